use thiserror::Error;

/// Errors from validating a caller-supplied identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity must not be empty")]
    Empty,

    #[error("identity is {len} characters long, maximum is {max}")]
    TooLong { max: usize, len: usize },

    #[error("identity must not contain control characters")]
    ControlCharacter,
}

/// Faults on a single client connection.
///
/// Always isolated to that session: the handler moves to `Closed` on a
/// receive fault, and broadcast counts a send fault and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("outbound queue full")]
    Full,

    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Errors from the durable message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Errors from encoding or decoding a chat event for the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode chat event: {0}")]
    Encode(String),

    #[error("malformed chat event payload: {0}")]
    Decode(String),
}

/// Errors from the distributed broadcast bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("publish to '{channel}' failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl BusError {
    /// Whether this error concerns a single bad payload rather than the
    /// subscription itself. Consumers drop such items and keep reading.
    pub fn is_malformed(&self) -> bool {
        matches!(self, BusError::Codec(CodecError::Decode(_)))
    }
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_display() {
        let err = IdentityError::TooLong { max: 64, len: 80 };
        assert_eq!(err.to_string(), "identity is 80 characters long, maximum is 64");
    }

    #[test]
    fn test_bus_error_malformed_classification() {
        let malformed = BusError::from(CodecError::Decode("eof".to_string()));
        assert!(malformed.is_malformed());
        assert_eq!(malformed.to_string(), "malformed chat event payload: eof");

        let encode = BusError::from(CodecError::Encode("bad".to_string()));
        assert!(!encode.is_malformed());

        let conn = BusError::Connection("refused".to_string());
        assert!(!conn.is_malformed());
    }

    #[test]
    fn test_publish_error_display() {
        let err = BusError::Publish {
            channel: "chat".to_string(),
            reason: "broken pipe".to_string(),
        };
        assert_eq!(err.to_string(), "publish to 'chat' failed: broken pipe");
    }
}
