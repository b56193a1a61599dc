use std::fmt;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for store commands
///
/// Every command returns exactly one of these. `NotFound` doubles as the
/// "logically empty" answer: a missing key and a stale (expired or emptied)
/// key are indistinguishable to callers.
#[derive(Debug)]
pub enum StoreError {
    /// Key or subentry absent, or its meta record is stale
    NotFound,
    /// Malformed encoded value or unparseable numeric payload
    Corruption(String),
    /// Out-of-range offset, numeric overflow, bad operand
    InvalidArgument(String),
    /// Engine failure, surfaced unchanged
    Engine(rocksdb::Error),
}

impl StoreError {
    /// True if this is the NotFound status
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn corruption(msg: impl Into<String>) -> StoreError {
        StoreError::Corruption(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> StoreError {
        StoreError::InvalidArgument(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::Corruption(msg) => write!(f, "corruption: {}", msg),
            StoreError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            StoreError::Engine(e) => write!(f, "engine error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Engine(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(StoreError::NotFound.is_not_found());
        assert!(!StoreError::corruption("bad meta").is_not_found());
        assert!(!StoreError::invalid_argument("overflow").is_not_found());
    }

    #[test]
    fn test_display() {
        assert_eq!(StoreError::NotFound.to_string(), "not found");
        assert_eq!(
            StoreError::corruption("truncated").to_string(),
            "corruption: truncated"
        );
        assert_eq!(
            StoreError::invalid_argument("offset < 0").to_string(),
            "invalid argument: offset < 0"
        );
    }
}
