use std::sync::Arc;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure flowing upstream through a chain.
///
/// `Error` is cheap to clone so a catch handler can inspect a failure while the
/// original is still available for rethrowing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A user callback failed.
    #[error(transparent)]
    Callback(Arc<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Message(Arc<str>),

    /// A strict combine received a payload it could not reinterpret.
    #[error("payload is not convertible to `{expected}`")]
    Coercion { expected: &'static str },
}

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(Arc::from(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn callback_error_is_transparent() {
        let error = Error::new(DiskError);
        assert_eq!(error.to_string(), "disk on fire");
        assert!(matches!(error, Error::Callback(_)));
    }

    #[test]
    fn clones_share_the_same_message() {
        let error = Error::msg("boom");
        let copy = error.clone();
        assert_eq!(error.to_string(), copy.to_string());
    }

    #[test]
    fn coercion_names_the_target_type() {
        let error = Error::Coercion { expected: "u32" };
        assert_eq!(error.to_string(), "payload is not convertible to `u32`");
    }
}
