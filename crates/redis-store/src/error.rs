//! Key-value store error types

use pipeline::ResourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvStoreError {
    #[error("Key-value store connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

impl From<KvStoreError> for ResourceError {
    fn from(err: KvStoreError) -> Self {
        ResourceError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let err = KvStoreError::Connection("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "Key-value store connection error: connection refused"
        );
    }

    #[test]
    fn converts_to_backend_resource_error() {
        let err: ResourceError = KvStoreError::Connection("timeout".into()).into();
        assert_eq!(
            err,
            ResourceError::Backend("Key-value store connection error: timeout".into())
        );
    }
}
