use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::delivery::DeliveryError;

use super::keys::CacheKey;

/// Outcome of a failed read-through.
///
/// Cloneable so every caller waiting on the same fetch receives the same
/// failure.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] Arc<DeliveryError>),
    #[error("fetch for `{key}` timed out after {after:?}")]
    Timeout { key: CacheKey, after: Duration },
    #[error("cached value for `{key}` has an unexpected type")]
    TypeMismatch { key: CacheKey },
}

impl CacheError {
    /// Delivery failure behind this error, if any.
    pub fn delivery(&self) -> Option<&DeliveryError> {
        match self {
            CacheError::Fetch(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.delivery(), Some(DeliveryError::NotFound { .. }))
    }
}

impl From<DeliveryError> for CacheError {
    fn from(error: DeliveryError) -> Self {
        Self::Fetch(Arc::new(error))
    }
}
