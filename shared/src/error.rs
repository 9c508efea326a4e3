use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the order and reminder services.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("{entity} not found with id: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Persistence call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Database error: {0}")]
    Database(String),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP status code the API layer answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::NotFound { .. } => 404,
            ServiceError::InvalidTransition(_) | ServiceError::ValidationError(_) => 400,
            ServiceError::Timeout(_) => 504,
            ServiceError::Database(_) => 500,
        }
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(e: diesel::result::Error) -> Self {
        ServiceError::Database(e.to_string())
    }
}

/// Runs a persistence call with an upper bound on how long it may take.
///
/// The call is not retried when the bound expires.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_fast_calls() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, ServiceError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn bounded_fails_stalled_calls() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServiceError>(())
        })
        .await;
        assert_eq!(result, Err(ServiceError::Timeout(limit)));
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServiceError::not_found("Order", 1).http_status(), 404);
        assert_eq!(ServiceError::InvalidTransition("x".into()).http_status(), 400);
        assert_eq!(ServiceError::ValidationError("x".into()).http_status(), 400);
        assert_eq!(ServiceError::Timeout(Duration::from_secs(1)).http_status(), 504);
        assert_eq!(ServiceError::Database("x".into()).http_status(), 500);
    }
}
