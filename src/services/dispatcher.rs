use thiserror::Error;

use crate::models::Destination;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is not configured: {0}")]
    NotConfigured(String),

    #[error("dispatch request failed: {0}")]
    Request(String),
}

/// Issues a fresh code to the destination, e.g. by SMS.
#[rocket::async_trait]
pub trait CodeDispatcher: Send + Sync {
    async fn request_new_code(&self, destination: &Destination) -> Result<(), DispatchError>;
}
