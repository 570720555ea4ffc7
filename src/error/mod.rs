mod forge;

pub use forge::{ApiErrorBody, ApiErrorObject, ForgeError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
