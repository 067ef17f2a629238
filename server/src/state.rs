use std::future::Future;
use std::time::Duration;

use crate::booking::{BookingError, BookingService};
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub booking: BookingService,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(booking: BookingService, request_timeout: Duration) -> Self {
        Self {
            booking,
            request_timeout,
        }
    }

    /// Runs a booking operation under the request deadline. On timeout the
    /// operation future is dropped, which rolls back its open transaction.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, BookingError>>,
    {
        match tokio::time::timeout(self.request_timeout, operation).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => {
                tracing::warn!(timeout = ?self.request_timeout, "Booking operation timed out");
                Err(AppError::from(BookingError::Timeout))
            }
        }
    }
}
