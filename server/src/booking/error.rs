use thiserror::Error;
use uuid::Uuid;

use super::payment::GatewayError;

/// Failures of booking operations. Every variant maps to a stable
/// classification so callers can tell whether a retry is safe.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("not enough tickets available of tier {tier_id}")]
    InsufficientTickets { tier_id: Uuid },

    #[error("reservation is expired")]
    ReservationExpired,

    #[error("reservation already paid")]
    AlreadyPaid,

    #[error("no tickets held by reservation")]
    NoTicketsHeld,

    #[error("idempotency key was already used for a different request")]
    IdempotencyConflict,

    #[error("payment failed: {0}")]
    PaymentDeclined(#[source] GatewayError),

    #[error("payment could not be processed: {0}")]
    PaymentUnavailable(#[source] GatewayError),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("operation timed out")]
    Timeout,
}

impl BookingError {
    /// Whether the caller may retry the same request, reusing its idempotency key.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BookingError::InsufficientTickets { .. }
                | BookingError::Database(_)
                | BookingError::StoreUnavailable(_)
                | BookingError::PaymentUnavailable(_)
                | BookingError::Timeout
        )
    }
}
