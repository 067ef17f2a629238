use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::booking::BookingError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Booking(err) => match err {
                BookingError::Validation(_) => StatusCode::BAD_REQUEST,
                BookingError::EventNotFound(_) | BookingError::ReservationNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BookingError::InsufficientTickets { .. }
                | BookingError::AlreadyPaid
                | BookingError::NoTicketsHeld => StatusCode::CONFLICT,
                BookingError::ReservationExpired => StatusCode::GONE,
                BookingError::IdempotencyConflict => StatusCode::UNPROCESSABLE_ENTITY,
                BookingError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
                BookingError::Database(_)
                | BookingError::StoreUnavailable(_)
                | BookingError::PaymentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                BookingError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Booking(err) => match err {
                BookingError::Validation(_) => "VALIDATION_ERROR",
                BookingError::EventNotFound(_) | BookingError::ReservationNotFound(_) => {
                    "NOT_FOUND"
                }
                BookingError::InsufficientTickets { .. } => "INSUFFICIENT_TICKETS",
                BookingError::ReservationExpired => "RESERVATION_EXPIRED",
                BookingError::AlreadyPaid => "ALREADY_PAID",
                BookingError::NoTicketsHeld => "NO_TICKETS_HELD",
                BookingError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
                BookingError::PaymentDeclined(_) => "PAYMENT_DECLINED",
                BookingError::PaymentUnavailable(_) => "PAYMENT_UNAVAILABLE",
                BookingError::Database(_) | BookingError::StoreUnavailable(_) => {
                    "STORE_UNAVAILABLE"
                }
                BookingError::Timeout => "TIMEOUT",
            },
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::ValidationError(_) => None,
            AppError::Booking(BookingError::InsufficientTickets { tier_id }) => Some(json!({
                "tierId": tier_id,
                "retriable": true,
            })),
            AppError::Booking(err) => Some(json!({ "retriable": err.is_retriable() })),
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            error!(error = ?self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::Booking(BookingError::Database(_)) => "A database error occurred".to_string(),
            AppError::Booking(BookingError::StoreUnavailable(_)) => {
                "The booking store is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        error_response(code, public_message, self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_payment_failures_are_distinguishable() {
        let cases = [
            (BookingError::ReservationNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (BookingError::ReservationExpired, StatusCode::GONE),
            (BookingError::AlreadyPaid, StatusCode::CONFLICT),
        ];

        let mut codes = Vec::new();
        for (err, status) in cases {
            let app_error = AppError::from(err);
            assert_eq!(app_error.status_code(), status);
            codes.push(app_error.code());
        }
        codes.dedup();
        assert_eq!(codes.len(), 3);
    }

    #[test]
    fn test_insufficient_tickets_details_name_tier() {
        let tier_id = Uuid::new_v4();
        let err = AppError::from(BookingError::InsufficientTickets { tier_id });

        assert_eq!(err.code(), "INSUFFICIENT_TICKETS");
        assert_eq!(
            err.details(),
            Some(json!({ "tierId": tier_id, "retriable": true }))
        );
    }

    #[test]
    fn test_transient_store_failure_is_service_unavailable() {
        let err = AppError::from(BookingError::StoreUnavailable("down".to_string()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.details(), Some(json!({ "retriable": true })));
    }

    #[test]
    fn test_provider_outage_is_not_a_decline() {
        use crate::booking::payment::GatewayError;

        let declined = AppError::from(BookingError::PaymentDeclined(GatewayError::Declined(
            "card is not in allowlist".to_string(),
        )));
        let outage = AppError::from(BookingError::PaymentUnavailable(
            GatewayError::Unavailable("connection refused".to_string()),
        ));

        assert_eq!(declined.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(declined.details(), Some(json!({ "retriable": false })));
        assert_eq!(outage.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(outage.code(), "PAYMENT_UNAVAILABLE");
        assert_eq!(outage.details(), Some(json!({ "retriable": true })));
    }
}
