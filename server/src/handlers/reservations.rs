use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::models::PaymentRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn get_reservation(
    State(state): State<AppState>,
    reservation_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(reservation_id) = reservation_id?;
    let reservation = state.run(state.booking.reservation(reservation_id)).await?;
    Ok(success(reservation, "Reservation retrieved"))
}

pub async fn list_user_reservations(
    State(state): State<AppState>,
    actor_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(actor_id) = actor_id?;
    let reservations = state.run(state.booking.actor_reservations(actor_id)).await?;
    Ok(success(reservations, "Reservations retrieved"))
}

pub async fn pay_reservation(
    State(state): State<AppState>,
    reservation_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(reservation_id) = reservation_id?;
    let Json(payment) = payload?;

    if payment.card_number.trim().is_empty() {
        return Err(AppError::ValidationError("cardNumber is required".to_string()));
    }

    let receipt = state
        .run(state.booking.pay(reservation_id, &payment.card_number))
        .await?;
    Ok(success(receipt, "Payment accepted"))
}
