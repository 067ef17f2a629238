use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::models::{CreateEventRequest, ReservationRequest, ReserveTicketsBody};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let event = state.run(state.booking.create_event(&request)).await?;
    Ok(created(event, "Event created"))
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.run(state.booking.list_events()).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn list_tiers(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(event_id) = event_id?;
    let tiers = state.run(state.booking.tier_availability(event_id)).await?;
    Ok(success(tiers, "Tiers retrieved"))
}

pub async fn reserve_tickets(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReserveTicketsBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(event_id) = event_id?;
    let Json(body) = payload?;

    let request = ReservationRequest::new(event_id, body);
    let handle = state.run(state.booking.reserve(&request)).await?;
    Ok(created(handle, "Tickets reserved"))
}
