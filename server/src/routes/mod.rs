use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers, Config};
use crate::handlers::{events, health_check, reservations};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/:event_id/tiers", get(events::list_tiers))
        .route("/events/:event_id/reserve", post(events::reserve_tickets))
        .route(
            "/reservations/:reservation_id",
            get(reservations::get_reservation),
        )
        .route(
            "/reservations/:reservation_id/payment",
            post(reservations::pay_reservation),
        )
        .route(
            "/users/:actor_id/reservations",
            get(reservations::list_user_reservations),
        );

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state);

    with_security_headers(router, config.is_production)
        .layer(create_cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}
