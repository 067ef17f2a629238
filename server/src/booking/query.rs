//! Read-only views. Availability is derived from ticket rows on every call, so
//! it can be stale by the time a reservation runs; the allocator re-checks.

use std::sync::Arc;

use uuid::Uuid;

use super::clock::Clock;
use super::store::InventoryStore;
use super::BookingError;
use crate::models::{Event, ReservationSummary, TierAvailability};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl QueryService {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, BookingError> {
        self.store.list_events().await
    }

    /// Tiers of an event with the number of units nobody holds or bought.
    pub async fn tier_availability(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<TierAvailability>, BookingError> {
        self.store
            .tier_availability(event_id, self.clock.now())
            .await?
            .ok_or(BookingError::EventNotFound(event_id))
    }

    pub async fn reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<ReservationSummary, BookingError> {
        self.store
            .reservation_summary(reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation_id))
    }

    pub async fn actor_reservations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, BookingError> {
        self.store.actor_reservations(actor_id).await
    }
}
