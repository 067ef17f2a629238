//! Reservation and payment engine.
//!
//! [`Allocator`] claims ticket units under contention and holds them for
//! [`allocator::RESERVATION_TTL_MINUTES`]; [`PaymentOrchestrator`] turns a live
//! hold into a sale through a [`PaymentGateway`]; [`QueryService`] serves
//! read-only views. All coordination between concurrent requests goes through
//! the [`InventoryStore`] transactions; expired holds are reclaimed lazily by the
//! next allocation that finds them.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{
    CreateEventRequest, CreatedEvent, Event, PaymentReceipt, ReservationHandle,
    ReservationRequest, ReservationSummary, TierAvailability,
};

pub mod allocator;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod payment;
pub mod query;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use allocator::Allocator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::BookingError;
pub use orchestrator::PaymentOrchestrator;
pub use payment::{MockPaymentGateway, PaymentGateway};
pub use query::QueryService;
pub use store::{InMemoryInventoryStore, InventoryStore, PgInventoryStore};

/// Entry point used by the HTTP layer.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    allocator: Allocator,
    orchestrator: PaymentOrchestrator,
    queries: QueryService,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            allocator: Allocator::new(Arc::clone(&store), Arc::clone(&clock)),
            orchestrator: PaymentOrchestrator::new(
                Arc::clone(&store),
                gateway,
                Arc::clone(&clock),
            ),
            queries: QueryService::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
        }
    }

    pub async fn create_event(
        &self,
        request: &CreateEventRequest,
    ) -> Result<CreatedEvent, BookingError> {
        catalog::create_event(self.store.as_ref(), self.clock.as_ref(), request).await
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, BookingError> {
        self.queries.list_events().await
    }

    pub async fn tier_availability(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<TierAvailability>, BookingError> {
        self.queries.tier_availability(event_id).await
    }

    pub async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationHandle, BookingError> {
        self.allocator.reserve(request).await
    }

    pub async fn pay(
        &self,
        reservation_id: Uuid,
        card_number: &str,
    ) -> Result<PaymentReceipt, BookingError> {
        self.orchestrator.pay(reservation_id, card_number).await
    }

    pub async fn reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<ReservationSummary, BookingError> {
        self.queries.reservation(reservation_id).await
    }

    pub async fn actor_reservations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, BookingError> {
        self.queries.actor_reservations(actor_id).await
    }
}
