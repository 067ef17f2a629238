//! Inventory store: durable state for events, tiers, ticket units and
//! reservations.
//!
//! Writers go through [`StoreTx`]; a transaction that is dropped without
//! [`StoreTx::commit`] leaves no trace. Read-only queries run directly on the
//! store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::booking::BookingError;
use crate::models::{Event, Reservation, ReservationSummary, TicketTier, TierAvailability};

pub mod memory;
pub mod postgres;

pub use memory::{FailPoint, InMemoryInventoryStore};
pub use postgres::PgInventoryStore;

/// A hold placed on claimed units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hold {
    pub reservation_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Opens a read-committed transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, BookingError>;

    async fn list_events(&self) -> Result<Vec<Event>, BookingError>;

    /// Per-tier availability at `now`, or `None` if the event does not exist.
    async fn tier_availability(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<TierAvailability>>, BookingError>;

    async fn reservation_summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, BookingError>;

    async fn actor_reservations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, BookingError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_event(&mut self, event: &Event) -> Result<(), BookingError>;

    async fn insert_tier(&mut self, tier: &TicketTier) -> Result<(), BookingError>;

    /// Creates `count` fresh units for a tier.
    async fn insert_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        count: u32,
    ) -> Result<(), BookingError>;

    async fn event_exists(&mut self, event_id: Uuid) -> Result<bool, BookingError>;

    /// Inserts a reservation unless its idempotency key is taken. Returns
    /// whether a row was inserted.
    async fn insert_reservation(&mut self, reservation: &Reservation)
        -> Result<bool, BookingError>;

    async fn reservation_by_key(
        &mut self,
        idempotency_key: Uuid,
    ) -> Result<Option<Reservation>, BookingError>;

    /// Loads a reservation and locks it for the rest of the transaction.
    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, BookingError>;

    /// Holds up to `quantity` units of a tier that are available at `now`,
    /// lowest unit id first. Units locked by concurrent transactions are
    /// skipped, never waited on. Returns the ids of the units held.
    async fn claim_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        quantity: u32,
        hold: Hold,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, BookingError>;

    /// Tier price of every unit held by the reservation, locking those units.
    async fn held_unit_prices(&mut self, reservation_id: Uuid)
        -> Result<Vec<Decimal>, BookingError>;

    /// Converts the reservation's holds into sales. Returns the number of units sold.
    async fn mark_units_sold(&mut self, reservation_id: Uuid) -> Result<u64, BookingError>;

    async fn mark_reservation_paid(&mut self, reservation_id: Uuid) -> Result<(), BookingError>;

    async fn commit(self: Box<Self>) -> Result<(), BookingError>;
}
