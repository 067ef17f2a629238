use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Hold, InventoryStore, StoreTx};
use crate::booking::BookingError;
use crate::models::{
    Event, Reservation, ReservationSummary, TicketTier, TicketUnit, TierAvailability,
};

/// Transaction step that can be made to fail once, to exercise failure paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    MarkUnitsSold,
    MarkReservationPaid,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    tiers: HashMap<Uuid, TicketTier>,
    // Kept sorted by id.
    tickets: Vec<TicketUnit>,
    reservations: HashMap<Uuid, Reservation>,
    next_ticket_id: i64,
}

impl MemoryState {
    fn summary(&self, reservation: &Reservation) -> ReservationSummary {
        let ticket_count = self
            .tickets
            .iter()
            .filter(|t| {
                t.hold_token == Some(reservation.id) || t.sold_to == Some(reservation.id)
            })
            .count();

        ReservationSummary {
            id: reservation.id,
            event_id: reservation.event_id,
            event_name: self
                .events
                .get(&reservation.event_id)
                .map(|e| e.name.clone())
                .unwrap_or_default(),
            actor_id: reservation.actor_id,
            expires_at: reservation.expires_at,
            is_paid: reservation.is_paid,
            ticket_count: ticket_count as i64,
        }
    }
}

/// In-process store for tests and local runs.
///
/// A transaction holds the whole state exclusively and works on a staged copy
/// that replaces the state on commit, so transactions are serialized and a
/// dropped transaction leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<AsyncMutex<MemoryState>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction that reaches `point` fail with a store error.
    pub fn fail_next(&self, point: FailPoint) {
        *self.fail_point.lock().unwrap_or_else(PoisonError::into_inner) = Some(point);
    }

    /// Snapshot of every unit of a tier, ordered by id.
    pub async fn tier_units(&self, tier_id: Uuid) -> Vec<TicketUnit> {
        let state = self.state.lock().await;
        state
            .tickets
            .iter()
            .filter(|t| t.tier_id == tier_id)
            .cloned()
            .collect()
    }

    pub async fn reservation(&self, reservation_id: Uuid) -> Option<Reservation> {
        let state = self.state.lock().await;
        state.reservations.get(&reservation_id).cloned()
    }

    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, BookingError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_point: Arc::clone(&self.fail_point),
        }))
    }

    async fn list_events(&self) -> Result<Vec<Event>, BookingError> {
        let state = self.state.lock().await;
        let mut events: Vec<Event> = state.events.values().cloned().collect();
        events.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(events)
    }

    async fn tier_availability(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<TierAvailability>>, BookingError> {
        let state = self.state.lock().await;
        if !state.events.contains_key(&event_id) {
            return Ok(None);
        }

        let mut tiers: Vec<TierAvailability> = state
            .tiers
            .values()
            .filter(|tier| tier.event_id == event_id)
            .map(|tier| TierAvailability {
                tier_id: tier.id,
                name: tier.name.clone(),
                price: tier.price,
                available_count: state
                    .tickets
                    .iter()
                    .filter(|t| t.tier_id == tier.id && t.is_available(now))
                    .count() as i64,
            })
            .collect();
        tiers.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));

        Ok(Some(tiers))
    }

    async fn reservation_summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, BookingError> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .get(&reservation_id)
            .map(|r| state.summary(r)))
    }

    async fn actor_reservations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, BookingError> {
        let state = self.state.lock().await;
        let mut owned: Vec<&Reservation> = state
            .reservations
            .values()
            .filter(|r| r.actor_id == actor_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned.into_iter().map(|r| state.summary(r)).collect())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> Result<(), BookingError> {
        let mut armed = self.fail_point.lock().unwrap_or_else(PoisonError::into_inner);
        if *armed == Some(point) {
            *armed = None;
            return Err(BookingError::StoreUnavailable(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_event(&mut self, event: &Event) -> Result<(), BookingError> {
        self.staged.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn insert_tier(&mut self, tier: &TicketTier) -> Result<(), BookingError> {
        if !self.staged.events.contains_key(&tier.event_id) {
            return Err(BookingError::EventNotFound(tier.event_id));
        }
        self.staged.tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn insert_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        count: u32,
    ) -> Result<(), BookingError> {
        for _ in 0..count {
            self.staged.next_ticket_id += 1;
            let id = self.staged.next_ticket_id;
            self.staged.tickets.push(TicketUnit::new(id, event_id, tier_id));
        }
        Ok(())
    }

    async fn event_exists(&mut self, event_id: Uuid) -> Result<bool, BookingError> {
        Ok(self.staged.events.contains_key(&event_id))
    }

    async fn insert_reservation(
        &mut self,
        reservation: &Reservation,
    ) -> Result<bool, BookingError> {
        let taken = self
            .staged
            .reservations
            .values()
            .any(|r| r.idempotency_key == reservation.idempotency_key);
        if taken {
            return Ok(false);
        }
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(true)
    }

    async fn reservation_by_key(
        &mut self,
        idempotency_key: Uuid,
    ) -> Result<Option<Reservation>, BookingError> {
        Ok(self
            .staged
            .reservations
            .values()
            .find(|r| r.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, BookingError> {
        Ok(self.staged.reservations.get(&reservation_id).cloned())
    }

    async fn claim_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        quantity: u32,
        hold: Hold,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, BookingError> {
        let mut claimed = Vec::new();
        for unit in self.staged.tickets.iter_mut().filter(|t| {
            t.event_id == event_id && t.tier_id == tier_id && t.is_available(now)
        }) {
            if claimed.len() == quantity as usize {
                break;
            }
            unit.hold(hold.reservation_id, hold.expires_at);
            claimed.push(unit.id);
        }
        Ok(claimed)
    }

    async fn held_unit_prices(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Vec<Decimal>, BookingError> {
        let staged = &self.staged;
        staged
            .tickets
            .iter()
            .filter(|t| t.is_held_by(reservation_id))
            .map(|t| {
                staged
                    .tiers
                    .get(&t.tier_id)
                    .map(|tier| tier.price)
                    .ok_or_else(|| {
                        BookingError::StoreUnavailable(format!("tier {} missing", t.tier_id))
                    })
            })
            .collect()
    }

    async fn mark_units_sold(&mut self, reservation_id: Uuid) -> Result<u64, BookingError> {
        self.check(FailPoint::MarkUnitsSold)?;
        let mut sold = 0;
        for unit in self
            .staged
            .tickets
            .iter_mut()
            .filter(|t| t.is_held_by(reservation_id))
        {
            unit.sell();
            sold += 1;
        }
        Ok(sold)
    }

    async fn mark_reservation_paid(&mut self, reservation_id: Uuid) -> Result<(), BookingError> {
        self.check(FailPoint::MarkReservationPaid)?;
        if let Some(reservation) = self.staged.reservations.get_mut(&reservation_id) {
            reservation.is_paid = true;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        self.check(FailPoint::Commit)?;
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn seed(store: &InMemoryInventoryStore, units: u32) -> (Uuid, Uuid) {
        let event = Event {
            id: Uuid::new_v4(),
            name: "Concert".to_string(),
            created_at: Utc::now(),
        };
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: "GA".to_string(),
            price: dec!(10.00),
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_event(&event).await.unwrap();
        tx.insert_tier(&tier).await.unwrap();
        tx.insert_units(event.id, tier.id, units).await.unwrap();
        tx.commit().await.unwrap();

        (event.id, tier.id)
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_changes() {
        let store = InMemoryInventoryStore::new();
        let (event_id, tier_id) = seed(&store, 3).await;
        let now = Utc::now();

        {
            let mut tx = store.begin().await.unwrap();
            let hold = Hold {
                reservation_id: Uuid::new_v4(),
                expires_at: now + Duration::minutes(15),
            };
            let claimed = tx.claim_units(event_id, tier_id, 2, hold, now).await.unwrap();
            assert_eq!(claimed.len(), 2);
        }

        let units = store.tier_units(tier_id).await;
        assert!(units.iter().all(|u| u.hold_token.is_none()));
    }

    #[tokio::test]
    async fn test_claim_takes_lowest_ids_first() {
        let store = InMemoryInventoryStore::new();
        let (event_id, tier_id) = seed(&store, 5).await;
        let now = Utc::now();
        let hold = Hold {
            reservation_id: Uuid::new_v4(),
            expires_at: now + Duration::minutes(15),
        };

        let mut tx = store.begin().await.unwrap();
        let claimed = tx.claim_units(event_id, tier_id, 2, hold, now).await.unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<i64> = store.tier_units(tier_id).await.iter().map(|u| u.id).collect();
        assert_eq!(claimed, ids[..2].to_vec());
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = InMemoryInventoryStore::new();
        seed(&store, 1).await;
        store.fail_next(FailPoint::Commit);

        let tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.commit().await,
            Err(BookingError::StoreUnavailable(_))
        ));

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn test_availability_for_unknown_event_is_none() {
        let store = InMemoryInventoryStore::new();
        let result = store
            .tier_availability(Uuid::new_v4(), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
