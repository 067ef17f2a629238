use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::store::{Hold, InventoryStore};
use super::BookingError;
use crate::models::{Reservation, ReservationHandle, ReservationRequest};

/// How long a reservation holds its tickets.
pub const RESERVATION_TTL_MINUTES: i64 = 15;

pub fn hold_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(RESERVATION_TTL_MINUTES)
}

/// Claims ticket units for reservations, all tiers or nothing.
#[derive(Clone)]
pub struct Allocator {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl Allocator {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reserves the requested quantities under one transaction.
    ///
    /// A repeated idempotency key never claims inventory again: an identical
    /// replay gets the original reservation back, anything else is an
    /// [`BookingError::IdempotencyConflict`].
    #[instrument(
        skip(self, request),
        fields(
            event_id = %request.event_id,
            actor_id = %request.actor_id,
            idempotency_key = %request.idempotency_key,
        )
    )]
    pub async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationHandle, BookingError> {
        if request.requested_tiers().next().is_none() {
            return Err(BookingError::Validation(
                "at least one ticket must be requested".to_string(),
            ));
        }

        let now = self.clock.now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            event_id: request.event_id,
            actor_id: request.actor_id,
            idempotency_key: request.idempotency_key,
            request_fingerprint: request.fingerprint(),
            expires_at: hold_expiry(now),
            is_paid: false,
            created_at: now,
        };

        let mut tx = self.store.begin().await?;

        if !tx.event_exists(request.event_id).await? {
            return Err(BookingError::EventNotFound(request.event_id));
        }

        if !tx.insert_reservation(&reservation).await? {
            let existing = tx
                .reservation_by_key(request.idempotency_key)
                .await?
                .ok_or_else(|| {
                    BookingError::StoreUnavailable(
                        "reservation for idempotency key is not visible".to_string(),
                    )
                })?;
            return replay(&existing, request);
        }

        let hold = Hold {
            reservation_id: reservation.id,
            expires_at: reservation.expires_at,
        };
        for (tier_id, quantity) in request.requested_tiers() {
            let claimed = tx
                .claim_units(request.event_id, tier_id, quantity, hold, now)
                .await?;

            if claimed.len() < quantity as usize {
                warn!(
                    tier_id = %tier_id,
                    requested = quantity,
                    available = claimed.len(),
                    "Not enough tickets, discarding reservation"
                );
                return Err(BookingError::InsufficientTickets { tier_id });
            }
        }

        tx.commit().await?;

        info!(
            reservation_id = %reservation.id,
            expires_at = %reservation.expires_at,
            "Reservation created"
        );

        Ok(ReservationHandle {
            reservation_id: reservation.id,
            expires_at: reservation.expires_at,
        })
    }
}

fn replay(
    existing: &Reservation,
    request: &ReservationRequest,
) -> Result<ReservationHandle, BookingError> {
    if !existing.matches(request) {
        warn!(
            reservation_id = %existing.id,
            "Idempotency key reused with a different request"
        );
        return Err(BookingError::IdempotencyConflict);
    }

    info!(reservation_id = %existing.id, "Replayed reservation request");
    Ok(ReservationHandle {
        reservation_id: existing.id,
        expires_at: existing.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::testing::{seed_event, TestBed};
    use std::collections::BTreeMap;

    fn request(event_id: Uuid, tickets: &[(Uuid, u32)]) -> ReservationRequest {
        ReservationRequest {
            idempotency_key: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            event_id,
            tickets: tickets.iter().copied().collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_reserve_holds_units_until_expiry() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let tier = seeded.tier("GA");

        let handle = bed
            .allocator()
            .reserve(&request(seeded.event_id, &[(tier, 2)]))
            .await
            .unwrap();

        assert_eq!(handle.expires_at, hold_expiry(bed.clock.now()));
        let held: Vec<_> = bed
            .store
            .tier_units(tier)
            .await
            .into_iter()
            .filter(|u| u.hold_token == Some(handle.reservation_id))
            .collect();
        assert_eq!(held.len(), 2);
        assert!(held.iter().all(|u| u.hold_expires_at == Some(handle.expires_at)));
    }

    #[tokio::test]
    async fn test_insufficient_tier_rolls_back_every_tier() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 10), ("VIP", "100.00", 2)]).await;
        let ga = seeded.tier("GA");
        let vip = seeded.tier("VIP");

        let err = bed
            .allocator()
            .reserve(&request(seeded.event_id, &[(ga, 3), (vip, 5)]))
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::InsufficientTickets { tier_id } if tier_id == vip));
        assert!(bed
            .store
            .tier_units(ga)
            .await
            .iter()
            .all(|u| u.hold_token.is_none()));
        assert_eq!(bed.store.reservation_count().await, 0);
        assert_eq!(bed.available(seeded.event_id, ga).await, 10);
    }

    #[tokio::test]
    async fn test_zero_quantities_are_ignored() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 1), ("VIP", "100.00", 0)]).await;

        let handle = bed
            .allocator()
            .reserve(&request(
                seeded.event_id,
                &[(seeded.tier("GA"), 1), (seeded.tier("VIP"), 0)],
            ))
            .await;
        assert!(handle.is_ok());
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 1)]).await;

        let err = bed
            .allocator()
            .reserve(&request(seeded.event_id, &[(seeded.tier("GA"), 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let bed = TestBed::new();
        let event_id = Uuid::new_v4();

        let err = bed
            .allocator()
            .reserve(&request(event_id, &[(Uuid::new_v4(), 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::EventNotFound(id) if id == event_id));
    }

    #[tokio::test]
    async fn test_tier_of_another_event_is_insufficient() {
        let bed = TestBed::new();
        let first = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let second = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let foreign_tier = second.tier("GA");

        let err = bed
            .allocator()
            .reserve(&request(first.event_id, &[(foreign_tier, 1)]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BookingError::InsufficientTickets { tier_id } if tier_id == foreign_tier)
        );
    }

    #[tokio::test]
    async fn test_identical_replay_returns_original_without_claiming() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let tier = seeded.tier("GA");
        let req = request(seeded.event_id, &[(tier, 2)]);

        let first = bed.allocator().reserve(&req).await.unwrap();
        let second = bed.allocator().reserve(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(bed.store.reservation_count().await, 1);
        assert_eq!(bed.available(seeded.event_id, tier).await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_replays_claim_once() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 10)]).await;
        let tier = seeded.tier("GA");
        let req = request(seeded.event_id, &[(tier, 2)]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = bed.allocator();
            let req = req.clone();
            handles.push(tokio::spawn(async move { allocator.reserve(&req).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().reservation_id);
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(bed.store.reservation_count().await, 1);
        assert_eq!(bed.available(seeded.event_id, tier).await, 8);
    }

    #[tokio::test]
    async fn test_mismatched_replay_is_rejected() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let tier = seeded.tier("GA");
        let original = request(seeded.event_id, &[(tier, 2)]);
        bed.allocator().reserve(&original).await.unwrap();

        let mut changed = original.clone();
        changed.tickets.insert(tier, 3);

        let err = bed.allocator().reserve(&changed).await.unwrap_err();
        assert!(matches!(err, BookingError::IdempotencyConflict));
        assert_eq!(bed.available(seeded.event_id, tier).await, 3);
    }

    #[tokio::test]
    async fn test_failed_attempt_can_be_retried_with_same_key() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 2)]).await;
        let tier = seeded.tier("GA");

        let blocker = bed
            .allocator()
            .reserve(&request(seeded.event_id, &[(tier, 2)]))
            .await
            .unwrap();
        let retry = request(seeded.event_id, &[(tier, 1)]);
        assert!(matches!(
            bed.allocator().reserve(&retry).await,
            Err(BookingError::InsufficientTickets { .. })
        ));

        bed.clock.advance(Duration::minutes(RESERVATION_TTL_MINUTES + 1));
        let handle = bed.allocator().reserve(&retry).await.unwrap();
        assert_ne!(handle.reservation_id, blocker.reservation_id);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_exclusive() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 5)]).await;
        let tier = seeded.tier("GA");

        let a = {
            let allocator = bed.allocator();
            let req = request(seeded.event_id, &[(tier, 3)]);
            tokio::spawn(async move { allocator.reserve(&req).await })
        };
        let b = {
            let allocator = bed.allocator();
            let req = request(seeded.event_id, &[(tier, 3)]);
            tokio::spawn(async move { allocator.reserve(&req).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let shortfalls = results
            .iter()
            .filter(|r| {
                matches!(r, Err(BookingError::InsufficientTickets { tier_id }) if *tier_id == tier)
            })
            .count();

        assert_eq!(successes, 1);
        assert_eq!(shortfalls, 1);
        assert_eq!(bed.available(seeded.event_id, tier).await, 2);
    }

    #[tokio::test]
    async fn test_many_buyers_never_oversell() {
        let bed = TestBed::new();
        let seeded = seed_event(&bed, &[("GA", "10.00", 20)]).await;
        let tier = seeded.tier("GA");

        let mut handles = Vec::new();
        for _ in 0..30 {
            let allocator = bed.allocator();
            let req = request(seeded.event_id, &[(tier, 1)]);
            handles.push(tokio::spawn(async move { allocator.reserve(&req).await }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 20);
        let units = bed.store.tier_units(tier).await;
        let mut holders: Vec<_> = units.iter().filter_map(|u| u.hold_token).collect();
        holders.sort();
        holders.dedup();
        assert_eq!(holders.len(), 20);
    }

    #[test]
    fn test_hold_lasts_fifteen_minutes() {
        let now = Utc::now();
        assert_eq!(hold_expiry(now) - now, Duration::minutes(15));
    }
}
