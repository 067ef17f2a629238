use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub actor_id: Uuid,
    pub idempotency_key: Uuid,
    pub request_fingerprint: String,
    pub expires_at: DateTime<Utc>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// An unpaid reservation past its expiry is dead and must not be paid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether `request` is a replay of the request that created this reservation.
    pub fn matches(&self, request: &ReservationRequest) -> bool {
        self.actor_id == request.actor_id
            && self.event_id == request.event_id
            && self.request_fingerprint == request.fingerprint()
    }
}

/// Body of a reserve call. The event comes from the route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveTicketsBody {
    pub idempotency_key: Uuid,
    #[serde(rename = "actorID", alias = "actorId")]
    pub actor_id: Uuid,
    /// Tier id to requested quantity.
    pub tickets_count: BTreeMap<Uuid, u32>,
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub idempotency_key: Uuid,
    pub actor_id: Uuid,
    pub event_id: Uuid,
    pub tickets: BTreeMap<Uuid, u32>,
}

impl ReservationRequest {
    pub fn new(event_id: Uuid, body: ReserveTicketsBody) -> Self {
        Self {
            idempotency_key: body.idempotency_key,
            actor_id: body.actor_id,
            event_id,
            tickets: body.tickets_count,
        }
    }

    /// Requested tiers in ascending tier id order, zero quantities dropped.
    pub fn requested_tiers(&self) -> impl Iterator<Item = (Uuid, u32)> + '_ {
        self.tickets
            .iter()
            .filter(|(_, quantity)| **quantity > 0)
            .map(|(tier_id, quantity)| (*tier_id, *quantity))
    }

    /// Canonical form of the requested quantities, stored with the reservation so a
    /// replay under the same idempotency key can be compared against the original.
    pub fn fingerprint(&self) -> String {
        let mut out = self.event_id.to_string();
        for (tier_id, quantity) in self.requested_tiers() {
            let _ = write!(out, ";{tier_id}={quantity}");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationHandle {
    #[serde(rename = "reservationID")]
    pub reservation_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Read-side view of a reservation joined with its event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSummary {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_name: String,
    pub actor_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub is_paid: bool,
    pub ticket_count: i64,
}
