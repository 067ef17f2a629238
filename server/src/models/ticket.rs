use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single sellable ticket.
///
/// `hold_token` names the reservation currently holding the unit. A hold whose
/// `hold_expires_at` has passed no longer counts; the unit stays nominally held
/// in storage until another reservation claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketUnit {
    pub id: i64,
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub is_sold: bool,
    pub hold_token: Option<Uuid>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub sold_to: Option<Uuid>,
}

impl TicketUnit {
    pub fn new(id: i64, event_id: Uuid, tier_id: Uuid) -> Self {
        Self {
            id,
            event_id,
            tier_id,
            is_sold: false,
            hold_token: None,
            hold_expires_at: None,
            sold_to: None,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if self.is_sold {
            return false;
        }
        match (self.hold_token, self.hold_expires_at) {
            (None, _) | (_, None) => true,
            (Some(_), Some(expires_at)) => expires_at < now,
        }
    }

    pub fn is_held_by(&self, reservation_id: Uuid) -> bool {
        !self.is_sold && self.hold_token == Some(reservation_id)
    }

    pub fn hold(&mut self, reservation_id: Uuid, expires_at: DateTime<Utc>) {
        self.hold_token = Some(reservation_id);
        self.hold_expires_at = Some(expires_at);
    }

    pub fn sell(&mut self) {
        self.sold_to = self.hold_token.take();
        self.hold_expires_at = None;
        self.is_sold = true;
    }
}
