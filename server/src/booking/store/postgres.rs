use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Hold, InventoryStore, StoreTx};
use crate::booking::BookingError;
use crate::models::{Event, Reservation, ReservationSummary, TicketTier, TierAvailability};

const RESERVATION_COLUMNS: &str = "id, event_id, actor_id, idempotency_key, request_fingerprint, \
     expires_at, is_paid, created_at";

const SUMMARY_SELECT: &str = r#"
    SELECT
        r.id,
        r.event_id,
        e.name AS event_name,
        r.actor_id,
        r.expires_at,
        r.is_paid,
        (
            SELECT COUNT(*)
            FROM tickets t
            WHERE t.hold_token = r.id OR t.sold_to = r.id
        ) AS ticket_count
    FROM reservations r
    JOIN events e ON e.id = r.event_id
"#;

/// PostgreSQL-backed store. Claims rely on `FOR UPDATE SKIP LOCKED`, so
/// concurrent allocators never wait on each other's candidate rows.
#[derive(Debug, Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, BookingError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn list_events(&self) -> Result<Vec<Event>, BookingError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT id, name, created_at FROM events ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn tier_availability(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<TierAvailability>>, BookingError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Ok(None);
        }

        let tiers = sqlx::query_as::<_, TierAvailability>(
            r#"
            SELECT
                tt.id AS tier_id,
                tt.name,
                tt.price,
                COUNT(t.id) FILTER (
                    WHERE t.is_sold = FALSE
                    AND (t.hold_token IS NULL OR t.hold_expires_at < $2)
                ) AS available_count
            FROM ticket_tiers tt
            LEFT JOIN tickets t ON t.tier_id = tt.id
            WHERE tt.event_id = $1
            GROUP BY tt.id, tt.name, tt.price
            ORDER BY tt.price, tt.name
            "#,
        )
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(tiers))
    }

    async fn reservation_summary(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationSummary>, BookingError> {
        let summary =
            sqlx::query_as::<_, ReservationSummary>(&format!("{SUMMARY_SELECT} WHERE r.id = $1"))
                .bind(reservation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(summary)
    }

    async fn actor_reservations(
        &self,
        actor_id: Uuid,
    ) -> Result<Vec<ReservationSummary>, BookingError> {
        let summaries = sqlx::query_as::<_, ReservationSummary>(&format!(
            "{SUMMARY_SELECT} WHERE r.actor_id = $1 ORDER BY r.created_at DESC"
        ))
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }
}

/// Dropping this without committing rolls the transaction back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn insert_event(&mut self, event: &Event) -> Result<(), BookingError> {
        sqlx::query("INSERT INTO events (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(event.id)
            .bind(&event.name)
            .bind(event.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_tier(&mut self, tier: &TicketTier) -> Result<(), BookingError> {
        sqlx::query("INSERT INTO ticket_tiers (id, event_id, name, price) VALUES ($1, $2, $3, $4)")
            .bind(tier.id)
            .bind(tier.event_id)
            .bind(&tier.name)
            .bind(tier.price)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        count: u32,
    ) -> Result<(), BookingError> {
        sqlx::query(
            "INSERT INTO tickets (event_id, tier_id) \
             SELECT $1, $2 FROM generate_series(1::BIGINT, $3::BIGINT)",
        )
        .bind(event_id)
        .bind(tier_id)
        .bind(i64::from(count))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn event_exists(&mut self, event_id: Uuid) -> Result<bool, BookingError> {
        let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_reservation(
        &mut self,
        reservation: &Reservation,
    ) -> Result<bool, BookingError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reservations
                (id, event_id, actor_id, idempotency_key, request_fingerprint,
                 expires_at, is_paid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.event_id)
        .bind(reservation.actor_id)
        .bind(reservation.idempotency_key)
        .bind(&reservation.request_fingerprint)
        .bind(reservation.expires_at)
        .bind(reservation.is_paid)
        .bind(reservation.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reservation_by_key(
        &mut self,
        idempotency_key: Uuid,
    ) -> Result<Option<Reservation>, BookingError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE idempotency_key = $1"
        ))
        .bind(idempotency_key)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(reservation)
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Option<Reservation>, BookingError> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(reservation)
    }

    async fn claim_units(
        &mut self,
        event_id: Uuid,
        tier_id: Uuid,
        quantity: u32,
        hold: Hold,
        now: DateTime<Utc>,
    ) -> Result<Vec<i64>, BookingError> {
        let mut claimed: Vec<i64> = sqlx::query_scalar(
            r#"
            WITH picked AS (
                SELECT id
                FROM tickets
                WHERE event_id = $1
                    AND tier_id = $2
                    AND is_sold = FALSE
                    AND (hold_token IS NULL OR hold_expires_at < $3)
                ORDER BY id
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tickets t
            SET hold_token = $5, hold_expires_at = $6
            FROM picked
            WHERE t.id = picked.id
            RETURNING t.id
            "#,
        )
        .bind(event_id)
        .bind(tier_id)
        .bind(now)
        .bind(i64::from(quantity))
        .bind(hold.reservation_id)
        .bind(hold.expires_at)
        .fetch_all(&mut *self.tx)
        .await?;

        claimed.sort_unstable();
        Ok(claimed)
    }

    async fn held_unit_prices(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Vec<Decimal>, BookingError> {
        let prices = sqlx::query_scalar(
            r#"
            SELECT tt.price
            FROM tickets t
            JOIN ticket_tiers tt ON t.tier_id = tt.id
            WHERE t.hold_token = $1 AND t.is_sold = FALSE
            ORDER BY t.id
            FOR UPDATE OF t
            "#,
        )
        .bind(reservation_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(prices)
    }

    async fn mark_units_sold(&mut self, reservation_id: Uuid) -> Result<u64, BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET is_sold = TRUE, sold_to = hold_token, hold_token = NULL, hold_expires_at = NULL
            WHERE hold_token = $1 AND is_sold = FALSE
            "#,
        )
        .bind(reservation_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_reservation_paid(&mut self, reservation_id: Uuid) -> Result<(), BookingError> {
        sqlx::query("UPDATE reservations SET is_paid = TRUE WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        let PgStoreTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
