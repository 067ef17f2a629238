use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::payment::{ChargeRequest, GatewayError, PaymentGateway};
use super::store::{InventoryStore, StoreTx};
use super::BookingError;
use crate::models::PaymentReceipt;

/// Turns a live reservation into a sale.
///
/// The charge is the only external side effect and happens after every local
/// precondition holds. Any failure after a successful charge reverses it before
/// the error reaches the caller.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn InventoryStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
        }
    }

    #[instrument(skip(self, card_number), fields(reservation_id = %reservation_id))]
    pub async fn pay(
        &self,
        reservation_id: Uuid,
        card_number: &str,
    ) -> Result<PaymentReceipt, BookingError> {
        let mut tx = self.store.begin().await?;

        let reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or(BookingError::ReservationNotFound(reservation_id))?;

        if reservation.is_paid {
            return Err(BookingError::AlreadyPaid);
        }
        if reservation.is_expired(self.clock.now()) {
            return Err(BookingError::ReservationExpired);
        }

        let prices = tx.held_unit_prices(reservation_id).await?;
        if prices.is_empty() {
            return Err(BookingError::NoTicketsHeld);
        }
        let amount: Decimal = prices.iter().sum();

        let receipt = self
            .gateway
            .charge(ChargeRequest {
                reservation_id,
                card_number: card_number.to_string(),
                amount,
            })
            .await
            .map_err(|err| {
                warn!(error = %err, "Charge failed");
                match err {
                    GatewayError::Declined(_) => BookingError::PaymentDeclined(err),
                    GatewayError::Unavailable(_) => BookingError::PaymentUnavailable(err),
                }
            })?;

        let mut guard = ReversalGuard::arm(Arc::clone(&self.gateway), receipt.transaction_id);

        if let Err(err) = finalize(tx, reservation_id, prices.len(), &mut guard).await {
            error!(
                error = %err,
                transaction_id = %receipt.transaction_id,
                "Finalizing sale failed after charge, reversing"
            );
            guard.reverse().await;
            return Err(err);
        }
        guard.disarm();

        info!(
            transaction_id = %receipt.transaction_id,
            amount = %amount,
            tickets = prices.len(),
            "Reservation paid"
        );

        Ok(PaymentReceipt {
            transaction_id: receipt.transaction_id,
            amount_charged: amount,
        })
    }
}

async fn finalize(
    mut tx: Box<dyn StoreTx>,
    reservation_id: Uuid,
    expected_units: usize,
    guard: &mut ReversalGuard,
) -> Result<(), BookingError> {
    let sold = tx.mark_units_sold(reservation_id).await?;
    if sold != expected_units as u64 {
        return Err(BookingError::StoreUnavailable(format!(
            "expected to sell {expected_units} tickets, sold {sold}"
        )));
    }
    tx.mark_reservation_paid(reservation_id).await?;
    guard.committing();
    tx.commit().await
}

/// Reverses a charge unless disarmed. Dropping an armed guard, which happens
/// when the payment future is cancelled before the commit, spawns the reversal.
///
/// While the commit is in flight the store may already have made the sale
/// durable, so a guard dropped in that window does not reverse. It logs the
/// transaction for reconciliation instead. A commit that returns an error is
/// reversed through [`ReversalGuard::reverse`].
struct ReversalGuard {
    gateway: Arc<dyn PaymentGateway>,
    transaction_id: Uuid,
    stage: GuardStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardStage {
    Armed,
    Committing,
    Done,
}

impl ReversalGuard {
    fn arm(gateway: Arc<dyn PaymentGateway>, transaction_id: Uuid) -> Self {
        Self {
            gateway,
            transaction_id,
            stage: GuardStage::Armed,
        }
    }

    fn committing(&mut self) {
        if self.stage == GuardStage::Armed {
            self.stage = GuardStage::Committing;
        }
    }

    fn disarm(&mut self) {
        self.stage = GuardStage::Done;
    }

    async fn reverse(&mut self) {
        if self.stage != GuardStage::Done {
            self.stage = GuardStage::Done;
            reverse_charge(Arc::clone(&self.gateway), self.transaction_id).await;
        }
    }
}

impl Drop for ReversalGuard {
    fn drop(&mut self) {
        let transaction_id = self.transaction_id;
        match self.stage {
            GuardStage::Done => {}
            GuardStage::Committing => {
                error!(
                    transaction_id = %transaction_id,
                    "Payment cancelled while committing, sale must be reconciled"
                );
            }
            GuardStage::Armed => {
                warn!(
                    transaction_id = %transaction_id,
                    "Payment cancelled after charge, reversing"
                );
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(reverse_charge(Arc::clone(&self.gateway), transaction_id));
                    }
                    Err(_) => {
                        error!(
                            transaction_id = %transaction_id,
                            "No runtime available to reverse charge"
                        );
                    }
                }
            }
        }
    }
}

async fn reverse_charge(gateway: Arc<dyn PaymentGateway>, transaction_id: Uuid) {
    if let Err(err) = gateway.reverse(transaction_id).await {
        error!(
            error = %err,
            transaction_id = %transaction_id,
            "Charge reversal failed"
        );
    }
}
