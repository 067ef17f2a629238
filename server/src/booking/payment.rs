//! Payment capability consumed by the orchestrator.
//!
//! The orchestrator only relies on two calls: a charge that either succeeds with
//! a transaction id or fails, and a reversal of a previous charge. Settlement
//! details belong to whatever sits behind the trait.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Card number accepted by [`MockPaymentGateway`].
pub const KNOWN_TEST_CARD: &str = "1234567890";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("card declined: {0}")]
    Declined(String),

    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub reservation_id: Uuid,
    pub card_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub transaction_id: Uuid,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges `amount` for a reservation. Not assumed to be idempotent.
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    /// Reverses a successful charge.
    async fn reverse(&self, transaction_id: Uuid) -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct MockLedger {
    charges: Vec<(ChargeRequest, Uuid)>,
    reversals: Vec<Uuid>,
}

/// Gateway for development and tests: charges succeed only for
/// [`KNOWN_TEST_CARD`] and every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentGateway {
    ledger: Arc<Mutex<MockLedger>>,
    fail_reversals: bool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose reversals always fail.
    pub fn with_failing_reversals() -> Self {
        Self {
            fail_reversals: true,
            ..Self::default()
        }
    }

    pub fn charges(&self) -> Vec<(ChargeRequest, Uuid)> {
        self.ledger().charges.clone()
    }

    pub fn reversals(&self) -> Vec<Uuid> {
        self.ledger().reversals.clone()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, MockLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        if request.card_number != KNOWN_TEST_CARD {
            return Err(GatewayError::Declined(
                "card is not in allowlist".to_string(),
            ));
        }

        let transaction_id = Uuid::new_v4();
        tracing::info!(
            reservation_id = %request.reservation_id,
            amount = %request.amount,
            transaction_id = %transaction_id,
            "Mock payment processed"
        );
        self.ledger().charges.push((request, transaction_id));

        Ok(ChargeReceipt { transaction_id })
    }

    async fn reverse(&self, transaction_id: Uuid) -> Result<(), GatewayError> {
        self.ledger().reversals.push(transaction_id);
        if self.fail_reversals {
            return Err(GatewayError::Unavailable(
                "reversal endpoint unreachable".to_string(),
            ));
        }

        tracing::info!(transaction_id = %transaction_id, "Mock payment reversed");
        Ok(())
    }
}
