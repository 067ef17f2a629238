use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::catalog::create_event;
use super::clock::ManualClock;
use super::payment::MockPaymentGateway;
use super::store::InMemoryInventoryStore;
use super::{Allocator, BookingService, PaymentOrchestrator, QueryService};
use crate::models::{CreateEventRequest, CreateTierRequest};

/// In-memory store, manual clock and mock gateway wired together.
pub struct TestBed {
    pub store: InMemoryInventoryStore,
    pub clock: Arc<ManualClock>,
    pub gateway: MockPaymentGateway,
}

impl TestBed {
    pub fn new() -> Self {
        Self::with_gateway(MockPaymentGateway::new())
    }

    pub fn with_gateway(gateway: MockPaymentGateway) -> Self {
        Self {
            store: InMemoryInventoryStore::new(),
            clock: Arc::new(ManualClock::default()),
            gateway,
        }
    }

    pub fn allocator(&self) -> Allocator {
        Allocator::new(Arc::new(self.store.clone()), self.clock.clone())
    }

    pub fn orchestrator(&self) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            Arc::new(self.store.clone()),
            Arc::new(self.gateway.clone()),
            self.clock.clone(),
        )
    }

    pub fn queries(&self) -> QueryService {
        QueryService::new(Arc::new(self.store.clone()), self.clock.clone())
    }

    pub fn service(&self) -> BookingService {
        BookingService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.gateway.clone()),
            self.clock.clone(),
        )
    }

    pub async fn available(&self, event_id: Uuid, tier_id: Uuid) -> i64 {
        self.queries()
            .tier_availability(event_id)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.tier_id == tier_id)
            .map(|t| t.available_count)
            .unwrap()
    }
}

pub struct SeededEvent {
    pub event_id: Uuid,
    pub tiers: BTreeMap<String, Uuid>,
}

impl SeededEvent {
    pub fn tier(&self, name: &str) -> Uuid {
        self.tiers[name]
    }
}

/// Creates "Test Event" with `(name, price, tickets)` tiers.
pub async fn seed_event(bed: &TestBed, tiers: &[(&str, &str, u32)]) -> SeededEvent {
    let tiers: BTreeMap<_, _> = tiers
        .iter()
        .map(|(name, price, count)| {
            (
                name.to_string(),
                CreateTierRequest {
                    price: price.parse::<Decimal>().unwrap(),
                    tickets_count: *count,
                },
            )
        })
        .collect();

    let created = create_event(
        &bed.store,
        bed.clock.as_ref(),
        &CreateEventRequest {
            name: "Test Event".to_string(),
            tiers,
        },
    )
    .await
    .unwrap();

    SeededEvent {
        event_id: created.event_id,
        tiers: created.tiers,
    }
}
