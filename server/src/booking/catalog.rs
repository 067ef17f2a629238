use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use super::clock::Clock;
use super::store::InventoryStore;
use super::BookingError;
use crate::models::{CreateEventRequest, CreatedEvent, Event, TicketTier};

/// Prices are stored as `NUMERIC(12,2)`: whole cents below ten billion.
const PRICE_SCALE: u32 = 2;
const PRICE_LIMIT: i64 = 10_000_000_000;

/// Creates an event, its tiers and every tier's ticket units in one transaction.
#[instrument(
    skip(store, clock, request),
    fields(name = %request.name, tiers = request.tiers.len())
)]
pub async fn create_event(
    store: &dyn InventoryStore,
    clock: &dyn Clock,
    request: &CreateEventRequest,
) -> Result<CreatedEvent, BookingError> {
    validate(request)?;

    let event = Event {
        id: Uuid::new_v4(),
        name: request.name.trim().to_string(),
        created_at: clock.now(),
    };

    let mut tx = store.begin().await?;
    tx.insert_event(&event).await?;

    let mut tiers = BTreeMap::new();
    for (name, params) in &request.tiers {
        let mut price = params.price;
        price.rescale(PRICE_SCALE);
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: name.trim().to_string(),
            price,
        };
        tx.insert_tier(&tier).await?;
        tx.insert_units(event.id, tier.id, params.tickets_count)
            .await?;
        tiers.insert(tier.name, tier.id);
    }

    tx.commit().await?;
    info!(event_id = %event.id, "Event created");

    Ok(CreatedEvent {
        event_id: event.id,
        tiers,
    })
}

fn validate(request: &CreateEventRequest) -> Result<(), BookingError> {
    if request.name.trim().is_empty() {
        return Err(BookingError::Validation("event name is required".to_string()));
    }
    if request.tiers.is_empty() {
        return Err(BookingError::Validation(
            "an event needs at least one tier".to_string(),
        ));
    }
    let mut names = BTreeSet::new();
    for (name, params) in &request.tiers {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(BookingError::Validation("tier name is required".to_string()));
        }
        if !names.insert(trimmed) {
            return Err(BookingError::Validation(format!(
                "tier name {trimmed:?} is used more than once"
            )));
        }
        validate_price(trimmed, params.price)?;
    }
    Ok(())
}

fn validate_price(tier: &str, price: Decimal) -> Result<(), BookingError> {
    if price.is_sign_negative() {
        return Err(BookingError::Validation(format!(
            "tier {tier:?} has a negative price"
        )));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(BookingError::Validation(format!(
            "tier {tier:?} price has fractions of a cent"
        )));
    }
    if price >= Decimal::from(PRICE_LIMIT) {
        return Err(BookingError::Validation(format!(
            "tier {tier:?} price must be below {PRICE_LIMIT}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::testing::TestBed;
    use crate::models::CreateTierRequest;
    use rust_decimal_macros::dec;

    fn tier(price: rust_decimal::Decimal, tickets_count: u32) -> CreateTierRequest {
        CreateTierRequest {
            price,
            tickets_count,
        }
    }

    #[tokio::test]
    async fn test_create_event_creates_units_per_tier() {
        let bed = TestBed::new();
        let request = CreateEventRequest {
            name: "Festival".to_string(),
            tiers: BTreeMap::from([
                ("VIP".to_string(), tier(dec!(100.00), 50)),
                ("GA".to_string(), tier(dec!(10.00), 1000)),
            ]),
        };

        let created = create_event(&bed.store, bed.clock.as_ref(), &request)
            .await
            .unwrap();

        assert_eq!(created.tiers.len(), 2);
        assert_eq!(bed.store.tier_units(created.tiers["VIP"]).await.len(), 50);
        assert_eq!(bed.store.tier_units(created.tiers["GA"]).await.len(), 1000);
    }

    #[tokio::test]
    async fn test_create_event_rejects_invalid_input() {
        let bed = TestBed::new();

        let unnamed = CreateEventRequest {
            name: "  ".to_string(),
            tiers: BTreeMap::from([("GA".to_string(), tier(dec!(1), 1))]),
        };
        let no_tiers = CreateEventRequest {
            name: "Show".to_string(),
            tiers: BTreeMap::new(),
        };
        let negative = CreateEventRequest {
            name: "Show".to_string(),
            tiers: BTreeMap::from([("GA".to_string(), tier(dec!(-5), 1))]),
        };

        let sub_cent = CreateEventRequest {
            name: "Show".to_string(),
            tiers: BTreeMap::from([("GA".to_string(), tier(dec!(10.005), 1))]),
        };
        let too_expensive = CreateEventRequest {
            name: "Show".to_string(),
            tiers: BTreeMap::from([("GA".to_string(), tier(dec!(10000000000.00), 1))]),
        };
        let duplicate_after_trim = CreateEventRequest {
            name: "Show".to_string(),
            tiers: BTreeMap::from([
                ("GA".to_string(), tier(dec!(10), 1)),
                ("GA ".to_string(), tier(dec!(20), 1)),
            ]),
        };

        for request in [
            unnamed,
            no_tiers,
            negative,
            sub_cent,
            too_expensive,
            duplicate_after_trim,
        ] {
            let result = create_event(&bed.store, bed.clock.as_ref(), &request).await;
            assert!(
                matches!(result, Err(BookingError::Validation(_))),
                "{:?}",
                request.tiers
            );
        }
        assert!(bed.store.list_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_event_keys_tiers_by_trimmed_name() {
        let bed = TestBed::new();
        let request = CreateEventRequest {
            name: " Festival ".to_string(),
            tiers: BTreeMap::from([
                (" VIP".to_string(), tier(dec!(99.9900), 1)),
                ("GA ".to_string(), tier(dec!(10), 2)),
            ]),
        };

        let created = create_event(&bed.store, bed.clock.as_ref(), &request)
            .await
            .unwrap();

        assert_eq!(
            created.tiers.keys().collect::<Vec<_>>(),
            vec!["GA", "VIP"]
        );
        let tiers = bed
            .store
            .tier_availability(created.event_id, bed.clock.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tiers[0].name, "GA");
        assert_eq!(tiers[0].tier_id, created.tiers["GA"]);
        assert_eq!(tiers[1].price.to_string(), "99.99");
        assert_eq!(tiers[0].price.to_string(), "10.00");
    }
}
