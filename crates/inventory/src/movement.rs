use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockval_core::{ProductId, TenantId, WarehouseId};

use crate::error::ValuationError;
use crate::numeric::round_currency;
use crate::state::StockKey;

/// Kind of stock event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
    Transfer,
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            MovementType::Entry => "entry",
            MovementType::Exit => "exit",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
        })
    }
}

/// Whether a movement adds stock to or removes stock from its key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// A single event to apply to one product/warehouse.
///
/// `quantity` is always a magnitude; the sign lives in `movement_type` (and in
/// `direction` for adjustments and transfers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub movement_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub quantity: f64,
    /// Cost basis for inbound movements; informational on exits.
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<f64>,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub company_id: TenantId,
}

impl StockMovement {
    fn new(
        key: StockKey,
        company_id: TenantId,
        movement_date: DateTime<Utc>,
        movement_type: MovementType,
        direction: Option<Direction>,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            movement_date,
            movement_type,
            direction,
            quantity,
            unit_price,
            total_value: None,
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            company_id,
        }
    }

    /// Goods receipt at `unit_price`.
    pub fn entry(
        key: StockKey,
        company_id: TenantId,
        movement_date: DateTime<Utc>,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self::new(key, company_id, movement_date, MovementType::Entry, None, quantity, unit_price)
    }

    /// Issue (sale, consumption). Valued by the engine, not by the caller.
    pub fn exit(key: StockKey, company_id: TenantId, movement_date: DateTime<Utc>, quantity: f64) -> Self {
        Self::new(key, company_id, movement_date, MovementType::Exit, None, quantity, 0.0)
    }

    /// Inventory count correction. `unit_price` only matters when inbound.
    pub fn adjustment(
        key: StockKey,
        company_id: TenantId,
        movement_date: DateTime<Utc>,
        direction: Direction,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self::new(
            key,
            company_id,
            movement_date,
            MovementType::Adjustment,
            Some(direction),
            quantity,
            unit_price,
        )
    }

    /// One leg of an inter-warehouse transfer.
    pub fn transfer(
        key: StockKey,
        company_id: TenantId,
        movement_date: DateTime<Utc>,
        direction: Direction,
        quantity: f64,
        unit_price: f64,
    ) -> Self {
        Self::new(
            key,
            company_id,
            movement_date,
            MovementType::Transfer,
            Some(direction),
            quantity,
            unit_price,
        )
    }

    pub fn with_total_value(mut self, total_value: f64) -> Self {
        self.total_value = Some(total_value);
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    /// Resolve the direction of this movement.
    pub fn direction(&self) -> Result<Direction, ValuationError> {
        match self.movement_type {
            MovementType::Entry => Ok(Direction::In),
            MovementType::Exit => Ok(Direction::Out),
            MovementType::Adjustment | MovementType::Transfer => self
                .direction
                .ok_or(ValuationError::MissingDirection(self.movement_type)),
        }
    }

    /// Check magnitudes and prices, returning the resolved direction.
    pub fn validate(&self) -> Result<Direction, ValuationError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(ValuationError::InvalidQuantity(self.quantity));
        }

        let direction = self.direction()?;
        if direction == Direction::In {
            if !self.unit_price.is_finite() || self.unit_price < 0.0 {
                return Err(ValuationError::InvalidUnitPrice(self.unit_price));
            }
            if let Some(declared) = self.total_value {
                let computed = self.quantity * self.unit_price;
                if !declared.is_finite() || round_currency(declared) != round_currency(computed) {
                    return Err(ValuationError::InconsistentTotalValue { declared, computed });
                }
            }
        }

        Ok(direction)
    }

    /// Value of an inbound movement at its own cost basis.
    pub fn inbound_value(&self) -> f64 {
        self.total_value
            .unwrap_or(self.quantity * self.unit_price)
    }

    /// Per-unit cost implied by [`inbound_value`](Self::inbound_value).
    ///
    /// A declared `total_value` may differ from `quantity * unit_price` by
    /// less than a cent; stored value and stored lots both follow the
    /// declared figure.
    pub fn inbound_unit_cost(&self) -> f64 {
        match self.total_value {
            Some(total) => total / self.quantity,
            None => self.unit_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn entry_and_exit_have_fixed_direction() {
        let k = key();
        let tenant = TenantId::new();
        assert_eq!(StockMovement::entry(k, tenant, at(), 5.0, 2.0).validate(), Ok(Direction::In));
        assert_eq!(StockMovement::exit(k, tenant, at(), 5.0).validate(), Ok(Direction::Out));
    }

    #[test]
    fn adjustment_without_direction_is_rejected() {
        let mut m = StockMovement::adjustment(key(), TenantId::new(), at(), Direction::Out, 1.0, 0.0);
        m.direction = None;
        assert_eq!(
            m.validate(),
            Err(ValuationError::MissingDirection(MovementType::Adjustment))
        );
    }

    #[test]
    fn rejects_non_positive_or_nan_quantity() {
        let tenant = TenantId::new();
        for q in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let m = StockMovement::exit(key(), tenant, at(), q);
            assert!(matches!(m.validate(), Err(ValuationError::InvalidQuantity(_))));
        }
    }

    #[test]
    fn rejects_negative_entry_price() {
        let m = StockMovement::entry(key(), TenantId::new(), at(), 1.0, -0.5);
        assert_eq!(m.validate(), Err(ValuationError::InvalidUnitPrice(-0.5)));
    }

    #[test]
    fn exit_price_is_not_validated() {
        let mut m = StockMovement::exit(key(), TenantId::new(), at(), 1.0);
        m.unit_price = -1.0;
        assert!(m.validate().is_ok());
    }

    #[test]
    fn declared_total_must_match_to_the_cent() {
        let k = key();
        let tenant = TenantId::new();
        let ok = StockMovement::entry(k, tenant, at(), 3.0, 3.333).with_total_value(10.0);
        assert!(ok.validate().is_ok());

        let bad = StockMovement::entry(k, tenant, at(), 3.0, 3.0).with_total_value(10.0);
        assert!(matches!(
            bad.validate(),
            Err(ValuationError::InconsistentTotalValue { .. })
        ));
    }

    #[test]
    fn deserializes_wire_shape() {
        let product = ProductId::new();
        let warehouse = WarehouseId::new();
        let company = TenantId::new();
        let json = serde_json::json!({
            "id": Uuid::now_v7(),
            "movement_date": "2024-01-15T00:00:00Z",
            "type": "transfer",
            "direction": "out",
            "quantity": 4.0,
            "product_id": product,
            "warehouse_id": warehouse,
            "company_id": company,
        });
        let m: StockMovement = serde_json::from_value(json).unwrap();
        assert_eq!(m.movement_type, MovementType::Transfer);
        assert_eq!(m.direction(), Ok(Direction::Out));
        assert_eq!(m.unit_price, 0.0);
        assert_eq!(m.key(), StockKey::new(product, warehouse));
    }
}
