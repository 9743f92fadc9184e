//! Inventory movements.
//!
//! A transaction row is written together with its effect on the product's
//! quantity; the quantity is never edited directly after creation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, UserId};

use crate::{Product, ProductId};

ainventory_core::define_id!(
    /// Identifier of an inventory transaction.
    InventoryTransactionId,
    "InventoryTransactionId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryTransactionKind {
    Purchase,
    Sale,
    Adjustment,
    Return,
    Transfer,
    Damaged,
    Expired,
}

impl InventoryTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Sale => "sale",
            Self::Adjustment => "adjustment",
            Self::Return => "return",
            Self::Transfer => "transfer",
            Self::Damaged => "damaged",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "purchase" => Ok(Self::Purchase),
            "sale" => Ok(Self::Sale),
            "adjustment" => Ok(Self::Adjustment),
            "return" => Ok(Self::Return),
            "transfer" => Ok(Self::Transfer),
            "damaged" => Ok(Self::Damaged),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::validation(format!(
                "invalid transaction type '{other}'"
            ))),
        }
    }

    /// Signed change to on-hand quantity.
    ///
    /// Stock-in kinds add, stock-out kinds subtract, an adjustment carries its
    /// own sign, and a transfer moves stock between locations without
    /// changing the product total.
    pub fn quantity_delta(&self, quantity: i32) -> i32 {
        match self {
            Self::Purchase | Self::Return | Self::Adjustment => quantity,
            Self::Sale | Self::Damaged | Self::Expired => quantity.saturating_neg(),
            Self::Transfer => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: InventoryTransactionId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub kind: InventoryTransactionKind,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub reference_type: String,
    pub reference_id: Option<i64>,
    pub notes: String,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewInventoryTransaction {
    #[serde(rename = "type")]
    pub kind: InventoryTransactionKind,
    pub quantity: i32,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub reference_type: String,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

impl NewInventoryTransaction {
    /// Only adjustments may be negative; nothing may be zero.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.reference_type = self.reference_type.trim().to_string();
        self.notes = self.notes.trim().to_string();

        if self.quantity == 0 {
            return Err(DomainError::validation("quantity must not be zero"));
        }
        if self.quantity < 0 && self.kind != InventoryTransactionKind::Adjustment {
            return Err(DomainError::validation(
                "quantity must be positive unless the transaction is an adjustment",
            ));
        }
        if self.unit_cost.is_some_and(|c| c.is_sign_negative()) {
            return Err(DomainError::validation("unit_cost must not be negative"));
        }
        if self.reference_type.chars().count() > 50 {
            return Err(DomainError::validation(
                "reference_type must be at most 50 characters",
            ));
        }
        if self.notes.chars().count() > 500 {
            return Err(DomainError::validation(
                "notes must be at most 500 characters",
            ));
        }
        Ok(self)
    }

    pub fn total_cost(&self) -> Option<Decimal> {
        self.unit_cost
            .map(|unit| (unit * Decimal::from(self.quantity)).round_dp(2))
    }

    /// Apply this movement to `product`, clamping at zero, and return the
    /// transaction row to persist alongside it.
    pub fn apply(
        self,
        id: InventoryTransactionId,
        product: &mut Product,
        performed_by: UserId,
        now: DateTime<Utc>,
    ) -> InventoryTransaction {
        let delta = self.kind.quantity_delta(self.quantity);
        product.quantity = product.quantity.saturating_add(delta).max(0);
        product.recompute_stock_status();
        product.updated_at = now;

        InventoryTransaction {
            id,
            product_id: product.id,
            kind: self.kind,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            total_cost: self.total_cost(),
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            notes: self.notes,
            performed_by,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewProduct, ProductStatus, StockStatus, stock_status_for};

    fn product(quantity: i32) -> Product {
        NewProduct {
            name: "Wireless Mouse".into(),
            sku: "WM-100".into(),
            description: String::new(),
            category_id: None,
            supplier_id: None,
            brand: String::new(),
            cost: Decimal::new(1250, 2),
            price: Decimal::new(2500, 2),
            currency: "USD".into(),
            quantity,
            low_stock_threshold: Some(10),
            track_quantity: true,
            status: ProductStatus::Active,
        }
        .into_product(ProductId::new(1), None, Utc::now())
    }

    fn movement(kind: InventoryTransactionKind, quantity: i32) -> NewInventoryTransaction {
        NewInventoryTransaction {
            kind,
            quantity,
            unit_cost: None,
            reference_type: String::new(),
            reference_id: None,
            notes: String::new(),
        }
    }

    fn apply(p: &mut Product, kind: InventoryTransactionKind, quantity: i32) -> InventoryTransaction {
        movement(kind, quantity)
            .normalized()
            .unwrap()
            .apply(InventoryTransactionId::new(1), p, UserId::new(1), Utc::now())
    }

    #[test]
    fn purchase_adds_and_sale_subtracts() {
        let mut p = product(5);
        apply(&mut p, InventoryTransactionKind::Purchase, 20);
        assert_eq!(p.quantity, 25);
        assert_eq!(p.stock_status, StockStatus::InStock);

        apply(&mut p, InventoryTransactionKind::Sale, 18);
        assert_eq!(p.quantity, 7);
        assert_eq!(p.stock_status, StockStatus::LowStock);
    }

    #[test]
    fn stock_out_clamps_at_zero() {
        let mut p = product(3);
        apply(&mut p, InventoryTransactionKind::Damaged, 10);
        assert_eq!(p.quantity, 0);
        assert_eq!(p.stock_status, StockStatus::OutOfStock);
    }

    #[test]
    fn negative_adjustment_reduces_stock_and_transfer_is_neutral() {
        let mut p = product(30);
        apply(&mut p, InventoryTransactionKind::Adjustment, -5);
        assert_eq!(p.quantity, 25);
        apply(&mut p, InventoryTransactionKind::Transfer, 12);
        assert_eq!(p.quantity, 25);
    }

    #[test]
    fn only_adjustments_may_be_negative() {
        assert!(movement(InventoryTransactionKind::Sale, -1).normalized().is_err());
        assert!(movement(InventoryTransactionKind::Purchase, 0).normalized().is_err());
        assert!(movement(InventoryTransactionKind::Adjustment, -1).normalized().is_ok());
    }

    #[test]
    fn total_cost_is_unit_cost_times_quantity() {
        let mut p = product(0);
        let tx = NewInventoryTransaction {
            unit_cost: Some(Decimal::new(350, 2)),
            ..movement(InventoryTransactionKind::Purchase, 4)
        }
        .apply(InventoryTransactionId::new(9), &mut p, UserId::new(2), Utc::now());
        assert_eq!(tx.total_cost, Some(Decimal::new(1400, 2)));
        assert_eq!(tx.product_id, ProductId::new(1));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = InventoryTransactionKind> {
            prop_oneof![
                Just(InventoryTransactionKind::Purchase),
                Just(InventoryTransactionKind::Sale),
                Just(InventoryTransactionKind::Return),
                Just(InventoryTransactionKind::Transfer),
                Just(InventoryTransactionKind::Damaged),
                Just(InventoryTransactionKind::Expired),
            ]
        }

        proptest! {
            /// Property: after any sequence of movements the quantity is
            /// non-negative and the stock status matches the quantity.
            #[test]
            fn stock_status_tracks_quantity(
                start in 0i32..500,
                moves in proptest::collection::vec((kind(), 1i32..200), 0..40),
            ) {
                let mut p = product(start);
                for (kind, quantity) in moves {
                    apply(&mut p, kind, quantity);
                    prop_assert!(p.quantity >= 0);
                    prop_assert_eq!(p.stock_status, stock_status_for(p.quantity, p.low_stock_threshold));
                }
            }
        }
    }
}
