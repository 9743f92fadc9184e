use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult};
use ainventory_products::{Product, ProductId};

use crate::OrderId;

ainventory_core::define_id!(
    /// Identifier of an order line.
    OrderItemId,
    "OrderItemId"
);

/// One line of an order. Name and SKU are snapshotted from the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Option<Decimal>,
    /// Always `quantity × unit_price`.
    pub line_total: Decimal,
    pub discount_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    fn recompute_line_total(&mut self) {
        self.line_total = self.unit_price * Decimal::from(self.quantity);
    }

    pub fn apply(&mut self, update: OrderItemUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let update = update.normalized()?;
        if let Some(quantity) = update.quantity {
            self.quantity = quantity;
        }
        if let Some(unit_price) = update.unit_price {
            self.unit_price = unit_price.round_dp(2);
        }
        if let Some(discount) = update.discount_amount {
            self.discount_amount = discount.round_dp(2);
        }
        self.recompute_line_total();
        ensure_discount_fits(self.discount_amount, self.line_total)?;
        self.updated_at = now;
        Ok(())
    }
}

fn ensure_discount_fits(discount: Decimal, line_total: Decimal) -> DomainResult<()> {
    if discount > line_total {
        return Err(DomainError::validation(
            "discount_amount must not exceed the line total",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Defaults to the product's current price.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Decimal,
}

impl NewOrderItem {
    pub fn normalized(self) -> DomainResult<Self> {
        if self.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.unit_price.is_some_and(|p| p.is_sign_negative()) {
            return Err(DomainError::validation("unit_price must not be negative"));
        }
        if self.discount_amount.is_sign_negative() {
            return Err(DomainError::validation(
                "discount_amount must not be negative",
            ));
        }
        Ok(self)
    }

    pub fn into_item(
        self,
        id: OrderItemId,
        order_id: OrderId,
        product: &Product,
        now: DateTime<Utc>,
    ) -> DomainResult<OrderItem> {
        if product.id != self.product_id {
            return Err(DomainError::invariant("order line does not match its product"));
        }
        let mut item = OrderItem {
            id,
            order_id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_sku: product.sku.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price.unwrap_or(product.price).round_dp(2),
            unit_cost: Some(product.cost),
            line_total: Decimal::ZERO,
            discount_amount: self.discount_amount.round_dp(2),
            created_at: now,
            updated_at: now,
        };
        item.recompute_line_total();
        ensure_discount_fits(item.discount_amount, item.line_total)?;
        Ok(item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrderItemUpdate {
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

impl OrderItemUpdate {
    fn normalized(self) -> DomainResult<Self> {
        if self.quantity.is_some_and(|q| q < 1) {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.unit_price.is_some_and(|p| p.is_sign_negative())
            || self.discount_amount.is_some_and(|d| d.is_sign_negative())
        {
            return Err(DomainError::validation(
                "unit_price and discount_amount must not be negative",
            ));
        }
        Ok(self)
    }
}
