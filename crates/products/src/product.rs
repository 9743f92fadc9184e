use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity, UserId};

use crate::{CategoryId, SupplierId};

ainventory_core::define_id!(
    /// Identifier of a product.
    ProductId,
    "ProductId"
);

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    LowStock,
    OutOfStock,
    Discontinued,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::LowStock => "low_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Discontinued => "discontinued",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "in_stock" => Ok(Self::InStock),
            "low_stock" => Ok(Self::LowStock),
            "out_of_stock" => Ok(Self::OutOfStock),
            "discontinued" => Ok(Self::Discontinued),
            other => Err(DomainError::validation(format!(
                "invalid stock status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Discontinued => "discontinued",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "discontinued" => Ok(Self::Discontinued),
            other => Err(DomainError::validation(format!(
                "invalid product status '{other}'"
            ))),
        }
    }
}

/// Stock status as a function of quantity alone.
///
/// Zero (or less) is out of stock; at or under the threshold is low; anything
/// else is in stock. Without a threshold nothing is ever "low".
pub fn stock_status_for(quantity: i32, low_stock_threshold: Option<i32>) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if low_stock_threshold.is_some_and(|threshold| quantity <= threshold) {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub supplier_id: Option<SupplierId>,
    pub brand: String,
    pub cost: Decimal,
    pub price: Decimal,
    pub currency: String,
    pub quantity: i32,
    pub low_stock_threshold: Option<i32>,
    pub track_quantity: bool,
    pub stock_status: StockStatus,
    pub status: ProductStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Re-derive `stock_status`. Untracked products keep whatever they had.
    pub fn recompute_stock_status(&mut self) {
        if self.track_quantity {
            self.stock_status = stock_status_for(self.quantity, self.low_stock_threshold);
        }
    }

    pub fn is_in_stock(&self) -> bool {
        self.track_quantity && self.quantity > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.track_quantity
            && self.quantity > 0
            && self
                .low_stock_threshold
                .is_some_and(|threshold| self.quantity <= threshold)
    }

    pub fn profit(&self) -> Decimal {
        self.price - self.cost
    }

    /// Margin over price, as a percentage rounded to two places. Zero when
    /// the product is free.
    pub fn profit_margin(&self) -> Decimal {
        if self.price.is_zero() {
            return Decimal::ZERO;
        }
        (self.profit() / self.price * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> Option<i32> {
    Some(DEFAULT_LOW_STOCK_THRESHOLD)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub supplier_id: Option<SupplierId>,
    #[serde(default)]
    pub brand: String,
    pub cost: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default = "default_threshold")]
    pub low_stock_threshold: Option<i32>,
    #[serde(default = "default_true")]
    pub track_quantity: bool,
    #[serde(default)]
    pub status: ProductStatus,
}

impl NewProduct {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_string();
        self.sku = self.sku.trim().to_uppercase();
        self.description = self.description.trim().to_string();
        self.brand = self.brand.trim().to_string();
        self.currency = self.currency.trim().to_uppercase();
        if self.currency.is_empty() {
            self.currency = "USD".to_string();
        }

        if !(2..=200).contains(&self.name.chars().count()) {
            return Err(DomainError::validation(
                "name must be between 2 and 200 characters",
            ));
        }
        if self.sku.is_empty() || self.sku.len() > 50 {
            return Err(DomainError::validation(
                "sku must be between 1 and 50 characters",
            ));
        }
        if self.brand.chars().count() > 100 {
            return Err(DomainError::validation(
                "brand must be at most 100 characters",
            ));
        }
        if self.cost.is_sign_negative() || self.price.is_sign_negative() {
            return Err(DomainError::validation("cost and price must not be negative"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity must not be negative"));
        }
        if self.low_stock_threshold.is_some_and(|t| t < 0) {
            return Err(DomainError::validation(
                "low_stock_threshold must not be negative",
            ));
        }
        if self.currency.len() != 3 {
            return Err(DomainError::validation("currency must be a 3-letter code"));
        }
        Ok(self)
    }

    pub fn into_product(
        self,
        id: ProductId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Product {
        let mut product = Product {
            id,
            name: self.name,
            sku: self.sku,
            description: self.description,
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            brand: self.brand,
            cost: self.cost.round_dp(2),
            price: self.price.round_dp(2),
            currency: self.currency,
            quantity: self.quantity,
            low_stock_threshold: self.low_stock_threshold,
            track_quantity: self.track_quantity,
            stock_status: StockStatus::default(),
            status: self.status,
            created_by,
            created_at: now,
            updated_at: now,
        };
        product.recompute_stock_status();
        product
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(quantity: i32) -> NewProduct {
        NewProduct {
            name: "Wireless Mouse".into(),
            sku: " wm-100 ".into(),
            description: String::new(),
            category_id: None,
            supplier_id: None,
            brand: "Acme".into(),
            cost: Decimal::new(1250, 2),
            price: Decimal::new(2500, 2),
            currency: String::new(),
            quantity,
            low_stock_threshold: default_threshold(),
            track_quantity: true,
            status: ProductStatus::Active,
        }
    }

    fn product(quantity: i32) -> Product {
        new_product(quantity)
            .normalized()
            .unwrap()
            .into_product(ProductId::new(1), None, Utc::now())
    }

    #[test]
    fn stock_status_boundaries() {
        assert_eq!(stock_status_for(0, Some(10)), StockStatus::OutOfStock);
        assert_eq!(stock_status_for(10, Some(10)), StockStatus::LowStock);
        assert_eq!(stock_status_for(11, Some(10)), StockStatus::InStock);
        assert_eq!(stock_status_for(1, None), StockStatus::InStock);
    }

    #[test]
    fn creation_derives_stock_status_and_defaults() {
        let p = product(3);
        assert_eq!(p.sku, "WM-100");
        assert_eq!(p.currency, "USD");
        assert_eq!(p.stock_status, StockStatus::LowStock);
        assert!(p.is_low_stock());
        assert!(p.is_in_stock());
    }

    #[test]
    fn untracked_products_keep_their_status() {
        let mut p = product(50);
        p.track_quantity = false;
        p.quantity = 0;
        p.recompute_stock_status();
        assert_eq!(p.stock_status, StockStatus::InStock);
        assert!(!p.is_in_stock());
        assert!(!p.is_low_stock());
    }

    #[test]
    fn profit_and_margin() {
        let p = product(20);
        assert_eq!(p.profit(), Decimal::new(1250, 2));
        assert_eq!(p.profit_margin(), Decimal::new(5000, 2));

        let mut free = product(20);
        free.price = Decimal::ZERO;
        assert_eq!(free.profit_margin(), Decimal::ZERO);
    }

    #[test]
    fn negative_money_is_rejected() {
        let input = NewProduct {
            cost: Decimal::new(-1, 0),
            ..new_product(1)
        };
        assert!(matches!(input.normalized(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn missing_threshold_defaults_when_deserialized() {
        let input: NewProduct = serde_json::from_value(serde_json::json!({
            "name": "Desk Lamp",
            "sku": "DL-1",
            "cost": "4.00",
            "price": "9.99",
        }))
        .unwrap();
        assert_eq!(input.low_stock_threshold, Some(DEFAULT_LOW_STOCK_THRESHOLD));
        assert!(input.track_quantity);
    }
}
