use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ainventory_core::{DomainError, DomainResult, Entity, UserId};

use crate::OrderFigures;

ainventory_core::define_id!(
    /// Identifier of a customer.
    CustomerId,
    "CustomerId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    #[default]
    Individual,
    Business,
    Wholesale,
    Vip,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Business => "business",
            Self::Wholesale => "wholesale",
            Self::Vip => "vip",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "individual" => Ok(Self::Individual),
            "business" => Ok(Self::Business),
            "wholesale" => Ok(Self::Wholesale),
            "vip" => Ok(Self::Vip),
            other => Err(DomainError::validation(format!(
                "invalid customer type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Blocked,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "blocked" => Ok(Self::Blocked),
            other => Err(DomainError::validation(format!(
                "invalid customer status '{other}'"
            ))),
        }
    }
}

/// Lifetime figures derived from a customer's orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CustomerMetrics {
    pub total_orders: i64,
    pub total_spent: Decimal,
    pub average_order_value: Decimal,
    pub last_order_date: Option<DateTime<Utc>>,
}

/// Recompute metrics from every order of one customer.
///
/// Cancelled and refunded orders are ignored entirely, including for
/// `last_order_date`.
pub fn customer_metrics(orders: impl IntoIterator<Item = OrderFigures>) -> CustomerMetrics {
    let mut metrics = CustomerMetrics::default();
    for order in orders.into_iter().filter(|o| o.status.counts_toward_metrics()) {
        metrics.total_orders += 1;
        metrics.total_spent += order.total_amount;
        metrics.last_order_date = metrics.last_order_date.max(Some(order.order_date));
    }
    if metrics.total_orders > 0 {
        metrics.average_order_value =
            (metrics.total_spent / Decimal::from(metrics.total_orders)).round_dp(2);
    }
    metrics
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub customer_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub customer_type: CustomerType,
    pub status: CustomerStatus,
    pub notes: String,
    pub total_orders: i64,
    pub total_spent: Decimal,
    pub average_order_value: Decimal,
    pub last_order_date: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_vip(&self) -> bool {
        self.customer_type == CustomerType::Vip
    }

    pub fn apply_metrics(&mut self, metrics: CustomerMetrics, now: DateTime<Utc>) {
        self.total_orders = metrics.total_orders;
        self.total_spent = metrics.total_spent;
        self.average_order_value = metrics.average_order_value;
        self.last_order_date = metrics.last_order_date;
        self.updated_at = now;
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

/// `CUS-` followed by eight hex digits taken from `seed`.
///
/// The store draws a fresh v4 uuid per attempt and retries on collision.
pub fn customer_code(seed: Uuid) -> String {
    let hex = seed.simple().to_string().to_uppercase();
    format!("CUS-{}", &hex[..8])
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub customer_type: CustomerType,
    pub status: CustomerStatus,
    pub notes: String,
}

impl NewCustomer {
    pub fn normalized(mut self) -> DomainResult<Self> {
        for field in [
            &mut self.first_name,
            &mut self.last_name,
            &mut self.phone,
            &mut self.company,
            &mut self.address,
            &mut self.city,
            &mut self.state,
            &mut self.zip_code,
            &mut self.country,
            &mut self.notes,
        ] {
            *field = field.trim().to_string();
        }
        self.email = self.email.trim().to_lowercase();
        if self.country.is_empty() {
            self.country = "United States".to_string();
        }

        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if !(1..=100).contains(&value.chars().count()) {
                return Err(DomainError::validation(format!(
                    "{field} must be between 1 and 100 characters"
                )));
            }
        }
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(DomainError::validation("email is invalid")),
        }
        if self.email.len() > 150 {
            return Err(DomainError::validation("email must be at most 150 characters"));
        }
        if self.phone.chars().count() > 20 {
            return Err(DomainError::validation("phone must be at most 20 characters"));
        }
        Ok(self)
    }

    pub fn into_customer(
        self,
        id: CustomerId,
        customer_code: String,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Customer {
        Customer {
            id,
            customer_code,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            address: self.address,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country,
            customer_type: self.customer_type,
            status: self.status,
            notes: self.notes,
            total_orders: 0,
            total_spent: Decimal::ZERO,
            average_order_value: Decimal::ZERO,
            last_order_date: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
