use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ainventory_core::{DomainError, DomainResult, Entity, UserId};

use crate::{
    CustomerId, NewOrderItem, OrderHistory, OrderHistoryAction, OrderItem, OrderPayment,
    payment_status_after,
};

ainventory_core::define_id!(
    /// Identifier of an order.
    OrderId,
    "OrderId"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
        Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == raw)
            .ok_or_else(|| DomainError::validation(format!("invalid order status '{raw}'")))
    }

    /// No transition leaves these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    pub fn counts_toward_metrics(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl OrderPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(DomainError::validation(format!("invalid priority '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Partial,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(DomainError::validation(format!(
                "invalid payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
    Cash,
    Check,
    StoreCredit,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 7] = [
        Self::CreditCard,
        Self::DebitCard,
        Self::Paypal,
        Self::BankTransfer,
        Self::Cash,
        Self::Check,
        Self::StoreCredit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Paypal => "paypal",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
            Self::Check => "check",
            Self::StoreCredit => "store_credit",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == raw)
            .ok_or_else(|| DomainError::validation(format!("invalid payment method '{raw}'")))
    }
}

/// Where the order ships.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl ShippingDetails {
    fn normalized(mut self) -> DomainResult<Self> {
        for field in [
            &mut self.name,
            &mut self.phone,
            &mut self.company,
            &mut self.address,
            &mut self.city,
            &mut self.state,
            &mut self.zip,
            &mut self.country,
        ] {
            *field = field.trim().to_string();
        }
        self.email = self.email.trim().to_lowercase();

        let required = [
            ("shipping name", &self.name),
            ("shipping email", &self.email),
            ("shipping phone", &self.phone),
            ("shipping address", &self.address),
            ("shipping city", &self.city),
            ("shipping state", &self.state),
            ("shipping zip", &self.zip),
            ("shipping country", &self.country),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(DomainError::validation(format!("{field} is required")));
        }
        if !self.email.contains('@') {
            return Err(DomainError::validation("shipping email is invalid"));
        }
        Ok(self)
    }
}

/// Derived money fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Totals from the current line items.
///
/// `subtotal = Σ(line_total - item discount)`, `tax = subtotal × tax_rate`,
/// `total = subtotal + tax + shipping - order discount`. Tax is rounded to
/// cents before it is added.
pub fn order_totals(
    items: &[OrderItem],
    tax_rate: Decimal,
    shipping_cost: Decimal,
    discount_amount: Decimal,
) -> OrderTotals {
    let subtotal: Decimal = items
        .iter()
        .map(|item| item.line_total - item.discount_amount)
        .sum();
    let tax_amount = (subtotal * tax_rate).round_dp(2);
    OrderTotals {
        subtotal,
        tax_amount,
        total_amount: subtotal + tax_amount + shipping_cost - discount_amount,
    }
}

/// `ORD-YYYYMMDD-` followed by eight hex digits taken from `seed`.
pub fn order_number(date: NaiveDate, seed: Uuid) -> String {
    let hex = seed.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", date.format("%Y%m%d"), &hex[..8])
}

/// The three fields customer metrics are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFigures {
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub priority: OrderPriority,
    pub order_date: DateTime<Utc>,
    pub required_date: Option<DateTime<Utc>>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub shipping: ShippingDetails,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn recompute_totals(&mut self, items: &[OrderItem], now: DateTime<Utc>) {
        let totals = order_totals(items, self.tax_rate, self.shipping_cost, self.discount_amount);
        self.subtotal = totals.subtotal;
        self.tax_amount = totals.tax_amount;
        self.total_amount = totals.total_amount;
        self.updated_at = now;
    }

    /// Move to `next`, stamping shipped/delivered dates, and return the
    /// history row to persist. Cancelled and refunded orders are final.
    pub fn change_status(
        &mut self,
        next: OrderStatus,
        performed_by: UserId,
        notes: String,
        now: DateTime<Utc>,
    ) -> DomainResult<OrderHistory> {
        if self.status.is_terminal() && next != self.status {
            return Err(DomainError::invariant(format!(
                "cannot change status of a {} order",
                self.status.as_str()
            )));
        }
        let previous = self.status;
        self.status = next;
        match next {
            OrderStatus::Shipped => self.shipped_date = Some(now),
            OrderStatus::Delivered => self.delivered_date = Some(now),
            _ => {}
        }
        self.updated_at = now;

        Ok(OrderHistory::new(
            self.id,
            OrderHistoryAction::StatusChange,
            performed_by,
            now,
        )
        .with_values(previous.as_str(), next.as_str())
        .with_description(notes))
    }

    /// Re-derive `payment_status` after a completed payment.
    pub fn apply_payments(&mut self, payments: &[OrderPayment], now: DateTime<Utc>) {
        if let Some(status) = payment_status_after(payments, self.total_amount) {
            self.payment_status = status;
            self.updated_at = now;
        }
    }

    /// Line items can only change while the order is still open.
    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot modify items of a {} order",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    pub fn figures(&self) -> OrderFigures {
        OrderFigures {
            status: self.status,
            total_amount: self.total_amount,
            order_date: self.order_date,
        }
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> OrderId {
        self.id
    }
}

/// An order with its lines and payments, as returned by reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<OrderPayment>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub priority: OrderPriority,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub required_date: Option<DateTime<Utc>>,
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.shipping = self.shipping.normalized()?;
        self.currency = self.currency.trim().to_uppercase();
        self.notes = self.notes.trim().to_string();

        if !(Decimal::ZERO..=Decimal::ONE).contains(&self.tax_rate) {
            return Err(DomainError::validation("tax_rate must be between 0 and 1"));
        }
        if self.shipping_cost.is_sign_negative() || self.discount_amount.is_sign_negative() {
            return Err(DomainError::validation(
                "shipping_cost and discount_amount must not be negative",
            ));
        }
        if self.currency.len() != 3 {
            return Err(DomainError::validation("currency must be a 3-letter code"));
        }
        self.items = self
            .items
            .into_iter()
            .map(NewOrderItem::normalized)
            .collect::<DomainResult<_>>()?;
        Ok(self)
    }

    /// Build the order row with zero totals; the caller adds the items and
    /// then calls [`Order::recompute_totals`].
    pub fn into_order(
        self,
        id: OrderId,
        order_number: String,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> (Order, Vec<NewOrderItem>) {
        let order = Order {
            id,
            order_number,
            customer_id: self.customer_id,
            status: OrderStatus::Pending,
            priority: self.priority,
            order_date: self.order_date.unwrap_or(now),
            required_date: self.required_date,
            shipped_date: None,
            delivered_date: None,
            shipping: self.shipping,
            payment_status: PaymentStatus::Pending,
            payment_method: self.payment_method,
            subtotal: Decimal::ZERO,
            tax_rate: self.tax_rate,
            tax_amount: Decimal::ZERO,
            shipping_cost: self.shipping_cost.round_dp(2),
            discount_amount: self.discount_amount.round_dp(2),
            total_amount: Decimal::ZERO,
            currency: self.currency,
            notes: self.notes,
            created_by,
            created_at: now,
            updated_at: now,
        };
        (order, self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderItemId, PaymentId, PaymentRecordStatus};
    use ainventory_products::ProductId;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-04T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: "+44 20 0000".into(),
            company: String::new(),
            address: "12 St James's Square".into(),
            city: "London".into(),
            state: "London".into(),
            zip: "SW1Y 4JH".into(),
            country: "United Kingdom".into(),
        }
    }

    fn new_order() -> NewOrder {
        NewOrder {
            customer_id: CustomerId::new(1),
            priority: OrderPriority::Normal,
            order_date: None,
            required_date: None,
            shipping: shipping(),
            payment_method: PaymentMethod::CreditCard,
            tax_rate: Decimal::new(8, 2),
            shipping_cost: Decimal::from(5),
            discount_amount: Decimal::from(2),
            currency: "usd".into(),
            notes: String::new(),
            items: Vec::new(),
        }
    }

    fn order() -> Order {
        new_order()
            .normalized()
            .unwrap()
            .into_order(OrderId::new(1), "ORD-1".into(), None, now())
            .0
    }

    fn item(quantity: i32, unit_price: i64, discount: i64) -> OrderItem {
        OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            product_id: ProductId::new(1),
            product_name: "Widget".into(),
            product_sku: "W-1".into(),
            quantity,
            unit_price: Decimal::from(unit_price),
            unit_cost: None,
            line_total: Decimal::from(unit_price) * Decimal::from(quantity),
            discount_amount: Decimal::from(discount),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn totals_follow_the_formula() {
        let mut o = order();
        o.recompute_totals(&[item(2, 50, 10), item(1, 10, 0)], now());
        // subtotal = (100 - 10) + 10 = 100; tax = 8; total = 100 + 8 + 5 - 2
        assert_eq!(o.subtotal, Decimal::from(100));
        assert_eq!(o.tax_amount, Decimal::new(800, 2));
        assert_eq!(o.total_amount, Decimal::from(111));
    }

    #[test]
    fn empty_order_total_is_shipping_minus_discount() {
        let mut o = order();
        o.recompute_totals(&[], now());
        assert_eq!(o.subtotal, Decimal::ZERO);
        assert_eq!(o.total_amount, Decimal::from(3));
    }

    #[test]
    fn order_number_embeds_the_date() {
        let number = order_number(now().date_naive(), Uuid::new_v4());
        assert!(number.starts_with("ORD-20260704-"));
        assert_eq!(number.len(), "ORD-20260704-".len() + 8);
    }

    #[test]
    fn status_change_stamps_dates_and_writes_history() {
        let mut o = order();
        let history = o
            .change_status(OrderStatus::Shipped, UserId::new(3), "left dock".into(), now())
            .unwrap();
        assert_eq!(o.shipped_date, Some(now()));
        assert_eq!(history.action, OrderHistoryAction::StatusChange);
        assert_eq!(history.old_value, "pending");
        assert_eq!(history.new_value, "shipped");
        assert_eq!(history.description, "left dock");

        o.change_status(OrderStatus::Delivered, UserId::new(3), String::new(), now())
            .unwrap();
        assert_eq!(o.delivered_date, Some(now()));
    }

    #[test]
    fn cancelled_orders_are_final() {
        let mut o = order();
        o.change_status(OrderStatus::Cancelled, UserId::new(1), String::new(), now())
            .unwrap();
        let err = o
            .change_status(OrderStatus::Confirmed, UserId::new(1), String::new(), now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert!(o.ensure_editable().is_err());
    }

    #[test]
    fn missing_shipping_field_is_named() {
        let input = NewOrder {
            shipping: ShippingDetails {
                city: "  ".into(),
                ..shipping()
            },
            ..new_order()
        };
        assert_eq!(
            input.normalized().unwrap_err().to_string(),
            "shipping city is required"
        );
    }

    #[test]
    fn payments_move_payment_status() {
        let mut o = order();
        o.recompute_totals(&[item(1, 100, 0)], now());
        let order_id = o.id;
        let pay = |amount: i64, status: PaymentRecordStatus| OrderPayment {
            id: PaymentId::new(1),
            order_id,
            payment_method: PaymentMethod::Cash,
            provider: String::new(),
            transaction_id: String::new(),
            amount: Decimal::from(amount),
            currency: "USD".into(),
            status,
            processed_at: None,
            failure_reason: String::new(),
            notes: String::new(),
            created_at: now(),
        };
        let payments = vec![pay(50, PaymentRecordStatus::Completed), pay(500, PaymentRecordStatus::Failed)];
        o.apply_payments(&payments, now());
        assert_eq!(o.payment_status, PaymentStatus::Partial);

        let payments = vec![pay(50, PaymentRecordStatus::Completed), pay(61, PaymentRecordStatus::Completed)];
        o.apply_payments(&payments, now());
        assert_eq!(o.payment_status, PaymentStatus::Paid);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: total = subtotal + tax + shipping - discount, and the
            /// subtotal is the discounted sum of the lines.
            #[test]
            fn totals_identity(
                lines in proptest::collection::vec((1i32..20, 0i64..10_000, 0i64..50), 0..15),
                tax_bp in 0i64..=10_000,
                shipping in 0i64..5_000,
                discount in 0i64..5_000,
            ) {
                let items: Vec<_> = lines.iter().map(|&(q, p, d)| item(q, p, d)).collect();
                let tax_rate = Decimal::new(tax_bp, 4);
                let totals = order_totals(&items, tax_rate, Decimal::from(shipping), Decimal::from(discount));

                let expected_subtotal: Decimal = lines
                    .iter()
                    .map(|&(q, p, d)| Decimal::from(p) * Decimal::from(q) - Decimal::from(d))
                    .sum();
                prop_assert_eq!(totals.subtotal, expected_subtotal);
                prop_assert_eq!(
                    totals.total_amount,
                    totals.subtotal + totals.tax_amount + Decimal::from(shipping) - Decimal::from(discount)
                );
            }
        }
    }
}
