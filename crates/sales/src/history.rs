use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, UserId};

use crate::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderHistoryAction {
    OrderCreated,
    StatusChange,
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
    PaymentAdded,
}

impl OrderHistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::StatusChange => "status_change",
            Self::ItemAdded => "item_added",
            Self::ItemUpdated => "item_updated",
            Self::ItemRemoved => "item_removed",
            Self::PaymentAdded => "payment_added",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "order_created" => Ok(Self::OrderCreated),
            "status_change" => Ok(Self::StatusChange),
            "item_added" => Ok(Self::ItemAdded),
            "item_updated" => Ok(Self::ItemUpdated),
            "item_removed" => Ok(Self::ItemRemoved),
            "payment_added" => Ok(Self::PaymentAdded),
            other => Err(DomainError::validation(format!(
                "unknown order history action '{other}'"
            ))),
        }
    }
}

/// Append-only audit row for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub order_id: OrderId,
    pub action: OrderHistoryAction,
    pub old_value: String,
    pub new_value: String,
    pub description: String,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl OrderHistory {
    pub fn new(
        order_id: OrderId,
        action: OrderHistoryAction,
        performed_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            action,
            old_value: String::new(),
            new_value: String::new(),
            description: String::new(),
            performed_by,
            created_at: now,
        }
    }

    pub fn with_values(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.old_value = old.into();
        self.new_value = new.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip_through_parse() {
        for action in [
            OrderHistoryAction::OrderCreated,
            OrderHistoryAction::StatusChange,
            OrderHistoryAction::PaymentAdded,
        ] {
            assert_eq!(OrderHistoryAction::parse(action.as_str()).unwrap(), action);
        }
        assert!(OrderHistoryAction::parse("teleported").is_err());
    }

    #[test]
    fn builder_fills_values() {
        let row = OrderHistory::new(OrderId::new(1), OrderHistoryAction::OrderCreated, UserId::new(2), Utc::now())
            .with_values("", "pending")
            .with_description("Order created");
        assert_eq!(row.new_value, "pending");
        assert_eq!(row.description, "Order created");
    }
}
