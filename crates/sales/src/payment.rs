use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult};

use crate::{OrderId, PaymentMethod, PaymentStatus};

ainventory_core::define_id!(
    /// Identifier of a payment record.
    PaymentId,
    "PaymentId"
);

/// Status of a single payment attempt (not of the order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(DomainError::validation(format!(
                "invalid payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub provider: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentRecordStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPayment {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    #[serde(default)]
    pub status: PaymentRecordStatus,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub failure_reason: String,
    #[serde(default)]
    pub notes: String,
}

impl NewPayment {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.provider = self.provider.trim().to_string();
        self.transaction_id = self.transaction_id.trim().to_string();
        self.failure_reason = self.failure_reason.trim().to_string();
        self.notes = self.notes.trim().to_string();
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }
        Ok(self)
    }

    /// Payments are recorded in the order's currency.
    pub fn into_payment(
        self,
        id: PaymentId,
        order_id: OrderId,
        currency: &str,
        now: DateTime<Utc>,
    ) -> OrderPayment {
        let processed_at = (self.status == PaymentRecordStatus::Completed).then_some(now);
        OrderPayment {
            id,
            order_id,
            payment_method: self.payment_method,
            provider: self.provider,
            transaction_id: self.transaction_id,
            amount: self.amount.round_dp(2),
            currency: currency.to_string(),
            status: self.status,
            processed_at,
            failure_reason: self.failure_reason,
            notes: self.notes,
            created_at: now,
        }
    }
}

/// Order payment status implied by the completed payments, or `None` when
/// nothing has been completed yet and the status should stay as it is.
pub fn payment_status_after(payments: &[OrderPayment], total: Decimal) -> Option<PaymentStatus> {
    let paid: Decimal = payments
        .iter()
        .filter(|p| p.status == PaymentRecordStatus::Completed)
        .map(|p| p.amount)
        .sum();
    if paid >= total && paid > Decimal::ZERO {
        Some(PaymentStatus::Paid)
    } else if paid > Decimal::ZERO {
        Some(PaymentStatus::Partial)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: i64, status: PaymentRecordStatus) -> OrderPayment {
        NewPayment {
            payment_method: PaymentMethod::Paypal,
            amount: Decimal::from(amount),
            status,
            provider: "PayPal".into(),
            transaction_id: String::new(),
            failure_reason: String::new(),
            notes: String::new(),
        }
        .into_payment(PaymentId::new(1), OrderId::new(1), "USD", Utc::now())
    }

    #[test]
    fn only_completed_payments_count() {
        let payments = [
            payment(40, PaymentRecordStatus::Completed),
            payment(500, PaymentRecordStatus::Pending),
        ];
        assert_eq!(payment_status_after(&payments, Decimal::from(100)), Some(PaymentStatus::Partial));
        assert_eq!(payment_status_after(&payments[1..], Decimal::from(100)), None);
    }

    #[test]
    fn reaching_the_total_is_paid() {
        let payments = [
            payment(40, PaymentRecordStatus::Completed),
            payment(60, PaymentRecordStatus::Completed),
        ];
        assert_eq!(payment_status_after(&payments, Decimal::from(100)), Some(PaymentStatus::Paid));
    }

    #[test]
    fn completed_payments_are_stamped() {
        assert!(payment(1, PaymentRecordStatus::Completed).processed_at.is_some());
        assert!(payment(1, PaymentRecordStatus::Failed).processed_at.is_none());
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let input = NewPayment {
            payment_method: PaymentMethod::Cash,
            amount: Decimal::ZERO,
            status: PaymentRecordStatus::Completed,
            provider: String::new(),
            transaction_id: String::new(),
            failure_reason: String::new(),
            notes: String::new(),
        };
        assert!(matches!(input.normalized(), Err(DomainError::Validation(_))));
    }
}
