//! `ainventory-sales`: customers and their orders.
//!
//! Order totals and customer lifetime metrics are derived values. They are
//! recomputed from the child rows by the functions here, which the stores
//! call inside the same transaction as the write that invalidated them.

pub mod customer;
pub mod history;
pub mod item;
pub mod order;
pub mod payment;

pub use customer::{
    Customer, CustomerId, CustomerMetrics, CustomerStatus, CustomerType, NewCustomer,
    customer_code, customer_metrics,
};
pub use history::{OrderHistory, OrderHistoryAction};
pub use item::{NewOrderItem, OrderItem, OrderItemId, OrderItemUpdate};
pub use order::{
    NewOrder, Order, OrderDetails, OrderFigures, OrderId, OrderPriority, OrderStatus, OrderTotals,
    PaymentMethod, PaymentStatus, ShippingDetails, order_number, order_totals,
};
pub use payment::{NewPayment, OrderPayment, PaymentId, PaymentRecordStatus, payment_status_after};
