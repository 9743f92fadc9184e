use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ainventory_core::{Page, PageRequest, UserId};
use ainventory_products::{Product, ProductId};
use ainventory_sales::{
    Customer, CustomerId, NewCustomer, NewOrder, NewOrderItem, NewPayment, Order, OrderDetails,
    OrderHistory, OrderHistoryAction, OrderId, OrderItem, OrderItemId, OrderItemUpdate,
    OrderStatus, customer_code, customer_metrics, order_number,
};

use super::{InMemoryStore, State, upsert};
use crate::store::{SalesStore, StoreError, StoreResult};

impl State {
    fn customer(&self, id: CustomerId) -> StoreResult<&Customer> {
        self.customers
            .get(&id)
            .ok_or_else(|| StoreError::not_found("customer"))
    }

    fn product_for_line(&self, id: ProductId) -> StoreResult<Product> {
        self.products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::validation(format!("product {id} does not exist")))
    }

    fn order_item(&self, order_id: OrderId, item_id: OrderItemId) -> StoreResult<OrderItem> {
        self.order_items
            .get(&item_id)
            .filter(|item| item.order_id == order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order item"))
    }

    /// Re-derive an order's totals from its current lines and store it.
    fn store_with_totals(&mut self, mut order: Order, now: DateTime<Utc>) -> Order {
        order.recompute_totals(&self.order_items_of(order.id), now);
        upsert(&mut self.orders, &order);
        order
    }

    fn refresh_customer_metrics(&mut self, customer_id: CustomerId, now: DateTime<Utc>) {
        let metrics = customer_metrics(
            self.orders
                .values()
                .filter(|o| o.customer_id == customer_id)
                .map(Order::figures),
        );
        if let Some(customer) = self.customers.get_mut(&customer_id) {
            customer.apply_metrics(metrics, now);
        }
    }
}

#[async_trait]
impl SalesStore for InMemoryStore {
    async fn create_customer(
        &self,
        input: NewCustomer,
        created_by: Option<UserId>,
    ) -> StoreResult<Customer> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if state.customers.values().any(|c| c.email == input.email) {
            return Err(StoreError::conflict("customer email already exists"));
        }

        let code = loop {
            let candidate = customer_code(Uuid::new_v4());
            if !state.customers.values().any(|c| c.customer_code == candidate) {
                break candidate;
            }
        };
        let id = state.next_id("customers");
        let customer = input.into_customer(id, code, created_by, Utc::now());
        upsert(&mut state.customers, &customer);
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let state = self.state.read().await;
        state.customer(id).cloned()
    }

    async fn list_customers(&self, page: PageRequest) -> StoreResult<Page<Customer>> {
        let state = self.state.read().await;
        let rows: Vec<_> = state.customers.values().rev().cloned().collect();
        Ok(Page::from_sorted(rows, page))
    }

    async fn create_order(&self, input: NewOrder, created_by: UserId) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if !state.customers.contains_key(&input.customer_id) {
            return Err(StoreError::validation("customer does not exist"));
        }
        let products = input
            .items
            .iter()
            .map(|line| state.product_for_line(line.product_id))
            .collect::<StoreResult<Vec<_>>>()?;

        let now = Utc::now();
        let number = loop {
            let candidate = order_number(now.date_naive(), Uuid::new_v4());
            if !state.orders.values().any(|o| o.order_number == candidate) {
                break candidate;
            }
        };
        let id = state.next_id("orders");
        let (order, lines) = input.into_order(id, number, Some(created_by), now);

        let mut items = Vec::with_capacity(lines.len());
        for (line, product) in lines.into_iter().zip(&products) {
            let item_id = state.next_id("order_items");
            items.push(line.into_item(item_id, id, product, now)?);
        }

        for item in items {
            state.order_items.insert(item.id, item);
        }
        let order = state.store_with_totals(order, now);
        state.order_history.push(
            OrderHistory::new(id, OrderHistoryAction::OrderCreated, created_by, now)
                .with_values("", order.status.as_str())
                .with_description(format!("order {} created", order.order_number)),
        );
        state.refresh_customer_metrics(order.customer_id, now);
        tracing::info!(order_id = %id, total = %order.total_amount, "order created");
        state.order_details(id)
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<OrderDetails> {
        let state = self.state.read().await;
        state.order_details(id)
    }

    async fn list_orders(
        &self,
        page: PageRequest,
        customer_id: Option<CustomerId>,
    ) -> StoreResult<Page<Order>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .orders
            .values()
            .filter(|o| customer_id.is_none_or(|c| o.customer_id == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(rows, page))
    }

    async fn change_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: String,
        performed_by: UserId,
    ) -> StoreResult<Order> {
        let mut state = self.state.write().await;
        let mut order = state.order(id)?.clone();
        let now = Utc::now();
        let history = order.change_status(status, performed_by, notes, now)?;

        upsert(&mut state.orders, &order);
        state.order_history.push(history);
        state.refresh_customer_metrics(order.customer_id, now);
        Ok(order)
    }

    async fn add_order_item(
        &self,
        order_id: OrderId,
        input: NewOrderItem,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        let order = state.order(order_id)?.clone();
        order.ensure_editable()?;
        let product = state.product_for_line(input.product_id)?;

        let now = Utc::now();
        let item_id = state.next_id("order_items");
        let item = input.into_item(item_id, order_id, &product, now)?;
        let description = format!("added {} x {}", item.quantity, item.product_sku);
        state.order_items.insert(item_id, item);

        let order = state.store_with_totals(order, now);
        state.order_history.push(
            OrderHistory::new(order_id, OrderHistoryAction::ItemAdded, performed_by, now)
                .with_description(description),
        );
        state.refresh_customer_metrics(order.customer_id, now);
        state.order_details(order_id)
    }

    async fn update_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: OrderItemUpdate,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let mut state = self.state.write().await;
        let order = state.order(order_id)?.clone();
        order.ensure_editable()?;
        let mut item = state.order_item(order_id, item_id)?;
        let old_quantity = item.quantity;

        let now = Utc::now();
        item.apply(update, now)?;
        let history = OrderHistory::new(order_id, OrderHistoryAction::ItemUpdated, performed_by, now)
            .with_values(old_quantity.to_string(), item.quantity.to_string())
            .with_description(format!("updated {}", item.product_sku));
        state.order_items.insert(item_id, item);

        let order = state.store_with_totals(order, now);
        state.order_history.push(history);
        state.refresh_customer_metrics(order.customer_id, now);
        state.order_details(order_id)
    }

    async fn remove_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let mut state = self.state.write().await;
        let order = state.order(order_id)?.clone();
        order.ensure_editable()?;
        let item = state.order_item(order_id, item_id)?;

        let now = Utc::now();
        state.order_items.remove(&item_id);
        let order = state.store_with_totals(order, now);
        state.order_history.push(
            OrderHistory::new(order_id, OrderHistoryAction::ItemRemoved, performed_by, now)
                .with_values(item.product_sku.clone(), "")
                .with_description(format!("removed {} x {}", item.quantity, item.product_sku)),
        );
        state.refresh_customer_metrics(order.customer_id, now);
        state.order_details(order_id)
    }

    async fn add_payment(
        &self,
        order_id: OrderId,
        input: NewPayment,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        let mut order = state.order(order_id)?.clone();

        let now = Utc::now();
        let payment_id = state.next_id("order_payments");
        let payment = input.into_payment(payment_id, order_id, &order.currency, now);
        let history = OrderHistory::new(order_id, OrderHistoryAction::PaymentAdded, performed_by, now)
            .with_values("", payment.amount.to_string())
            .with_description(format!(
                "{} payment ({})",
                payment.payment_method.as_str(),
                payment.status.as_str()
            ));
        state.payments.insert(payment_id, payment);

        let previous = order.payment_status;
        order.apply_payments(&state.payments_of(order_id), now);
        if order.payment_status != previous {
            tracing::info!(
                order_id = %order_id,
                payment_status = order.payment_status.as_str(),
                "order payment status changed"
            );
        }
        state.orders.insert(order_id, order);
        state.order_history.push(history);
        state.order_details(order_id)
    }

    async fn order_history(&self, order_id: OrderId) -> StoreResult<Vec<OrderHistory>> {
        let state = self.state.read().await;
        state.order(order_id)?;
        Ok(state
            .order_history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CatalogStore, IdentityStore};
    use ainventory_auth::{Gender, NewUser};
    use ainventory_products::ProductStatus;
    use ainventory_sales::{
        OrderPriority, PaymentMethod, PaymentRecordStatus, PaymentStatus, ShippingDetails,
    };
    use rust_decimal::Decimal;

    struct Fixture {
        store: InMemoryStore,
        clerk: UserId,
        customer: CustomerId,
        product: ProductId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let clerk = store
            .create_user(NewUser {
                first_name: "Sales".into(),
                last_name: "Clerk".into(),
                email: "clerk@example.com".into(),
                password_hash: "hash".into(),
                gender: Gender::PreferNotToSay,
                role_id: None,
                joined_at: Utc::now(),
            })
            .await
            .unwrap()
            .id;
        let customer = store
            .create_customer(
                NewCustomer {
                    first_name: "Ada".into(),
                    last_name: "Lovelace".into(),
                    email: "ADA@example.com".into(),
                    ..NewCustomer::default()
                },
                Some(clerk),
            )
            .await
            .unwrap()
            .id;
        let product = store
            .create_product(
                ainventory_products::NewProduct {
                    name: "Desk Lamp".into(),
                    sku: "lamp-1".into(),
                    description: String::new(),
                    category_id: None,
                    supplier_id: None,
                    brand: String::new(),
                    cost: Decimal::new(600, 2),
                    price: Decimal::new(1000, 2),
                    currency: "USD".into(),
                    quantity: 100,
                    low_stock_threshold: Some(10),
                    track_quantity: true,
                    status: ProductStatus::Active,
                },
                None,
            )
            .await
            .unwrap()
            .id;
        Fixture {
            store,
            clerk,
            customer,
            product,
        }
    }

    fn new_order(customer_id: CustomerId, product_id: ProductId, quantity: i32) -> NewOrder {
        NewOrder {
            customer_id,
            priority: OrderPriority::default(),
            order_date: None,
            required_date: None,
            shipping: ShippingDetails {
                name: "Ada Lovelace".into(),
                email: "ada@example.com".into(),
                phone: "555-0100".into(),
                company: String::new(),
                address: "12 St James's Square".into(),
                city: "London".into(),
                state: "London".into(),
                zip: "SW1Y 4JH".into(),
                country: "United Kingdom".into(),
            },
            payment_method: PaymentMethod::CreditCard,
            tax_rate: Decimal::new(10, 2),
            shipping_cost: Decimal::new(500, 2),
            discount_amount: Decimal::ZERO,
            currency: "usd".into(),
            notes: String::new(),
            items: vec![NewOrderItem {
                product_id,
                quantity,
                unit_price: None,
                discount_amount: Decimal::ZERO,
            }],
        }
    }

    fn payment(amount: Decimal) -> NewPayment {
        NewPayment {
            payment_method: PaymentMethod::Cash,
            amount,
            status: PaymentRecordStatus::Completed,
            provider: String::new(),
            transaction_id: String::new(),
            failure_reason: String::new(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn customers_get_codes_and_unique_emails() {
        let f = fixture().await;
        let customer = f.store.get_customer(f.customer).await.unwrap();
        assert!(customer.customer_code.starts_with("CUS-"));
        assert_eq!(customer.email, "ada@example.com");

        let err = f
            .store
            .create_customer(
                NewCustomer {
                    first_name: "Other".into(),
                    last_name: "Ada".into(),
                    email: "ada@example.com".into(),
                    ..NewCustomer::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "customer email already exists");
    }

    #[tokio::test]
    async fn order_totals_and_customer_metrics_follow_the_lines() {
        let f = fixture().await;
        let details = f
            .store
            .create_order(new_order(f.customer, f.product, 2), f.clerk)
            .await
            .unwrap();
        assert!(details.order.order_number.starts_with("ORD-"));
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].line_total, Decimal::new(2000, 2));
        assert_eq!(details.order.subtotal, Decimal::new(2000, 2));
        assert_eq!(details.order.tax_amount, Decimal::new(200, 2));
        assert_eq!(details.order.total_amount, Decimal::new(2700, 2));

        let customer = f.store.get_customer(f.customer).await.unwrap();
        assert_eq!(customer.total_orders, 1);
        assert_eq!(customer.total_spent, Decimal::new(2700, 2));

        let order_id = details.order.id;
        let item_id = details.items[0].id;
        let updated = f
            .store
            .update_order_item(
                order_id,
                item_id,
                OrderItemUpdate {
                    quantity: Some(3),
                    ..OrderItemUpdate::default()
                },
                f.clerk,
            )
            .await
            .unwrap();
        assert_eq!(updated.order.subtotal, Decimal::new(3000, 2));
        assert_eq!(updated.order.total_amount, Decimal::new(3800, 2));
        assert_eq!(
            f.store.get_customer(f.customer).await.unwrap().total_spent,
            Decimal::new(3800, 2)
        );
    }

    #[tokio::test]
    async fn cancelled_orders_are_frozen_and_leave_the_metrics() {
        let f = fixture().await;
        let details = f
            .store
            .create_order(new_order(f.customer, f.product, 1), f.clerk)
            .await
            .unwrap();
        let order_id = details.order.id;

        f.store
            .change_order_status(order_id, OrderStatus::Cancelled, "customer request".into(), f.clerk)
            .await
            .unwrap();
        assert_eq!(f.store.get_customer(f.customer).await.unwrap().total_orders, 0);

        let err = f
            .store
            .add_order_item(
                order_id,
                NewOrderItem {
                    product_id: f.product,
                    quantity: 1,
                    unit_price: None,
                    discount_amount: Decimal::ZERO,
                },
                f.clerk,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot modify items of a cancelled order");

        let err = f
            .store
            .change_order_status(order_id, OrderStatus::Pending, String::new(), f.clerk)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot change status of a cancelled order");
    }

    #[tokio::test]
    async fn shipping_stamps_the_date_and_writes_history() {
        let f = fixture().await;
        let order_id = f
            .store
            .create_order(new_order(f.customer, f.product, 1), f.clerk)
            .await
            .unwrap()
            .order
            .id;
        let shipped = f
            .store
            .change_order_status(order_id, OrderStatus::Shipped, "via courier".into(), f.clerk)
            .await
            .unwrap();
        assert!(shipped.shipped_date.is_some());

        let history = f.store.order_history(order_id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.action, OrderHistoryAction::StatusChange);
        assert_eq!((last.old_value.as_str(), last.new_value.as_str()), ("pending", "shipped"));
        assert_eq!(last.description, "via courier");
    }

    #[tokio::test]
    async fn completed_payments_drive_payment_status() {
        let f = fixture().await;
        let order_id = f
            .store
            .create_order(new_order(f.customer, f.product, 2), f.clerk)
            .await
            .unwrap()
            .order
            .id;

        let partial = f
            .store
            .add_payment(order_id, payment(Decimal::new(1000, 2)), f.clerk)
            .await
            .unwrap();
        assert_eq!(partial.order.payment_status, PaymentStatus::Partial);

        let paid = f
            .store
            .add_payment(order_id, payment(Decimal::new(1700, 2)), f.clerk)
            .await
            .unwrap();
        assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.payments.len(), 2);
        assert!(paid.payments.iter().all(|p| p.currency == "USD"));
    }

    #[tokio::test]
    async fn every_mutation_is_audited() {
        let f = fixture().await;
        let details = f
            .store
            .create_order(new_order(f.customer, f.product, 1), f.clerk)
            .await
            .unwrap();
        let order_id = details.order.id;
        let added = f
            .store
            .add_order_item(
                order_id,
                NewOrderItem {
                    product_id: f.product,
                    quantity: 4,
                    unit_price: Some(Decimal::new(900, 2)),
                    discount_amount: Decimal::ZERO,
                },
                f.clerk,
            )
            .await
            .unwrap();
        let new_item = added.items.iter().map(|i| i.id).max().unwrap();
        let removed = f
            .store
            .remove_order_item(order_id, new_item, f.clerk)
            .await
            .unwrap();
        assert_eq!(removed.items.len(), 1);
        f.store
            .add_payment(order_id, payment(Decimal::new(100, 2)), f.clerk)
            .await
            .unwrap();

        let actions: Vec<_> = f
            .store
            .order_history(order_id)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                OrderHistoryAction::OrderCreated,
                OrderHistoryAction::ItemAdded,
                OrderHistoryAction::ItemRemoved,
                OrderHistoryAction::PaymentAdded,
            ]
        );
    }

    #[tokio::test]
    async fn unknown_products_and_items_are_rejected() {
        let f = fixture().await;
        let err = f
            .store
            .create_order(new_order(f.customer, ProductId::new(404), 1), f.clerk)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(f
            .store
            .list_orders(PageRequest::default(), None)
            .await
            .unwrap()
            .data
            .is_empty());

        let order_id = f
            .store
            .create_order(new_order(f.customer, f.product, 1), f.clerk)
            .await
            .unwrap()
            .order
            .id;
        let err = f
            .store
            .remove_order_item(order_id, OrderItemId::new(999), f.clerk)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
