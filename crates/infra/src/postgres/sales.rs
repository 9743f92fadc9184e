use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use ainventory_core::{Page, PageRequest, UserId};
use ainventory_products::{Product, ProductId};
use ainventory_sales::{
    Customer, CustomerId, NewCustomer, NewOrder, NewOrderItem, NewPayment, Order, OrderDetails,
    OrderFigures, OrderHistory, OrderHistoryAction, OrderId, OrderItem, OrderItemId,
    OrderItemUpdate, OrderPayment, OrderStatus, PaymentId, customer_code, customer_metrics,
    order_number,
};

use super::rows::Db;
use super::{PostgresStore, commit, ensure_exists, map_sqlx_error};
use crate::store::{SalesStore, StoreError, StoreResult};

async fn order_for_update(conn: &mut PgConnection, id: OrderId) -> StoreResult<Order> {
    sqlx::query_as::<_, Db<Order>>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("order_for_update", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("order"))
}

async fn items_of(conn: &mut PgConnection, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
    let rows = sqlx::query_as::<_, Db<OrderItem>>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id.get())
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("order_items", e))?;
    Ok(rows.into_iter().map(Db::into_inner).collect())
}

async fn payments_of(conn: &mut PgConnection, order_id: OrderId) -> StoreResult<Vec<OrderPayment>> {
    let rows = sqlx::query_as::<_, Db<OrderPayment>>(
        "SELECT * FROM order_payments WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id.get())
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("order_payments", e))?;
    Ok(rows.into_iter().map(Db::into_inner).collect())
}

async fn order_details(conn: &mut PgConnection, id: OrderId) -> StoreResult<OrderDetails> {
    let order = sqlx::query_as::<_, Db<Order>>("SELECT * FROM orders WHERE id = $1")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("order_details", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("order"))?;
    Ok(OrderDetails {
        order,
        items: items_of(&mut *conn, id).await?,
        payments: payments_of(&mut *conn, id).await?,
    })
}

async fn product_for_line(conn: &mut PgConnection, id: ProductId) -> StoreResult<Product> {
    sqlx::query_as::<_, Db<Product>>("SELECT * FROM products WHERE id = $1")
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("product_for_line", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::validation(format!("product {id} does not exist")))
}

/// Persist the mutable columns of an order: status, dates, payment status, totals.
async fn save_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE orders SET
            status = $2, shipped_date = $3, delivered_date = $4, payment_status = $5,
            subtotal = $6, tax_amount = $7, total_amount = $8, updated_at = $9
        WHERE id = $1
        "#,
    )
    .bind(order.id.get())
    .bind(order.status.as_str())
    .bind(order.shipped_date)
    .bind(order.delivered_date)
    .bind(order.payment_status.as_str())
    .bind(order.subtotal)
    .bind(order.tax_amount)
    .bind(order.total_amount)
    .bind(order.updated_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("save_order", e))?;
    Ok(())
}

/// Re-derive an order's totals from its current lines and store it.
async fn save_with_totals(
    conn: &mut PgConnection,
    mut order: Order,
    now: DateTime<Utc>,
) -> StoreResult<Order> {
    let items = items_of(&mut *conn, order.id).await?;
    order.recompute_totals(&items, now);
    save_order(conn, &order).await?;
    Ok(order)
}

async fn insert_item(conn: &mut PgConnection, item: &OrderItem) -> StoreResult<OrderItem> {
    let row = sqlx::query_as::<_, Db<OrderItem>>(
        r#"
        INSERT INTO order_items (
            order_id, product_id, product_name, product_sku, quantity, unit_price, unit_cost,
            line_total, discount_amount, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(item.order_id.get())
    .bind(item.product_id.get())
    .bind(&item.product_name)
    .bind(&item.product_sku)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.unit_cost)
    .bind(item.line_total)
    .bind(item.discount_amount)
    .bind(item.created_at)
    .bind(item.updated_at)
    .fetch_one(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order_item", e))?;
    Ok(row.into_inner())
}

async fn insert_history(conn: &mut PgConnection, entry: &OrderHistory) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_history (order_id, action, old_value, new_value, description, performed_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.order_id.get())
    .bind(entry.action.as_str())
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(&entry.description)
    .bind(entry.performed_by.get())
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order_history", e))?;
    Ok(())
}

async fn refresh_customer_metrics(
    conn: &mut PgConnection,
    customer_id: CustomerId,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let rows: Vec<(String, Decimal, DateTime<Utc>)> = sqlx::query_as(
        "SELECT status, total_amount, order_date FROM orders WHERE customer_id = $1",
    )
    .bind(customer_id.get())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("refresh_customer_metrics", e))?;

    let figures = rows
        .into_iter()
        .map(|(status, total_amount, order_date)| {
            Ok(OrderFigures {
                status: OrderStatus::parse(&status)?,
                total_amount,
                order_date,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let metrics = customer_metrics(figures);

    sqlx::query(
        r#"
        UPDATE customers SET total_orders = $2, total_spent = $3, average_order_value = $4,
            last_order_date = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(customer_id.get())
    .bind(metrics.total_orders)
    .bind(metrics.total_spent)
    .bind(metrics.average_order_value)
    .bind(metrics.last_order_date)
    .bind(now)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("refresh_customer_metrics", e))?;
    Ok(())
}

async fn order_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item_id: OrderItemId,
) -> StoreResult<OrderItem> {
    sqlx::query_as::<_, Db<OrderItem>>(
        "SELECT * FROM order_items WHERE id = $1 AND order_id = $2 FOR UPDATE",
    )
    .bind(item_id.get())
    .bind(order_id.get())
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("order_item", e))?
    .map(Db::into_inner)
    .ok_or_else(|| StoreError::not_found("order item"))
}

async fn unused_code(
    conn: &mut PgConnection,
    sql: &'static str,
    mut candidate: impl FnMut() -> String,
) -> StoreResult<String> {
    loop {
        let code = candidate();
        let taken: bool = sqlx::query_scalar(sql)
            .bind(&code)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("unused_code", e))?;
        if !taken {
            return Ok(code);
        }
    }
}

#[async_trait]
impl SalesStore for PostgresStore {
    #[instrument(skip(self, input), err)]
    async fn create_customer(
        &self,
        input: NewCustomer,
        created_by: Option<UserId>,
    ) -> StoreResult<Customer> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        let email_taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE email = $1)")
                .bind(&input.email)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("create_customer", e))?;
        if email_taken {
            return Err(StoreError::conflict("customer email already exists"));
        }
        let code = unused_code(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM customers WHERE customer_code = $1)",
            || customer_code(Uuid::new_v4()),
        )
        .await?;

        let now = Utc::now();
        let customer = input.into_customer(CustomerId::from(0), code, created_by, now);
        let row = sqlx::query_as::<_, Db<Customer>>(
            r#"
            INSERT INTO customers (
                customer_code, first_name, last_name, email, phone, company, address, city,
                state, zip_code, country, customer_type, status, notes, created_by,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING *
            "#,
        )
        .bind(&customer.customer_code)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.company)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.state)
        .bind(&customer.zip_code)
        .bind(&customer.country)
        .bind(customer.customer_type.as_str())
        .bind(customer.status.as_str())
        .bind(&customer.notes)
        .bind(created_by.map(|id| id.get()))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_customer", e))?;

        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        sqlx::query_as::<_, Db<Customer>>("SELECT * FROM customers WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("customer"))
    }

    #[instrument(skip(self), err)]
    async fn list_customers(&self, page: PageRequest) -> StoreResult<Page<Customer>> {
        let mut conn = self.acquire().await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;
        let rows = sqlx::query_as::<_, Db<Customer>>(
            "SELECT * FROM customers ORDER BY id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_customers", e))?;
        Ok(Page::new(rows.into_iter().map(Db::into_inner).collect(), total, page))
    }

    #[instrument(skip(self, input), fields(customer_id = %input.customer_id), err)]
    async fn create_order(&self, input: NewOrder, created_by: UserId) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, "customers", input.customer_id.get(), "customer")
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    StoreError::validation("customer does not exist")
                } else {
                    e
                }
            })?;
        let mut products = Vec::with_capacity(input.items.len());
        for line in &input.items {
            products.push(product_for_line(&mut tx, line.product_id).await?);
        }

        let now = Utc::now();
        let number = unused_code(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)",
            || order_number(now.date_naive(), Uuid::new_v4()),
        )
        .await?;

        let (mut order, lines) = input.into_order(OrderId::from(0), number, Some(created_by), now);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_number, customer_id, status, priority, order_date, required_date,
                shipping_name, shipping_email, shipping_phone, shipping_company, shipping_address,
                shipping_city, shipping_state, shipping_zip, shipping_country,
                payment_status, payment_method, tax_rate, shipping_cost, discount_amount,
                currency, notes, created_by, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $24
            )
            RETURNING id
            "#,
        )
        .bind(&order.order_number)
        .bind(order.customer_id.get())
        .bind(order.status.as_str())
        .bind(order.priority.as_str())
        .bind(order.order_date)
        .bind(order.required_date)
        .bind(&order.shipping.name)
        .bind(&order.shipping.email)
        .bind(&order.shipping.phone)
        .bind(&order.shipping.company)
        .bind(&order.shipping.address)
        .bind(&order.shipping.city)
        .bind(&order.shipping.state)
        .bind(&order.shipping.zip)
        .bind(&order.shipping.country)
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.tax_rate)
        .bind(order.shipping_cost)
        .bind(order.discount_amount)
        .bind(&order.currency)
        .bind(&order.notes)
        .bind(created_by.get())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_order", e))?;
        order.id = OrderId::from(id);

        for (line, product) in lines.into_iter().zip(&products) {
            let item = line.into_item(OrderItemId::from(0), order.id, product, now)?;
            insert_item(&mut tx, &item).await?;
        }
        let order = save_with_totals(&mut tx, order, now).await?;

        let history = OrderHistory::new(order.id, OrderHistoryAction::OrderCreated, created_by, now)
            .with_values("", order.status.as_str())
            .with_description(format!("order {} created", order.order_number));
        insert_history(&mut tx, &history).await?;
        refresh_customer_metrics(&mut tx, order.customer_id, now).await?;
        let details = order_details(&mut tx, order.id).await?;

        commit(tx).await?;
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(details)
    }

    #[instrument(skip(self), err)]
    async fn get_order(&self, id: OrderId) -> StoreResult<OrderDetails> {
        let mut conn = self.acquire().await?;
        order_details(&mut conn, id).await
    }

    #[instrument(skip(self), err)]
    async fn list_orders(
        &self,
        page: PageRequest,
        customer_id: Option<CustomerId>,
    ) -> StoreResult<Page<Order>> {
        let mut conn = self.acquire().await?;
        let customer = customer_id.map(|id| id.get());
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE $1::BIGINT IS NULL OR customer_id = $1",
        )
        .bind(customer)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        let rows = sqlx::query_as::<_, Db<Order>>(
            r#"
            SELECT * FROM orders
            WHERE $1::BIGINT IS NULL OR customer_id = $1
            ORDER BY order_date DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(customer)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        Ok(Page::new(rows.into_iter().map(Db::into_inner).collect(), total, page))
    }

    #[instrument(skip(self, notes), err)]
    async fn change_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: String,
        performed_by: UserId,
    ) -> StoreResult<Order> {
        let mut tx = self.begin().await?;
        let mut order = order_for_update(&mut tx, id).await?;
        let now = Utc::now();
        let history = order.change_status(status, performed_by, notes, now)?;
        save_order(&mut tx, &order).await?;
        insert_history(&mut tx, &history).await?;
        refresh_customer_metrics(&mut tx, order.customer_id, now).await?;
        commit(tx).await?;
        Ok(order)
    }

    #[instrument(skip(self, input), err)]
    async fn add_order_item(
        &self,
        order_id: OrderId,
        input: NewOrderItem,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        let order = order_for_update(&mut tx, order_id).await?;
        order.ensure_editable()?;
        let product = product_for_line(&mut tx, input.product_id).await?;

        let now = Utc::now();
        let item = input.into_item(OrderItemId::from(0), order_id, &product, now)?;
        let item = insert_item(&mut tx, &item).await?;
        let order = save_with_totals(&mut tx, order, now).await?;
        let history = OrderHistory::new(order_id, OrderHistoryAction::ItemAdded, performed_by, now)
            .with_description(format!("added {} x {}", item.quantity, item.product_sku));
        insert_history(&mut tx, &history).await?;
        refresh_customer_metrics(&mut tx, order.customer_id, now).await?;
        let details = order_details(&mut tx, order_id).await?;
        commit(tx).await?;
        Ok(details)
    }

    #[instrument(skip(self, update), err)]
    async fn update_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: OrderItemUpdate,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let mut tx = self.begin().await?;
        let order = order_for_update(&mut tx, order_id).await?;
        order.ensure_editable()?;
        let mut item = order_item(&mut tx, order_id, item_id).await?;
        let old_quantity = item.quantity;
        let now = Utc::now();
        item.apply(update, now)?;

        sqlx::query(
            r#"
            UPDATE order_items SET quantity = $2, unit_price = $3, line_total = $4,
                discount_amount = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(item_id.get())
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.line_total)
        .bind(item.discount_amount)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_item", e))?;

        let order = save_with_totals(&mut tx, order, now).await?;
        let history = OrderHistory::new(order_id, OrderHistoryAction::ItemUpdated, performed_by, now)
            .with_values(old_quantity.to_string(), item.quantity.to_string())
            .with_description(format!("updated {}", item.product_sku));
        insert_history(&mut tx, &history).await?;
        refresh_customer_metrics(&mut tx, order.customer_id, now).await?;
        let details = order_details(&mut tx, order_id).await?;
        commit(tx).await?;
        Ok(details)
    }

    #[instrument(skip(self), err)]
    async fn remove_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let mut tx = self.begin().await?;
        let order = order_for_update(&mut tx, order_id).await?;
        order.ensure_editable()?;
        let item = order_item(&mut tx, order_id, item_id).await?;
        let now = Utc::now();

        sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(item_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("remove_order_item", e))?;

        let order = save_with_totals(&mut tx, order, now).await?;
        let history = OrderHistory::new(order_id, OrderHistoryAction::ItemRemoved, performed_by, now)
            .with_values(item.product_sku.clone(), "")
            .with_description(format!("removed {} x {}", item.quantity, item.product_sku));
        insert_history(&mut tx, &history).await?;
        refresh_customer_metrics(&mut tx, order.customer_id, now).await?;
        let details = order_details(&mut tx, order_id).await?;
        commit(tx).await?;
        Ok(details)
    }

    #[instrument(skip(self, input), err)]
    async fn add_payment(
        &self,
        order_id: OrderId,
        input: NewPayment,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        let mut order = order_for_update(&mut tx, order_id).await?;
        let now = Utc::now();
        let payment = input.into_payment(PaymentId::from(0), order_id, &order.currency, now);

        sqlx::query(
            r#"
            INSERT INTO order_payments (
                order_id, payment_method, provider, transaction_id, amount, currency, status,
                processed_at, failure_reason, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_id.get())
        .bind(payment.payment_method.as_str())
        .bind(&payment.provider)
        .bind(&payment.transaction_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.processed_at)
        .bind(&payment.failure_reason)
        .bind(&payment.notes)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_payment", e))?;

        let previous = order.payment_status;
        let payments = payments_of(&mut tx, order_id).await?;
        order.apply_payments(&payments, now);
        if order.payment_status != previous {
            save_order(&mut tx, &order).await?;
            tracing::info!(
                order_id = %order_id,
                payment_status = order.payment_status.as_str(),
                "order payment status changed"
            );
        }

        let history = OrderHistory::new(order_id, OrderHistoryAction::PaymentAdded, performed_by, now)
            .with_values("", payment.amount.to_string())
            .with_description(format!(
                "{} payment ({})",
                payment.payment_method.as_str(),
                payment.status.as_str()
            ));
        insert_history(&mut tx, &history).await?;
        let details = order_details(&mut tx, order_id).await?;
        commit(tx).await?;
        Ok(details)
    }

    #[instrument(skip(self), err)]
    async fn order_history(&self, order_id: OrderId) -> StoreResult<Vec<OrderHistory>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "orders", order_id.get(), "order").await?;
        let rows = sqlx::query_as::<_, Db<OrderHistory>>(
            "SELECT * FROM order_history WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("order_history", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }
}
