use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;

use ainventory_core::{Page, PageRequest, SortDirection, UserId};
use ainventory_products::{
    CategoryId, CategoryInput, CategoryWithCount, InventoryTransaction, InventoryTransactionId,
    NewInventoryTransaction, NewProduct, NewSupplier, Product, ProductCategory, ProductId,
    Supplier, SupplierId, SupplierSort, SupplierWithCount, ensure_parent_is_not_self,
    parent_would_cycle,
};

use super::rows::Db;
use super::{PostgresStore, commit, ensure_exists, map_sqlx_error};
use crate::store::{CatalogStore, MAX_TREE_DEPTH, StoreError, StoreResult};

const CATEGORY_WITH_COUNT: &str = r#"
    SELECT c.*, (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count
    FROM product_categories c
"#;

const SUPPLIER_WITH_COUNT: &str = r#"
    SELECT s.*, (SELECT COUNT(*) FROM products p WHERE p.supplier_id = s.id) AS product_count
    FROM suppliers s
"#;

async fn count(conn: &mut PgConnection, table: &'static str) -> StoreResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error("count", e))
}

/// Turn a missing referenced row into a validation error with `message`.
fn missing_as_invalid(message: &'static str) -> impl FnOnce(StoreError) -> StoreError {
    move |e| {
        if e.is_not_found() {
            StoreError::validation(message)
        } else {
            e
        }
    }
}

/// Code uniqueness among other categories, shared by create and update.
async fn ensure_category_code_free(
    conn: &mut PgConnection,
    code: &str,
    this: Option<CategoryId>,
) -> StoreResult<()> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM product_categories WHERE code = $1 AND id IS DISTINCT FROM $2)",
    )
    .bind(code)
    .bind(this.map(|id| id.get()))
    .fetch_one(conn)
    .await
    .map_err(|e| map_sqlx_error("ensure_category_code_free", e))?;
    if taken {
        return Err(StoreError::conflict("category code already exists"));
    }
    Ok(())
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, input), fields(code = %input.code), err)]
    async fn create_category(&self, input: CategoryInput) -> StoreResult<ProductCategory> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        ensure_category_code_free(&mut tx, &input.code, None).await?;

        // Insert detached first: a create may only name itself as parent once
        // its id is known.
        let mut category = sqlx::query_as::<_, Db<ProductCategory>>(
            r#"
            INSERT INTO product_categories (name, code, description, sort_order, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.description)
        .bind(input.sort_order)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_category", e))?
        .into_inner();

        if let Some(parent_id) = input.parent_id {
            ensure_parent_is_not_self(category.id, Some(parent_id))?;
            ensure_exists(&mut tx, "product_categories", parent_id.get(), "category")
                .await
                .map_err(missing_as_invalid("parent category does not exist"))?;
            sqlx::query("UPDATE product_categories SET parent_id = $2 WHERE id = $1")
                .bind(category.id.get())
                .bind(parent_id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("create_category", e))?;
            category.parent_id = Some(parent_id);
        }

        commit(tx).await?;
        Ok(category)
    }

    #[instrument(skip(self, input), err)]
    async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
    ) -> StoreResult<ProductCategory> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        let mut category = sqlx::query_as::<_, Db<ProductCategory>>(
            "SELECT * FROM product_categories WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_category", e))?
        .map(Db::into_inner)
        .ok_or_else(|| StoreError::not_found("category"))?;

        ensure_parent_is_not_self(id, input.parent_id)?;
        ensure_category_code_free(&mut tx, &input.code, Some(id)).await?;
        if let Some(parent_id) = input.parent_id {
            ensure_exists(&mut tx, "product_categories", parent_id.get(), "category")
                .await
                .map_err(missing_as_invalid("parent category does not exist"))?;

            let parents: HashMap<i64, Option<i64>> =
                sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, parent_id FROM product_categories")
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_category", e))?
                    .into_iter()
                    .collect();
            let parent_of = |node: CategoryId| {
                parents
                    .get(&node.get())
                    .copied()
                    .flatten()
                    .map(CategoryId::from)
            };
            if parent_would_cycle(id, parent_id, MAX_TREE_DEPTH, parent_of) {
                return Err(StoreError::validation(
                    "category cannot be a descendant of itself",
                ));
            }
        }

        category.apply(input, Utc::now());
        sqlx::query(
            r#"
            UPDATE product_categories SET name = $2, code = $3, description = $4,
                parent_id = $5, sort_order = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(&category.name)
        .bind(&category.code)
        .bind(&category.description)
        .bind(category.parent_id.map(|id| id.get()))
        .bind(category.sort_order)
        .bind(category.is_active)
        .bind(category.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_category", e))?;

        commit(tx).await?;
        Ok(category)
    }

    #[instrument(skip(self), err)]
    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryWithCount> {
        let sql = format!("{CATEGORY_WITH_COUNT} WHERE c.id = $1");
        sqlx::query_as::<_, Db<CategoryWithCount>>(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("category"))
    }

    #[instrument(skip(self), err)]
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let sql = format!("{CATEGORY_WITH_COUNT} WHERE c.id = $1 FOR UPDATE OF c");
        let row = sqlx::query_as::<_, Db<CategoryWithCount>>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("category"))?;

        let children: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM product_categories WHERE parent_id = $1")
                .bind(id.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_category", e))?;
        row.category.ensure_deletable(row.product_count, children)?;

        sqlx::query("DELETE FROM product_categories WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        commit(tx).await
    }

    #[instrument(skip(self), err)]
    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<CategoryWithCount>> {
        let mut conn = self.acquire().await?;
        let total = count(&mut conn, "product_categories").await?;
        let sql = format!("{CATEGORY_WITH_COUNT} ORDER BY c.sort_order, c.name, c.id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Db<CategoryWithCount>>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;
        Ok(Page::new(rows.into_iter().map(Db::into_inner).collect(), total, page))
    }

    #[instrument(skip(self, input), fields(code = %input.code), err)]
    async fn create_supplier(
        &self,
        input: NewSupplier,
        created_by: Option<UserId>,
    ) -> StoreResult<Supplier> {
        let input = input.normalized()?;
        let row = sqlx::query_as::<_, Db<Supplier>>(
            r#"
            INSERT INTO suppliers (
                name, code, contact_person, email, phone, website, address, city, state,
                zip_code, country, tax_id, payment_terms, currency, minimum_order_value,
                status, rating, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.code)
        .bind(&input.contact_person)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.website)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.zip_code)
        .bind(&input.country)
        .bind(&input.tax_id)
        .bind(&input.payment_terms)
        .bind(&input.currency)
        .bind(input.minimum_order_value)
        .bind(input.status.as_str())
        .bind(input.rating)
        .bind(&input.notes)
        .bind(created_by.map(|id| id.get()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_supplier", e))?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn get_supplier(&self, id: SupplierId) -> StoreResult<SupplierWithCount> {
        let sql = format!("{SUPPLIER_WITH_COUNT} WHERE s.id = $1");
        sqlx::query_as::<_, Db<SupplierWithCount>>(&sql)
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_supplier", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("supplier"))
    }

    #[instrument(skip(self), err)]
    async fn list_suppliers(
        &self,
        page: PageRequest,
        sort: SupplierSort,
        direction: SortDirection,
    ) -> StoreResult<Page<SupplierWithCount>> {
        let mut conn = self.acquire().await?;
        let total = count(&mut conn, "suppliers").await?;
        // Both pieces come from whitelists, never from the request text.
        let dir = direction.as_sql();
        let sql = format!(
            "{SUPPLIER_WITH_COUNT} ORDER BY s.{} {dir} NULLS LAST, s.id {dir} LIMIT $1 OFFSET $2",
            sort.column()
        );
        let rows = sqlx::query_as::<_, Db<SupplierWithCount>>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_suppliers", e))?;
        Ok(Page::new(rows.into_iter().map(Db::into_inner).collect(), total, page))
    }

    #[instrument(skip(self, input), fields(sku = %input.sku), err)]
    async fn create_product(
        &self,
        input: NewProduct,
        created_by: Option<UserId>,
    ) -> StoreResult<Product> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE sku = $1)")
            .bind(&input.sku)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_product", e))?;
        if taken {
            return Err(StoreError::conflict("product sku already exists"));
        }
        if let Some(category_id) = input.category_id {
            ensure_exists(&mut tx, "product_categories", category_id.get(), "category")
                .await
                .map_err(missing_as_invalid("category does not exist"))?;
        }
        if let Some(supplier_id) = input.supplier_id {
            ensure_exists(&mut tx, "suppliers", supplier_id.get(), "supplier")
                .await
                .map_err(missing_as_invalid("supplier does not exist"))?;
        }

        // The domain derives stock status; build the row first, then persist it.
        let now = Utc::now();
        let product = input.into_product(ProductId::from(0), created_by, now);
        let row = sqlx::query_as::<_, Db<Product>>(
            r#"
            INSERT INTO products (
                name, sku, description, category_id, supplier_id, brand, cost, price, currency,
                quantity, low_stock_threshold, track_quantity, stock_status, status, created_by,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING *
            "#,
        )
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(product.category_id.map(|id| id.get()))
        .bind(product.supplier_id.map(|id| id.get()))
        .bind(&product.brand)
        .bind(product.cost)
        .bind(product.price)
        .bind(&product.currency)
        .bind(product.quantity)
        .bind(product.low_stock_threshold)
        .bind(product.track_quantity)
        .bind(product.stock_status.as_str())
        .bind(product.status.as_str())
        .bind(created_by.map(|id| id.get()))
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;

        commit(tx).await?;
        Ok(row.into_inner())
    }

    #[instrument(skip(self), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        sqlx::query_as::<_, Db<Product>>("SELECT * FROM products WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .map(Db::into_inner)
            .ok_or_else(|| StoreError::not_found("product"))
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, page: PageRequest) -> StoreResult<Page<Product>> {
        let mut conn = self.acquire().await?;
        let total = count(&mut conn, "products").await?;
        let rows = sqlx::query_as::<_, Db<Product>>(
            "SELECT * FROM products ORDER BY id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        Ok(Page::new(rows.into_iter().map(Db::into_inner).collect(), total, page))
    }

    #[instrument(skip(self, input), fields(kind = input.kind.as_str()), err)]
    async fn record_inventory(
        &self,
        product_id: ProductId,
        input: NewInventoryTransaction,
        performed_by: UserId,
    ) -> StoreResult<(Product, InventoryTransaction)> {
        let input = input.normalized()?;
        let mut tx = self.begin().await?;
        ensure_exists(&mut tx, "users", performed_by.get(), "user").await?;
        let mut product =
            sqlx::query_as::<_, Db<Product>>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("record_inventory", e))?
                .map(Db::into_inner)
                .ok_or_else(|| StoreError::not_found("product"))?;

        let draft = input.apply(InventoryTransactionId::from(0), &mut product, performed_by, Utc::now());
        sqlx::query(
            "UPDATE products SET quantity = $2, stock_status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(product_id.get())
        .bind(product.quantity)
        .bind(product.stock_status.as_str())
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_inventory", e))?;

        let transaction = sqlx::query_as::<_, Db<InventoryTransaction>>(
            r#"
            INSERT INTO inventory_transactions (
                product_id, type, quantity, unit_cost, total_cost, reference_type, reference_id,
                notes, performed_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(product_id.get())
        .bind(draft.kind.as_str())
        .bind(draft.quantity)
        .bind(draft.unit_cost)
        .bind(draft.total_cost)
        .bind(&draft.reference_type)
        .bind(draft.reference_id)
        .bind(&draft.notes)
        .bind(performed_by.get())
        .bind(draft.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_inventory", e))?
        .into_inner();

        commit(tx).await?;
        tracing::debug!(
            product_id = %product_id,
            quantity = product.quantity,
            stock_status = product.stock_status.as_str(),
            "inventory recorded"
        );
        Ok((product, transaction))
    }

    #[instrument(skip(self), err)]
    async fn inventory_transactions(
        &self,
        product_id: ProductId,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let mut conn = self.acquire().await?;
        ensure_exists(&mut conn, "products", product_id.get(), "product").await?;
        let rows = sqlx::query_as::<_, Db<InventoryTransaction>>(
            "SELECT * FROM inventory_transactions WHERE product_id = $1 ORDER BY id DESC",
        )
        .bind(product_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("inventory_transactions", e))?;
        Ok(rows.into_iter().map(Db::into_inner).collect())
    }
}
