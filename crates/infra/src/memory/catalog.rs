use async_trait::async_trait;
use chrono::Utc;

use ainventory_core::{Page, PageRequest, SortDirection, UserId};
use ainventory_products::{
    CategoryId, CategoryInput, CategoryWithCount, InventoryTransaction, NewInventoryTransaction,
    NewProduct, NewSupplier, Product, ProductCategory, ProductId, Supplier, SupplierId,
    SupplierSort, SupplierWithCount, ensure_parent_is_not_self, parent_would_cycle,
    sort_suppliers,
};

use super::{InMemoryStore, State, upsert};
use crate::store::{CatalogStore, MAX_TREE_DEPTH, StoreError, StoreResult};

impl State {
    fn category(&self, id: CategoryId) -> StoreResult<&ProductCategory> {
        self.categories
            .get(&id)
            .ok_or_else(|| StoreError::not_found("category"))
    }

    fn product_mut(&mut self, id: ProductId) -> StoreResult<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product"))
    }

    fn products_in_category(&self, id: CategoryId) -> i64 {
        self.products
            .values()
            .filter(|p| p.category_id == Some(id))
            .count() as i64
    }

    fn products_from_supplier(&self, id: SupplierId) -> i64 {
        self.products
            .values()
            .filter(|p| p.supplier_id == Some(id))
            .count() as i64
    }

    fn with_count(&self, category: &ProductCategory) -> CategoryWithCount {
        CategoryWithCount {
            category: category.clone(),
            product_count: self.products_in_category(category.id),
        }
    }

    /// Code uniqueness and parent existence, shared by create and update.
    fn check_category(&self, input: &CategoryInput, this: Option<CategoryId>) -> StoreResult<()> {
        if self
            .categories
            .values()
            .any(|c| c.code == input.code && Some(c.id) != this)
        {
            return Err(StoreError::conflict("category code already exists"));
        }
        if let Some(parent_id) = input.parent_id {
            if !self.categories.contains_key(&parent_id) {
                return Err(StoreError::validation("parent category does not exist"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_category(&self, input: CategoryInput) -> StoreResult<ProductCategory> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        ensure_parent_is_not_self(state.peek_id("categories"), input.parent_id)?;
        state.check_category(&input, None)?;
        let id = state.next_id("categories");

        let category = input.into_category(id, Utc::now());
        upsert(&mut state.categories, &category);
        Ok(category)
    }

    async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
    ) -> StoreResult<ProductCategory> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        state.category(id)?;
        ensure_parent_is_not_self(id, input.parent_id)?;
        state.check_category(&input, Some(id))?;
        if let Some(parent_id) = input.parent_id {
            let parent_of =
                |node: CategoryId| state.categories.get(&node).and_then(|c| c.parent_id);
            if parent_would_cycle(id, parent_id, MAX_TREE_DEPTH, parent_of) {
                return Err(StoreError::validation(
                    "category cannot be a descendant of itself",
                ));
            }
        }

        let category = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("category"))?;
        category.apply(input, Utc::now());
        Ok(category.clone())
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryWithCount> {
        let state = self.state.read().await;
        let category = state.category(id)?;
        Ok(state.with_count(category))
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let category = state.category(id)?;
        let children = state
            .categories
            .values()
            .filter(|c| c.parent_id == Some(id))
            .count() as i64;
        category.ensure_deletable(state.products_in_category(id), children)?;
        state.categories.remove(&id);
        Ok(())
    }

    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<CategoryWithCount>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state.categories.values().map(|c| state.with_count(c)).collect();
        rows.sort_by(|a, b| {
            a.category
                .sort_order
                .cmp(&b.category.sort_order)
                .then_with(|| a.category.name.cmp(&b.category.name))
        });
        Ok(Page::from_sorted(rows, page))
    }

    async fn create_supplier(
        &self,
        input: NewSupplier,
        created_by: Option<UserId>,
    ) -> StoreResult<Supplier> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if state.suppliers.values().any(|s| s.code == input.code) {
            return Err(StoreError::conflict("supplier code already exists"));
        }
        let id = state.next_id("suppliers");
        let supplier = input.into_supplier(id, created_by, Utc::now());
        upsert(&mut state.suppliers, &supplier);
        Ok(supplier)
    }

    async fn get_supplier(&self, id: SupplierId) -> StoreResult<SupplierWithCount> {
        let state = self.state.read().await;
        let supplier = state
            .suppliers
            .get(&id)
            .ok_or_else(|| StoreError::not_found("supplier"))?;
        Ok(SupplierWithCount {
            supplier: supplier.clone(),
            product_count: state.products_from_supplier(id),
        })
    }

    async fn list_suppliers(
        &self,
        page: PageRequest,
        sort: SupplierSort,
        direction: SortDirection,
    ) -> StoreResult<Page<SupplierWithCount>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .suppliers
            .values()
            .map(|s| SupplierWithCount {
                supplier: s.clone(),
                product_count: state.products_from_supplier(s.id),
            })
            .collect();
        sort_suppliers(&mut rows, sort, direction);
        Ok(Page::from_sorted(rows, page))
    }

    async fn create_product(
        &self,
        input: NewProduct,
        created_by: Option<UserId>,
    ) -> StoreResult<Product> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == input.sku) {
            return Err(StoreError::conflict("product sku already exists"));
        }
        if let Some(category_id) = input.category_id {
            if !state.categories.contains_key(&category_id) {
                return Err(StoreError::validation("category does not exist"));
            }
        }
        if let Some(supplier_id) = input.supplier_id {
            if !state.suppliers.contains_key(&supplier_id) {
                return Err(StoreError::validation("supplier does not exist"));
            }
        }

        let id = state.next_id("products");
        let product = input.into_product(id, created_by, Utc::now());
        upsert(&mut state.products, &product);
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let state = self.state.read().await;
        state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("product"))
    }

    async fn list_products(&self, page: PageRequest) -> StoreResult<Page<Product>> {
        let state = self.state.read().await;
        let rows: Vec<_> = state.products.values().rev().cloned().collect();
        Ok(Page::from_sorted(rows, page))
    }

    async fn record_inventory(
        &self,
        product_id: ProductId,
        input: NewInventoryTransaction,
        performed_by: UserId,
    ) -> StoreResult<(Product, InventoryTransaction)> {
        let input = input.normalized()?;
        let mut state = self.state.write().await;
        state.user(performed_by)?;
        let mut product = state.product_mut(product_id)?.clone();

        let id = state.next_id("inventory_transactions");
        let transaction = input.apply(id, &mut product, performed_by, Utc::now());
        tracing::debug!(
            product_id = %product_id,
            kind = transaction.kind.as_str(),
            quantity = product.quantity,
            "inventory recorded"
        );
        upsert(&mut state.products, &product);
        state.inventory.push(transaction.clone());
        Ok((product, transaction))
    }

    async fn inventory_transactions(
        &self,
        product_id: ProductId,
    ) -> StoreResult<Vec<InventoryTransaction>> {
        let state = self.state.read().await;
        if !state.products.contains_key(&product_id) {
            return Err(StoreError::not_found("product"));
        }
        Ok(state
            .inventory
            .iter()
            .rev()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect())
    }
}
