//! Storage boundary.
//!
//! Each trait covers one area of the back office. Every method is one
//! transaction: derived values (closure rows, order totals, customer metrics,
//! stock status, role user counts) are recomputed by the domain crates inside
//! the same unit of work as the write that invalidated them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use ainventory_auth::{
    BlacklistedToken, DepartmentGrantRequest, DepartmentPermission, NewPermission, NewRole,
    NewUser, OverrideRequest, Permission, PermissionFacts, Role, RoleHistoryEntry, RoleUpdate,
    User, UserPermission, UserStatus,
};
use ainventory_core::{
    DepartmentId, DomainError, Page, PageRequest, RoleId, SortDirection, UserId,
};
use ainventory_org::{Department, HierarchyEdge, NewDepartment, Organization, ValidOnboarding};
use ainventory_products::{
    CategoryId, CategoryInput, CategoryWithCount, InventoryTransaction, NewInventoryTransaction,
    NewProduct, NewSupplier, Product, ProductCategory, ProductId, Supplier, SupplierId,
    SupplierSort, SupplierWithCount,
};
use ainventory_sales::{
    Customer, CustomerId, NewCustomer, NewOrder, NewOrderItem, NewPayment, Order, OrderDetails,
    OrderHistory, OrderId, OrderItemId, OrderItemUpdate, OrderStatus,
};

/// Bound on parent-chain walks (category re-parenting).
pub const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(what: &str) -> Self {
        Self::Domain(DomainError::not_found(what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::conflict(message))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(message))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Domain(DomainError::NotFound(_)))
    }
}

/// Blank names in an onboarding request keep the current value.
pub(crate) fn apply_onboarding_names(
    user: &mut User,
    onboarding: &ValidOnboarding,
) -> StoreResult<()> {
    let first = if onboarding.first_name.is_empty() {
        user.first_name.clone()
    } else {
        onboarding.first_name.clone()
    };
    let last = if onboarding.last_name.is_empty() {
        user.last_name.clone()
    } else {
        onboarding.last_name.clone()
    };
    user.rename(&first, &last)?;
    Ok(())
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with a conflict when the (lowercased) email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, id: UserId) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Count a failed sign-in, locking the account at `max_attempts`.
    async fn record_failed_login(&self, id: UserId, max_attempts: i32) -> StoreResult<User>;

    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> StoreResult<User>;

    /// Clear a sign-in lockout and the failed-attempt count.
    async fn unlock_user(&self, id: UserId) -> StoreResult<User>;

    /// Change the account status; the department head count follows it.
    async fn set_user_status(&self, id: UserId, status: UserStatus) -> StoreResult<User>;

    /// Invalidate every token issued so far; returns the new version.
    async fn bump_token_version(&self, id: UserId) -> StoreResult<i32>;

    /// Also drops entries whose token has expired by `token.created_at`.
    async fn blacklist_token(&self, token: BlacklistedToken) -> StoreResult<()>;

    /// Expired entries no longer count.
    async fn is_token_blacklisted(&self, jti: Uuid) -> StoreResult<bool>;

    /// Rename the user and create the organization they own, atomically.
    async fn onboard(&self, user_id: UserId, onboarding: ValidOnboarding)
    -> StoreResult<Organization>;

    async fn organizations_owned_by(&self, user_id: UserId) -> StoreResult<Vec<Organization>>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn create_permission(&self, input: NewPermission) -> StoreResult<Permission>;

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;

    /// Setting `is_default` clears the flag on every other role.
    async fn create_role(
        &self,
        input: NewRole,
        is_system: bool,
        created_by: Option<UserId>,
    ) -> StoreResult<Role>;

    async fn update_role(
        &self,
        id: RoleId,
        update: RoleUpdate,
        changed_by: Option<UserId>,
    ) -> StoreResult<Role>;

    async fn delete_role(&self, id: RoleId, deleted_by: Option<UserId>) -> StoreResult<()>;

    async fn get_role(&self, id: RoleId) -> StoreResult<Role>;

    async fn list_roles(&self) -> StoreResult<Vec<Role>>;

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;

    async fn default_role(&self) -> StoreResult<Option<Role>>;

    /// Link a permission (by name) to a role. Linking twice is a no-op.
    async fn grant_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        granted_by: Option<UserId>,
    ) -> StoreResult<()>;

    /// Unlink a permission (by name). Unlinking a missing link is a no-op.
    async fn revoke_role_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        revoked_by: Option<UserId>,
    ) -> StoreResult<()>;

    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>>;

    /// Oldest first.
    async fn role_history(&self, role_id: RoleId) -> StoreResult<Vec<RoleHistoryEntry>>;

    /// Set (or clear) the user's role and recount both roles' users.
    async fn assign_role(&self, user_id: UserId, role_id: Option<RoleId>) -> StoreResult<User>;

    async fn upsert_user_override(
        &self,
        user_id: UserId,
        request: OverrideRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<UserPermission>;

    async fn user_overrides(&self, user_id: UserId) -> StoreResult<Vec<UserPermission>>;

    async fn upsert_department_grant(
        &self,
        department_id: DepartmentId,
        request: DepartmentGrantRequest,
        granted_by: Option<UserId>,
    ) -> StoreResult<DepartmentPermission>;

    async fn department_grants(
        &self,
        department_id: DepartmentId,
    ) -> StoreResult<Vec<DepartmentPermission>>;

    /// Everything the evaluator needs for one (user, permission) check.
    async fn permission_facts(&self, user_id: UserId, permission: &str)
    -> StoreResult<PermissionFacts>;
}

#[async_trait]
pub trait DepartmentStore: Send + Sync {
    /// Insert the department and its closure rows.
    async fn create_department(
        &self,
        input: NewDepartment,
        created_by: Option<UserId>,
    ) -> StoreResult<Department>;

    async fn get_department(&self, id: DepartmentId) -> StoreResult<Department>;

    async fn list_departments(&self) -> StoreResult<Vec<Department>>;

    async fn child_departments(&self, id: DepartmentId) -> StoreResult<Vec<Department>>;

    /// Farthest first.
    async fn ancestors(&self, id: DepartmentId) -> StoreResult<Vec<Department>>;

    /// Closest first.
    async fn descendants(&self, id: DepartmentId) -> StoreResult<Vec<Department>>;

    async fn is_ancestor_of(
        &self,
        ancestor: DepartmentId,
        descendant: DepartmentId,
    ) -> StoreResult<bool>;

    /// Closure rows whose descendant is `id`, including the self edge.
    async fn closure_rows_for(&self, id: DepartmentId) -> StoreResult<Vec<HierarchyEdge>>;

    /// Rejected while active users or child departments reference it.
    async fn delete_department(&self, id: DepartmentId) -> StoreResult<()>;

    async fn assign_user_department(
        &self,
        user_id: UserId,
        department_id: Option<DepartmentId>,
    ) -> StoreResult<User>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_category(&self, input: CategoryInput) -> StoreResult<ProductCategory>;

    async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
    ) -> StoreResult<ProductCategory>;

    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryWithCount>;

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()>;

    /// Ordered by `sort_order`, then name.
    async fn list_categories(&self, page: PageRequest) -> StoreResult<Page<CategoryWithCount>>;

    async fn create_supplier(
        &self,
        input: NewSupplier,
        created_by: Option<UserId>,
    ) -> StoreResult<Supplier>;

    async fn get_supplier(&self, id: SupplierId) -> StoreResult<SupplierWithCount>;

    async fn list_suppliers(
        &self,
        page: PageRequest,
        sort: SupplierSort,
        direction: SortDirection,
    ) -> StoreResult<Page<SupplierWithCount>>;

    async fn create_product(
        &self,
        input: NewProduct,
        created_by: Option<UserId>,
    ) -> StoreResult<Product>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Product>;

    async fn list_products(&self, page: PageRequest) -> StoreResult<Page<Product>>;

    /// Persist the movement and the product's new quantity and stock status together.
    async fn record_inventory(
        &self,
        product_id: ProductId,
        input: NewInventoryTransaction,
        performed_by: UserId,
    ) -> StoreResult<(Product, InventoryTransaction)>;

    /// Newest first.
    async fn inventory_transactions(
        &self,
        product_id: ProductId,
    ) -> StoreResult<Vec<InventoryTransaction>>;
}

#[async_trait]
pub trait SalesStore: Send + Sync {
    async fn create_customer(
        &self,
        input: NewCustomer,
        created_by: Option<UserId>,
    ) -> StoreResult<Customer>;

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer>;

    async fn list_customers(&self, page: PageRequest) -> StoreResult<Page<Customer>>;

    async fn create_order(&self, input: NewOrder, created_by: UserId) -> StoreResult<OrderDetails>;

    async fn get_order(&self, id: OrderId) -> StoreResult<OrderDetails>;

    /// Newest first, optionally for one customer.
    async fn list_orders(
        &self,
        page: PageRequest,
        customer_id: Option<CustomerId>,
    ) -> StoreResult<Page<Order>>;

    async fn change_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: String,
        performed_by: UserId,
    ) -> StoreResult<Order>;

    async fn add_order_item(
        &self,
        order_id: OrderId,
        input: NewOrderItem,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails>;

    async fn update_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        update: OrderItemUpdate,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails>;

    async fn remove_order_item(
        &self,
        order_id: OrderId,
        item_id: OrderItemId,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails>;

    async fn add_payment(
        &self,
        order_id: OrderId,
        input: NewPayment,
        performed_by: UserId,
    ) -> StoreResult<OrderDetails>;

    /// Oldest first.
    async fn order_history(&self, order_id: OrderId) -> StoreResult<Vec<OrderHistory>>;
}

/// The whole back office behind one object.
pub trait Backoffice:
    IdentityStore + AccessStore + DepartmentStore + CatalogStore + SalesStore
{
}

impl<T> Backoffice for T where
    T: IdentityStore + AccessStore + DepartmentStore + CatalogStore + SalesStore
{
}
