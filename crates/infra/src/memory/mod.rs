//! In-memory backend.
//!
//! All tables live behind one `tokio::sync::RwLock`. Every mutating
//! operation holds the write guard for its whole body and validates before
//! it writes, so an operation either applies completely or not at all.

mod access;
mod catalog;
mod departments;
mod identity;
mod sales;

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use uuid::Uuid;

use ainventory_auth::{
    BlacklistedToken, DepartmentPermission, Permission, Role, RoleHistoryEntry, RolePermission,
    User, UserPermission,
};
use ainventory_core::{DepartmentId, Entity, OrganizationId, PermissionId, RoleId, UserId};
use ainventory_org::{Department, HierarchyEdge, Organization};
use ainventory_products::{
    CategoryId, InventoryTransaction, Product, ProductCategory, ProductId, Supplier, SupplierId,
};
use ainventory_sales::{
    Customer, CustomerId, Order, OrderDetails, OrderHistory, OrderId, OrderItem, OrderItemId,
    OrderPayment, PaymentId,
};

use crate::store::{StoreError, StoreResult};

#[derive(Debug, Default)]
pub(crate) struct State {
    sequences: HashMap<&'static str, i64>,

    users: BTreeMap<UserId, User>,
    organizations: BTreeMap<OrganizationId, Organization>,
    blacklist: HashMap<Uuid, BlacklistedToken>,

    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    role_permissions: BTreeMap<(RoleId, PermissionId), RolePermission>,
    role_history: Vec<RoleHistoryEntry>,
    user_permissions: BTreeMap<(UserId, PermissionId), UserPermission>,
    department_permissions: BTreeMap<(DepartmentId, PermissionId), DepartmentPermission>,

    departments: BTreeMap<DepartmentId, Department>,
    hierarchy: Vec<HierarchyEdge>,

    categories: BTreeMap<CategoryId, ProductCategory>,
    suppliers: BTreeMap<SupplierId, Supplier>,
    products: BTreeMap<ProductId, Product>,
    inventory: Vec<InventoryTransaction>,

    customers: BTreeMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    payments: BTreeMap<PaymentId, OrderPayment>,
    order_history: Vec<OrderHistory>,
}

impl State {
    /// Next value of a per-table sequence, starting at 1.
    fn next_id<I: From<i64>>(&mut self, table: &'static str) -> I {
        let value = self.sequences.entry(table).or_insert(0);
        *value += 1;
        I::from(*value)
    }

    /// The id `next_id` would hand out, without consuming it.
    fn peek_id<I: From<i64>>(&self, table: &'static str) -> I {
        I::from(self.sequences.get(table).copied().unwrap_or(0) + 1)
    }

    fn user(&self, id: UserId) -> StoreResult<&User> {
        self.users.get(&id).ok_or_else(|| StoreError::not_found("user"))
    }

    fn user_mut(&mut self, id: UserId) -> StoreResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user"))
    }

    fn role(&self, id: RoleId) -> StoreResult<&Role> {
        self.roles.get(&id).ok_or_else(|| StoreError::not_found("role"))
    }

    fn permission_by_name(&self, name: &str) -> StoreResult<&Permission> {
        let name = name.trim().to_lowercase();
        self.permissions
            .values()
            .find(|p| p.name == name)
            .ok_or_else(|| StoreError::not_found("permission"))
    }

    fn department(&self, id: DepartmentId) -> StoreResult<&Department> {
        self.departments
            .get(&id)
            .ok_or_else(|| StoreError::not_found("department"))
    }

    fn order(&self, id: OrderId) -> StoreResult<&Order> {
        self.orders.get(&id).ok_or_else(|| StoreError::not_found("order"))
    }

    fn order_items_of(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    fn payments_of(&self, order_id: OrderId) -> Vec<OrderPayment> {
        self.payments
            .values()
            .filter(|payment| payment.order_id == order_id)
            .cloned()
            .collect()
    }

    fn order_details(&self, id: OrderId) -> StoreResult<OrderDetails> {
        Ok(OrderDetails {
            order: self.order(id)?.clone(),
            items: self.order_items_of(id),
            payments: self.payments_of(id),
        })
    }

    fn count_users_with_role(&self, role_id: RoleId) -> i64 {
        self.users
            .values()
            .filter(|u| u.role_id == Some(role_id))
            .count() as i64
    }
}

/// Insert or replace a row under its own id.
fn upsert<E: Entity + Clone>(table: &mut BTreeMap<E::Id, E>, row: &E) {
    table.insert(row.id(), row.clone());
}

/// In-memory store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
