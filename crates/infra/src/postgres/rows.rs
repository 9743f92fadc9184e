//! Row decoding.
//!
//! Domain types live in crates that know nothing about sqlx, so each one is
//! decoded through the local [`Db`] wrapper. Enum columns go through the
//! domain `parse` functions; an unknown value is a decode error.

use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use ainventory_auth::{
    DepartmentPermission, Gender, Permission, Role, RoleHistoryAction, RoleHistoryEntry, User,
    UserPermission, UserStatus,
};
use ainventory_core::{DepartmentId, DomainError, OrganizationId, PermissionId, RoleId, UserId};
use ainventory_org::{Department, HierarchyEdge, Organization};
use ainventory_products::{
    CategoryId, CategoryWithCount, InventoryTransaction, InventoryTransactionId,
    InventoryTransactionKind, Product, ProductCategory, ProductId, ProductStatus, StockStatus,
    Supplier, SupplierId, SupplierStatus, SupplierWithCount,
};
use ainventory_sales::{
    Customer, CustomerId, CustomerStatus, CustomerType, Order, OrderHistory, OrderHistoryAction,
    OrderId, OrderItem, OrderItemId, OrderPayment, OrderPriority, OrderStatus, PaymentId,
    PaymentMethod, PaymentRecordStatus, PaymentStatus, ShippingDetails,
};

/// Decoding wrapper; `Db<T>` is what `query_as` produces.
pub(super) struct Db<T>(pub T);

impl<T> Db<T> {
    pub(super) fn into_inner(self) -> T {
        self.0
    }
}

fn decode(err: DomainError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn parsed<T>(
    row: &PgRow,
    column: &str,
    parse: impl Fn(&str) -> Result<T, DomainError>,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse(&raw).map_err(decode)
}

fn id<I: From<i64>>(row: &PgRow, column: &str) -> Result<I, sqlx::Error> {
    Ok(I::from(row.try_get::<i64, _>(column)?))
}

fn opt_id<I: From<i64>>(row: &PgRow, column: &str) -> Result<Option<I>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(I::from))
}

impl<'r> FromRow<'r, PgRow> for Db<User> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(User {
            id: id::<UserId>(row, "id")?,
            employee_id: row.try_get("employee_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            gender: parsed(row, "gender", Gender::parse)?,
            is_superuser: row.try_get("is_superuser")?,
            status: parsed(row, "status", UserStatus::parse)?,
            email_verified: row.try_get("email_verified")?,
            verified_at: row.try_get("verified_at")?,
            role_id: opt_id::<RoleId>(row, "role_id")?,
            department_id: opt_id::<DepartmentId>(row, "department_id")?,
            account_locked: row.try_get("account_locked")?,
            failed_login_attempts: row.try_get("failed_login_attempts")?,
            token_version: row.try_get("token_version")?,
            joined_at: row.try_get("joined_at")?,
            last_login_at: row.try_get("last_login_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Organization> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Organization {
            id: id::<OrganizationId>(row, "id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            owner_id: id::<UserId>(row, "owner_id")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Permission> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Permission {
            id: id::<PermissionId>(row, "id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
            module: row.try_get("module")?,
            action: row.try_get("action")?,
            resource: row.try_get("resource")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Role> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let level: i16 = row.try_get("level")?;
        Ok(Db(Role {
            id: id::<RoleId>(row, "id")?,
            name: row.try_get("name")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
            level: u8::try_from(level).map_err(|_| {
                decode(DomainError::validation(format!("invalid role level {level}")))
            })?,
            color: row.try_get("color")?,
            is_default: row.try_get("is_default")?,
            is_system: row.try_get("is_system")?,
            is_active: row.try_get("is_active")?,
            user_count: row.try_get("user_count")?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<RoleHistoryEntry> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let action = parsed(row, "action", |raw| {
            RoleHistoryAction::parse(raw).ok_or_else(|| {
                DomainError::validation(format!("unknown role history action '{raw}'"))
            })
        })?;
        Ok(Db(RoleHistoryEntry {
            role_id: id::<RoleId>(row, "role_id")?,
            action,
            field_name: row.try_get("field_name")?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            changed_by: opt_id::<UserId>(row, "changed_by")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<UserPermission> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(UserPermission {
            user_id: id::<UserId>(row, "user_id")?,
            permission_id: id::<PermissionId>(row, "permission_id")?,
            is_granted: row.try_get("is_granted")?,
            expires_at: row.try_get("expires_at")?,
            reason: row.try_get("reason")?,
            granted_by: opt_id::<UserId>(row, "granted_by")?,
            granted_at: row.try_get("granted_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<DepartmentPermission> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(DepartmentPermission {
            department_id: id::<DepartmentId>(row, "department_id")?,
            permission_id: id::<PermissionId>(row, "permission_id")?,
            is_granted: row.try_get("is_granted")?,
            reason: row.try_get("reason")?,
            granted_by: opt_id::<UserId>(row, "granted_by")?,
            granted_at: row.try_get("granted_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Department> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Department {
            id: id::<DepartmentId>(row, "id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            parent_id: opt_id::<DepartmentId>(row, "parent_id")?,
            manager_id: opt_id::<UserId>(row, "manager_id")?,
            location: row.try_get("location")?,
            is_active: row.try_get("is_active")?,
            employee_count: row.try_get("employee_count")?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<HierarchyEdge> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(HierarchyEdge {
            ancestor_id: id::<DepartmentId>(row, "ancestor_id")?,
            descendant_id: id::<DepartmentId>(row, "descendant_id")?,
            depth: row.try_get("depth")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<ProductCategory> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(ProductCategory {
            id: id::<CategoryId>(row, "id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            parent_id: opt_id::<CategoryId>(row, "parent_id")?,
            sort_order: row.try_get("sort_order")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

/// Expects a `product_count` column next to the category columns.
impl<'r> FromRow<'r, PgRow> for Db<CategoryWithCount> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Db(category) = Db::<ProductCategory>::from_row(row)?;
        Ok(Db(CategoryWithCount {
            category,
            product_count: row.try_get("product_count")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Supplier> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Supplier {
            id: id::<SupplierId>(row, "id")?,
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            contact_person: row.try_get("contact_person")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            website: row.try_get("website")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            tax_id: row.try_get("tax_id")?,
            payment_terms: row.try_get("payment_terms")?,
            currency: row.try_get("currency")?,
            minimum_order_value: row.try_get("minimum_order_value")?,
            status: parsed(row, "status", SupplierStatus::parse)?,
            rating: row.try_get("rating")?,
            notes: row.try_get("notes")?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<SupplierWithCount> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Db(supplier) = Db::<Supplier>::from_row(row)?;
        Ok(Db(SupplierWithCount {
            supplier,
            product_count: row.try_get("product_count")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Product> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Product {
            id: id::<ProductId>(row, "id")?,
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            description: row.try_get("description")?,
            category_id: opt_id::<CategoryId>(row, "category_id")?,
            supplier_id: opt_id::<SupplierId>(row, "supplier_id")?,
            brand: row.try_get("brand")?,
            cost: row.try_get("cost")?,
            price: row.try_get("price")?,
            currency: row.try_get("currency")?,
            quantity: row.try_get("quantity")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            track_quantity: row.try_get("track_quantity")?,
            stock_status: parsed(row, "stock_status", StockStatus::parse)?,
            status: parsed(row, "status", ProductStatus::parse)?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<InventoryTransaction> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(InventoryTransaction {
            id: id::<InventoryTransactionId>(row, "id")?,
            product_id: id::<ProductId>(row, "product_id")?,
            kind: parsed(row, "type", InventoryTransactionKind::parse)?,
            quantity: row.try_get("quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            total_cost: row.try_get("total_cost")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            notes: row.try_get("notes")?,
            performed_by: id::<UserId>(row, "performed_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Customer> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Customer {
            id: id::<CustomerId>(row, "id")?,
            customer_code: row.try_get("customer_code")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            company: row.try_get("company")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            customer_type: parsed(row, "customer_type", CustomerType::parse)?,
            status: parsed(row, "status", CustomerStatus::parse)?,
            notes: row.try_get("notes")?,
            total_orders: row.try_get("total_orders")?,
            total_spent: row.try_get("total_spent")?,
            average_order_value: row.try_get("average_order_value")?,
            last_order_date: row.try_get("last_order_date")?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<Order> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(Order {
            id: id::<OrderId>(row, "id")?,
            order_number: row.try_get("order_number")?,
            customer_id: id::<CustomerId>(row, "customer_id")?,
            status: parsed(row, "status", OrderStatus::parse)?,
            priority: parsed(row, "priority", OrderPriority::parse)?,
            order_date: row.try_get("order_date")?,
            required_date: row.try_get("required_date")?,
            shipped_date: row.try_get("shipped_date")?,
            delivered_date: row.try_get("delivered_date")?,
            shipping: ShippingDetails {
                name: row.try_get("shipping_name")?,
                email: row.try_get("shipping_email")?,
                phone: row.try_get("shipping_phone")?,
                company: row.try_get("shipping_company")?,
                address: row.try_get("shipping_address")?,
                city: row.try_get("shipping_city")?,
                state: row.try_get("shipping_state")?,
                zip: row.try_get("shipping_zip")?,
                country: row.try_get("shipping_country")?,
            },
            payment_status: parsed(row, "payment_status", PaymentStatus::parse)?,
            payment_method: parsed(row, "payment_method", PaymentMethod::parse)?,
            subtotal: row.try_get("subtotal")?,
            tax_rate: row.try_get("tax_rate")?,
            tax_amount: row.try_get("tax_amount")?,
            shipping_cost: row.try_get("shipping_cost")?,
            discount_amount: row.try_get("discount_amount")?,
            total_amount: row.try_get("total_amount")?,
            currency: row.try_get("currency")?,
            notes: row.try_get("notes")?,
            created_by: opt_id::<UserId>(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<OrderItem> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(OrderItem {
            id: id::<OrderItemId>(row, "id")?,
            order_id: id::<OrderId>(row, "order_id")?,
            product_id: id::<ProductId>(row, "product_id")?,
            product_name: row.try_get("product_name")?,
            product_sku: row.try_get("product_sku")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            unit_cost: row.try_get("unit_cost")?,
            line_total: row.try_get("line_total")?,
            discount_amount: row.try_get("discount_amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<OrderPayment> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(OrderPayment {
            id: id::<PaymentId>(row, "id")?,
            order_id: id::<OrderId>(row, "order_id")?,
            payment_method: parsed(row, "payment_method", PaymentMethod::parse)?,
            provider: row.try_get("provider")?,
            transaction_id: row.try_get("transaction_id")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            status: parsed(row, "status", PaymentRecordStatus::parse)?,
            processed_at: row.try_get("processed_at")?,
            failure_reason: row.try_get("failure_reason")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl<'r> FromRow<'r, PgRow> for Db<OrderHistory> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Db(OrderHistory {
            order_id: id::<OrderId>(row, "order_id")?,
            action: parsed(row, "action", OrderHistoryAction::parse)?,
            old_value: row.try_get("old_value")?,
            new_value: row.try_get("new_value")?,
            description: row.try_get("description")?,
            performed_by: id::<UserId>(row, "performed_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}
