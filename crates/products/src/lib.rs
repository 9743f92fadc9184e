//! `ainventory-products`: catalogue side of the back office.
//!
//! Categories form a tree, suppliers own products, and a product's stock
//! status is always derived from its quantity. Inventory transactions are the
//! only way quantities move after creation.

pub mod category;
pub mod inventory;
pub mod product;
pub mod supplier;

pub use category::{
    CategoryId, CategoryInput, CategoryWithCount, ProductCategory, ensure_parent_is_not_self,
    parent_would_cycle,
};
pub use inventory::{
    InventoryTransaction, InventoryTransactionId, InventoryTransactionKind,
    NewInventoryTransaction,
};
pub use product::{
    DEFAULT_LOW_STOCK_THRESHOLD, NewProduct, Product, ProductId, ProductStatus, StockStatus,
    stock_status_for,
};
pub use supplier::{
    NewSupplier, Supplier, SupplierId, SupplierSort, SupplierStatus, SupplierWithCount,
    sort_suppliers,
};
