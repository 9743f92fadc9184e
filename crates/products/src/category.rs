use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity};

ainventory_core::define_id!(
    /// Identifier of a product category.
    CategoryId,
    "CategoryId"
);

/// A node of the category tree.
///
/// # Invariants
/// - `code` is unique, uppercase `[A-Z0-9_]`.
/// - `parent_id` never points at the category itself or at one of its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: CategoryId,
    pub name: String,
    pub code: String,
    pub description: String,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductCategory {
    pub fn ensure_deletable(&self, products: i64, children: i64) -> DomainResult<()> {
        if products > 0 {
            return Err(DomainError::invariant(
                "cannot delete category with associated products",
            ));
        }
        if children > 0 {
            return Err(DomainError::invariant(
                "cannot delete category with child categories",
            ));
        }
        Ok(())
    }

    /// Overwrite the editable fields from an already normalized input.
    pub fn apply(&mut self, input: CategoryInput, now: DateTime<Utc>) {
        self.name = input.name;
        self.code = input.code;
        self.description = input.description;
        self.parent_id = input.parent_id;
        self.sort_order = input.sort_order;
        self.is_active = input.is_active.unwrap_or(true);
        self.updated_at = now;
    }
}

impl Entity for ProductCategory {
    type Id = CategoryId;

    fn id(&self) -> CategoryId {
        self.id
    }
}

/// Listing row: a category plus the number of products filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: ProductCategory,
    pub product_count: i64,
}

/// Create/update body for a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CategoryInput {
    pub name: String,
    pub code: String,
    pub description: String,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub is_active: Option<bool>,
}

impl CategoryInput {
    /// Trim and uppercase first, then validate what is left.
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_string();
        self.code = self.code.trim().to_uppercase();
        self.description = self.description.trim().to_string();
        self.is_active = Some(self.is_active.unwrap_or(true));

        if !(2..=100).contains(&self.name.chars().count()) {
            return Err(DomainError::validation(
                "name must be between 2 and 100 characters",
            ));
        }
        if !(2..=20).contains(&self.code.len()) {
            return Err(DomainError::validation(
                "code must be between 2 and 20 characters",
            ));
        }
        if !self
            .code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::validation(
                "code must contain only uppercase letters, numbers, and underscores",
            ));
        }
        if self.description.chars().count() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
        if !(0..=9999).contains(&self.sort_order) {
            return Err(DomainError::validation(
                "sort_order must be between 0 and 9999",
            ));
        }
        Ok(self)
    }

    pub fn into_category(self, id: CategoryId, now: DateTime<Utc>) -> ProductCategory {
        ProductCategory {
            id,
            name: self.name,
            code: self.code,
            description: self.description,
            parent_id: self.parent_id,
            sort_order: self.sort_order,
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Checked once the row's id is known, since a create can only point at
/// itself after the id has been assigned.
pub fn ensure_parent_is_not_self(id: CategoryId, parent_id: Option<CategoryId>) -> DomainResult<()> {
    if parent_id == Some(id) {
        return Err(DomainError::validation("category cannot be its own parent"));
    }
    Ok(())
}

/// True when re-parenting `id` under `new_parent` would close a loop, i.e.
/// `id` is `new_parent` or one of its ancestors.
///
/// `parent_of` answers the current parent of any category. The walk stops
/// after `limit` steps so a corrupted tree cannot hang the caller; hitting
/// the limit counts as a cycle.
pub fn parent_would_cycle(
    id: CategoryId,
    new_parent: CategoryId,
    limit: usize,
    parent_of: impl Fn(CategoryId) -> Option<CategoryId>,
) -> bool {
    let mut current = Some(new_parent);
    for _ in 0..limit {
        match current {
            None => return false,
            Some(node) if node == id => return true,
            Some(node) => current = parent_of(node),
        }
    }
    current.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn input() -> CategoryInput {
        CategoryInput {
            name: "  Electronics ".into(),
            code: " elec ".into(),
            description: "Electronic devices and accessories".into(),
            ..CategoryInput::default()
        }
    }

    fn id(n: i64) -> CategoryId {
        CategoryId::new(n)
    }

    #[test]
    fn normalization_runs_before_validation() {
        let valid = input().normalized().unwrap();
        assert_eq!(valid.name, "Electronics");
        assert_eq!(valid.code, "ELEC");
        assert_eq!(valid.is_active, Some(true));
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let short = CategoryInput { name: "E".into(), ..input() };
        assert!(matches!(short.normalized(), Err(DomainError::Validation(_))));

        let bad_code = CategoryInput { code: "EL-EC".into(), ..input() };
        assert!(bad_code.normalized().is_err());

        let bad_order = CategoryInput { sort_order: 10_000, ..input() };
        assert!(bad_order.normalized().is_err());
    }

    #[test]
    fn self_parent_is_rejected_with_pinned_message() {
        let err = ensure_parent_is_not_self(id(4), Some(id(4))).unwrap_err();
        assert_eq!(err.to_string(), "category cannot be its own parent");
        assert!(ensure_parent_is_not_self(id(4), Some(id(3))).is_ok());
        assert!(ensure_parent_is_not_self(id(4), None).is_ok());
    }

    #[test]
    fn reparenting_under_a_descendant_is_a_cycle() {
        // 1 <- 2 <- 3
        let parents: HashMap<CategoryId, CategoryId> = [(id(2), id(1)), (id(3), id(2))].into();
        let parent_of = |c: CategoryId| parents.get(&c).copied();

        assert!(parent_would_cycle(id(1), id(3), 64, parent_of));
        assert!(parent_would_cycle(id(2), id(2), 64, parent_of));
        assert!(!parent_would_cycle(id(3), id(1), 64, parent_of));
    }

    #[test]
    fn delete_guard_names_the_blocker() {
        let category = input().normalized().unwrap().into_category(id(1), Utc::now());
        assert_eq!(
            category.ensure_deletable(2, 0).unwrap_err().to_string(),
            "cannot delete category with associated products"
        );
        assert_eq!(
            category.ensure_deletable(0, 1).unwrap_err().to_string(),
            "cannot delete category with child categories"
        );
        assert!(category.ensure_deletable(0, 0).is_ok());
    }

    #[test]
    fn listing_row_flattens_the_category() {
        let row = CategoryWithCount {
            category: input().normalized().unwrap().into_category(id(9), Utc::now()),
            product_count: 3,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["code"], "ELEC");
        assert_eq!(json["product_count"], 3);
    }
}
