use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DepartmentId, DomainError, DomainResult, Entity, UserId};

/// A node of the department tree.
///
/// # Invariants
/// - `code` is unique, uppercase `[A-Z0-9_]`.
/// - A department with active users or child departments is never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub code: String,
    pub description: String,
    pub parent_id: Option<DepartmentId>,
    pub manager_id: Option<UserId>,
    pub location: String,
    pub is_active: bool,
    pub employee_count: i64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Department {
    /// Deletion guard, checked against live counts inside the deleting transaction.
    pub fn ensure_deletable(&self, active_users: i64, children: i64) -> DomainResult<()> {
        if active_users > 0 {
            return Err(DomainError::invariant(
                "cannot delete department with active users",
            ));
        }
        if children > 0 {
            return Err(DomainError::invariant(
                "cannot delete department with child departments",
            ));
        }
        Ok(())
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> DepartmentId {
        self.id
    }
}

fn default_true() -> bool {
    true
}

/// Input for creating a department. `code` is generated when absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDepartment {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_id: Option<DepartmentId>,
    #[serde(default)]
    pub manager_id: Option<UserId>,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn validate_code(code: &str) -> DomainResult<()> {
    if !(2..=20).contains(&code.len()) {
        return Err(DomainError::validation(
            "code must be between 2 and 20 characters",
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(DomainError::validation(
            "code must contain only uppercase letters, numbers, and underscores",
        ));
    }
    Ok(())
}

impl NewDepartment {
    pub fn normalized(mut self) -> DomainResult<Self> {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.location = self.location.trim().to_string();
        self.code = self
            .code
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());

        if !(2..=100).contains(&self.name.chars().count()) {
            return Err(DomainError::validation(
                "name must be between 2 and 100 characters",
            ));
        }
        if let Some(code) = &self.code {
            validate_code(code)?;
        }
        if self.description.len() > 500 {
            return Err(DomainError::validation(
                "description must be at most 500 characters",
            ));
        }
        Ok(self)
    }

    pub fn into_department(
        self,
        id: DepartmentId,
        code: String,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Department {
        Department {
            id,
            name: self.name,
            code,
            description: self.description,
            parent_id: self.parent_id,
            manager_id: self.manager_id,
            location: self.location,
            is_active: self.is_active,
            employee_count: 0,
            created_by,
            created_at: now,
        }
    }
}

/// Uppercase initials of the first three words of `name`.
fn code_base(name: &str) -> String {
    let base: String = name
        .split_whitespace()
        .take(3)
        .filter_map(|word| word.chars().find(|c| c.is_ascii_alphanumeric()))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if base.is_empty() {
        "DEPT".to_string()
    } else {
        base
    }
}

/// Generate a unique department code: `IT`, then `IT1`, `IT2`, ...
pub fn generate_code(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let base = code_base(name);
    let mut code = base.clone();
    let mut counter = 1u32;
    while is_taken(&code) {
        code = format!("{base}{counter}");
        counter += 1;
    }
    code
}

/// Departments seeded into a fresh store.
pub fn default_departments() -> Vec<NewDepartment> {
    let dept = |name: &str, code: &str, description: &str, location: &str| NewDepartment {
        name: name.to_string(),
        code: Some(code.to_string()),
        description: description.to_string(),
        parent_id: None,
        manager_id: None,
        location: location.to_string(),
        is_active: true,
    };
    vec![
        dept("Administration", "ADM", "Administrative and executive functions", "Main Office"),
        dept("Information Technology", "IT", "Technology infrastructure and support", "Main Office"),
        dept("Sales", "SAL", "Sales and customer acquisition", "Main Office"),
        dept("Warehouse Operations", "WH", "Inventory management and logistics", "Warehouse"),
        dept("Customer Service", "CS", "Customer support and relations", "Main Office"),
        dept("Finance", "FIN", "Financial planning and accounting", "Main Office"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn department() -> Department {
        default_departments()
            .remove(1)
            .normalized()
            .unwrap()
            .into_department(DepartmentId::new(2), "IT".into(), None, Utc::now())
    }

    #[test]
    fn code_is_built_from_initials_of_first_three_words() {
        assert_eq!(generate_code("Information Technology", |_| false), "IT");
        assert_eq!(generate_code("research and development lab", |_| false), "RAD");
        assert_eq!(generate_code("   ", |_| false), "DEPT");
    }

    #[test]
    fn code_gets_numeric_suffix_until_unique() {
        let taken: HashSet<&str> = ["IT", "IT1"].into_iter().collect();
        assert_eq!(
            generate_code("Information Technology", |c| taken.contains(c)),
            "IT2"
        );
    }

    #[test]
    fn normalization_uppercases_and_validates_code() {
        let input = NewDepartment {
            code: Some(" qa_1 ".into()),
            ..default_departments().remove(0)
        };
        assert_eq!(input.normalized().unwrap().code.as_deref(), Some("QA_1"));

        let bad = NewDepartment {
            code: Some("Q-A".into()),
            ..default_departments().remove(0)
        };
        assert!(matches!(bad.normalized(), Err(DomainError::Validation(_))));

        let blank = NewDepartment {
            code: Some("  ".into()),
            ..default_departments().remove(0)
        };
        assert_eq!(blank.normalized().unwrap().code, None);
    }

    #[test]
    fn deletion_is_blocked_by_users_or_children() {
        let d = department();
        assert_eq!(
            d.ensure_deletable(1, 0).unwrap_err().to_string(),
            "cannot delete department with active users"
        );
        assert_eq!(
            d.ensure_deletable(0, 2).unwrap_err().to_string(),
            "cannot delete department with child departments"
        );
        assert!(d.ensure_deletable(0, 0).is_ok());
    }

    #[test]
    fn default_departments_are_valid() {
        for dept in default_departments() {
            let normalized = dept.normalized().unwrap();
            assert!(normalized.code.is_some());
        }
    }
}
