//! Strongly-typed identifiers used across the domain.
//!
//! Rows are keyed by store-assigned `i64` sequences, so an identifier only
//! exists once the row has been persisted.

/// Define a `#[serde(transparent)]` newtype over a store-assigned `i64` key.
///
/// Used by every domain crate so that a `ProductId` can never be passed where
/// a `CategoryId` is expected.
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(i64);

        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| $crate::DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if value <= 0 {
                    return Err($crate::DomainError::invalid_id(format!(
                        "{}: must be positive",
                        $name
                    )));
                }
                Ok(Self(value))
            }
        }
    };
}

define_id!(
    /// Identifier of a user (actor identity).
    UserId,
    "UserId"
);
define_id!(
    /// Identifier of a role.
    RoleId,
    "RoleId"
);
define_id!(
    /// Identifier of a permission.
    PermissionId,
    "PermissionId"
);
define_id!(
    /// Identifier of a department node.
    DepartmentId,
    "DepartmentId"
);
define_id!(OrganizationId, "OrganizationId");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainError;

    #[test]
    fn parses_positive_ids() {
        let id: UserId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn rejects_garbage_and_non_positive_ids() {
        assert!(matches!("abc".parse::<RoleId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("0".parse::<RoleId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("-3".parse::<DepartmentId>(), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&PermissionId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
