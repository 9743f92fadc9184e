//! `ainventory-org`: departments, their closure-table hierarchy, and organizations.

pub mod department;
pub mod hierarchy;
pub mod organization;

pub use department::{Department, NewDepartment, default_departments, generate_code};
pub use hierarchy::{HierarchyEdge, ancestor_ids, closure_edges_for, descendant_ids, is_ancestor_of};
pub use organization::{NewOrganization, Onboarding, Organization, ValidOnboarding};
