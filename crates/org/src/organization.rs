use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity, OrganizationId, UserId};

pub const DEFAULT_COUNTRY: &str = "United States";

/// A company owned by the user who onboarded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> OrganizationId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrganization {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl NewOrganization {
    pub fn into_organization(
        self,
        id: OrganizationId,
        owner_id: UserId,
        now: DateTime<Utc>,
    ) -> Organization {
        Organization {
            id,
            name: self.name,
            address: self.address,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country,
            owner_id,
            created_at: now,
        }
    }
}

/// Onboarding request: rename the user and create their organization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Onboarding {
    pub first_name: String,
    pub last_name: String,
    pub organization: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOnboarding {
    pub first_name: String,
    pub last_name: String,
    pub organization: NewOrganization,
}

fn bounded(field: &str, value: String, max: usize) -> DomainResult<String> {
    let value = value.trim().to_string();
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

impl Onboarding {
    /// Trims every field; the organization name is required.
    pub fn validate(self) -> DomainResult<ValidOnboarding> {
        let name = bounded("organization", self.organization, 255)?;
        if name.is_empty() {
            return Err(DomainError::validation("organization is required"));
        }
        let country = bounded("country", self.country, 100)?;

        Ok(ValidOnboarding {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            organization: NewOrganization {
                name,
                address: bounded("address", self.address, 500)?,
                city: bounded("city", self.city, 100)?,
                state: bounded("state", self.state, 100)?,
                zip_code: bounded("zip_code", self.zip_code, 20)?,
                country: if country.is_empty() {
                    DEFAULT_COUNTRY.to_string()
                } else {
                    country
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onboarding() -> Onboarding {
        Onboarding {
            first_name: " Ada ".into(),
            last_name: " Lovelace ".into(),
            organization: "  Analytical Engines Ltd ".into(),
            address: "12 St James's Square".into(),
            city: "London".into(),
            state: String::new(),
            zip_code: "SW1Y".into(),
            country: String::new(),
        }
    }

    #[test]
    fn trims_fields_and_defaults_country() {
        let valid = onboarding().validate().unwrap();
        assert_eq!(valid.first_name, "Ada");
        assert_eq!(valid.organization.name, "Analytical Engines Ltd");
        assert_eq!(valid.organization.country, DEFAULT_COUNTRY);
    }

    #[test]
    fn organization_name_is_required() {
        let input = Onboarding {
            organization: "   ".into(),
            ..onboarding()
        };
        assert!(matches!(input.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn overlong_zip_code_is_rejected() {
        let input = Onboarding {
            zip_code: "1".repeat(21),
            ..onboarding()
        };
        assert!(input.validate().is_err());
    }
}
