use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ainventory_core::{DomainError, DomainResult, Entity, SortDirection, UserId};

ainventory_core::define_id!(
    /// Identifier of a supplier.
    SupplierId,
    "SupplierId"
);

pub const DEFAULT_PAYMENT_TERMS: &str = "Net 30";
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl SupplierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(DomainError::validation(format!(
                "invalid supplier status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub code: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub tax_id: String,
    pub payment_terms: String,
    pub currency: String,
    pub minimum_order_value: Option<Decimal>,
    pub status: SupplierStatus,
    pub rating: Option<Decimal>,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> SupplierId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierWithCount {
    #[serde(flatten)]
    pub supplier: Supplier,
    pub product_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NewSupplier {
    pub name: String,
    pub code: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub tax_id: String,
    pub payment_terms: String,
    pub currency: String,
    pub minimum_order_value: Option<Decimal>,
    pub status: SupplierStatus,
    pub rating: Option<Decimal>,
    pub notes: String,
}

fn max_len(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

impl NewSupplier {
    pub fn normalized(mut self) -> DomainResult<Self> {
        for field in [
            &mut self.name,
            &mut self.contact_person,
            &mut self.phone,
            &mut self.website,
            &mut self.address,
            &mut self.city,
            &mut self.state,
            &mut self.zip_code,
            &mut self.country,
            &mut self.tax_id,
            &mut self.payment_terms,
            &mut self.notes,
        ] {
            *field = field.trim().to_string();
        }
        self.code = self.code.trim().to_uppercase();
        self.email = self.email.trim().to_lowercase();
        self.currency = self.currency.trim().to_uppercase();
        if self.payment_terms.is_empty() {
            self.payment_terms = DEFAULT_PAYMENT_TERMS.to_string();
        }
        if self.currency.is_empty() {
            self.currency = DEFAULT_CURRENCY.to_string();
        }

        if !(2..=200).contains(&self.name.chars().count()) {
            return Err(DomainError::validation(
                "name must be between 2 and 200 characters",
            ));
        }
        if !(2..=20).contains(&self.code.len())
            || !self
                .code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::validation(
                "code must be 2 to 20 uppercase letters, numbers, or underscores",
            ));
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err(DomainError::validation("email is invalid"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation("currency must be a 3-letter code"));
        }
        if self
            .rating
            .is_some_and(|rating| !(Decimal::ZERO..=Decimal::from(5)).contains(&rating))
        {
            return Err(DomainError::validation("rating must be between 0 and 5"));
        }
        if self.minimum_order_value.is_some_and(|v| v.is_sign_negative()) {
            return Err(DomainError::validation(
                "minimum_order_value must not be negative",
            ));
        }
        max_len("contact_person", &self.contact_person, 100)?;
        max_len("email", &self.email, 100)?;
        max_len("phone", &self.phone, 20)?;
        max_len("website", &self.website, 255)?;
        max_len("address", &self.address, 500)?;
        max_len("zip_code", &self.zip_code, 20)?;
        max_len("tax_id", &self.tax_id, 50)?;
        Ok(self)
    }

    pub fn into_supplier(
        self,
        id: SupplierId,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Supplier {
        Supplier {
            id,
            name: self.name,
            code: self.code,
            contact_person: self.contact_person,
            email: self.email,
            phone: self.phone,
            website: self.website,
            address: self.address,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country,
            tax_id: self.tax_id,
            payment_terms: self.payment_terms,
            currency: self.currency,
            minimum_order_value: self.minimum_order_value,
            status: self.status,
            rating: self.rating,
            notes: self.notes,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whitelisted `sortBy` values for the supplier listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupplierSort {
    Name,
    Code,
    #[default]
    CreatedAt,
    UpdatedAt,
    Status,
    Rating,
}

impl SupplierSort {
    /// Absent means `created_at`; anything off the whitelist is a validation error.
    pub fn parse(raw: Option<&str>) -> DomainResult<Self> {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::default());
        };
        match raw {
            "name" => Ok(Self::Name),
            "code" => Ok(Self::Code),
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "status" => Ok(Self::Status),
            "rating" => Ok(Self::Rating),
            other => Err(DomainError::validation(format!("invalid sortBy '{other}'"))),
        }
    }

    /// Column name; safe to splice into SQL because it comes from the whitelist.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Code => "code",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Status => "status",
            Self::Rating => "rating",
        }
    }
}

/// In-process equivalent of `ORDER BY <column> <dir> NULLS LAST, id <dir>`.
///
/// Missing ratings sort last in both directions.
pub fn sort_suppliers(rows: &mut [SupplierWithCount], sort: SupplierSort, direction: SortDirection) {
    use std::cmp::Ordering;

    let directed = |ord: Ordering| match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    };

    rows.sort_by(|a, b| {
        let (a, b) = (&a.supplier, &b.supplier);
        let primary = match sort {
            SupplierSort::Name => directed(a.name.cmp(&b.name)),
            SupplierSort::Code => directed(a.code.cmp(&b.code)),
            SupplierSort::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
            SupplierSort::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at)),
            SupplierSort::Status => directed(a.status.as_str().cmp(b.status.as_str())),
            SupplierSort::Rating => match (a.rating, b.rating) {
                (Some(x), Some(y)) => directed(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| directed(a.id.cmp(&b.id)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_supplier(name: &str, code: &str) -> NewSupplier {
        NewSupplier {
            name: name.into(),
            code: code.into(),
            email: " Orders@Example.com ".into(),
            ..NewSupplier::default()
        }
    }

    fn row(id: i64, name: &str, rating: Option<i64>, age_days: i64) -> SupplierWithCount {
        let now = Utc::now();
        let mut supplier = new_supplier(name, &format!("S{id}"))
            .normalized()
            .unwrap()
            .into_supplier(SupplierId::new(id), None, now - Duration::days(age_days));
        supplier.rating = rating.map(Decimal::from);
        SupplierWithCount {
            supplier,
            product_count: 0,
        }
    }

    #[test]
    fn normalization_fills_defaults() {
        let s = new_supplier(" Global Electronics Inc. ", "gei").normalized().unwrap();
        assert_eq!(s.code, "GEI");
        assert_eq!(s.email, "orders@example.com");
        assert_eq!(s.payment_terms, DEFAULT_PAYMENT_TERMS);
        assert_eq!(s.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn rating_must_be_within_zero_and_five() {
        let s = NewSupplier {
            rating: Some(Decimal::new(51, 1)),
            ..new_supplier("Acme", "ACME")
        };
        assert!(matches!(s.normalized(), Err(DomainError::Validation(_))));

        let s = NewSupplier {
            rating: Some(Decimal::new(45, 1)),
            ..new_supplier("Acme", "ACME")
        };
        assert!(s.normalized().is_ok());
    }

    #[test]
    fn sort_by_is_whitelisted() {
        assert_eq!(SupplierSort::parse(None).unwrap(), SupplierSort::CreatedAt);
        assert_eq!(SupplierSort::parse(Some("rating")).unwrap(), SupplierSort::Rating);
        let err = SupplierSort::parse(Some("name; DROP TABLE suppliers")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sorts_by_name_in_both_directions() {
        let mut rows = vec![row(1, "Bravo", None, 0), row(2, "Alpha", None, 0), row(3, "Charlie", None, 0)];
        sort_suppliers(&mut rows, SupplierSort::Name, SortDirection::Asc);
        let names: Vec<_> = rows.iter().map(|r| r.supplier.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Bravo", "Charlie"]);

        sort_suppliers(&mut rows, SupplierSort::Name, SortDirection::Desc);
        assert_eq!(rows[0].supplier.name, "Charlie");
    }

    #[test]
    fn default_sort_is_newest_first_and_missing_ratings_go_last() {
        let mut rows = vec![row(1, "Old", Some(2), 10), row(2, "New", None, 1), row(3, "Mid", Some(4), 5)];
        sort_suppliers(&mut rows, SupplierSort::default(), SortDirection::default());
        assert_eq!(rows[0].supplier.name, "New");

        sort_suppliers(&mut rows, SupplierSort::Rating, SortDirection::Desc);
        let names: Vec<_> = rows.iter().map(|r| r.supplier.name.as_str()).collect();
        assert_eq!(names, ["Mid", "Old", "New"]);
    }
}
