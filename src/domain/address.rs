use crate::error::{OrderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const MAX_NAME_LEN: usize = 120;
const MAX_LINE_LEN: usize = 120;
const MAX_LOCALITY_LEN: usize = 64;
const MAX_COUNTRY_LEN: usize = 56;

static IN_POSTAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[1-9][0-9]{5}$").unwrap());
static US_POSTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").unwrap());
static GB_POSTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}$").unwrap()
});
static ANY_POSTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 -]{3,10}$").unwrap());

static IN_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[6-9][0-9]{9}$").unwrap());
static US_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[2-9][0-9]{9}$").unwrap());
static GB_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0?7[0-9]{9}$").unwrap());
static ANY_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{7,15}$").unwrap());

/// Countries with dedicated postal/phone rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountryRules {
    India,
    UnitedStates,
    UnitedKingdom,
    Other,
}

impl CountryRules {
    fn detect(country: &str) -> (Self, String) {
        match country.to_ascii_lowercase().as_str() {
            "" | "in" | "ind" | "india" => (Self::India, "IN".to_string()),
            "us" | "usa" | "united states" | "united states of america" => {
                (Self::UnitedStates, "US".to_string())
            }
            "gb" | "uk" | "united kingdom" | "great britain" => {
                (Self::UnitedKingdom, "GB".to_string())
            }
            _ => (Self::Other, country.to_string()),
        }
    }

    fn calling_code(self) -> Option<&'static str> {
        match self {
            Self::India => Some("91"),
            Self::UnitedStates => Some("1"),
            Self::UnitedKingdom => Some("44"),
            Self::Other => None,
        }
    }

    fn postal_pattern(self) -> &'static Regex {
        match self {
            Self::India => &IN_POSTAL,
            Self::UnitedStates => &US_POSTAL,
            Self::UnitedKingdom => &GB_POSTAL,
            Self::Other => &ANY_POSTAL,
        }
    }

    fn phone_pattern(self) -> &'static Regex {
        match self {
            Self::India => &IN_PHONE,
            Self::UnitedStates => &US_PHONE,
            Self::UnitedKingdom => &GB_PHONE,
            Self::Other => &ANY_PHONE,
        }
    }
}

/// Unvalidated address as submitted by the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressForm {
    #[serde(alias = "fullName")]
    pub full_name: String,
    #[serde(alias = "addressLine1")]
    pub line1: String,
    #[serde(default, alias = "addressLine2")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(alias = "state")]
    pub region: String,
    #[serde(alias = "postalCode")]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    pub phone: String,
}

/// A validated shipping address. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AddressForm", into = "AddressForm")]
pub struct ShippingAddress {
    full_name: String,
    line1: String,
    line2: Option<String>,
    city: String,
    region: String,
    postal_code: String,
    country: String,
    phone: String,
}

impl ShippingAddress {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn line1(&self) -> &str {
        &self.line1
    }

    pub fn line2(&self) -> Option<&str> {
        self.line2.as_deref()
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }
}

fn required(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OrderError::ValidationError(format!("{field} is required")));
    }
    bounded(field, value, max)
}

fn bounded(field: &str, value: &str, max: usize) -> Result<String> {
    if value.chars().count() > max {
        return Err(OrderError::ValidationError(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn normalize_phone(raw: &str, rules: CountryRules) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    match (digits.strip_prefix('+'), rules.calling_code()) {
        (Some(rest), Some(code)) => rest.strip_prefix(code).unwrap_or(rest).to_string(),
        (Some(rest), None) => rest.to_string(),
        (None, _) => digits,
    }
}

impl TryFrom<AddressForm> for ShippingAddress {
    type Error = OrderError;

    fn try_from(form: AddressForm) -> Result<Self> {
        let (rules, country) = CountryRules::detect(form.country.trim());
        let country = bounded("country", &country, MAX_COUNTRY_LEN)?;

        let postal_code = required("postal code", &form.postal_code, MAX_LOCALITY_LEN)?;
        if !rules.postal_pattern().is_match(&postal_code) {
            return Err(OrderError::ValidationError(format!(
                "Invalid postal code for {country}: {postal_code}"
            )));
        }

        let phone = normalize_phone(form.phone.trim(), rules);
        if !rules.phone_pattern().is_match(&phone) {
            return Err(OrderError::ValidationError(format!(
                "Invalid phone number for {country}"
            )));
        }

        let line2 = match form.line2.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(line) => Some(bounded("address line 2", line, MAX_LINE_LEN)?),
        };

        Ok(Self {
            full_name: required("full name", &form.full_name, MAX_NAME_LEN)?,
            line1: required("address line 1", &form.line1, MAX_LINE_LEN)?,
            line2,
            city: required("city", &form.city, MAX_LOCALITY_LEN)?,
            region: required("region", &form.region, MAX_LOCALITY_LEN)?,
            postal_code,
            country,
            phone,
        })
    }
}

impl From<ShippingAddress> for AddressForm {
    fn from(address: ShippingAddress) -> Self {
        Self {
            full_name: address.full_name,
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            region: address.region,
            postal_code: address.postal_code,
            country: address.country,
            phone: address.phone,
        }
    }
}
