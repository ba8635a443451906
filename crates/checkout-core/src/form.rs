//! # Order Form
//!
//! The customer details form posted to the checkout. Every field deserializes
//! with a default so that a missing input surfaces as a field error instead of
//! a rejected request. Field rules are declared with `validator` and mapped
//! onto [`FieldErrors`] with the storefront's own messages.

use crate::order::CustomerDetails;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrors};

/// Raw order form as posted by the browser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrderForm {
    #[validate(length(min = 1, max = 50))]
    pub full_name: String,
    #[validate(length(min = 1, max = 254), email)]
    pub email: String,
    #[validate(length(min = 1, max = 20))]
    pub phone_number: String,
    #[validate(length(min = 1, max = 2), custom(function = "validate_country"))]
    pub country: String,
    #[validate(length(max = 20))]
    pub postcode: String,
    #[validate(length(min = 1, max = 40))]
    pub town_or_city: String,
    #[validate(length(min = 1, max = 80))]
    pub street_address1: String,
    #[validate(length(max = 80))]
    pub street_address2: String,
    #[validate(length(max = 80))]
    pub county: String,
}

/// Validation messages keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Field name, label, max length, required
pub const ORDER_FORM_FIELDS: &[(&str, &str, usize, bool)] = &[
    ("full_name", "Full Name", 50, true),
    ("email", "Email Address", 254, true),
    ("phone_number", "Phone Number", 20, true),
    ("street_address1", "Street Address 1", 80, true),
    ("street_address2", "Street Address 2", 80, false),
    ("town_or_city", "Town or City", 40, true),
    ("county", "County, State or Locality", 80, false),
    ("postcode", "Postal Code", 20, false),
    ("country", "Country", 2, true),
];

impl OrderForm {
    /// Current value of a field by name
    pub fn value(&self, field: &str) -> &str {
        match field {
            "full_name" => &self.full_name,
            "email" => &self.email,
            "phone_number" => &self.phone_number,
            "country" => &self.country,
            "postcode" => &self.postcode,
            "town_or_city" => &self.town_or_city,
            "street_address1" => &self.street_address1,
            "street_address2" => &self.street_address2,
            "county" => &self.county,
            _ => "",
        }
    }

    /// Trim every field, run the declared rules and produce customer details
    pub fn clean(&self) -> Result<CustomerDetails, FieldErrors> {
        let trimmed = self.trimmed();
        if let Err(errors) = trimmed.validate() {
            return Err(trimmed.field_errors(&errors));
        }

        Ok(CustomerDetails {
            full_name: trimmed.full_name,
            email: trimmed.email,
            phone_number: trimmed.phone_number,
            country: trimmed.country,
            postcode: optional(trimmed.postcode),
            town_or_city: trimmed.town_or_city,
            street_address1: trimmed.street_address1,
            street_address2: optional(trimmed.street_address2),
            county: optional(trimmed.county),
        })
    }

    fn trimmed(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            country: self.country.trim().to_ascii_uppercase(),
            postcode: self.postcode.trim().to_string(),
            town_or_city: self.town_or_city.trim().to_string(),
            street_address1: self.street_address1.trim().to_string(),
            street_address2: self.street_address2.trim().to_string(),
            county: self.county.trim().to_string(),
        }
    }

    fn field_errors(&self, errors: &ValidationErrors) -> FieldErrors {
        let by_field = errors.field_errors();
        let mut out = FieldErrors::default();

        for &(field, label, max_len, required) in ORDER_FORM_FIELDS {
            let Some(failures) = by_field.get(field) else {
                continue;
            };
            let value = self.value(field);
            if value.is_empty() {
                if required {
                    out.add(field, format!("{} is required.", label));
                }
                continue;
            }
            for failure in failures.iter() {
                let message = match failure.code.as_ref() {
                    "length" => format!(
                        "Ensure {} has at most {} characters (it has {}).",
                        label,
                        max_len,
                        value.chars().count()
                    ),
                    "email" => "Enter a valid email address.".to_string(),
                    "country" => "Select a valid country.".to_string(),
                    other => format!("{} is invalid ({}).", label, other),
                };
                out.add(field, message);
            }
        }

        out
    }
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn validate_country(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || ISO_3166_ALPHA2.contains(&code) {
        Ok(())
    } else {
        Err(ValidationError::new("country"))
    }
}

/// Officially assigned ISO 3166-1 alpha-2 codes
pub const ISO_3166_ALPHA2: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX",
    "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ",
    "BR", "BS", "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK",
    "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR",
    "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS",
    "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN",
    "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV",
    "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ",
    "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI",
    "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM",
    "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW", "SA", "SB", "SC",
    "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS", "ST", "SV",
    "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR",
    "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> OrderForm {
        OrderForm {
            full_name: "  Ada Lovelace ".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "02079460000".to_string(),
            country: "gb".to_string(),
            postcode: "".to_string(),
            town_or_city: "London".to_string(),
            street_address1: "12 St James's Square".to_string(),
            street_address2: " ".to_string(),
            county: "Greater London".to_string(),
        }
    }

    #[test]
    fn test_valid_form() {
        let details = valid_form().clean().unwrap();

        assert_eq!(details.full_name, "Ada Lovelace");
        assert_eq!(details.country, "GB");
        assert_eq!(details.postcode, None);
        assert_eq!(details.street_address2, None);
        assert_eq!(details.county.as_deref(), Some("Greater London"));
    }

    #[test]
    fn test_missing_required_fields() {
        let errors = OrderForm::default().clean().unwrap_err();

        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(
            fields,
            vec![
                "country",
                "email",
                "full_name",
                "phone_number",
                "street_address1",
                "town_or_city"
            ]
        );
        assert_eq!(errors.get("full_name"), ["Full Name is required."]);
        assert_eq!(errors.get("email"), ["Email Address is required."]);
        assert!(errors.get("postcode").is_empty());
    }

    #[test]
    fn test_field_too_long() {
        let mut form = valid_form();
        form.full_name = "x".repeat(51);

        let errors = form.clean().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("full_name"),
            ["Ensure Full Name has at most 50 characters (it has 51)."]
        );
    }

    #[test]
    fn test_invalid_email_and_country() {
        let mut form = valid_form();
        form.email = "ada.example.com".to_string();
        form.country = "Britain".to_string();

        let errors = form.clean().unwrap_err();
        assert_eq!(errors.get("email"), ["Enter a valid email address."]);
        assert!(errors
            .get("country")
            .contains(&"Select a valid country.".to_string()));
    }

    #[test]
    fn test_unassigned_country_codes_are_rejected() {
        for code in ["ZZ", "xx", "UK"] {
            let mut form = valid_form();
            form.country = code.to_string();

            let errors = form.clean().unwrap_err();
            assert_eq!(errors.get("country"), ["Select a valid country."], "{}", code);
        }

        let mut form = valid_form();
        form.country = " us ".to_string();
        assert_eq!(form.clean().unwrap().country, "US");
    }

    #[test]
    fn test_country_table() {
        assert_eq!(ISO_3166_ALPHA2.len(), 249);
        assert!(ISO_3166_ALPHA2.windows(2).all(|w| w[0] < w[1]));
    }
}
