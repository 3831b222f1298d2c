use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::utils::{format_date, format_phone, parse_date, parse_leading_float, parse_leading_int};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Coordinates arrive as numbers or as decimal strings depending on the column type.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A customer record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default)]
    pub whatsapp_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_gallon_stock: i64,
    #[serde(default)]
    pub gallon_price_id: Option<i64>,
    #[serde(default)]
    pub subscription_date: Option<String>,
    #[serde(default)]
    pub customer_photo: Option<String>,
    #[serde(default)]
    pub sub_region_id: Option<i64>,
    #[serde(default)]
    pub sub_region_name: Option<String>,
    #[serde(default)]
    pub customer_type_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    /// Fields this client does not model (joined names, timestamps, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Customer {
    /// "<title> <name>", as shown in lists
    pub fn display_name(&self) -> String {
        format!("{} {}", self.title, self.customer_name)
    }

    pub fn formatted(&self) -> FormattedCustomer {
        FormattedCustomer {
            display_name: self.display_name(),
            formatted_phone: self
                .whatsapp_number
                .as_deref()
                .map(format_phone)
                .unwrap_or_default(),
            subscription_date_formatted: self
                .subscription_date
                .as_deref()
                .map(format_date)
                .unwrap_or_default(),
            date_of_birth_formatted: self
                .date_of_birth
                .as_deref()
                .map(format_date)
                .unwrap_or_default(),
            customer: self.clone(),
        }
    }

    /// Overlay the fields of a (possibly partial) server response.
    ///
    /// Returns `None` when the merged object no longer forms a valid record.
    pub fn merged(&self, patch: &Value) -> Option<Customer> {
        let mut base = serde_json::to_value(self).ok()?;
        if let (Value::Object(base), Value::Object(patch)) = (&mut base, patch) {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(base).ok()
    }
}

/// A customer plus its display-ready fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedCustomer {
    #[serde(flatten)]
    pub customer: Customer,
    pub display_name: String,
    pub formatted_phone: String,
    pub subscription_date_formatted: String,
    pub date_of_birth_formatted: String,
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<&'static str, &'static str>);

impl ValidationErrors {
    fn insert(&mut self, field: &'static str, message: &'static str) {
        self.0.insert(field, message);
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

struct FieldRule {
    field: &'static str,
    max_len: Option<usize>,
    message: &'static str,
}

const REQUIRED_FIELDS: &[FieldRule] = &[
    FieldRule {
        field: "title",
        max_len: Some(10),
        message: "Title is required and at most 10 characters",
    },
    FieldRule {
        field: "customer_name",
        max_len: Some(255),
        message: "Customer name is required and at most 255 characters",
    },
    FieldRule {
        field: "address",
        max_len: Some(500),
        message: "Address is required and at most 500 characters",
    },
    FieldRule {
        field: "gallon_price_id",
        max_len: None,
        message: "A gallon price must be selected",
    },
    FieldRule {
        field: "customer_type_id",
        max_len: None,
        message: "A customer type must be selected",
    },
];

const INVALID_WHATSAPP: &str = "WhatsApp number format is invalid";
const FUTURE_BIRTH_DATE: &str = "Date of birth cannot be in the future";

/// Customer form state. Every field is text, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDraft {
    pub id: Option<i64>,
    pub title: String,
    pub customer_name: String,
    pub date_of_birth: String,
    pub address: String,
    pub whatsapp_number: String,
    pub customer_gallon_stock: String,
    pub gallon_price_id: String,
    pub subscription_date: String,
    pub customer_photo: String,
    pub sub_region_id: String,
    pub customer_type_id: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for CustomerDraft {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            customer_name: String::new(),
            date_of_birth: String::new(),
            address: String::new(),
            whatsapp_number: String::new(),
            customer_gallon_stock: "0".to_string(),
            gallon_price_id: String::new(),
            subscription_date: Local::now().date_naive().format("%Y-%m-%d").to_string(),
            customer_photo: String::new(),
            sub_region_id: String::new(),
            customer_type_id: "1".to_string(),
            latitude: String::new(),
            longitude: String::new(),
        }
    }
}

fn opt_to_string<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl From<&Customer> for CustomerDraft {
    fn from(customer: &Customer) -> Self {
        Self {
            id: Some(customer.id),
            title: customer.title.clone(),
            customer_name: customer.customer_name.clone(),
            date_of_birth: opt_to_string(&customer.date_of_birth),
            address: customer.address.clone(),
            whatsapp_number: opt_to_string(&customer.whatsapp_number),
            customer_gallon_stock: customer.customer_gallon_stock.to_string(),
            gallon_price_id: opt_to_string(&customer.gallon_price_id),
            subscription_date: opt_to_string(&customer.subscription_date),
            customer_photo: opt_to_string(&customer.customer_photo),
            sub_region_id: opt_to_string(&customer.sub_region_id),
            customer_type_id: opt_to_string(&customer.customer_type_id),
            latitude: opt_to_string(&customer.latitude),
            longitude: opt_to_string(&customer.longitude),
        }
    }
}

impl CustomerDraft {
    fn field(&self, name: &str) -> &str {
        match name {
            "title" => &self.title,
            "customer_name" => &self.customer_name,
            "address" => &self.address,
            "gallon_price_id" => &self.gallon_price_id,
            "customer_type_id" => &self.customer_type_id,
            _ => "",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Local::now().date_naive())
    }

    /// Validate against `today` as the latest acceptable birth date.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        for rule in REQUIRED_FIELDS {
            let value = self.field(rule.field);
            let too_long = rule
                .max_len
                .map(|max| value.chars().count() > max)
                .unwrap_or(false);
            if value.trim().is_empty() || too_long {
                errors.insert(rule.field, rule.message);
            }
        }

        let phone_ok = self
            .whatsapp_number
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')') || c.is_whitespace());
        if !phone_ok {
            errors.insert("whatsapp_number", INVALID_WHATSAPP);
        }

        // An unparseable date is left for the backend to reject
        if let Some(born) = parse_date(&self.date_of_birth) {
            if born > today {
                errors.insert("date_of_birth", FUTURE_BIRTH_DATE);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Convert the form into the body sent to the API.
    pub fn clean(&self) -> CustomerPayload {
        fn text(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }
        // Numbers are read leniently: "12 galon" is 12, "dua" is null
        fn int(value: &str) -> Option<i64> {
            text(value).and_then(|v| parse_leading_int(&v))
        }
        fn float(value: &str) -> Option<f64> {
            text(value).and_then(|v| parse_leading_float(&v))
        }

        CustomerPayload {
            title: text(&self.title),
            customer_name: text(&self.customer_name),
            date_of_birth: text(&self.date_of_birth),
            address: text(&self.address),
            whatsapp_number: text(&self.whatsapp_number),
            customer_gallon_stock: int(&self.customer_gallon_stock),
            gallon_price_id: int(&self.gallon_price_id),
            subscription_date: text(&self.subscription_date),
            customer_photo: text(&self.customer_photo),
            sub_region_id: int(&self.sub_region_id),
            customer_type_id: int(&self.customer_type_id),
            latitude: float(&self.latitude),
            longitude: float(&self.longitude),
        }
    }
}

/// Body for create and update calls. Blank fields are sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub title: Option<String>,
    pub customer_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub whatsapp_number: Option<String>,
    pub customer_gallon_stock: Option<i64>,
    pub gallon_price_id: Option<i64>,
    pub subscription_date: Option<String>,
    pub customer_photo: Option<String>,
    pub sub_region_id: Option<i64>,
    pub customer_type_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn valid_draft() -> CustomerDraft {
        CustomerDraft {
            title: "Bu".into(),
            customer_name: "Siti Aminah".into(),
            address: "Jl. Kenanga 12, Depok".into(),
            gallon_price_id: "2".into(),
            whatsapp_number: "0812-3456-7890".into(),
            date_of_birth: "1990-04-01".into(),
            ..CustomerDraft::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_default_draft() {
        let draft = CustomerDraft::default();
        assert_eq!(draft.customer_gallon_stock, "0");
        assert_eq!(draft.customer_type_id, "1");
        assert_eq!(draft.subscription_date.len(), 10);
        assert!(draft.id.is_none());
    }

    #[test]
    fn test_valid_draft_passes() {
        assert_eq!(valid_draft().validate_at(today()), Ok(()));
    }

    #[test]
    fn test_required_fields() {
        let errors = CustomerDraft {
            customer_type_id: String::new(),
            ..CustomerDraft::default()
        }
        .validate_at(today())
        .unwrap_err();

        for field in ["title", "customer_name", "address", "gallon_price_id", "customer_type_id"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_whitespace_only_counts_as_missing() {
        let draft = CustomerDraft { title: "   ".into(), ..valid_draft() };
        let errors = draft.validate_at(today()).unwrap_err();
        assert_eq!(errors.get("title"), Some("Title is required and at most 10 characters"));
    }

    #[test]
    fn test_max_lengths() {
        let draft = CustomerDraft {
            title: "Bapak Haji ".into(),
            address: "a".repeat(501),
            customer_name: "n".repeat(255),
            ..valid_draft()
        };
        let errors = draft.validate_at(today()).unwrap_err();
        assert!(errors.get("title").is_some());
        assert!(errors.get("address").is_some());
        assert!(errors.get("customer_name").is_none());
    }

    #[test]
    fn test_whatsapp_format() {
        let ok = CustomerDraft { whatsapp_number: "+62 (812) 3456-7890".into(), ..valid_draft() };
        assert!(ok.validate_at(today()).is_ok());

        let bad = CustomerDraft { whatsapp_number: "0812-ABC".into(), ..valid_draft() };
        assert_eq!(
            bad.validate_at(today()).unwrap_err().get("whatsapp_number"),
            Some(INVALID_WHATSAPP)
        );
    }

    #[test]
    fn test_birth_date_not_in_future() {
        let draft = CustomerDraft { date_of_birth: "2024-06-02".into(), ..valid_draft() };
        assert_eq!(
            draft.validate_at(today()).unwrap_err().get("date_of_birth"),
            Some(FUTURE_BIRTH_DATE)
        );

        let draft = CustomerDraft { date_of_birth: "2024-06-01".into(), ..valid_draft() };
        assert!(draft.validate_at(today()).is_ok());
    }

    #[test]
    fn test_clean_converts_blanks_and_numbers() {
        let draft = CustomerDraft {
            id: Some(44),
            customer_gallon_stock: "3".into(),
            sub_region_id: "7".into(),
            latitude: "-6.402484".into(),
            longitude: "".into(),
            customer_photo: "".into(),
            ..valid_draft()
        };
        let payload = draft.clean();

        assert_eq!(payload.customer_gallon_stock, Some(3));
        assert_eq!(payload.gallon_price_id, Some(2));
        assert_eq!(payload.sub_region_id, Some(7));
        assert_eq!(payload.customer_type_id, Some(1));
        assert_eq!(payload.latitude, Some(-6.402484));
        assert_eq!(payload.longitude, None);
        assert_eq!(payload.customer_photo, None);

        let body = serde_json::to_value(&payload).unwrap();
        assert!(body.get("id").is_none());
        assert_eq!(body["customer_photo"], Value::Null);
    }

    #[test]
    fn test_clean_unparseable_number_becomes_null() {
        let draft = CustomerDraft { customer_gallon_stock: "dua".into(), ..valid_draft() };
        assert_eq!(draft.clean().customer_gallon_stock, None);
    }

    #[test]
    fn test_clean_reads_leading_numbers() {
        let draft = CustomerDraft {
            customer_gallon_stock: "12abc".into(),
            sub_region_id: " 3".into(),
            longitude: "106.83 BT".into(),
            ..valid_draft()
        };
        let payload = draft.clean();
        assert_eq!(payload.customer_gallon_stock, Some(12));
        assert_eq!(payload.sub_region_id, Some(3));
        assert_eq!(payload.longitude, Some(106.83));
    }

    fn record() -> Customer {
        serde_json::from_value(json!({
            "id": 5,
            "title": "Pak",
            "customer_name": "Joko",
            "date_of_birth": null,
            "address": null,
            "whatsapp_number": "081234567890",
            "customer_gallon_stock": 2,
            "gallon_price_id": 1,
            "subscription_date": "2024-01-15T00:00:00.000Z",
            "sub_region_name": "Beji",
            "latitude": "-6.37",
            "longitude": 106.83,
            "created_at": "2024-01-15T03:21:00.000Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_record_parsing_is_lenient() {
        let customer = record();
        assert_eq!(customer.address, "");
        assert_eq!(customer.latitude, Some(-6.37));
        assert_eq!(customer.longitude, Some(106.83));
        assert_eq!(customer.extra["created_at"], "2024-01-15T03:21:00.000Z");
    }

    #[test]
    fn test_formatted_customer() {
        let formatted = record().formatted();
        assert_eq!(formatted.display_name, "Pak Joko");
        assert_eq!(formatted.formatted_phone, "0812-3456-7890");
        assert_eq!(formatted.subscription_date_formatted, "15/1/2024");
        assert_eq!(formatted.date_of_birth_formatted, "");

        let json = serde_json::to_value(&formatted).unwrap();
        assert_eq!(json["customer_name"], "Joko");
        assert_eq!(json["display_name"], "Pak Joko");
    }

    #[test]
    fn test_merged_overlays_fields() {
        let merged = record()
            .merged(&json!({"customer_gallon_stock": 6, "address": "Jl. Baru"}))
            .unwrap();
        assert_eq!(merged.customer_gallon_stock, 6);
        assert_eq!(merged.address, "Jl. Baru");
        assert_eq!(merged.customer_name, "Joko");
    }

    #[test]
    fn test_draft_from_record() {
        let draft = CustomerDraft::from(&record());
        assert_eq!(draft.id, Some(5));
        assert_eq!(draft.gallon_price_id, "1");
        assert_eq!(draft.date_of_birth, "");
        assert_eq!(draft.latitude, "-6.37");
    }
}
