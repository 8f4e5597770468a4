//! Domain model: vehicle records and known state
//!
//! The vendor's vehicle schema varies between endpoints, so a
//! [`VehicleRecord`] keeps the raw JSON object and reads fields through
//! candidate-key accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One inventory unit returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleRecord {
    fields: Map<String, Value>,
}

impl VehicleRecord {
    /// Wrap a raw vehicle object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value; non-objects are rejected
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Raw field access
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Stable identifier: `vehicleId`, falling back to `vin`
    pub fn id(&self) -> Option<String> {
        self.text(&["vehicleId", "vin"])
    }

    /// Vehicle-type code, if the record carries one
    pub fn car_code(&self) -> Option<String> {
        self.text(&["carCode"])
    }

    /// First candidate key holding a non-null, non-empty scalar, rendered as text
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Numeric value of the first non-empty candidate key
    ///
    /// Numeric strings (with thousands separators) are accepted.
    pub fn amount(&self, keys: &[&str]) -> Option<f64> {
        let value = keys
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })?;

        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn model_name(&self) -> Option<String> {
        self.text(&["modelNm", "carName"])
    }

    pub fn trim_name(&self) -> Option<String> {
        self.text(&["trimNm", "trimName"])
    }

    pub fn exterior_color(&self) -> Option<String> {
        self.text(&["extCrNm", "exteriorColorName"])
    }

    pub fn interior_color(&self) -> Option<String> {
        self.text(&["intCrNm", "interiorColorName"])
    }

    pub fn delivery_center(&self) -> Option<String> {
        self.text(&["poName", "deliveryCenterName"])
    }

    pub fn price(&self) -> Option<f64> {
        self.amount(&["price", "carPrice"])
    }

    pub fn discount(&self) -> Option<f64> {
        self.amount(&["discountAmt", "crDscntAmt"])
    }

    pub fn criterion_year_month(&self) -> Option<String> {
        self.text(&["criterionYearMonth"])
    }

    pub fn production_number(&self) -> Option<String> {
        self.text(&["carProductionNumber"])
    }

    /// Option names from `optionList` (or `options`)
    ///
    /// Entries are either objects carrying a name field or bare strings.
    pub fn option_names(&self) -> Vec<String> {
        let list = ["optionList", "options"]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find(|value| !value.is_null());

        let Some(Value::Array(entries)) = list else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(obj) => Some(
                    VehicleRecord::new(obj.clone())
                        .text(&["optionName", "optName", "name"])
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Persisted mapping of exhibition id to previously seen vehicle identifiers
///
/// Each entry is kept in first-seen order and only ever grows. An entry
/// exists once a target has completed one successful cycle, even if it
/// observed no vehicles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownState {
    entries: BTreeMap<String, Vec<String>>,
}

impl KnownState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the target has ever been registered
    pub fn contains_target(&self, exhb_no: &str) -> bool {
        self.entries.contains_key(exhb_no)
    }

    /// Known ids for a target (empty when unregistered)
    pub fn ids(&self, exhb_no: &str) -> &[String] {
        self.entries.get(exhb_no).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Known ids for a target as a set
    pub fn id_set(&self, exhb_no: &str) -> BTreeSet<String> {
        self.ids(exhb_no).iter().cloned().collect()
    }

    /// Number of known ids for a target
    pub fn count(&self, exhb_no: &str) -> usize {
        self.ids(exhb_no).len()
    }

    /// Registered target ids
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Register ids for a target, appending unseen ids in the given order
    ///
    /// Creates the entry if absent. Returns `true` if the state changed.
    pub fn record<'a>(&mut self, exhb_no: &str, ids: impl IntoIterator<Item = &'a String>) -> bool {
        let created = !self.entries.contains_key(exhb_no);
        let entry = self.entries.entry(exhb_no.to_string()).or_default();
        let mut seen: HashSet<String> = entry.iter().cloned().collect();

        let before = entry.len();
        for id in ids {
            if seen.insert(id.clone()) {
                entry.push(id.clone());
            }
        }

        created || entry.len() != before
    }

    /// Whether no target is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> VehicleRecord {
        VehicleRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_id_falls_back_to_vin() {
        assert_eq!(record(json!({"vehicleId": "V1", "vin": "K1"})).id().as_deref(), Some("V1"));
        assert_eq!(record(json!({"vehicleId": "", "vin": "K1"})).id().as_deref(), Some("K1"));
        assert_eq!(record(json!({"vin": "K1"})).id().as_deref(), Some("K1"));
        assert_eq!(record(json!({"modelNm": "x"})).id(), None);
    }

    #[test]
    fn test_candidate_keys() {
        let v = record(json!({"carName": "캐스퍼", "trimNm": null, "trimName": "인스퍼레이션"}));
        assert_eq!(v.model_name().as_deref(), Some("캐스퍼"));
        assert_eq!(v.trim_name().as_deref(), Some("인스퍼레이션"));
        assert_eq!(v.exterior_color(), None);
    }

    #[test]
    fn test_amounts() {
        let v = record(json!({"price": 35040000, "crDscntAmt": "1,500,000"}));
        assert_eq!(v.price(), Some(35040000.0));
        assert_eq!(v.discount(), Some(1500000.0));
        assert_eq!(record(json!({"price": "n/a"})).price(), None);
    }

    #[test]
    fn test_option_names() {
        let v = record(json!({
            "optionList": [{"optName": "선루프"}, {"optionName": "하이패스"}, "컴포트", {"code": 1}, 7]
        }));
        assert_eq!(v.option_names(), vec!["선루프", "하이패스", "컴포트", "-"]);
        assert!(record(json!({"optionList": "none"})).option_names().is_empty());
        assert!(record(json!({})).option_names().is_empty());
    }

    #[test]
    fn test_known_state_record_is_append_only() {
        let mut state = KnownState::new();
        assert!(!state.contains_target("E1"));

        let first = vec!["A".to_string(), "B".to_string()];
        assert!(state.record("E1", &first));
        assert_eq!(state.ids("E1"), &["A".to_string(), "B".to_string()]);

        let second = vec!["B".to_string(), "C".to_string()];
        assert!(state.record("E1", &second));
        assert_eq!(state.ids("E1"), &["A".to_string(), "B".to_string(), "C".to_string()]);

        assert!(!state.record("E1", &second));
    }

    #[test]
    fn test_known_state_registers_empty_target() {
        let mut state = KnownState::new();
        assert!(state.record("E1", &Vec::<String>::new()));
        assert!(state.contains_target("E1"));
        assert_eq!(state.count("E1"), 0);
    }

    #[test]
    fn test_known_state_json_shape() {
        let mut state = KnownState::new();
        state.record("E1", &vec!["A".to_string()]);
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({"E1": ["A"]}));
    }
}
