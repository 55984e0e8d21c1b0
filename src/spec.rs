use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Raw value of a dimension as stored on a product or material spec.
///
/// Serialized untagged so that it matches the backend JSON: a plain number,
/// boolean, date string or any other string. Inside a [`Dimension`] the
/// declared data type decides whether a string is a date.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum DimensionValue {
    Number(f64),
    Boolean(bool),
    Date(#[serde(with = "date_value")] DateTime<Utc>),
    Text(String),
}

impl DimensionValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DimensionValue::Number(_) => DataType::Number,
            DimensionValue::Boolean(_) => DataType::Boolean,
            DimensionValue::Date(_) => DataType::Date,
            DimensionValue::Text(_) => DataType::String,
        }
    }
}

impl From<f64> for DimensionValue {
    fn from(value: f64) -> Self {
        DimensionValue::Number(value)
    }
}

impl From<bool> for DimensionValue {
    fn from(value: bool) -> Self {
        DimensionValue::Boolean(value)
    }
}

impl From<&str> for DimensionValue {
    fn from(value: &str) -> Self {
        DimensionValue::Text(value.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(value: String) -> Self {
        DimensionValue::Text(value)
    }
}

impl From<DateTime<Utc>> for DimensionValue {
    fn from(value: DateTime<Utc>) -> Self {
        DimensionValue::Date(value)
    }
}

// Dates travel as RFC 3339 strings; a bare `YYYY-MM-DD` is accepted as midnight UTC.
mod date_value {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).ok_or_else(|| D::Error::custom(format!("not a date: {raw}")))
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    String,
    Boolean,
    Date,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        };
        f.write_str(name)
    }
}

/// One named measurable attribute of a spec.
///
/// On deserialization the declared `dataType` decides how a string value is
/// read: only a dimension declared `date` has its value parsed as a date. When
/// `dataType` is missing it follows the JSON value.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", from = "RawDimension")]
pub struct Dimension {
    pub name: String,
    pub value: DimensionValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub data_type: DataType,
    /// Informational only, never evaluated here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub is_calculated: bool,
}

// JSON value of a dimension before its declared data type is applied.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Boolean(bool),
    Text(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDimension {
    name: String,
    value: RawValue,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    data_type: Option<DataType>,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    is_calculated: bool,
}

impl From<RawDimension> for Dimension {
    fn from(raw: RawDimension) -> Self {
        let value = match (raw.value, raw.data_type) {
            (RawValue::Number(n), _) => DimensionValue::Number(n),
            (RawValue::Boolean(b), _) => DimensionValue::Boolean(b),
            // a declared date that does not parse stays text and shows up as a type mismatch
            (RawValue::Text(text), Some(DataType::Date)) => match parse_date(&text) {
                Some(date) => DimensionValue::Date(date),
                None => DimensionValue::Text(text),
            },
            (RawValue::Text(text), _) => DimensionValue::Text(text),
        };
        Dimension {
            name: raw.name,
            data_type: raw.data_type.unwrap_or_else(|| value.data_type()),
            value,
            unit: raw.unit,
            formula: raw.formula,
            is_calculated: raw.is_calculated,
        }
    }
}

impl Dimension {
    /// Creates a dimension whose declared data type follows the value.
    pub fn new(name: &str, value: impl Into<DimensionValue>) -> Self {
        let value = value.into();
        Dimension {
            name: name.to_string(),
            data_type: value.data_type(),
            value,
            unit: None,
            formula: None,
            is_calculated: false,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Describes the disagreement between `data_type` and the stored value, if any.
    pub fn type_mismatch(&self) -> Option<String> {
        let actual = self.value.data_type();
        if actual == self.data_type {
            return None;
        }
        Some(format!(
            "dimension {} is declared {} but holds a {} value",
            self.name, self.data_type, actual
        ))
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpec {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub spec_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl ProductSpec {
    pub fn new(id: &str, spec_name: &str, dimensions: Vec<Dimension>) -> Self {
        ProductSpec {
            id: id.to_string(),
            spec_name: spec_name.to_string(),
            dimensions,
        }
    }

    /// First dimension with the given name.
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        find_dimension(&self.dimensions, name)
    }

    pub fn duplicate_dimension_names(&self) -> Vec<String> {
        duplicate_names(self.dimensions.iter().map(|d| d.name.as_str()))
    }
}

/// Material spec. `mol`, `weight_per_piece` and `density` are dimensions kept as
/// direct fields; they win over same-named entries of `dimensions`.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaterialSpec {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub spec_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_per_piece: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
}

impl MaterialSpec {
    pub fn new(id: &str, spec_name: &str, dimensions: Vec<Dimension>) -> Self {
        MaterialSpec {
            id: id.to_string(),
            spec_name: spec_name.to_string(),
            dimensions,
            ..Default::default()
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        find_dimension(&self.dimensions, name)
    }

    /// Value of a well-known scalar field, when `name` is one and it is set.
    pub fn core_value(&self, name: &str) -> Option<f64> {
        match name {
            "mol" => self.mol,
            "weightPerPiece" => self.weight_per_piece,
            "density" => self.density,
            _ => None,
        }
    }

    pub fn duplicate_dimension_names(&self) -> Vec<String> {
        duplicate_names(self.dimensions.iter().map(|d| d.name.as_str()))
    }
}

/// A named formula shown on a machine's operator view.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineCalculation {
    pub name: String,
    pub display_name: String,
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MachineCalculation {
    pub fn new(name: &str, display_name: &str, formula: &str) -> Self {
        MachineCalculation {
            name: name.to_string(),
            display_name: display_name.to_string(),
            formula: formula.to_string(),
            unit: None,
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

fn find_dimension<'a>(dimensions: &'a [Dimension], name: &str) -> Option<&'a Dimension> {
    dimensions.iter().find(|d| d.name == name)
}

pub(crate) fn duplicate_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut dups = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            dups.insert(name.to_string());
        }
    }
    dups.into_iter().collect()
}
