use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::comparator::{DataComparator, RecordComparator, DEFAULT_DECIMAL_PRECISION};
use crate::converter::{StringTypeConverter, TypeConverter};
use crate::error::ReconError;
use crate::exclude::{BreakExclude, RuleExcluder};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparisonConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Ordered; defines both sort order and match identity.
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    /// Fractional digits for tolerance and key rounding. -1 disables rounding
    /// of converted doubles.
    #[serde(default = "default_precision")]
    pub decimal_precision: i32,
    /// chrono `strftime` patterns, tried in order.
    #[serde(default)]
    pub date_formats: Vec<String>,
    /// Left field → right field it is compared against.
    #[serde(default)]
    pub mapped_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub break_excludes: Vec<BreakExcludeConfig>,
}

fn default_name() -> String {
    "comparison".to_string()
}

fn default_precision() -> i32 {
    DEFAULT_DECIMAL_PRECISION
}

// ---------------------------------------------------------------------------
// Break excludes
// ---------------------------------------------------------------------------

/// TOML form of a `BreakExclude`. Values are raw strings and go through the
/// configured type converter before use.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakExcludeConfig {
    #[serde(default)]
    pub key: BTreeMap<String, String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub left: Option<String>,
    #[serde(default)]
    pub right: Option<String>,
}

impl BreakExcludeConfig {
    pub fn to_rule(&self, converter: &dyn TypeConverter) -> Result<BreakExclude, ReconError> {
        let convert = |raw: &String| converter.convert(Value::from(raw.as_str()));
        BreakExclude::new(
            self.key
                .iter()
                .map(|(field, raw)| (field.clone(), convert(raw)))
                .collect(),
            self.field.clone(),
            self.left.as_ref().map(convert),
            self.right.as_ref().map(convert),
        )
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ComparisonConfig {
    pub fn new<I, S>(key_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: default_name(),
            key_fields: key_fields.into_iter().map(Into::into).collect(),
            exclude_fields: Vec::new(),
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            date_formats: Vec::new(),
            mapped_fields: BTreeMap::new(),
            break_excludes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_decimal_precision(mut self, precision: i32) -> Self {
        self.decimal_precision = precision;
        self
    }

    pub fn with_date_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mapped_field(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.mapped_fields.insert(left.into(), right.into());
        self
    }

    pub fn with_break_exclude(mut self, exclude: BreakExcludeConfig) -> Self {
        self.break_excludes.push(exclude);
        self
    }

    /// Config from comma-separated key and exclude lists, e.g. `"Key1, Key2"`.
    pub fn from_field_lists(
        name: &str,
        key_fields: &str,
        exclude_fields: &str,
    ) -> Result<Self, ReconError> {
        let excludes = if exclude_fields.trim().is_empty() {
            Vec::new()
        } else {
            parse_field_list(exclude_fields)?
        };
        let config = Self::new(parse_field_list(key_fields)?)
            .with_name(name)
            .with_exclude_fields(excludes);
        config.validate()?;
        Ok(config)
    }
}

/// Split a comma-separated field list, trimming each entry.
pub fn parse_field_list(list: &str) -> Result<Vec<String>, ReconError> {
    list.split(',')
        .map(|entry| {
            let field = entry.trim();
            if field.is_empty() {
                Err(ReconError::ConfigValidation(format!(
                    "empty field name in field list '{list}'"
                )))
            } else {
                Ok(field.to_string())
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ComparisonConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ComparisonConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReconError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.key_fields.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one key field is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.key_fields {
            if key.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "key field names must not be blank".into(),
                ));
            }
            if !seen.insert(key.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "duplicate key field '{key}'"
                )));
            }
        }

        // Keys define matching; excluding or remapping one would change it
        for field in &self.exclude_fields {
            if seen.contains(field.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "key field '{field}' cannot be excluded"
                )));
            }
        }
        for left in self.mapped_fields.keys() {
            if seen.contains(left.as_str()) {
                return Err(ReconError::ConfigValidation(format!(
                    "key field '{left}' cannot be mapped"
                )));
            }
        }

        if self.decimal_precision < -1 {
            return Err(ReconError::ConfigValidation(format!(
                "decimal_precision must be >= -1, got {}",
                self.decimal_precision
            )));
        }

        for (i, exclude) in self.break_excludes.iter().enumerate() {
            if exclude.key.is_empty()
                && exclude.field.is_none()
                && exclude.left.is_none()
                && exclude.right.is_none()
            {
                return Err(ReconError::ConfigValidation(format!(
                    "break_excludes[{i}] must set at least one of key, field, left or right"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Derived components
// ---------------------------------------------------------------------------

impl ComparisonConfig {
    pub fn is_key(&self, field: &str) -> bool {
        self.key_fields.iter().any(|k| k == field)
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.exclude_fields.iter().any(|f| f == field)
    }

    pub fn type_converter(&self) -> StringTypeConverter {
        StringTypeConverter::new(self.decimal_precision, self.date_formats.iter().cloned())
    }

    pub fn data_comparator(&self) -> DataComparator {
        DataComparator::new(self.decimal_precision)
    }

    pub fn record_comparator(&self) -> RecordComparator {
        RecordComparator::new(self.data_comparator(), self.key_fields.iter().cloned())
    }

    /// Rule excluder over `break_excludes`, values converted like data.
    pub fn exclusion_policy(&self) -> Result<RuleExcluder, ReconError> {
        let converter = self.type_converter();
        let rules = self
            .break_excludes
            .iter()
            .map(|e| e.to_rule(&converter))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleExcluder::new(self.data_comparator(), rules))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
