// src/capability/set.rs

//! The named feature set a run offers to capability expressions.

use std::collections::BTreeMap;
use std::fmt;

/// Value of a single capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl CapabilityValue {
    /// Interpret a raw string: `true`/`false`, then integers, else a string.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "true" => return CapabilityValue::Bool(true),
            "false" => return CapabilityValue::Bool(false),
            _ => {}
        }
        match raw.parse::<i64>() {
            Ok(n) => CapabilityValue::Int(n),
            Err(_) => CapabilityValue::Str(raw.to_string()),
        }
    }

    /// A bare name in an expression is true unless the value is `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, CapabilityValue::Bool(false))
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{b}"),
            CapabilityValue::Int(n) => write!(f, "{n}"),
            CapabilityValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(b: bool) -> Self {
        CapabilityValue::Bool(b)
    }
}

impl From<i64> for CapabilityValue {
    fn from(n: i64) -> Self {
        CapabilityValue::Int(n)
    }
}

impl From<u32> for CapabilityValue {
    fn from(n: u32) -> Self {
        CapabilityValue::Int(i64::from(n))
    }
}

impl From<&str> for CapabilityValue {
    fn from(s: &str) -> Self {
        CapabilityValue::Str(s.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(s: String) -> Self {
        CapabilityValue::Str(s)
    }
}

/// Capabilities keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    values: BTreeMap<String, CapabilityValue>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<CapabilityValue>) {
        self.values
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`Capabilities::insert`].
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<CapabilityValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityValue> {
        self.values.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapabilityValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a `name=value` assignment. A bare `name` means `name=true`.
    pub fn parse_assignment(raw: &str) -> Result<(String, CapabilityValue), String> {
        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name.trim(), CapabilityValue::parse(value)),
            None => (raw.trim(), CapabilityValue::Bool(true)),
        };

        if name.is_empty() {
            return Err(format!("capability assignment '{raw}' has no name"));
        }
        if !name.chars().all(is_name_char) {
            return Err(format!(
                "capability name '{name}' may only contain letters, digits and '_'"
            ));
        }

        Ok((name.to_ascii_lowercase(), value))
    }

    /// Build a set from repeated `name=value` assignments; later ones win.
    pub fn from_assignments<I, S>(items: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut caps = Capabilities::new();
        for item in items {
            let (name, value) = Capabilities::parse_assignment(item.as_ref())?;
            caps.values.insert(name, value);
        }
        Ok(caps)
    }
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

