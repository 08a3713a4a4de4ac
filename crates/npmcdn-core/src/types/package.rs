//! Package manifest types.
//!
//! The manifest is kept as a raw JSON object because `?main=<field>` may
//! name any top-level field.

use serde_json::{Map, Value};

/// A parsed `package.json`
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    fields: Map<String, Value>,
}

impl PackageManifest {
    /// Parse a manifest; anything other than a JSON object is rejected
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        let fields = serde_json::from_str::<Map<String, Value>>(input)?;
        Ok(Self { fields })
    }

    /// Raw access to a top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn string_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Pick the file to serve at the bare package URL.
    ///
    /// `requested_field` comes from the `?main=` query; when given, that field
    /// must exist and be a string, otherwise `None` is returned. Without it the
    /// priority is `unpkg`, then `browser` (string form only), then `main`,
    /// then `"index"`.
    pub fn main_entry(&self, requested_field: Option<&str>) -> Option<&str> {
        if let Some(field) = requested_field {
            return self.string_field(field);
        }

        Some(
            self.string_field("unpkg")
                .or_else(|| self.string_field("browser"))
                .or_else(|| self.string_field("main").filter(|main| !main.is_empty()))
                .unwrap_or("index"),
        )
    }
}
