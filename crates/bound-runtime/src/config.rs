#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`BindingConfig`] holds the defaults every binding adapter falls back to
//! when an element does not name its own prop names or default value. With
//! the `config` feature it deserializes from TOML or JSON; missing keys take
//! their defaults.
//!
//! ```toml
//! value_prop = "checked"
//! change_prop = "onToggle"
//! derive_labels = false
//! ```

#[cfg(feature = "config")]
use std::path::Path;

#[cfg(feature = "config")]
use crate::error::{BindError, Result};

/// Binding defaults shared by one runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct BindingConfig {
    /// Prop receiving the bound value.
    pub value_prop: String,
    /// Prop receiving the change handler.
    pub change_prop: String,
    /// Prop defaulted to a label derived from the field name; empty disables.
    pub label_prop: String,
    /// Text written into an unset slot when a binding has no default.
    pub default_value: String,
    /// Install the label-deriving property subscriber.
    pub derive_labels: bool,
    /// Install the rule-validation property subscriber.
    pub validate: bool,
    /// Prop holding validation rules.
    pub rules_prop: String,
    /// Prop receiving a validation message unless the element names another.
    pub helper_text_prop: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            value_prop: "value".into(),
            change_prop: "onChange".into(),
            label_prop: "label".into(),
            default_value: String::new(),
            derive_labels: true,
            validate: true,
            rules_prop: "validate".into(),
            helper_text_prop: "helperText".into(),
        }
    }
}

impl BindingConfig {
    /// The label prop, or `None` when label defaulting is disabled.
    #[must_use]
    pub fn label_prop(&self) -> Option<&str> {
        (!self.label_prop.is_empty()).then_some(self.label_prop.as_str())
    }
}

#[cfg(feature = "config")]
impl BindingConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`BindError::Config`] when the document is malformed or names an
    /// unknown key.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| BindError::Config(err.to_string()))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// [`BindError::Config`] when the document is malformed or names an
    /// unknown key.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| BindError::Config(err.to_string()))
    }

    /// Load from a file, choosing the format by extension (`.json` is JSON,
    /// anything else TOML).
    ///
    /// # Errors
    ///
    /// [`BindError::Config`] when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| BindError::Config(format!("{}: {err}", path.display())))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_toml_str(&text)?,
        };
        tracing::debug!(path = %path.display(), "binding config loaded");
        Ok(config)
    }
}
