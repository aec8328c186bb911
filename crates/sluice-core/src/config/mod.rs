use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Tableau 10, the default node palette.
pub const DEFAULT_PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2c", "#e15759", "#76b7b2", "#59a14f", "#edc949", "#af7aa1", "#ff9da7",
    "#9c755f", "#bab0ab",
];

/// JSON-shaped chart configuration.
///
/// Keys are camelCase and grouped by concern (`layout`, `entry`, `style`, `svg`, `flow`). Typed
/// option structs elsewhere in the workspace read from this with dotted paths, falling back to
/// their own defaults when a key is missing or has the wrong type.
#[derive(Debug, Clone, PartialEq)]
pub struct SankeyConfig(Value);

impl Default for SankeyConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SankeyConfig {
    pub fn empty_object() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// The built-in defaults every lookup falls back to.
    pub fn defaults() -> Self {
        Self(json!({
            "layout": {
                "width": 800.0,
                "height": 500.0,
                "nodeWidth": 30.0,
                "nodePadding": 20.0,
                "minNodeHeight": 10.0,
                "heightScale": 0.6,
                "linkScale": 1.2,
            },
            "entry": {
                "enabled": true,
                "label": "Entry",
            },
            "style": {
                "palette": DEFAULT_PALETTE,
                "nodeCornerRadius": 4.0,
                "nodeOpacity": 0.9,
                "nodeHoverOpacity": 1.0,
                "nodeHoverScale": 1.05,
                "linkOpacity": 0.4,
                "linkHoverOpacity": 0.7,
            },
            "svg": {
                "showValues": true,
                "prefix": "",
                "suffix": "",
                "labelFontSize": 13.0,
            },
            "flow": {
                "maxHops": 3,
                "rootLabel": "Home",
                "unknownLabel": "Unknown",
                "aliases": {
                    "login": "Login",
                    "register": "Register",
                    "search": "Search",
                    "submit": "Submit",
                },
            },
        }))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Defaults with `overrides` deep-merged on top.
    pub fn with_overrides(overrides: &Value) -> Self {
        let mut cfg = Self::defaults();
        cfg.deep_merge(overrides);
        cfg
    }

    /// Parses a JSON document and merges it onto the defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_overrides(value)
    }

    /// Parses a YAML document and merges it onto the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_overrides(value)
    }

    fn from_overrides(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::defaults()),
            Value::Object(_) => Ok(Self::with_overrides(&value)),
            other => Err(Error::InvalidConfig {
                message: format!("expected a mapping at the top level, found {}", kind(&other)),
            }),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn get(&self, dotted_path: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in dotted_path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    pub fn get_str(&self, dotted_path: &str) -> Option<&str> {
        self.get(dotted_path)?.as_str()
    }

    pub fn get_bool(&self, dotted_path: &str) -> Option<bool> {
        self.get(dotted_path)?.as_bool()
    }

    pub fn get_f64(&self, dotted_path: &str) -> Option<f64> {
        self.get(dotted_path)?.as_f64().filter(|v| v.is_finite())
    }

    pub fn get_usize(&self, dotted_path: &str) -> Option<usize> {
        self.get(dotted_path)?
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
    }

    /// Reads an array of strings, skipping non-string entries.
    pub fn get_str_list(&self, dotted_path: &str) -> Option<Vec<String>> {
        let items = self.get(dotted_path)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    pub fn set_value(&mut self, dotted_path: &str, value: Value) {
        // Callers can construct a config from any JSON value via `from_value`; coerce non-objects
        // so this never panics on user input.
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }

        let Value::Object(ref mut root) = self.0 else {
            return;
        };
        let mut cur: &mut Map<String, Value> = root;
        let mut segments = dotted_path.split('.').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_none() {
                cur.insert(seg.to_string(), value);
                return;
            }
            let slot = cur.entry(seg).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(next) = slot.as_object_mut() else {
                return;
            };
            cur = next;
        }
    }

    pub fn deep_merge(&mut self, other: &Value) {
        deep_merge_value(&mut self.0, other);
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(in_map)) => {
            for (key, in_value) in in_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_value(base_value, in_value),
                    None => {
                        base_map.insert(key.clone(), in_value.clone());
                    }
                }
            }
        }
        (base_slot, in_value) => {
            *base_slot = in_value.clone();
        }
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_expose_reference_scales() {
        let cfg = SankeyConfig::defaults();
        assert_eq!(cfg.get_f64("layout.heightScale"), Some(0.6));
        assert_eq!(cfg.get_f64("layout.linkScale"), Some(1.2));
        assert_eq!(cfg.get_str("entry.label"), Some("Entry"));
        assert_eq!(cfg.get_str_list("style.palette").map(|p| p.len()), Some(10));
    }

    #[test]
    fn overrides_merge_without_dropping_siblings() {
        let cfg = SankeyConfig::with_overrides(&json!({"layout": {"width": 1200}}));
        assert_eq!(cfg.get_f64("layout.width"), Some(1200.0));
        assert_eq!(cfg.get_f64("layout.height"), Some(500.0));
    }

    #[test]
    fn yaml_overrides_are_accepted() {
        let cfg = SankeyConfig::from_yaml_str("entry:\n  label: Start\n").unwrap();
        assert_eq!(cfg.get_str("entry.label"), Some("Start"));
        assert_eq!(cfg.get_bool("entry.enabled"), Some(true));
    }

    #[test]
    fn non_mapping_config_is_rejected() {
        let err = SankeyConfig::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }), "{err}");
    }

    #[test]
    fn set_value_coerces_scalars_into_objects() {
        let mut cfg = SankeyConfig::from_value(json!(3));
        cfg.set_value("svg.prefix", json!("$"));
        assert_eq!(cfg.get_str("svg.prefix"), Some("$"));
    }
}
