// file: src/config/de.rs
// version: 1.0.0
// guid: c8f6dfa4-51cd-422f-9819-242e86949cdd

//! Lenient deserializers for desired-state documents
//!
//! Settings arrive from hand-written YAML/TOML where `9022`, `"9022"` and
//! `yes` are all expected to work, so scalar fields are normalised here.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Accept a string or number; empty strings become `None`
pub fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(Scalar::into_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Accept a port as a number or a numeric string
pub fn port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Scalar::deserialize(deserializer)?.into_string();
    raw.trim()
        .parse::<u16>()
        .map_err(|e| serde::de::Error::custom(format!("invalid port '{}': {}", raw, e)))
}

/// Boolean-like flag: `true`, `yes`, `1` (any case) are on, everything else off
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(match value {
        Some(Scalar::Bool(b)) => b,
        Some(Scalar::Int(i)) => i == 1,
        Some(other) => parse_flag(&other.into_string()),
        None => false,
    })
}

/// Interpret a textual boolean-like flag
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "optional_scalar")]
        value: Option<String>,
        #[serde(default, deserialize_with = "flag")]
        enabled: bool,
    }

    #[test]
    fn test_optional_scalar_accepts_numbers_and_strings() {
        let p: Probe = serde_yaml::from_str("value: 9022").unwrap();
        assert_eq!(p.value.as_deref(), Some("9022"));

        let p: Probe = serde_yaml::from_str("value: \"eth1 eth2\"").unwrap();
        assert_eq!(p.value.as_deref(), Some("eth1 eth2"));

        let p: Probe = serde_yaml::from_str("value: \"\"").unwrap();
        assert!(p.value.is_none());
    }

    #[test]
    fn test_flag_variants() {
        for (doc, expected) in [
            ("enabled: yes", true),
            ("enabled: \"TRUE\"", true),
            ("enabled: true", true),
            ("enabled: no", false),
            ("enabled: \"false\"", false),
            ("{}", false),
        ] {
            let p: Probe = serde_yaml::from_str(doc).unwrap();
            assert_eq!(p.enabled, expected, "document: {}", doc);
        }
    }
}
