//! Handler configuration values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{RegistrationError, Result};

/// Configuration passed to a registration handler.
///
/// Configs arrive either as a bare string (typically a URL) or as a
/// structured value. Handlers decode whichever form they support.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HandlerConfig {
    #[default]
    None,
    String(String),
    Json(Value),
}

impl HandlerConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, HandlerConfig::None)
    }

    /// The bare string form, if given as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HandlerConfig::String(s) => Some(s),
            HandlerConfig::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Decode into a handler specific type.
    ///
    /// A string config is first tried as JSON text, then as a JSON string
    /// value, so `"{\"url\":..}"` and `"file:///x"` both work for types that
    /// accept either.
    pub fn decode<C: DeserializeOwned>(&self) -> Result<Option<C>> {
        let value = match self {
            HandlerConfig::None => return Ok(None),
            HandlerConfig::Json(v) => v.clone(),
            HandlerConfig::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
                _ => Value::String(s.clone()),
            },
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RegistrationError::InvalidConfig {
                detail: e.to_string(),
            })
    }
}

impl From<&str> for HandlerConfig {
    fn from(s: &str) -> Self {
        HandlerConfig::String(s.to_string())
    }
}

impl From<String> for HandlerConfig {
    fn from(s: String) -> Self {
        HandlerConfig::String(s)
    }
}

impl From<Value> for HandlerConfig {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => HandlerConfig::None,
            Value::String(s) => HandlerConfig::String(s),
            other => HandlerConfig::Json(other),
        }
    }
}

impl Serialize for HandlerConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            HandlerConfig::None => serializer.serialize_none(),
            HandlerConfig::String(s) => serializer.serialize_str(s),
            HandlerConfig::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for HandlerConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(HandlerConfig::from(Value::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(untagged)]
    enum UrlConfig {
        Url(String),
        Spec { url: String },
    }

    #[test]
    fn decode_either_form() {
        let bare = HandlerConfig::from("file:///repo");
        assert_eq!(
            bare.decode::<UrlConfig>().unwrap(),
            Some(UrlConfig::Url("file:///repo".into()))
        );
        let text = HandlerConfig::from(r#"{"url":"file:///repo"}"#);
        assert_eq!(
            text.decode::<UrlConfig>().unwrap(),
            Some(UrlConfig::Spec { url: "file:///repo".into() })
        );
        let json = HandlerConfig::from(serde_json::json!({"url": "x"}));
        assert!(matches!(json, HandlerConfig::Json(_)));
        assert!(HandlerConfig::None.decode::<UrlConfig>().unwrap().is_none());
    }

    #[test]
    fn decode_failure() {
        let json = HandlerConfig::from(serde_json::json!({"other": 1}));
        assert!(matches!(
            json.decode::<UrlConfig>(),
            Err(RegistrationError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            a: HandlerConfig,
            b: HandlerConfig,
        }
        let doc: Doc = toml::from_str("a = \"url\"\n[b]\nurl = \"x\"\n").unwrap();
        assert_eq!(doc.a.as_str(), Some("url"));
        assert_eq!(doc.b, HandlerConfig::Json(serde_json::json!({"url": "x"})));
    }
}
