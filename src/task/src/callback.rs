//! Callback descriptor: the tagged variant replacing the legacy
//! union-of-strings-and-records wire encoding (spec.md §9 Design Notes).

use crate::AddTaskArgs;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of: no-op, the local report sink, a delete hint, an HTTP URL to
/// POST to, or a full sub-task record. The string sentinels
/// (`"__report__"`, `"__delete__"`) exist only for wire compatibility with
/// the stored encoding; application code should match on the variant, not
/// the sentinel strings.
#[derive(Debug, Clone)]
pub enum CallbackSpec {
    None,
    Report,
    Delete,
    HttpUrl(String),
    Subtask(Box<AddTaskArgs>),
}

impl Default for CallbackSpec {
    fn default() -> Self {
        CallbackSpec::None
    }
}

impl CallbackSpec {
    /// `on_failure` defaults to `"__report__"` per spec.md §4.1.
    pub fn default_on_failure() -> Self {
        CallbackSpec::Report
    }

    fn from_sentinel_str(s: &str) -> Self {
        match s {
            "__report__" => CallbackSpec::Report,
            "__delete__" => CallbackSpec::Delete,
            other => CallbackSpec::HttpUrl(other.to_string()),
        }
    }

    /// Case-insensitive check used when firing a string callback: any
    /// string starting with `http`/`https` is rewritten into a POST
    /// sub-task per spec.md §4.4.
    pub fn is_http_url(s: &str) -> bool {
        let lower = s.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

impl Serialize for CallbackSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CallbackSpec::None => serializer.serialize_none(),
            CallbackSpec::Report => serializer.serialize_str("__report__"),
            CallbackSpec::Delete => serializer.serialize_str("__delete__"),
            CallbackSpec::HttpUrl(s) => serializer.serialize_str(s),
            CallbackSpec::Subtask(args) => args.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CallbackSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CallbackVisitor;

        impl<'de> Visitor<'de> for CallbackVisitor {
            type Value = CallbackSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(
                    "null, \"__report__\"/\"__delete__\", an http(s) URL, or a sub-task record",
                )
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CallbackSpec::None)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CallbackSpec::None)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(CallbackSpec::from_sentinel_str(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(CallbackSpec::from_sentinel_str(&v))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                let args = AddTaskArgs::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(CallbackSpec::Subtask(Box::new(args)))
            }
        }

        deserializer.deserialize_any(CallbackVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpRequestSpec;

    #[test]
    fn legacy_sentinels_round_trip() {
        let report = CallbackSpec::Report;
        let encoded = serde_json::to_string(&report).unwrap();
        assert_eq!(encoded, "\"__report__\"");
        let decoded: CallbackSpec = serde_json::from_str(&encoded).unwrap();
        assert!(matches!(decoded, CallbackSpec::Report));
    }

    #[test]
    fn null_decodes_to_none() {
        let decoded: CallbackSpec = serde_json::from_str("null").unwrap();
        assert!(matches!(decoded, CallbackSpec::None));
    }

    #[test]
    fn http_string_decodes_to_http_url() {
        let decoded: CallbackSpec = serde_json::from_str("\"http://example.com/hook\"").unwrap();
        assert!(matches!(decoded, CallbackSpec::HttpUrl(u) if u == "http://example.com/hook"));
    }

    #[test]
    fn record_decodes_to_subtask() {
        let args = AddTaskArgs::new(HttpRequestSpec::get("http://x"));
        let encoded = serde_json::to_string(&args).unwrap();
        let decoded: CallbackSpec = serde_json::from_str(&encoded).unwrap();
        assert!(matches!(decoded, CallbackSpec::Subtask(_)));
    }
}
