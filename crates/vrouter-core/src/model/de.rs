// ── Lenient field decoders ──
//
// The upstream producer is not consistent about JSON types: booleans
// arrive as `"true"`, NIC ids as strings, rule ids as numbers. These
// helpers accept every shape seen on the wire.

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Bool(bool),
    Str(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarRepr {
    Num(serde_json::Number),
    Str(String),
}

pub(crate) fn default_true() -> bool {
    true
}

/// Decode `true` / `"true"` / `"yes"` / `"1"` (and their negatives).
pub(crate) fn flexible_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    match BoolRepr::deserialize(d)? {
        BoolRepr::Bool(b) => Ok(b),
        BoolRepr::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid boolean '{other}'"))),
        },
    }
}

/// Decode an identifier as its literal text.
///
/// Numbers keep their JSON spelling and strings are taken verbatim, so
/// `"007"` and `7` stay distinct keys.
pub(crate) fn opaque_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match ScalarRepr::deserialize(d)? {
        ScalarRepr::Num(n) => Ok(n.to_string()),
        ScalarRepr::Str(s) => Ok(s),
    }
}

/// Decode a small unsigned integer that may arrive quoted.
pub(crate) fn flexible_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    match ScalarRepr::deserialize(d)? {
        ScalarRepr::Num(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid unsigned integer {n}"))),
        ScalarRepr::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid unsigned integer '{s}'"))),
    }
}

/// Render a JSON scalar the way `opaque_id` would, for keys read out of
/// raw payload values.
pub(crate) fn opaque_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
