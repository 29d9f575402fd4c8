//! Serialization of variants to and from extended JSON ("ejson").
//!
//! Two format families are offered, named after the option set `spec.md`
//! calls out: `PlainEjson` casts every number to an ordinary JSON number
//! (lossy for `longint`/`ulongint` magnitudes a double can't hold
//! exactly) and emits byte sequences per `ByteSequenceEncoding`;
//! `RealEjson` tags `longint`/`ulongint` with a single-key wrapper
//! object so the distinction survives a round trip.

use std::sync::Arc;

use serde_json::{Map, Number, Value};

use crate::error::{VariantError, VariantResult};
use crate::variant::Variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjsonFormat {
    PlainEjson,
    RealEjson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteSequenceEncoding {
    Hex,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    pub format: EjsonFormat,
    pub byte_sequence: ByteSequenceEncoding,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            format: EjsonFormat::PlainEjson,
            byte_sequence: ByteSequenceEncoding::Base64,
        }
    }
}

const LONGINT_KEY: &str = "$longint";
const ULONGINT_KEY: &str = "$ulongint";
const BSEQUENCE_HEX_KEY: &str = "$bsequence-hex";
const BSEQUENCE_B64_KEY: &str = "$bsequence-b64";

pub fn to_ejson(variant: &Variant, options: SerializeOptions) -> VariantResult<Value> {
    Ok(match variant {
        Variant::Null => Value::Null,
        Variant::Boolean(b) => Value::Bool(*b),
        Variant::Number(n) => Number::from_f64(*n)
            .map(Value::Number)
            .ok_or(VariantError::Unrepresentable)?,
        Variant::LongInt(n) => match options.format {
            EjsonFormat::RealEjson => tagged_string(LONGINT_KEY, n.to_string()),
            EjsonFormat::PlainEjson => Value::Number(Number::from(*n)),
        },
        Variant::ULongInt(n) => match options.format {
            EjsonFormat::RealEjson => tagged_string(ULONGINT_KEY, n.to_string()),
            EjsonFormat::PlainEjson => Value::Number(Number::from(*n)),
        },
        Variant::String(s) => Value::String(s.to_string()),
        Variant::ByteSequence(bytes) => match options.byte_sequence {
            ByteSequenceEncoding::Hex => tagged_string(BSEQUENCE_HEX_KEY, hex_encode(bytes)),
            ByteSequenceEncoding::Base64 => {
                use base64::Engine;
                tagged_string(
                    BSEQUENCE_B64_KEY,
                    base64::engine::general_purpose::STANDARD.encode(bytes.as_ref()),
                )
            }
        },
        Variant::Array(container) => Value::Array(
            container
                .read()
                .iter()
                .map(|v| to_ejson(v, options))
                .collect::<VariantResult<Vec<_>>>()?,
        ),
        Variant::Object(container) => {
            let mut map = Map::new();
            for (key, value) in container.read().iter() {
                map.insert(key.to_string(), to_ejson(value, options)?);
            }
            Value::Object(map)
        }
        Variant::Set(container) => Value::Array(
            container
                .read()
                .iter()
                .map(|v| to_ejson(v, options))
                .collect::<VariantResult<Vec<_>>>()?,
        ),
        Variant::Tuple(items) => Value::Array(
            items
                .iter()
                .map(|v| to_ejson(v, options))
                .collect::<VariantResult<Vec<_>>>()?,
        ),
        Variant::Native(_) | Variant::Dynamic(_) => return Err(VariantError::Unrepresentable),
    })
}

pub fn from_ejson(value: &Value, options: SerializeOptions) -> VariantResult<Variant> {
    Ok(match value {
        Value::Null => Variant::Null,
        Value::Bool(b) => Variant::Boolean(*b),
        Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                Variant::Number(v)
            } else {
                return Err(VariantError::Unrepresentable);
            }
        }
        Value::String(s) => Variant::make_string(s.as_str()),
        Value::Array(items) => Variant::make_array(
            items
                .iter()
                .map(|v| from_ejson(v, options))
                .collect::<VariantResult<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            if let Some(tagged) = single_tagged_string(map, LONGINT_KEY) {
                return tagged
                    .parse::<i64>()
                    .map(Variant::LongInt)
                    .map_err(|_| VariantError::Unrepresentable);
            }
            if let Some(tagged) = single_tagged_string(map, ULONGINT_KEY) {
                return tagged
                    .parse::<u64>()
                    .map(Variant::ULongInt)
                    .map_err(|_| VariantError::Unrepresentable);
            }
            if let Some(tagged) = single_tagged_string(map, BSEQUENCE_HEX_KEY) {
                return hex_decode(&tagged)
                    .map(Variant::make_byte_sequence)
                    .ok_or(VariantError::Unrepresentable);
            }
            if let Some(tagged) = single_tagged_string(map, BSEQUENCE_B64_KEY) {
                use base64::Engine;
                return base64::engine::general_purpose::STANDARD
                    .decode(tagged.as_bytes())
                    .map(|bytes| Variant::make_byte_sequence(Arc::<[u8]>::from(bytes)))
                    .map_err(|_| VariantError::Unrepresentable);
            }
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                entries.push((Arc::<str>::from(key.as_str()), from_ejson(value, options)?));
            }
            Variant::make_object(entries)
        }
    })
}

fn tagged_string(key: &str, value: String) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), Value::String(value));
    Value::Object(map)
}

fn single_tagged_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    if map.len() != 1 {
        return None;
    }
    match map.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Arc<[u8]>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let byte = u8::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
        out.push(byte);
    }
    Some(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ejson_round_trips_the_json_representable_subset() {
        let options = SerializeOptions::default();
        let original = Variant::make_object([
            (Arc::from("n"), Variant::make_number(1.5)),
            (Arc::from("s"), Variant::make_string("hello")),
            (
                Arc::from("a"),
                Variant::make_array([Variant::make_boolean(true), Variant::Null]),
            ),
        ]);
        let value = to_ejson(&original, options).unwrap();
        let back = from_ejson(&value, options).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn real_ejson_round_trips_long_int() {
        let options = SerializeOptions {
            format: EjsonFormat::RealEjson,
            byte_sequence: ByteSequenceEncoding::Base64,
        };
        let original = Variant::LongInt(-9_000_000_000_000);
        let value = to_ejson(&original, options).unwrap();
        let back = from_ejson(&value, options).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn byte_sequence_round_trips_through_both_encodings() {
        for encoding in [ByteSequenceEncoding::Hex, ByteSequenceEncoding::Base64] {
            let options = SerializeOptions {
                format: EjsonFormat::RealEjson,
                byte_sequence: encoding,
            };
            let original = Variant::make_byte_sequence(Arc::<[u8]>::from(vec![0u8, 1, 255, 16]));
            let value = to_ejson(&original, options).unwrap();
            let back = from_ejson(&value, options).unwrap();
            assert_eq!(original, back);
        }
    }

    #[test]
    fn native_and_dynamic_are_unrepresentable() {
        struct Noop;
        impl crate::native::NativeEntity for Noop {
            fn type_name(&self) -> &'static str {
                "noop"
            }
        }
        let native = Variant::make_native(Arc::new(Noop));
        assert!(matches!(
            to_ejson(&native, SerializeOptions::default()),
            Err(VariantError::Unrepresentable)
        ));
    }
}
