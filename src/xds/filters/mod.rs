//! Typed-config helpers shared by every Envoy resource this crate builds.
//!
//! Nested Envoy configuration is carried as `google.protobuf.Any`. Model files can also embed
//! raw typed configs (a type URL plus base64 protobuf bytes) for filters the compiler does not
//! know about; [`TypedConfig`] is that JSON/YAML-friendly form.

pub mod http;

use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine;
use envoy_types::pb::google::protobuf::{value::Kind, Any, ListValue, Struct, Value};
use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STRUCT_TYPE_URL: &str = "type.googleapis.com/google.protobuf.Struct";

// Field numbers of the well-known types written by hand below
const STRUCT_FIELDS_TAG: u32 = 1;
const MAP_KEY_TAG: u32 = 1;
const MAP_VALUE_TAG: u32 = 2;
const VALUE_STRUCT_TAG: u32 = 5;
const VALUE_LIST_TAG: u32 = 6;
const LIST_VALUES_TAG: u32 = 1;

/// Binary protobuf payload serialized as base64 in JSON/YAML
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64Bytes(pub Vec<u8>);

impl Serialize for Base64Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&BASE64_ENGINE.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = BASE64_ENGINE
            .decode(encoded.as_bytes())
            .map_err(|err| serde::de::Error::custom(err.to_string()))?;
        Ok(Base64Bytes(decoded))
    }
}

/// A typed Envoy payload: fully-qualified type URL plus encoded message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedConfig {
    pub type_url: String,
    #[serde(default)]
    pub value: Base64Bytes,
}

impl TypedConfig {
    pub fn from_message<M: Message>(type_url: impl Into<String>, msg: &M) -> Self {
        Self { type_url: type_url.into(), value: Base64Bytes(msg.encode_to_vec()) }
    }

    pub fn to_any(&self) -> Any {
        Any { type_url: self.type_url.clone(), value: self.value.0.clone() }
    }
}

/// Encode `msg` as an `Any` with the given type URL
pub fn any_from_message<M: Message>(type_url: impl Into<String>, msg: &M) -> Any {
    TypedConfig::from_message(type_url, msg).to_any()
}

/// `Struct` packed as an `Any`, encoded with [`encode_struct`]
pub fn struct_any(value: &Struct) -> Any {
    Any { type_url: STRUCT_TYPE_URL.to_string(), value: encode_struct(value) }
}

/// Encode a `Struct` with its fields in key order at every nesting level.
///
/// `Struct::fields` is a `HashMap`, so `Message::encode` emits entries in iteration order,
/// which differs between runs. Every `Struct` that ends up in compiled output goes through here.
pub fn encode_struct(value: &Struct) -> Vec<u8> {
    let sorted: BTreeMap<&String, &Value> = value.fields.iter().collect();

    let mut buf = Vec::new();
    for (key, field) in sorted {
        let mut entry = Vec::new();
        prost::encoding::string::encode(MAP_KEY_TAG, key, &mut entry);
        encode_message_field(MAP_VALUE_TAG, &encode_value(field), &mut entry);
        encode_message_field(STRUCT_FIELDS_TAG, &entry, &mut buf);
    }
    buf
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    match &value.kind {
        Some(Kind::StructValue(inner)) => {
            encode_message_field(VALUE_STRUCT_TAG, &encode_struct(inner), &mut buf);
        }
        Some(Kind::ListValue(list)) => {
            let mut items = Vec::new();
            for item in &list.values {
                encode_message_field(LIST_VALUES_TAG, &encode_value(item), &mut items);
            }
            encode_message_field(VALUE_LIST_TAG, &items, &mut buf);
        }
        // scalars carry no maps
        _ => return value.encode_to_vec(),
    }
    buf
}

/// Append an already-encoded embedded message as field `tag`
pub fn encode_message_field(tag: u32, payload: &[u8], buf: &mut Vec<u8>) {
    encode_key(tag, WireType::LengthDelimited, buf);
    encode_varint(payload.len() as u64, buf);
    buf.extend_from_slice(payload);
}

/// Convert a JSON value into a `google.protobuf.Value`
pub fn proto_value(value: &serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => {
            Kind::ListValue(ListValue { values: items.iter().map(proto_value).collect() })
        }
        serde_json::Value::Object(map) => Kind::StructValue(proto_struct(map)),
    };
    Value { kind: Some(kind) }
}

/// Convert a JSON object into a `google.protobuf.Struct`
pub fn proto_struct(map: &serde_json::Map<String, serde_json::Value>) -> Struct {
    Struct { fields: map.iter().map(|(key, value)| (key.clone(), proto_value(value))).collect() }
}

/// Struct whose every field is a string
pub fn string_struct<'a, I>(entries: I) -> Struct
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    Struct {
        fields: entries
            .into_iter()
            .map(|(key, value)| {
                (key.to_string(), Value { kind: Some(Kind::StringValue(value.to_string())) })
            })
            .collect(),
    }
}

/// Configuration error for a filter definition
pub fn invalid_config(msg: impl Into<String>) -> crate::Error {
    crate::Error::config(msg.into())
}
