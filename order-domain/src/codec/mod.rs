//! 编解码（codec）
//!
//! 同一领域事件的两条独立编码管线：
//! - 结构化文本（`json`）：可读 JSON，类型元数据写入消息头；
//! - Schema 注册二进制（`binary`）：紧凑二进制，按注册中心的 Schema ID 成帧。
//!
//! 所有消费者都通过 `ErrorHandlingDeserializer` 包装值反序列化器，
//! 把格式错误转换为内联的失败值，而不是中断拉取循环。
//!
mod binary;
mod isolating;
mod json;
mod registry;

pub use binary::{
    BinaryDeserializer, BinaryRecord, BinarySerializer, GenericRecord, MAGIC_BYTE,
    SpecificBinaryDeserializer, Value,
};
pub use isolating::{DeserializationFailure, Delivery, ErrorHandlingDeserializer};
pub(crate) use isolating::panic_message;
pub use json::{GenericJsonDeserializer, JsonDeserializer, JsonSerializer, TYPE_ID_HEADER, TypedPayload};
pub use registry::{
    Field, FieldType, InMemorySchemaRegistry, RegisteredSchema, Schema, SchemaRegistry,
    value_subject,
};

use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::Headers;
use bytes::Bytes;

/// 值序列化器
pub trait Serializer<T: ?Sized>: Send + Sync {
    /// 序列化消息值，可向 `headers` 写入元数据
    fn serialize(&self, topic: &str, value: &T, headers: &mut Headers) -> Result<Bytes>;
}

/// 值反序列化器
pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, topic: &str, headers: &Headers, payload: &[u8]) -> Result<T>;
}

/// UTF-8 字符串序列化器
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer<str> for StringSerializer {
    fn serialize(&self, _topic: &str, value: &str, _headers: &mut Headers) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl Serializer<String> for StringSerializer {
    fn serialize(&self, topic: &str, value: &String, headers: &mut Headers) -> Result<Bytes> {
        <Self as Serializer<str>>::serialize(self, topic, value.as_str(), headers)
    }
}

/// UTF-8 字符串反序列化器
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl Deserializer<String> for StringDeserializer {
    fn deserialize(&self, _topic: &str, _headers: &Headers, payload: &[u8]) -> Result<String> {
        String::from_utf8(payload.to_vec())
            .map_err(|e| DomainError::codec(format!("payload is not valid UTF-8: {e}")))
    }
}
