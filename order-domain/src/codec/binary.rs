//! Schema 注册二进制编码
//!
//! 帧格式：`[0x00][schema id: u32 大端][字段值...]`。
//! 字段按 Schema 声明顺序依次编码，单个值使用 bincode 标准配置：
//! - `string` / `int` / `long`：bincode 原生编码；
//! - `decimal`：十进制文本；
//! - `enum`：符号下标（u32）；
//! - `timestamp-millis`：i64 毫秒；
//! - `optional`：u8 标记（0 = 空，1 = 有值）后接内部值。
//!
//! 反序列化总是使用帧内 ID 对应的写入方 Schema 解码，再按字段名投影到读取方类型，
//! 因此读取方可以容忍写入方新增的字段。
//!
use super::registry::{FieldType, Schema, SchemaRegistry, value_subject};
use super::{Deserializer, Serializer};
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::Headers;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

/// 帧首字节
pub const MAGIC_BYTE: u8 = 0x00;

const HEADER_LEN: usize = 5;

/// 动态字段值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i32),
    Long(i64),
    Decimal(Decimal),
    Enum(String),
    TimestampMillis(i64),
}

/// 可按 Schema 编解码的具体类型
pub trait BinaryRecord: Sized + Send + Sync + 'static {
    fn schema() -> Schema;

    /// 按 `schema()` 字段顺序给出字段值
    fn to_values(&self) -> Vec<Value>;

    /// 按字段名从通用记录还原
    fn from_record(record: &GenericRecord) -> Result<Self>;
}

/// 不依赖具体类型的解码结果
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRecord {
    schema_id: u32,
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl GenericRecord {
    pub fn schema_id(&self) -> u32 {
        self.schema_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .zip(self.values.iter())
    }

    fn required(&self, name: &str) -> Result<&Value> {
        match self.get(name) {
            Some(Value::Null) | None => Err(DomainError::codec(format!(
                "record {} has no value for `{name}`",
                self.schema.name
            ))),
            Some(value) => Ok(value),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<&str> {
        match self.required(name)? {
            Value::String(s) | Value::Enum(s) => Ok(s),
            other => Err(mismatch(name, "string", other)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i32> {
        match self.required(name)? {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch(name, "int", other)),
        }
    }

    pub fn get_decimal(&self, name: &str) -> Result<Decimal> {
        match self.required(name)? {
            Value::Decimal(v) => Ok(*v),
            other => Err(mismatch(name, "decimal", other)),
        }
    }

    pub fn get_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        match self.required(name)? {
            Value::TimestampMillis(ms) | Value::Long(ms) => DateTime::from_timestamp_millis(*ms)
                .ok_or_else(|| DomainError::codec(format!("`{name}` out of range: {ms}"))),
            other => Err(mismatch(name, "timestamp-millis", other)),
        }
    }
}

fn mismatch(name: &str, expected: &str, found: &Value) -> DomainError {
    DomainError::TypeMismatch {
        expected: format!("{name}: {expected}"),
        found: format!("{found:?}"),
    }
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard()
}

fn put<T: bincode::Encode>(buf: &mut Vec<u8>, value: T) -> Result<()> {
    bincode::encode_into_std_write(value, buf, config())?;
    Ok(())
}

fn take<T: bincode::Decode<()>>(buf: &[u8], pos: &mut usize) -> Result<T> {
    let (value, read) = bincode::decode_from_slice(&buf[*pos..], config())?;
    *pos += read;
    Ok(value)
}

/// 读取带长度前缀的字符串；声明长度超过剩余字节数时直接拒绝，不做预分配
fn take_string(buf: &[u8], pos: &mut usize, name: &str) -> Result<String> {
    let len: u64 = take(buf, pos)?;
    let remaining = buf.len() - *pos;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= remaining)
        .ok_or_else(|| {
            DomainError::codec(format!(
                "`{name}`: string length {len} exceeds remaining {remaining} bytes"
            ))
        })?;
    let text = std::str::from_utf8(&buf[*pos..*pos + len])
        .map_err(|e| DomainError::codec(format!("`{name}`: {e}")))?;
    *pos += len;
    Ok(text.to_string())
}

fn encode_value(buf: &mut Vec<u8>, name: &str, field_type: &FieldType, value: &Value) -> Result<()> {
    match (field_type, value) {
        (FieldType::Optional(_), Value::Null) => put(buf, 0u8),
        (FieldType::Optional(inner), value) => {
            put(buf, 1u8)?;
            encode_value(buf, name, inner, value)
        }
        (FieldType::String, Value::String(s)) => put(buf, s.as_str()),
        (FieldType::Int, Value::Int(v)) => put(buf, *v),
        (FieldType::Long, Value::Long(v)) => put(buf, *v),
        (FieldType::TimestampMillis, Value::TimestampMillis(v)) => put(buf, *v),
        (FieldType::Decimal { precision, scale }, Value::Decimal(d)) => {
            let d = d.normalize();
            let digits = d.mantissa().unsigned_abs().to_string().len() as u32;
            if d.scale() > u32::from(*scale) || digits > u32::from(*precision) {
                return Err(DomainError::codec(format!(
                    "`{name}` = {d} does not fit decimal({precision},{scale})"
                )));
            }
            put(buf, d.to_string())
        }
        (FieldType::Enum { symbols }, Value::Enum(symbol)) => {
            let index = symbols.iter().position(|s| s == symbol).ok_or_else(|| {
                DomainError::codec(format!("`{name}`: symbol {symbol} not in enum"))
            })?;
            put(buf, index as u32)
        }
        (expected, found) => Err(mismatch(name, &expected.to_string(), found)),
    }
}

fn decode_value(buf: &[u8], pos: &mut usize, name: &str, field_type: &FieldType) -> Result<Value> {
    Ok(match field_type {
        FieldType::Optional(inner) => match take::<u8>(buf, pos)? {
            0 => Value::Null,
            1 => decode_value(buf, pos, name, inner)?,
            tag => {
                return Err(DomainError::codec(format!(
                    "`{name}`: invalid optional tag {tag}"
                )));
            }
        },
        FieldType::String => Value::String(take_string(buf, pos, name)?),
        FieldType::Int => Value::Int(take(buf, pos)?),
        FieldType::Long => Value::Long(take(buf, pos)?),
        FieldType::TimestampMillis => Value::TimestampMillis(take(buf, pos)?),
        FieldType::Decimal { .. } => {
            let text = take_string(buf, pos, name)?;
            Value::Decimal(Decimal::from_str(&text)?)
        }
        FieldType::Enum { symbols } => {
            let index: u32 = take(buf, pos)?;
            let symbol = symbols.get(index as usize).ok_or_else(|| {
                DomainError::codec(format!("`{name}`: enum index {index} out of range"))
            })?;
            Value::Enum(symbol.clone())
        }
    })
}

/// 二进制序列化器：首次发布时向注册中心登记 Schema（可关闭）
pub struct BinarySerializer {
    registry: Arc<dyn SchemaRegistry>,
    auto_register: bool,
    ids: DashMap<(String, Schema), u32>,
}

impl BinarySerializer {
    pub fn new(registry: Arc<dyn SchemaRegistry>, auto_register: bool) -> Self {
        Self {
            registry,
            auto_register,
            ids: DashMap::new(),
        }
    }

    fn schema_id(&self, topic: &str, schema: &Schema) -> Result<u32> {
        let subject = value_subject(topic);
        let key = (subject, schema.clone());
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }

        let registered = if self.auto_register {
            self.registry.register(&key.0, schema)?
        } else {
            self.registry.lookup(&key.0, schema)?.ok_or_else(|| {
                DomainError::schema_registry(format!(
                    "schema {} not registered under {} and auto-register is off",
                    schema.name, key.0
                ))
            })?
        };

        self.ids.insert(key, registered.id);
        Ok(registered.id)
    }

    fn encode(&self, topic: &str, schema: &Schema, values: &[Value]) -> Result<Bytes> {
        if values.len() != schema.fields.len() {
            return Err(DomainError::codec(format!(
                "record {} expects {} values, got {}",
                schema.name,
                schema.fields.len(),
                values.len()
            )));
        }
        let id = self.schema_id(topic, schema)?;

        let mut body = Vec::new();
        for (field, value) in schema.fields.iter().zip(values) {
            encode_value(&mut body, &field.name, &field.field_type, value)?;
        }

        let mut framed = BytesMut::with_capacity(HEADER_LEN + body.len());
        framed.put_u8(MAGIC_BYTE);
        framed.put_u32(id);
        framed.extend_from_slice(&body);
        Ok(framed.freeze())
    }
}

impl<T> Serializer<T> for BinarySerializer
where
    T: BinaryRecord,
{
    fn serialize(&self, topic: &str, value: &T, _headers: &mut Headers) -> Result<Bytes> {
        self.encode(topic, &T::schema(), &value.to_values())
    }
}

impl Serializer<GenericRecord> for BinarySerializer {
    fn serialize(&self, topic: &str, value: &GenericRecord, _headers: &mut Headers) -> Result<Bytes> {
        self.encode(topic, &value.schema, &value.values)
    }
}

/// 二进制反序列化器：产出 `GenericRecord`
#[derive(Clone)]
pub struct BinaryDeserializer {
    registry: Arc<dyn SchemaRegistry>,
}

impl BinaryDeserializer {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }
}

impl Deserializer<GenericRecord> for BinaryDeserializer {
    fn deserialize(&self, _topic: &str, _headers: &Headers, payload: &[u8]) -> Result<GenericRecord> {
        if payload.len() < HEADER_LEN {
            return Err(DomainError::codec(format!(
                "frame too short: {} bytes",
                payload.len()
            )));
        }
        if payload[0] != MAGIC_BYTE {
            return Err(DomainError::codec(format!(
                "unknown magic byte {:#04x}",
                payload[0]
            )));
        }
        let id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
        let writer = self.registry.schema_by_id(id)?;

        let body = &payload[HEADER_LEN..];
        let mut pos = 0;
        let mut values = Vec::with_capacity(writer.schema.fields.len());
        for field in &writer.schema.fields {
            values.push(decode_value(body, &mut pos, &field.name, &field.field_type)?);
        }
        if pos != body.len() {
            return Err(DomainError::codec(format!(
                "{} trailing bytes after record {}",
                body.len() - pos,
                writer.schema.name
            )));
        }

        Ok(GenericRecord {
            schema_id: id,
            schema: writer.schema,
            values,
        })
    }
}

/// 具体类型的二进制反序列化器
pub struct SpecificBinaryDeserializer<T> {
    generic: BinaryDeserializer,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SpecificBinaryDeserializer<T> {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            generic: BinaryDeserializer::new(registry),
            _marker: PhantomData,
        }
    }
}

impl<T> Deserializer<T> for SpecificBinaryDeserializer<T>
where
    T: BinaryRecord,
{
    fn deserialize(&self, topic: &str, headers: &Headers, payload: &[u8]) -> Result<T> {
        let record = self.generic.deserialize(topic, headers, payload)?;
        T::from_record(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::registry::{Field, InMemorySchemaRegistry};
    use crate::domain_event::OrderEvent;
    use crate::order::OrderStatus;

    fn registry() -> Arc<InMemorySchemaRegistry> {
        Arc::new(InMemorySchemaRegistry::new())
    }

    fn event() -> OrderEvent {
        let mut ev = OrderEvent::new("ORD-1", "CUST-1", 5, Decimal::new(1999, 2));
        ev.status = OrderStatus::Shipped;
        // 二进制编码只保留毫秒
        ev.occurred_at = DateTime::from_timestamp_millis(1_705_312_200_123).unwrap();
        ev
    }

    #[test]
    fn frame_carries_magic_and_schema_id() {
        let registry = registry();
        let ser = BinarySerializer::new(registry.clone(), true);
        let bytes = ser.serialize("orders-binary", &event(), &mut Headers::new()).unwrap();

        assert_eq!(bytes[0], MAGIC_BYTE);
        let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let registered = registry.latest("orders-binary-value").unwrap().unwrap();
        assert_eq!(registered.id, id);
        assert_eq!(registered.schema.as_ref(), &OrderEvent::schema());
    }

    #[test]
    fn generic_and_specific_readers() {
        let registry = registry();
        let ser = BinarySerializer::new(registry.clone(), true);
        let ev = event();
        let bytes = ser.serialize("orders-binary", &ev, &mut Headers::new()).unwrap();

        let record = BinaryDeserializer::new(registry.clone())
            .deserialize("orders-binary", &Headers::new(), &bytes)
            .unwrap();
        assert_eq!(record.get("order_id"), Some(&Value::String("ORD-1".into())));
        assert_eq!(record.get("status"), Some(&Value::Enum("SHIPPED".into())));
        assert_eq!(record.get("price"), Some(&Value::Decimal(Decimal::new(1999, 2))));
        assert_eq!(record.get("missing"), None);

        let typed = SpecificBinaryDeserializer::<OrderEvent>::new(registry)
            .deserialize("orders-binary", &Headers::new(), &bytes)
            .unwrap();
        assert_eq!(typed, ev);
    }

    #[test]
    fn auto_register_off_requires_registered_schema() {
        let registry = registry();
        let ser = BinarySerializer::new(registry.clone(), false);
        match ser
            .serialize("orders-binary", &event(), &mut Headers::new())
            .unwrap_err()
        {
            DomainError::SchemaRegistry { .. } => {}
            other => panic!("unexpected {other:?}"),
        }

        registry
            .register("orders-binary-value", &OrderEvent::schema())
            .unwrap();
        assert!(ser.serialize("orders-binary", &event(), &mut Headers::new()).is_ok());
    }

    #[test]
    fn price_beyond_scale_is_rejected() {
        let ser = BinarySerializer::new(registry(), true);
        let mut ev = event();
        ev.price = Decimal::new(19_999, 3);
        assert!(ser.serialize("orders-binary", &ev, &mut Headers::new()).is_err());
    }

    #[test]
    fn malformed_frames_are_errors() {
        let registry = registry();
        let de = BinaryDeserializer::new(registry.clone());
        let headers = Headers::new();

        assert!(de.deserialize("t", &headers, &[0x00, 0x00]).is_err());
        assert!(de.deserialize("t", &headers, &[0x01, 0, 0, 0, 1]).is_err());
        // 未知 schema id
        assert!(de.deserialize("t", &headers, &[0x00, 0, 0, 0, 99]).is_err());

        let ser = BinarySerializer::new(registry, true);
        let mut bytes = ser
            .serialize("t", &event(), &mut Headers::new())
            .unwrap()
            .to_vec();
        bytes.push(0xff);
        assert!(de.deserialize("t", &headers, &bytes).is_err());
        bytes.truncate(bytes.len() - 4);
        assert!(de.deserialize("t", &headers, &bytes).is_err());
    }

    #[test]
    fn oversized_string_length_becomes_inline_failure() {
        use crate::codec::{Delivery, ErrorHandlingDeserializer};

        let registry = registry();
        let id = registry
            .register("orders-binary-value", &OrderEvent::schema())
            .unwrap()
            .id;

        // order_id 声明 2^40 字节，实际只跟了 3 字节
        let mut frame = vec![MAGIC_BYTE];
        frame.extend_from_slice(&id.to_be_bytes());
        frame.push(0xfd);
        frame.extend_from_slice(&(1u64 << 40).to_le_bytes());
        frame.extend_from_slice(b"abc");

        let de = BinaryDeserializer::new(registry.clone());
        match de.deserialize("orders-binary", &Headers::new(), &frame).unwrap_err() {
            DomainError::Codec { reason } => assert!(reason.contains("order_id"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }

        let isolating = ErrorHandlingDeserializer::new(BinaryDeserializer::new(registry));
        let delivery = isolating.deserialize("orders-binary", &Headers::new(), &Bytes::from(frame));
        assert!(delivery.is_failed());
        assert!(matches!(delivery, Delivery::Failed(ref f) if f.raw.len() == 17));
    }

    #[test]
    fn reader_tolerates_fields_added_by_writer() {
        let registry = registry();
        let mut schema = OrderEvent::schema();
        schema.fields.push(Field::new(
            "channel",
            FieldType::Optional(Box::new(FieldType::String)),
        ));
        let ev = event();
        let mut values = ev.to_values();
        values.push(Value::String("web".into()));

        let ser = BinarySerializer::new(registry.clone(), true);
        let record = GenericRecord {
            schema_id: 0,
            schema: Arc::new(schema),
            values,
        };
        let bytes = ser.serialize("t", &record, &mut Headers::new()).unwrap();

        let typed = SpecificBinaryDeserializer::<OrderEvent>::new(registry)
            .deserialize("t", &Headers::new(), &bytes)
            .unwrap();
        assert_eq!(typed, ev);
    }
}
