//! 结构化文本编码
//!
//! 生产侧把事件类型名写入 `__TypeId__` 消息头；消费侧可选择：
//! - `JsonDeserializer<T>`：固定目标类型，按配置决定是否核对类型头；
//! - `GenericJsonDeserializer`：不预知类型，按类型头还原为 `TypedPayload`，
//!   再由调用方按类型名向下转换。
//!
use super::{Deserializer, Serializer};
use crate::domain_event::DomainEvent;
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::Headers;
use bytes::Bytes;
use std::marker::PhantomData;

/// 类型元数据消息头
pub const TYPE_ID_HEADER: &str = "__TypeId__";

#[derive(Debug, Clone, Copy)]
pub struct JsonSerializer {
    add_type_info_headers: bool,
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self {
            add_type_info_headers: true,
        }
    }
}

impl JsonSerializer {
    pub fn new(add_type_info_headers: bool) -> Self {
        Self {
            add_type_info_headers,
        }
    }
}

impl<T> Serializer<T> for JsonSerializer
where
    T: DomainEvent,
{
    fn serialize(&self, _topic: &str, value: &T, headers: &mut Headers) -> Result<Bytes> {
        let body = serde_json::to_vec(value)?;
        if self.add_type_info_headers {
            headers.insert(TYPE_ID_HEADER, T::TYPE);
        }
        Ok(Bytes::from(body))
    }
}

/// 固定目标类型的 JSON 反序列化器
pub struct JsonDeserializer<T> {
    use_type_info_headers: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    /// `use_type_info_headers = false` 时忽略类型头，直接按 `T` 解析
    pub fn new(use_type_info_headers: bool) -> Self {
        Self {
            use_type_info_headers,
            _marker: PhantomData,
        }
    }
}

impl<T> Deserializer<T> for JsonDeserializer<T>
where
    T: DomainEvent,
{
    fn deserialize(&self, _topic: &str, headers: &Headers, payload: &[u8]) -> Result<T> {
        if self.use_type_info_headers {
            if let Some(found) = headers.get_str(TYPE_ID_HEADER) {
                if found != T::TYPE {
                    return Err(DomainError::TypeMismatch {
                        expected: T::TYPE.to_string(),
                        found: found.to_string(),
                    });
                }
            }
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

/// 通用消费者收到的载荷：类型名（来自消息头）+ JSON 树
#[derive(Debug, Clone, PartialEq)]
pub struct TypedPayload {
    pub type_name: Option<String>,
    pub value: serde_json::Value,
}

impl TypedPayload {
    pub fn is<T: DomainEvent>(&self) -> bool {
        self.type_name.as_deref() == Some(T::TYPE)
    }

    /// 按类型名向下转换；类型名缺失或不符返回 `TypeMismatch`
    pub fn downcast<T: DomainEvent>(&self) -> Result<T> {
        if !self.is::<T>() {
            return Err(DomainError::TypeMismatch {
                expected: T::TYPE.to_string(),
                found: self
                    .type_name
                    .clone()
                    .unwrap_or_else(|| "<none>".to_string()),
            });
        }
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// 不预知类型的 JSON 反序列化器
#[derive(Debug, Clone, Copy)]
pub struct GenericJsonDeserializer {
    use_type_info_headers: bool,
}

impl Default for GenericJsonDeserializer {
    fn default() -> Self {
        Self {
            use_type_info_headers: true,
        }
    }
}

impl GenericJsonDeserializer {
    pub fn new(use_type_info_headers: bool) -> Self {
        Self {
            use_type_info_headers,
        }
    }
}

impl Deserializer<TypedPayload> for GenericJsonDeserializer {
    fn deserialize(&self, _topic: &str, headers: &Headers, payload: &[u8]) -> Result<TypedPayload> {
        let type_name = self
            .use_type_info_headers
            .then(|| headers.get_str(TYPE_ID_HEADER).map(str::to_string))
            .flatten();

        Ok(TypedPayload {
            type_name,
            value: serde_json::from_slice(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::OrderEvent;
    use rust_decimal::Decimal;

    fn event() -> OrderEvent {
        OrderEvent::new("ORD-1", "CUST-1", 5, Decimal::new(1999, 2))
    }

    #[test]
    fn serializer_writes_type_header() {
        let mut headers = Headers::new();
        let bytes = JsonSerializer::default()
            .serialize("orders", &event(), &mut headers)
            .unwrap();

        assert_eq!(headers.get_str(TYPE_ID_HEADER), Some(OrderEvent::TYPE));
        let tree: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(tree["order_id"], "ORD-1");
        assert_eq!(tree["status"], "PENDING");
    }

    #[test]
    fn serializer_without_type_header() {
        let mut headers = Headers::new();
        JsonSerializer::new(false)
            .serialize("orders", &event(), &mut headers)
            .unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn typed_deserializer_honors_or_ignores_header() {
        let mut headers = Headers::new();
        let ev = event();
        let bytes = JsonSerializer::default()
            .serialize("orders", &ev, &mut headers)
            .unwrap();

        let strict = JsonDeserializer::<OrderEvent>::new(true);
        assert_eq!(strict.deserialize("orders", &headers, &bytes).unwrap(), ev);

        let mut foreign = Headers::new();
        foreign.insert(TYPE_ID_HEADER, "payment.event");
        match strict.deserialize("orders", &foreign, &bytes).unwrap_err() {
            DomainError::TypeMismatch { found, .. } => assert_eq!(found, "payment.event"),
            other => panic!("unexpected {other:?}"),
        }

        // 忽略类型头时按默认类型解析
        let lenient = JsonDeserializer::<OrderEvent>::new(false);
        assert_eq!(lenient.deserialize("orders", &foreign, &bytes).unwrap(), ev);
    }

    #[test]
    fn generic_deserializer_reconstructs_by_type_name() {
        let mut headers = Headers::new();
        let ev = event();
        let bytes = JsonSerializer::default()
            .serialize("orders", &ev, &mut headers)
            .unwrap();

        let payload = GenericJsonDeserializer::default()
            .deserialize("orders", &headers, &bytes)
            .unwrap();
        assert!(payload.is::<OrderEvent>());
        assert_eq!(payload.downcast::<OrderEvent>().unwrap(), ev);

        let untyped = GenericJsonDeserializer::default()
            .deserialize("orders", &Headers::new(), &bytes)
            .unwrap();
        assert_eq!(untyped.type_name, None);
        assert!(untyped.downcast::<OrderEvent>().is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let de = JsonDeserializer::<OrderEvent>::new(false);
        assert!(de.deserialize("orders", &Headers::new(), b"{not json").is_err());
    }
}
