//! 错误隔离的反序列化包装
//!
//! 包装任意值反序列化器：解码失败（包括解码器内部 panic）不会中断拉取循环，
//! 而是作为 `Delivery::Failed` 随记录一起交给监听器。
//!
use super::Deserializer;
use crate::eventing::Headers;
use bytes::Bytes;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// 解码失败：保留原始字节便于排查
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializationFailure {
    pub topic: String,
    pub reason: String,
    pub raw: Bytes,
}

impl DeserializationFailure {
    /// 原始载荷的可读形式（非 UTF-8 部分以替换字符显示）
    pub fn raw_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// 单条记录的解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Value(T),
    Failed(DeserializationFailure),
}

impl<T> Delivery<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Delivery::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Delivery::Value(v) => Some(v),
            Delivery::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, DeserializationFailure> {
        match self {
            Delivery::Value(v) => Ok(v),
            Delivery::Failed(f) => Err(f),
        }
    }
}

pub struct ErrorHandlingDeserializer<T> {
    inner: Arc<dyn Deserializer<T>>,
}

impl<T> Clone for ErrorHandlingDeserializer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ErrorHandlingDeserializer<T> {
    pub fn new(inner: impl Deserializer<T> + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn deserialize(&self, topic: &str, headers: &Headers, payload: &Bytes) -> Delivery<T> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.inner.deserialize(topic, headers, payload)
        }));

        let reason = match outcome {
            Ok(Ok(value)) => return Delivery::Value(value),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("deserializer panicked: {}", panic_message(&*panic)),
        };

        tracing::warn!(topic, %reason, bytes = payload.len(), "value deserialization failed");
        Delivery::Failed(DeserializationFailure {
            topic: topic.to_string(),
            reason,
            raw: payload.clone(),
        })
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
