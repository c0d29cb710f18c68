//! 变更消息解码
//!
//! 每个字段独立、宽松地读取，缺失或无法解析时取默认值：
//! - `order_id` / `customer_id`：空字符串（数字、布尔按文本读取）；
//! - `quantity` / `version`：0（接受数字字符串）；
//! - `price`：0（接受数字或十进制字符串）；
//! - `created_at` / `updated_at`：纪元以来的微秒数（字符串或数字），
//!   截断到毫秒后转为本地时间；无法解析时记录警告并置空。
//!
//! 唯一的例外是 `status`：缺失时为 PENDING，出现但无法识别则整条解码失败。
//!
use crate::order::OrderStatus;
use chrono::{DateTime, Local, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

/// 解码后的变更记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub order_id: String,
    pub customer_id: String,
    pub quantity: i32,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub version: i64,
}

/// 解码失败：保留原始文本便于排查
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to decode change message: {reason}")]
pub struct DecodeFailure {
    pub reason: String,
    pub raw: String,
}

impl DecodeFailure {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// 解码一条变更消息
pub fn decode_change_message(raw: &str) -> Result<ChangeRecord, DecodeFailure> {
    let tree: Value =
        serde_json::from_str(raw).map_err(|e| DecodeFailure::new(e.to_string(), raw))?;

    let Some(fields) = unwrap_envelope(&tree).as_object() else {
        return Err(DecodeFailure::new("change message is not a JSON object", raw));
    };

    let status = read_status(fields).map_err(|reason| DecodeFailure::new(reason, raw))?;

    Ok(ChangeRecord {
        order_id: read_text(fields, "order_id"),
        customer_id: read_text(fields, "customer_id"),
        quantity: read_i64(fields, "quantity")
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0),
        price: read_decimal(fields, "price").unwrap_or(Decimal::ZERO),
        status,
        created_at: read_timestamp(fields, "created_at"),
        updated_at: read_timestamp(fields, "updated_at"),
        version: read_i64(fields, "version").unwrap_or(0),
    })
}

/// 剥离转换器包装（`payload`）与前后镜像包装（`before`/`after`）
fn unwrap_envelope(tree: &Value) -> &Value {
    let Some(obj) = tree.as_object() else {
        return tree;
    };
    if obj.contains_key("order_id") {
        return tree;
    }
    if let Some(payload) = obj.get("payload").filter(|p| p.is_object()) {
        return unwrap_envelope(payload);
    }
    if obj.contains_key("after") || obj.contains_key("before") {
        let image = obj
            .get("after")
            .filter(|v| v.is_object())
            .or_else(|| obj.get("before").filter(|v| v.is_object()));
        if let Some(image) = image {
            return image;
        }
    }
    tree
}

fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn read_text(fields: &Map<String, Value>, key: &str) -> String {
    match present(fields, key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn read_i64(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match present(fields, key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn read_decimal(fields: &Map<String, Value>, key: &str) -> Option<Decimal> {
    let text = match present(fields, key)? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn read_status(fields: &Map<String, Value>) -> Result<OrderStatus, String> {
    match present(fields, "status") {
        None => Ok(OrderStatus::default()),
        Some(Value::String(s)) => OrderStatus::parse(s).map_err(|e| e.to_string()),
        Some(other) => Err(format!("status must be an enum name, got {other}")),
    }
}

fn read_timestamp(fields: &Map<String, Value>, key: &str) -> Option<NaiveDateTime> {
    let value = present(fields, key)?;
    let micros = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    let local = micros
        .and_then(|us| DateTime::from_timestamp_millis(us / 1000))
        .map(|utc| utc.with_timezone(&Local).naive_local());
    if local.is_none() {
        tracing::warn!(field = key, value = %value, "failed to parse timestamp, treating as absent");
    }
    local
}
