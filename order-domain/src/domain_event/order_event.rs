use super::DomainEvent;
use crate::codec::{BinaryRecord, Field, FieldType, GenericRecord, Schema, Value};
use crate::error::{DomainError, DomainResult};
use crate::order::{Order, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 订单事件（直接发布，不经过变更捕获）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub customer_id: String,
    pub quantity: i32,
    pub price: Decimal,
    #[serde(default)]
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        quantity: i32,
        price: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            quantity,
            price,
            status: OrderStatus::Pending,
            occurred_at: Utc::now(),
        }
    }
}

impl From<&Order> for OrderEvent {
    fn from(order: &Order) -> Self {
        use crate::entity::Entity;

        Self {
            order_id: order.id().clone(),
            customer_id: order.customer_id().to_string(),
            quantity: order.quantity().value(),
            price: order.price().value(),
            status: order.status(),
            occurred_at: order.updated_at(),
        }
    }
}

impl DomainEvent for OrderEvent {
    const TYPE: &'static str = "order.event";
    const VERSION: u32 = 1;

    fn key(&self) -> &str {
        &self.order_id
    }
}

impl BinaryRecord for OrderEvent {
    fn schema() -> Schema {
        Schema::new(
            "OrderEvent",
            vec![
                Field::new("order_id", FieldType::String),
                Field::new("customer_id", FieldType::String),
                Field::new("quantity", FieldType::Int),
                Field::new(
                    "price",
                    FieldType::Decimal {
                        precision: 10,
                        scale: 2,
                    },
                ),
                Field::new(
                    "status",
                    FieldType::Enum {
                        symbols: OrderStatus::ALL
                            .iter()
                            .map(|s| s.as_str().to_string())
                            .collect(),
                    },
                ),
                Field::new("occurred_at", FieldType::TimestampMillis),
            ],
        )
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::String(self.order_id.clone()),
            Value::String(self.customer_id.clone()),
            Value::Int(self.quantity),
            Value::Decimal(self.price),
            Value::Enum(self.status.as_str().to_string()),
            Value::TimestampMillis(self.occurred_at.timestamp_millis()),
        ]
    }

    fn from_record(record: &GenericRecord) -> DomainResult<Self> {
        // 写入方未携带状态时按默认值处理
        let status = match record.get("status") {
            None | Some(Value::Null) => OrderStatus::default(),
            Some(_) => OrderStatus::parse(record.get_string("status")?).map_err(|e| {
                DomainError::Parse {
                    reason: e.to_string(),
                }
            })?,
        };

        Ok(Self {
            order_id: record.get_string("order_id")?.to_string(),
            customer_id: record.get_string("customer_id")?.to_string(),
            quantity: record.get_int("quantity")?,
            price: record.get_decimal("price")?,
            status,
            occurred_at: record.get_timestamp("occurred_at")?,
        })
    }
}
