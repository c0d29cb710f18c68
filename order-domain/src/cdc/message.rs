//! 变更消息的线上形态
//!
//! 与捕获代理扁平化后的输出一致：金额为十进制字符串，时间戳为纪元以来的微秒数。
//!
use crate::entity::Entity;
use crate::error::DomainResult;
use crate::order::Order;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMessage {
    pub order_id: String,
    pub customer_id: String,
    pub quantity: i32,
    pub price: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

impl ChangeMessage {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            customer_id: order.customer_id().to_string(),
            quantity: order.quantity().value(),
            price: order.price().value().to_string(),
            status: order.status().as_str().to_string(),
            created_at: order.created_at().timestamp_micros(),
            updated_at: order.updated_at().timestamp_micros(),
            version: order.version().value() as i64,
        }
    }

    pub fn to_json(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
