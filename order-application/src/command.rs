use order_domain::order::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求。
///
/// 关联常量：
/// - `NAME`：命令的稳定名称，用于日志与追踪。避免依赖 `type_name::<T>()`。
pub trait Command: Send + Sync + 'static {
    const NAME: &'static str;
}

/// 以调用方给定的标识创建订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: String,
    pub customer_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl Command for CreateOrder {
    const NAME: &'static str = "order.create";
}

/// 写入端入口：由服务生成订单标识
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl Command for PlaceOrder {
    const NAME: &'static str = "order.place";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub order_id: String,
    pub status: OrderStatus,
}

impl Command for UpdateOrderStatus {
    const NAME: &'static str = "order.update_status";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrderQuantity {
    pub order_id: String,
    pub quantity: i32,
}

impl Command for UpdateOrderQuantity {
    const NAME: &'static str = "order.update_quantity";
}
