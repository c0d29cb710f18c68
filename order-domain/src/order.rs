//! 订单实体（Order）
//!
//! 订单是唯一的权威记录：标识一经创建不可变，状态与数量可变更，
//! 每次持久化变更都会刷新 `updated_at` 并由存储递增版本号。
//!
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::value_object::{Price, Quantity, Version};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 订单状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

/// 无法识别的状态名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownOrderStatus(pub String);

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// 按枚举名（区分大小写）解析
    pub fn parse(name: &str) -> Result<Self, UnknownOrderStatus> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| UnknownOrderStatus(name.to_string()))
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    id: String,
    customer_id: String,
    quantity: Quantity,
    price: Price,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: Version,
    #[serde(skip)]
    persisted: bool,
}

impl Order {
    /// 创建一条待插入的订单：状态 PENDING，版本 0，`created_at = updated_at = now`
    pub fn create(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        quantity: i32,
        price: Decimal,
    ) -> DomainResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::invalid_argument("order id must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id,
            customer_id: customer_id.into(),
            quantity: Quantity::new(quantity)?,
            price: Price::new(price)?,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            version: Version::new(),
            persisted: false,
        })
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 无条件变更状态
    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.touch(Utc::now());
    }

    /// 变更数量，非正数返回 `InvalidArgument` 且不改变状态
    pub fn update_quantity(&mut self, new_quantity: i32) -> DomainResult<()> {
        self.quantity = Quantity::new(new_quantity)?;
        self.touch(Utc::now());
        Ok(())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at.max(self.created_at);
    }
}

impl Entity for Order {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn is_persisted(&self) -> bool {
        self.persisted
    }

    fn mark_inserted(&mut self, committed_at: DateTime<Utc>) {
        self.created_at = committed_at;
        self.updated_at = committed_at;
        self.version = Version::new();
        self.persisted = true;
    }

    fn mark_updated(&mut self, version: Version, committed_at: DateTime<Utc>) {
        // 无论调用方是否修改过 updated_at，提交时统一刷新
        self.touch(committed_at);
        self.version = version;
        self.persisted = true;
    }
}

/// 持久化行形态（与 `orders` 表一一对应）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "infra-sqlx", derive(sqlx::FromRow))]
pub struct OrderRow {
    pub order_id: String,
    pub customer_id: String,
    pub quantity: i32,
    pub price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            quantity: order.quantity.value(),
            price: order.price.value(),
            status: order.status.as_str().to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            version: order.version.value() as i64,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    /// 从已持久化的行恢复订单
    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status).map_err(|e| DomainError::Parse {
            reason: e.to_string(),
        })?;
        let version = u64::try_from(row.version).map_err(|_| DomainError::Parse {
            reason: format!("negative version {}", row.version),
        })?;

        Ok(Self {
            id: row.order_id,
            customer_id: row.customer_id,
            quantity: Quantity::new(row.quantity)?,
            price: Price::new(row.price)?,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at.max(row.created_at),
            version: Version::from_value(version),
            persisted: true,
        })
    }
}
