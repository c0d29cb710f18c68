//! 领域事件（Domain Event）
//!
//! 定义直接发布的事件载荷需要实现的最小接口（`DomainEvent`），
//! 以及订单事件 `OrderEvent`。

mod domain_event_trait;
mod order_event;

pub use domain_event_trait::DomainEvent;
pub use order_event::OrderEvent;
