//! 订单变更中继领域层（order-domain）
//!
//! 提供订单写入、变更捕获消费与事件发布所需的领域构件：
//! - 订单实体（`order`）与值对象（`value_object`）
//! - 带乐观并发控制的仓储与事务（`persist`）
//! - 直接发布的订单事件（`domain_event`）
//! - 结构化文本与 Schema 注册二进制两条编解码管线（`codec`）
//! - 分区消息日志、生产者与监听容器（`eventing`）
//! - 变更消息解码与错误隔离的变更消费者（`cdc`）
//!
//! 本 crate 与具体的数据库、消息系统与注册中心解耦，只定义接口并提供
//! 内存实现；Postgres 仓储在 `infra-sqlx` 特性下启用。
//!
//! 典型用法：
//! 1. 选择 `persist` 中的仓储实现，通过事务 `exists/get/save/commit` 写入订单；
//! 2. 用 `codec` 中的序列化器构造 `Producer` 发布 `OrderEvent`；
//! 3. 用 `ListenerContainer` 运行 `ChangeConsumer`，把解码后的变更交给 `ChangeSink`。
//!
pub mod cdc;
pub mod codec;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod order;
pub mod persist;
pub mod value_object;
