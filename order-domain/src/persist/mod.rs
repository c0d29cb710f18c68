//! 持久化（persist）
//!
//! 定义实体仓储与显式事务边界：
//! - `Repository::begin` 获取事务，事务内提供 `exists/get/save`；
//! - `commit` 在提交时做乐观版本校验，冲突返回 `ConcurrencyConflict`；
//! - 事务未提交即被丢弃时自动回滚（暂存写入全部作废）。
//!
//! 内存实现用于测试与本地开发，Postgres 实现位于 `infra-sqlx` 特性之后。
//!
mod inmemory;
#[cfg(feature = "infra-sqlx")]
mod postgres;
mod repository;
mod schema;

pub use inmemory::{InMemoryRepository, InMemoryTransaction};
#[cfg(feature = "infra-sqlx")]
pub use postgres::{PgOrderRepository, PgOrderTransaction};
pub use repository::{OrderRepository, Repository, RepositoryTransaction};
pub use schema::ORDERS_SCHEMA;
