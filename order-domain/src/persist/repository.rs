//! 仓储与事务协议
//!
use crate::{entity::Entity, error::DomainResult as Result, order::Order};
use async_trait::async_trait;
use std::sync::Arc;

/// 仓储：负责开启事务
#[async_trait]
pub trait Repository<E>: Send + Sync
where
    E: Entity,
{
    type Transaction: RepositoryTransaction<E>;

    async fn begin(&self) -> Result<Self::Transaction>;
}

#[async_trait]
impl<E, T> Repository<E> for Arc<T>
where
    E: Entity + 'static,
    T: Repository<E> + ?Sized,
{
    type Transaction = T::Transaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        (**self).begin().await
    }
}

/// 事务：读取、暂存写入，显式提交；未提交即丢弃视为回滚
#[async_trait]
pub trait RepositoryTransaction<E>: Send
where
    E: Entity,
{
    async fn exists(&mut self, id: &E::Id) -> Result<bool>;

    async fn get(&mut self, id: &E::Id) -> Result<Option<E>>;

    /// 写入实体：未持久化的实体按插入处理，否则按其读取时的版本更新
    async fn save(&mut self, entity: E) -> Result<()>;

    /// 提交并返回提交后的实体（含新版本与刷新后的时间戳）
    async fn commit(self) -> Result<Vec<E>>;

    async fn rollback(self) -> Result<()>;
}

/// 订单仓储别名
pub trait OrderRepository: Repository<Order> {}

impl<T> OrderRepository for T where T: Repository<Order> {}
