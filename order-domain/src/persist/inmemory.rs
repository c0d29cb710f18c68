//! 内存版仓储（InMemoryRepository）
//!
//! 事务内的写入先暂存，提交时在写锁下统一做版本校验并落地：
//! - 未持久化实体：目标已存在则 `DuplicateEntity`；
//! - 已持久化实体：存储中的版本与读取时不一致则 `ConcurrencyConflict`；
//! - 校验全部通过才会写入，任一失败整体不生效。
//!
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{Repository, RepositoryTransaction};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 简单的内存仓储实现
pub struct InMemoryRepository<E>
where
    E: Entity,
{
    rows: Arc<RwLock<HashMap<E::Id, E>>>,
}

impl<E> Clone for InMemoryRepository<E>
where
    E: Entity,
{
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<E> Default for InMemoryRepository<E>
where
    E: Entity,
{
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<E> InMemoryRepository<E>
where
    E: Entity,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的记录数
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl<E> Repository<E> for InMemoryRepository<E>
where
    E: Entity + 'static,
{
    type Transaction = InMemoryTransaction<E>;

    async fn begin(&self) -> Result<Self::Transaction> {
        Ok(InMemoryTransaction {
            rows: Arc::clone(&self.rows),
            staged: Vec::new(),
        })
    }
}

/// 内存事务：持有暂存写入，丢弃即回滚
pub struct InMemoryTransaction<E>
where
    E: Entity,
{
    rows: Arc<RwLock<HashMap<E::Id, E>>>,
    staged: Vec<E>,
}

impl<E> InMemoryTransaction<E>
where
    E: Entity,
{
    fn staged(&self, id: &E::Id) -> Option<&E> {
        self.staged.iter().find(|e| e.id() == id)
    }
}

#[async_trait]
impl<E> RepositoryTransaction<E> for InMemoryTransaction<E>
where
    E: Entity + 'static,
{
    async fn exists(&mut self, id: &E::Id) -> Result<bool> {
        if self.staged(id).is_some() {
            return Ok(true);
        }
        Ok(self.rows.read().await.contains_key(id))
    }

    async fn get(&mut self, id: &E::Id) -> Result<Option<E>> {
        if let Some(entity) = self.staged(id) {
            return Ok(Some(entity.clone()));
        }
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn save(&mut self, entity: E) -> Result<()> {
        match self.staged.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => *slot = entity,
            None => self.staged.push(entity),
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<Vec<E>> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(staged);
        }

        let mut rows = self.rows.write().await;

        for entity in &staged {
            match (rows.get(entity.id()), entity.is_persisted()) {
                (None, false) => {}
                (Some(_), false) => {
                    return Err(DomainError::DuplicateEntity {
                        id: entity.id().to_string(),
                    });
                }
                (None, true) => {
                    return Err(DomainError::NotFound {
                        reason: format!("entity {} vanished before commit", entity.id()),
                    });
                }
                (Some(current), true) => {
                    if current.version() != entity.version() {
                        return Err(DomainError::ConcurrencyConflict {
                            id: entity.id().to_string(),
                            expected: entity.version().value(),
                            actual: current.version().value(),
                        });
                    }
                }
            }
        }

        let committed_at = Utc::now();
        let mut committed = Vec::with_capacity(staged.len());
        for mut entity in staged {
            if entity.is_persisted() {
                entity.mark_updated(entity.version().next(), committed_at);
            } else {
                entity.mark_inserted(committed_at);
            }
            rows.insert(entity.id().clone(), entity.clone());
            committed.push(entity);
        }

        tracing::debug!(count = committed.len(), "in-memory transaction committed");
        Ok(committed)
    }

    async fn rollback(mut self) -> Result<()> {
        self.staged.clear();
        Ok(())
    }
}

impl<E> Drop for InMemoryTransaction<E>
where
    E: Entity,
{
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            tracing::debug!(
                pending = self.staged.len(),
                "transaction dropped without commit, rolled back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, OrderStatus};
    use rust_decimal::Decimal;

    fn new_order(id: &str) -> Order {
        Order::create(id, "CUST-1", 5, Decimal::new(1999, 2)).unwrap()
    }

    #[tokio::test]
    async fn insert_then_read_back() {
        let repo = InMemoryRepository::<Order>::new();
        let mut tx = repo.begin().await.unwrap();
        assert!(!tx.exists(&"ORD-1".to_string()).await.unwrap());
        tx.save(new_order("ORD-1")).await.unwrap();
        // 事务内可读到自己的写入
        assert!(tx.exists(&"ORD-1".to_string()).await.unwrap());
        let committed = tx.commit().await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].version().value(), 0);
        assert!(committed[0].is_persisted());

        let mut tx = repo.begin().await.unwrap();
        let loaded = tx.get(&"ORD-1".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded, committed[0]);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let repo = InMemoryRepository::<Order>::new();
        {
            let mut tx = repo.begin().await.unwrap();
            tx.save(new_order("ORD-1")).await.unwrap();
        }
        assert!(repo.is_empty().await);

        let mut tx = repo.begin().await.unwrap();
        tx.save(new_order("ORD-2")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn update_bumps_version_exactly_once() {
        let repo = InMemoryRepository::<Order>::new();
        let mut tx = repo.begin().await.unwrap();
        tx.save(new_order("ORD-1")).await.unwrap();
        let created = tx.commit().await.unwrap().remove(0);

        let mut tx = repo.begin().await.unwrap();
        let mut order = tx.get(&"ORD-1".to_string()).await.unwrap().unwrap();
        order.update_status(OrderStatus::Confirmed);
        tx.save(order).await.unwrap();
        let updated = tx.commit().await.unwrap().remove(0);

        assert_eq!(updated.version(), created.version().next());
        assert!(updated.updated_at() >= updated.created_at());
        assert_eq!(updated.created_at(), created.created_at());
    }

    #[tokio::test]
    async fn concurrent_commits_from_same_version_conflict() {
        let repo = InMemoryRepository::<Order>::new();
        let mut tx = repo.begin().await.unwrap();
        tx.save(new_order("ORD-1")).await.unwrap();
        tx.commit().await.unwrap();

        let id = "ORD-1".to_string();
        let mut a = repo.begin().await.unwrap();
        let mut b = repo.begin().await.unwrap();
        let mut order_a = a.get(&id).await.unwrap().unwrap();
        let mut order_b = b.get(&id).await.unwrap().unwrap();
        order_a.update_status(OrderStatus::Shipped);
        order_b.update_status(OrderStatus::Cancelled);
        a.save(order_a).await.unwrap();
        b.save(order_b).await.unwrap();

        a.commit().await.unwrap();
        match b.commit().await.unwrap_err() {
            DomainError::ConcurrencyConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut tx = repo.begin().await.unwrap();
        let stored = tx.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Shipped);
        assert_eq!(stored.version().value(), 1);
    }

    #[tokio::test]
    async fn racing_inserts_yield_duplicate() {
        let repo = InMemoryRepository::<Order>::new();
        let mut a = repo.begin().await.unwrap();
        let mut b = repo.begin().await.unwrap();
        a.save(new_order("ORD-1")).await.unwrap();
        b.save(new_order("ORD-1")).await.unwrap();

        a.commit().await.unwrap();
        match b.commit().await.unwrap_err() {
            DomainError::DuplicateEntity { id } => assert_eq!(id, "ORD-1"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(repo.len().await, 1);
    }
}
