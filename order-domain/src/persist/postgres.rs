//! Postgres 订单仓储
//!
//! 写入在数据库事务内即时执行：更新语句带 `WHERE version = $n` 条件，
//! 影响行数为 0 即视为并发冲突；`sqlx::Transaction` 在未提交时丢弃会自动回滚。
//!
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult as Result};
use crate::order::{Order, OrderRow};
use crate::persist::{Repository, RepositoryTransaction};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按 [`crate::persist::ORDERS_SCHEMA`] 建表
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(crate::persist::ORDERS_SCHEMA)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository<Order> for PgOrderRepository {
    type Transaction = PgOrderTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        let tx = self.pool.begin().await?;
        Ok(PgOrderTransaction {
            tx,
            written: Vec::new(),
        })
    }
}

pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
    written: Vec<Order>,
}

const SELECT_ORDER: &str = "SELECT order_id, customer_id, quantity, price, status, \
     created_at, updated_at, version FROM orders WHERE order_id = $1";

#[async_trait]
impl RepositoryTransaction<Order> for PgOrderTransaction {
    async fn exists(&mut self, id: &String) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_id = $1)")
                .bind(id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn get(&mut self, id: &String) -> Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(SELECT_ORDER)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn save(&mut self, mut order: Order) -> Result<()> {
        let committed_at = Utc::now();

        if !order.is_persisted() {
            order.mark_inserted(committed_at);
            let row = OrderRow::from(&order);
            let inserted = sqlx::query(
                "INSERT INTO orders (order_id, customer_id, quantity, price, status, \
                 created_at, updated_at, version) VALUES ($1, $2, $3, $4, $5, $6, $7, 0) \
                 ON CONFLICT (order_id) DO NOTHING",
            )
            .bind(&row.order_id)
            .bind(&row.customer_id)
            .bind(row.quantity)
            .bind(row.price)
            .bind(&row.status)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *self.tx)
            .await?;

            if inserted.rows_affected() == 0 {
                return Err(DomainError::DuplicateEntity { id: row.order_id });
            }
            self.written.push(order);
            return Ok(());
        }

        let expected = order.version();
        order.mark_updated(expected.next(), committed_at);
        let row = OrderRow::from(&order);
        let updated = sqlx::query(
            "UPDATE orders SET customer_id = $2, quantity = $3, price = $4, status = $5, \
             updated_at = GREATEST($6, created_at), version = version + 1 \
             WHERE order_id = $1 AND version = $7",
        )
        .bind(&row.order_id)
        .bind(&row.customer_id)
        .bind(row.quantity)
        .bind(row.price)
        .bind(&row.status)
        .bind(row.updated_at)
        .bind(expected.value() as i64)
        .execute(&mut *self.tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1")
                    .bind(&row.order_id)
                    .fetch_optional(&mut *self.tx)
                    .await?;
            return match actual {
                Some(actual) => Err(DomainError::ConcurrencyConflict {
                    id: row.order_id,
                    expected: expected.value(),
                    actual: actual.max(0) as u64,
                }),
                None => Err(DomainError::NotFound {
                    reason: format!("order {}", row.order_id),
                }),
            };
        }

        self.written.push(order);
        Ok(())
    }

    async fn commit(self) -> Result<Vec<Order>> {
        self.tx.commit().await?;
        Ok(self.written)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
