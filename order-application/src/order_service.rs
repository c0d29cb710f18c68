//! 订单写入服务（OrderWriteService）
//!
//! 每个操作在单个仓储事务内完成读取、变更与提交：
//! - 创建：标识已存在返回 `DuplicateEntity`，否则以 PENDING、版本 0 落库；
//! - 更新：订单不存在返回 `NotFound`，提交时版本已被他人推进返回 `ConcurrencyConflict`。
//!
//! 服务从不发布事件，下游通过变更捕获感知写入。
//!
use crate::command::{Command, CreateOrder, PlaceOrder, UpdateOrderQuantity, UpdateOrderStatus};
use crate::context::AppContext;
use crate::error::AppResult;
use order_domain::entity::Entity;
use order_domain::error::DomainError;
use order_domain::order::Order;
use order_domain::persist::{OrderRepository, Repository, RepositoryTransaction};
use tracing::Instrument;
use uuid::Uuid;

pub struct OrderWriteService<R>
where
    R: OrderRepository,
{
    repo: R,
}

impl<R> OrderWriteService<R>
where
    R: OrderRepository,
{
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub async fn create_order(&self, ctx: &AppContext, cmd: CreateOrder) -> AppResult<Order> {
        let span = command_span::<CreateOrder>(ctx, &cmd.order_id);
        async move {
            let mut tx = self.repo.begin().await?;
            if tx.exists(&cmd.order_id).await? {
                tracing::warn!("order already exists");
                return Err(DomainError::DuplicateEntity { id: cmd.order_id }.into());
            }

            let order = Order::create(cmd.order_id, cmd.customer_id, cmd.quantity, cmd.price)?;
            tx.save(order).await?;
            let order = single(tx.commit().await?)?;

            tracing::info!(version = %order.version(), "created order");
            Ok(order)
        }
        .instrument(span)
        .await
    }

    /// 生成 UUID v4 标识后创建订单
    pub async fn create_order_with_generated_id(
        &self,
        ctx: &AppContext,
        cmd: PlaceOrder,
    ) -> AppResult<Order> {
        let order_id = Uuid::new_v4().to_string();
        tracing::debug!(name = PlaceOrder::NAME, %order_id, "generated order id");

        self.create_order(
            ctx,
            CreateOrder {
                order_id,
                customer_id: cmd.customer_id,
                quantity: cmd.quantity,
                price: cmd.price,
            },
        )
        .await
    }

    pub async fn update_status(&self, ctx: &AppContext, cmd: UpdateOrderStatus) -> AppResult<Order> {
        let span = command_span::<UpdateOrderStatus>(ctx, &cmd.order_id);
        async move {
            let mut tx = self.repo.begin().await?;
            let mut order = load(&mut tx, &cmd.order_id).await?;
            order.update_status(cmd.status);
            tx.save(order).await?;
            let order = single(tx.commit().await?)?;

            tracing::info!(status = %order.status(), version = %order.version(), "updated order status");
            Ok(order)
        }
        .instrument(span)
        .await
    }

    pub async fn update_quantity(
        &self,
        ctx: &AppContext,
        cmd: UpdateOrderQuantity,
    ) -> AppResult<Order> {
        let span = command_span::<UpdateOrderQuantity>(ctx, &cmd.order_id);
        async move {
            let mut tx = self.repo.begin().await?;
            let mut order = load(&mut tx, &cmd.order_id).await?;
            order.update_quantity(cmd.quantity)?;
            tx.save(order).await?;
            let order = single(tx.commit().await?)?;

            tracing::info!(quantity = %order.quantity(), version = %order.version(), "updated order quantity");
            Ok(order)
        }
        .instrument(span)
        .await
    }

    pub async fn get_order(&self, ctx: &AppContext, order_id: &str) -> AppResult<Option<Order>> {
        let span = tracing::debug_span!(
            "query",
            name = "order.get",
            correlation_id = %ctx.correlation_id,
            order_id,
        );
        async move {
            let mut tx = self.repo.begin().await?;
            let order = tx.get(&order_id.to_string()).await?;
            tx.rollback().await?;
            Ok(order)
        }
        .instrument(span)
        .await
    }
}

fn command_span<C: Command>(ctx: &AppContext, order_id: &str) -> tracing::Span {
    tracing::info_span!(
        "command",
        name = C::NAME,
        correlation_id = %ctx.correlation_id,
        actor_id = ctx.actor_id.as_deref(),
        order_id,
    )
}

async fn load<T>(tx: &mut T, order_id: &str) -> AppResult<Order>
where
    T: RepositoryTransaction<Order>,
{
    tx.get(&order_id.to_string())
        .await?
        .ok_or_else(|| {
            DomainError::NotFound {
                reason: format!("order {order_id}"),
            }
            .into()
        })
}

fn single(mut committed: Vec<Order>) -> AppResult<Order> {
    committed.pop().ok_or_else(|| {
        DomainError::Repository {
            reason: "commit returned no order".into(),
        }
        .into()
    })
}
