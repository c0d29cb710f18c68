use anyhow::{Context, Result};
use async_trait::async_trait;
use order_application::command::{PlaceOrder, UpdateOrderStatus};
use order_application::context::AppContext;
use order_application::{EventChannels, OrderWriteService, Settings};
use order_domain::cdc::{ChangeConsumer, ChangeMessage};
use order_domain::codec::{Delivery, GenericRecord};
use order_domain::domain_event::OrderEvent;
use order_domain::entity::Entity;
use order_domain::eventing::{ConsumerRecord, ContainerHandle, InMemoryMessageLog, RecordListener};
use order_domain::order::{Order, OrderStatus};
use order_domain::persist::InMemoryRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 只记录日志的下游监听器
struct LoggingListener;

#[async_trait]
impl RecordListener<OrderEvent> for LoggingListener {
    fn listener_name(&self) -> &str {
        "order-event-logger"
    }

    async fn on_record(&self, record: &ConsumerRecord, value: Delivery<OrderEvent>) -> Result<()> {
        match value {
            Delivery::Value(event) => tracing::info!(
                topic = %record.topic,
                order_id = %event.order_id,
                quantity = event.quantity,
                price = %event.price,
                "received order event"
            ),
            Delivery::Failed(failure) => tracing::warn!(
                topic = %record.topic,
                offset = record.offset,
                reason = %failure.reason,
                "skipped undecodable order event"
            ),
        }
        Ok(())
    }
}

#[async_trait]
impl RecordListener<GenericRecord> for LoggingListener {
    fn listener_name(&self) -> &str {
        "binary-record-logger"
    }

    async fn on_record(&self, record: &ConsumerRecord, value: Delivery<GenericRecord>) -> Result<()> {
        match value {
            Delivery::Value(generic) => {
                let fields: Vec<String> = generic
                    .iter()
                    .map(|(name, value)| format!("{name}={value:?}"))
                    .collect();
                tracing::info!(
                    topic = %record.topic,
                    schema_id = generic.schema_id(),
                    fields = %fields.join(", "),
                    "received binary record"
                );
            }
            Delivery::Failed(failure) => tracing::warn!(
                topic = %record.topic,
                offset = record.offset,
                reason = %failure.reason,
                "skipped undecodable binary record"
            ),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_domain=info,order_application=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("Failed to load settings")?;
    tracing::info!(cdc_topic = %settings.cdc_topic, group = %settings.cdc_group_id, "settings loaded");

    let message_log = Arc::new(InMemoryMessageLog::new(settings.topic_partitions));
    let registry = Arc::new(order_domain::codec::InMemorySchemaRegistry::new());
    let channels = EventChannels::new(settings, message_log, registry);

    // 消费端
    let consumer = ChangeConsumer::default();
    let stats = consumer.stats();
    let listener = Arc::new(LoggingListener);
    let handles: Vec<ContainerHandle> = vec![
        channels.change_container(consumer).start(),
        channels.order_event_container(listener.clone()).start(),
        channels.binary_record_container(listener).start(),
    ];

    // 写入端：提交后的行由捕获代理转成变更消息
    let service = OrderWriteService::new(InMemoryRepository::<Order>::new());
    let ctx = AppContext::builder().actor_id("order-relay").build();
    let created = service
        .create_order_with_generated_id(
            &ctx,
            PlaceOrder {
                customer_id: "CUST-123".into(),
                quantity: 5,
                price: Decimal::new(9999, 2),
            },
        )
        .await
        .context("Failed to create order")?;
    let confirmed = service
        .update_status(
            &ctx,
            UpdateOrderStatus {
                order_id: created.id().clone(),
                status: OrderStatus::Confirmed,
            },
        )
        .await
        .context("Failed to confirm order")?;

    let capture = channels.change_producer();
    let cdc_topic = channels.settings().cdc_topic.clone();
    for order in [&created, &confirmed] {
        let raw = ChangeMessage::from_order(order).to_json()?;
        capture.send(&cdc_topic, Some(order.id().as_str()), &raw).await?;
    }
    capture
        .send(&cdc_topic, None, "{\"order_id\": \"ORD-BROKEN\"")
        .await?;
    capture.flush().await?;

    // 直接发布端
    let json_id = channels
        .order_event_publisher()
        .publish_order_event("CUST-123", 5, Decimal::new(9999, 2))
        .await?;
    let binary_id = channels
        .binary_order_event_publisher()
        .publish_order_event("CUST-456", 2, Decimal::new(1250, 2))
        .await?;
    tracing::info!(%json_id, %binary_id, "order events published");

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while stats.received() < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(received = stats.received(), "change stream not drained before deadline");
    }
    // 给直接发布的事件留出一次拉取
    tokio::time::sleep(Duration::from_millis(200)).await;

    for handle in handles {
        handle.shutdown();
        handle.join().await;
    }
    capture.close().await?;

    tracing::info!(
        received = stats.received(),
        decoded = stats.decoded(),
        failed = stats.failed(),
        "relay stopped"
    );
    Ok(())
}
