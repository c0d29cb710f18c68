//! 订单事件发布器
//!
//! 两个发布器都生成新的订单标识、以该标识为消息键发送 `OrderEvent`，
//! 并在入队后立即返回标识；投递结果在后台等待并记录日志。
//!
use crate::error::AppResult;
use order_domain::domain_event::{DomainEvent, OrderEvent};
use order_domain::eventing::{DeliveryHandle, Producer};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 结构化文本（JSON）通道的发布器
#[derive(Clone)]
pub struct OrderEventPublisher {
    producer: Producer<OrderEvent>,
    topic: String,
}

impl OrderEventPublisher {
    pub fn new(producer: Producer<OrderEvent>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish_order_event(
        &self,
        customer_id: &str,
        quantity: i32,
        price: Decimal,
    ) -> AppResult<String> {
        let event = OrderEvent::new(Uuid::new_v4().to_string(), customer_id, quantity, price);
        self.publish(event).await
    }

    /// 发布已构造的事件，返回其订单标识
    pub async fn publish(&self, event: OrderEvent) -> AppResult<String> {
        send(&self.producer, &self.topic, event, "json").await
    }
}

/// Schema 注册二进制通道的发布器
#[derive(Clone)]
pub struct BinaryOrderEventPublisher {
    producer: Producer<OrderEvent>,
    topic: String,
}

impl BinaryOrderEventPublisher {
    pub fn new(producer: Producer<OrderEvent>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish_order_event(
        &self,
        customer_id: &str,
        quantity: i32,
        price: Decimal,
    ) -> AppResult<String> {
        let event = OrderEvent::new(Uuid::new_v4().to_string(), customer_id, quantity, price);
        send(&self.producer, &self.topic, event, "binary").await
    }
}

async fn send(
    producer: &Producer<OrderEvent>,
    topic: &str,
    event: OrderEvent,
    channel: &'static str,
) -> AppResult<String> {
    let order_id = event.order_id.clone();
    let handle = producer.send(topic, Some(event.key()), &event).await?;
    tracing::info!(channel, topic, %order_id, "order event queued");
    watch_delivery(handle, channel, order_id.clone());
    Ok(order_id)
}

fn watch_delivery(handle: DeliveryHandle, channel: &'static str, order_id: String) {
    tokio::spawn(async move {
        match handle.wait().await {
            Ok(Some(meta)) => tracing::debug!(
                channel,
                %order_id,
                partition = meta.partition,
                offset = meta.offset,
                "order event delivered"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(channel, %order_id, error = %e, "order event delivery failed"),
        }
    });
}
