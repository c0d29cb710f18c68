use anyhow::Result as AnyResult;
use order_domain::cdc::{ChangeConsumer, ChangeMessage, ChangeRecord, ChangeSink, DEFAULT_GROUP_ID};
use order_domain::codec::{ErrorHandlingDeserializer, StringDeserializer, StringSerializer};
use order_domain::entity::Entity;
use order_domain::eventing::{
    Acks, ContainerConfig, InMemoryMessageLog, ListenerContainer, MessageLog, Producer,
    ProducerConfig, TopicPartition,
};
use order_domain::order::{Order, OrderStatus};
use order_domain::persist::{InMemoryRepository, Repository, RepositoryTransaction};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOPIC: &str = "dbserver1.public.orders";

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<ChangeRecord>>,
}

#[async_trait::async_trait]
impl ChangeSink for CollectingSink {
    async fn accept(&self, record: ChangeRecord) -> AnyResult<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

async fn committed_orders(count: usize) -> Vec<Order> {
    let repo = InMemoryRepository::<Order>::new();
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut tx = repo.begin().await.unwrap();
        tx.save(Order::create(format!("ORD-{i}"), "CUST-1", i as i32 + 1, Decimal::new(1999, 2)).unwrap())
            .await
            .unwrap();
        out.extend(tx.commit().await.unwrap());
    }
    out
}

fn start(
    log: &Arc<InMemoryMessageLog>,
    consumer: ChangeConsumer,
) -> order_domain::eventing::ContainerHandle {
    let container = Arc::new(
        ListenerContainer::builder()
            .message_log(log.clone())
            .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
            .listener(Arc::new(consumer))
            .config(
                ContainerConfig::builder()
                    .group_id(DEFAULT_GROUP_ID)
                    .topics(vec![TOPIC.to_string()])
                    .auto_commit_interval(Duration::from_millis(50))
                    .poll_interval(Duration::from_millis(10))
                    .build(),
            )
            .build(),
    );
    container.start()
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_message_does_not_stall_the_stream() {
    let log = Arc::new(InMemoryMessageLog::new(1));
    let producer: Producer<str> = Producer::new(
        log.clone(),
        StringSerializer,
        ProducerConfig::builder().acks(Acks::Leader).build(),
    );

    let orders = committed_orders(5).await;
    producer
        .send(TOPIC, None, "{\"order_id\": \"ORD-X\", broken")
        .await
        .unwrap();
    for order in &orders {
        let raw = ChangeMessage::from_order(order).to_json().unwrap();
        producer.send(TOPIC, Some(order.id().as_str()), &raw).await.unwrap();
    }
    producer.flush().await.unwrap();

    let sink = Arc::new(CollectingSink::default());
    let consumer = ChangeConsumer::new(sink.clone());
    let stats = consumer.stats();
    let handle = start(&log, consumer);

    let _ = tokio::time::timeout(Duration::from_secs(3), async {
        while stats.received() < 6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    handle.shutdown();
    handle.join().await;

    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.decoded(), 5);

    let records = sink.records.lock().unwrap().clone();
    let ids: Vec<&str> = records.iter().map(|r| r.order_id.as_str()).collect();
    assert_eq!(ids, vec!["ORD-0", "ORD-1", "ORD-2", "ORD-3", "ORD-4"]);
    assert!(records.iter().all(|r| r.status == OrderStatus::Pending));
    assert!(records.iter().all(|r| r.created_at.is_some()));
    assert_eq!(records[4].quantity, 5);

    // 位点越过了失败的消息
    let tp = TopicPartition::new(TOPIC, 0);
    assert_eq!(log.committed_offset(DEFAULT_GROUP_ID, &tp).await.unwrap(), Some(6));
}

#[tokio::test(flavor = "multi_thread")]
async fn restarted_consumer_resumes_after_committed_offset() {
    let log = Arc::new(InMemoryMessageLog::new(1));
    let producer: Producer<str> = Producer::new(log.clone(), StringSerializer, ProducerConfig::default());
    let orders = committed_orders(4).await;

    for order in &orders[..2] {
        let raw = ChangeMessage::from_order(order).to_json().unwrap();
        producer.send(TOPIC, Some(order.id().as_str()), &raw).await.unwrap();
    }
    producer.flush().await.unwrap();

    let first = Arc::new(CollectingSink::default());
    let consumer = ChangeConsumer::new(first.clone());
    let stats = consumer.stats();
    let handle = start(&log, consumer);
    let _ = tokio::time::timeout(Duration::from_secs(3), async {
        while stats.decoded() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    handle.shutdown();
    handle.join().await;

    for order in &orders[2..] {
        let raw = ChangeMessage::from_order(order).to_json().unwrap();
        producer.send(TOPIC, Some(order.id().as_str()), &raw).await.unwrap();
    }
    producer.flush().await.unwrap();

    let second = Arc::new(CollectingSink::default());
    let consumer = ChangeConsumer::new(second.clone());
    let stats = consumer.stats();
    let handle = start(&log, consumer);
    let _ = tokio::time::timeout(Duration::from_secs(3), async {
        while stats.decoded() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    handle.shutdown();
    handle.join().await;

    let ids: Vec<String> = second
        .records
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.order_id.clone())
        .collect();
    assert_eq!(ids, vec!["ORD-2", "ORD-3"]);
    assert_eq!(first.records.lock().unwrap().len(), 2);
}
