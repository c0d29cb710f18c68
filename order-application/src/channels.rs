//! 事件通道装配（EventChannels）
//!
//! 按运行配置组装生产者、发布器与监听容器：
//! - 生产者：JSON（写入类型头）、二进制（leader 确认、有限重试、snappy）、变更主题文本；
//! - 消费者：类型化 JSON（忽略类型头）、通用 JSON（按类型头还原）、变更主题文本、
//!   二进制通用记录与二进制类型化事件。
//!
//! 所有消费者的值反序列化器都包在 `ErrorHandlingDeserializer` 中。
//!
use crate::publisher::{BinaryOrderEventPublisher, OrderEventPublisher};
use crate::settings::Settings;
use order_domain::cdc::ChangeConsumer;
use order_domain::codec::{
    BinaryDeserializer, BinarySerializer, ErrorHandlingDeserializer, GenericJsonDeserializer,
    GenericRecord, JsonDeserializer, JsonSerializer, SchemaRegistry, SpecificBinaryDeserializer,
    StringDeserializer, StringSerializer, TypedPayload,
};
use order_domain::domain_event::OrderEvent;
use order_domain::eventing::{
    Acks, AutoOffsetReset, Compression, ContainerConfig, ListenerContainer, MessageLog, Producer,
    ProducerConfig, RecordListener,
};
use std::sync::Arc;
use std::time::Duration;

pub const ORDER_EVENT_GROUP_ID: &str = "order-event-consumer";
pub const GENERIC_EVENT_GROUP_ID: &str = "generic-event-consumer";
pub const BINARY_RECORD_GROUP_ID: &str = "binary-record-consumer";
pub const BINARY_EVENT_GROUP_ID: &str = "binary-event-consumer";

#[derive(Clone)]
pub struct EventChannels {
    settings: Settings,
    message_log: Arc<dyn MessageLog>,
    registry: Arc<dyn SchemaRegistry>,
}

impl EventChannels {
    pub fn new(
        settings: Settings,
        message_log: Arc<dyn MessageLog>,
        registry: Arc<dyn SchemaRegistry>,
    ) -> Self {
        tracing::info!(
            bootstrap_servers = %settings.bootstrap_servers,
            schema_registry_url = %settings.schema_registry_url,
            "event channels configured"
        );
        Self {
            settings,
            message_log,
            registry,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn message_log(&self) -> Arc<dyn MessageLog> {
        Arc::clone(&self.message_log)
    }

    pub fn registry(&self) -> Arc<dyn SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    // --- 生产者 ---

    pub fn json_producer(&self) -> Producer<OrderEvent> {
        Producer::new(
            self.message_log(),
            JsonSerializer::new(true),
            ProducerConfig::default(),
        )
    }

    /// 二进制通道的投递策略
    pub fn binary_producer_config() -> ProducerConfig {
        ProducerConfig::builder()
            .acks(Acks::Leader)
            .retries(3)
            .linger(Duration::from_millis(10))
            .batch_size(16_384)
            .compression(Compression::Snappy)
            .build()
    }

    pub fn binary_producer(&self) -> Producer<OrderEvent> {
        Producer::new(
            self.message_log(),
            BinarySerializer::new(self.registry(), true),
            Self::binary_producer_config(),
        )
    }

    /// 向变更主题写入原始文本（模拟捕获代理）
    pub fn change_producer(&self) -> Producer<str> {
        Producer::new(
            self.message_log(),
            StringSerializer,
            ProducerConfig::builder().acks(Acks::Leader).build(),
        )
    }

    pub fn order_event_publisher(&self) -> OrderEventPublisher {
        OrderEventPublisher::new(self.json_producer(), &self.settings.order_events_topic)
    }

    pub fn binary_order_event_publisher(&self) -> BinaryOrderEventPublisher {
        BinaryOrderEventPublisher::new(self.binary_producer(), &self.settings.binary_events_topic)
    }

    // --- 消费者 ---

    pub fn change_container_config(&self) -> ContainerConfig {
        ContainerConfig::builder()
            .group_id(&self.settings.cdc_group_id)
            .topics(vec![self.settings.cdc_topic.clone()])
            .concurrency(self.settings.listener_concurrency)
            .auto_offset_reset(AutoOffsetReset::Earliest)
            .enable_auto_commit(true)
            .auto_commit_interval(self.settings.auto_commit_interval)
            .build()
    }

    pub fn change_container(&self, consumer: ChangeConsumer) -> Arc<ListenerContainer<String>> {
        Arc::new(
            ListenerContainer::builder()
                .message_log(self.message_log())
                .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
                .listener(Arc::new(consumer))
                .config(self.change_container_config())
                .build(),
        )
    }

    /// 类型化 JSON 消费者：忽略类型头，一律按 `OrderEvent` 解析
    pub fn order_event_container(
        &self,
        listener: Arc<dyn RecordListener<OrderEvent>>,
    ) -> Arc<ListenerContainer<OrderEvent>> {
        self.container(
            ErrorHandlingDeserializer::new(JsonDeserializer::<OrderEvent>::new(false)),
            listener,
            ORDER_EVENT_GROUP_ID,
            &self.settings.order_events_topic,
        )
    }

    /// 通用 JSON 消费者：按类型头还原为 `TypedPayload`
    pub fn generic_event_container(
        &self,
        listener: Arc<dyn RecordListener<TypedPayload>>,
    ) -> Arc<ListenerContainer<TypedPayload>> {
        self.container(
            ErrorHandlingDeserializer::new(GenericJsonDeserializer::new(true)),
            listener,
            GENERIC_EVENT_GROUP_ID,
            &self.settings.order_events_topic,
        )
    }

    /// 二进制消费者：按 Schema 产出 `GenericRecord`
    pub fn binary_record_container(
        &self,
        listener: Arc<dyn RecordListener<GenericRecord>>,
    ) -> Arc<ListenerContainer<GenericRecord>> {
        self.container(
            ErrorHandlingDeserializer::new(BinaryDeserializer::new(self.registry())),
            listener,
            BINARY_RECORD_GROUP_ID,
            &self.settings.binary_events_topic,
        )
    }

    pub fn binary_event_container(
        &self,
        listener: Arc<dyn RecordListener<OrderEvent>>,
    ) -> Arc<ListenerContainer<OrderEvent>> {
        self.container(
            ErrorHandlingDeserializer::new(SpecificBinaryDeserializer::<OrderEvent>::new(
                self.registry(),
            )),
            listener,
            BINARY_EVENT_GROUP_ID,
            &self.settings.binary_events_topic,
        )
    }

    fn container<T>(
        &self,
        deserializer: ErrorHandlingDeserializer<T>,
        listener: Arc<dyn RecordListener<T>>,
        group_id: &str,
        topic: &str,
    ) -> Arc<ListenerContainer<T>>
    where
        T: Send + 'static,
    {
        let config = ContainerConfig::builder()
            .group_id(group_id)
            .topics(vec![topic.to_string()])
            .concurrency(self.settings.listener_concurrency)
            .auto_commit_interval(self.settings.auto_commit_interval)
            .build();

        Arc::new(
            ListenerContainer::builder()
                .message_log(self.message_log())
                .deserializer(deserializer)
                .listener(listener)
                .config(config)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_domain::codec::InMemorySchemaRegistry;
    use order_domain::eventing::InMemoryMessageLog;

    fn channels() -> EventChannels {
        EventChannels::new(
            Settings::default(),
            Arc::new(InMemoryMessageLog::new(1)),
            Arc::new(InMemorySchemaRegistry::new()),
        )
    }

    #[test]
    fn binary_producer_policy() {
        let config = EventChannels::binary_producer_config();
        assert_eq!(config.acks, Acks::Leader);
        assert_eq!(config.retries, 3);
        assert_eq!(config.linger, Duration::from_millis(10));
        assert_eq!(config.batch_size, 16_384);
        assert_eq!(config.compression, Compression::Snappy);
    }

    #[test]
    fn change_consumer_reads_from_earliest_with_auto_commit() {
        let config = channels().change_container_config();
        assert_eq!(config.group_id, "order-cdc-processor");
        assert_eq!(config.topics, vec!["dbserver1.public.orders".to_string()]);
        assert_eq!(config.auto_offset_reset, AutoOffsetReset::Earliest);
        assert!(config.enable_auto_commit);
        assert_eq!(config.auto_commit_interval, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn presets_bind_their_topics() {
        let channels = channels();
        let consumer = channels.change_container(ChangeConsumer::default());
        assert_eq!(consumer.config().topics, vec![channels.settings().cdc_topic.clone()]);

        assert_eq!(channels.order_event_publisher().topic(), "order-events");
        assert_eq!(channels.binary_order_event_publisher().topic(), "order-events-binary");
    }
}
