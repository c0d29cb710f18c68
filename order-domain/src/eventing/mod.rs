//! 消息子系统（eventing）
//!
//! 提供分区消息日志之上的生产与消费运行时：
//! - `MessageLog`：追加/拉取、消费组协调与位点提交的统一接口；
//! - `Producer`：序列化、批处理与有限重试的异步生产者；
//! - `RecordListener`：对单条记录进行消费处理；
//! - `ListenerContainer`：按消费组并发拉取记录、隔离失败并周期提交位点。
//!
//! 该模块仅定义协议与运行时，不绑定具体传输实现；`InMemoryMessageLog`
//! 用于测试与本地运行。
//!
pub mod container;
pub mod listener;
pub mod log;
pub mod log_inmemory;
pub mod producer;
pub mod record;

pub use container::{AutoOffsetReset, ContainerConfig, ContainerHandle, ListenerContainer};
pub use listener::RecordListener;
pub use log::{Assignment, MessageLog};
pub use log_inmemory::InMemoryMessageLog;
pub use producer::{Acks, Compression, DeliveryHandle, Producer, ProducerConfig};
pub use record::{ConsumerRecord, Headers, ProducerRecord, RecordMetadata, TopicPartition};
