//! 变更消费者（ChangeConsumer）
//!
//! 作为变更主题的记录监听器：记录原始消息、解码，再把记录交给 `ChangeSink`。
//! 解码失败与下游处理失败都在这里被吸收并带原始载荷记录日志，不重试，
//! 位点照常前进。
//!
use super::decoder::{ChangeRecord, decode_change_message};
use crate::codec::Delivery;
use crate::eventing::{ConsumerRecord, RecordListener};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 解码后记录的去向
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn accept(&self, record: ChangeRecord) -> anyhow::Result<()>;
}

/// 只记录日志的默认去向
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChangeSink;

#[async_trait]
impl ChangeSink for LoggingChangeSink {
    async fn accept(&self, record: ChangeRecord) -> anyhow::Result<()> {
        tracing::info!(
            order_id = %record.order_id,
            status = %record.status,
            version = record.version,
            "processing order change"
        );
        Ok(())
    }
}

/// 消费计数
#[derive(Debug, Default)]
pub struct ChangeConsumerStats {
    received: AtomicU64,
    decoded: AtomicU64,
    failed: AtomicU64,
}

impl ChangeConsumerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// 成功解码并交给去向的记录数
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// 解码失败或去向处理失败的消息数
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct ChangeConsumer {
    sink: Arc<dyn ChangeSink>,
    stats: Arc<ChangeConsumerStats>,
}

impl Default for ChangeConsumer {
    fn default() -> Self {
        Self::new(Arc::new(LoggingChangeSink))
    }
}

impl ChangeConsumer {
    pub fn new(sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            sink,
            stats: Arc::new(ChangeConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ChangeConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// 处理一条原始变更消息；返回是否成功
    pub async fn process(&self, raw: &str) -> bool {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(raw, "raw change message");

        let record = match decode_change_message(raw) {
            Ok(record) => record,
            Err(failure) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(raw = %failure.raw, reason = %failure.reason, "failed to process change message");
                return false;
            }
        };

        let order_id = record.order_id.clone();
        match self.sink.accept(record).await {
            Ok(()) => {
                self.stats.decoded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(raw, order_id = %order_id, error = %e, "change sink rejected record");
                false
            }
        }
    }
}

#[async_trait]
impl RecordListener<String> for ChangeConsumer {
    fn listener_name(&self) -> &str {
        "order-cdc-processor"
    }

    async fn on_record(&self, record: &ConsumerRecord, value: Delivery<String>) -> anyhow::Result<()> {
        match value {
            Delivery::Value(raw) => {
                self.process(&raw).await;
            }
            Delivery::Failed(failure) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    partition = record.partition,
                    offset = record.offset,
                    raw = %failure.raw_lossy(),
                    reason = %failure.reason,
                    "failed to process change message"
                );
            }
        }
        Ok(())
    }
}
