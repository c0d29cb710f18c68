//! 记录监听器（RecordListener）
//!
//! 监听容器为每条拉取到的记录调用一次监听器，值已经过错误隔离解码。
//!
use super::record::ConsumerRecord;
use crate::codec::Delivery;
use async_trait::async_trait;

/// 记录监听器：处理单条记录
#[async_trait]
pub trait RecordListener<T>: Send + Sync
where
    T: Send + 'static,
{
    /// 监听器名称（用于日志）
    fn listener_name(&self) -> &str;

    /// 处理记录；返回错误只会被记录，不会重试，也不会阻塞后续记录
    async fn on_record(&self, record: &ConsumerRecord, value: Delivery<T>) -> anyhow::Result<()>;
}
