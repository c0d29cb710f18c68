//! 分区消息日志（MessageLog）协议
//!
//! 对接外部消息系统的最小接口：按分区追加与拉取、消费组成员管理与
//! 位点提交。分区内有序，跨分区、跨消费组不保证顺序。
//!
use super::record::{ConsumerRecord, ProducerRecord, RecordMetadata, TopicPartition};
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use std::time::Duration;

/// 成员在当前代（generation）下分得的分区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub generation: u64,
    pub partitions: Vec<TopicPartition>,
}

/// 分区消息日志：负责存储消息与协调消费组
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, record: ProducerRecord) -> Result<RecordMetadata>;

    /// 从 `offset` 起最多拉取 `max_records` 条
    async fn fetch(
        &self,
        partition: &TopicPartition,
        offset: u64,
        max_records: usize,
    ) -> Result<Vec<ConsumerRecord>>;

    /// 分区下一条消息将获得的位点
    async fn end_offset(&self, partition: &TopicPartition) -> Result<u64>;

    /// 加入消费组；`max_poll_interval` 内未再次拉取分配的成员会被剔除
    async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        max_poll_interval: Duration,
    ) -> Result<()>;

    /// 获取当前分配并刷新存活时间；成员已被剔除时返回 `None`
    async fn assignment(&self, group_id: &str, member_id: &str) -> Result<Option<Assignment>>;

    async fn leave_group(&self, group_id: &str, member_id: &str) -> Result<()>;

    async fn commit_offsets(&self, group_id: &str, offsets: &[(TopicPartition, u64)]) -> Result<()>;

    async fn committed_offset(
        &self,
        group_id: &str,
        partition: &TopicPartition,
    ) -> Result<Option<u64>>;
}
