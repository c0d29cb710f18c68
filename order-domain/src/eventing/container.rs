//! 监听容器（ListenerContainer）
//!
//! 以消费组成员的身份长驻拉取记录并分发给监听器：
//! - 按 `concurrency` 启动多个成员任务，每个成员独占一组分区；
//! - 周期拉取分配，代（generation）变化时提交位点并重建拉取位置；
//! - 被协调方剔除后丢弃未提交位置并重新加入；
//! - 每条记录先经错误隔离解码，再调用监听器；监听器的错误与 panic 只记录日志；
//! - 开启自动提交时按固定间隔提交，否则每批处理完立即提交；
//! - 关闭时提交已处理位点并离开消费组。
//!
//! 提交发生在处理之后，崩溃可能导致重复投递（至少一次）。
//!
use super::listener::RecordListener;
use super::log::{Assignment, MessageLog};
use super::record::{ConsumerRecord, TopicPartition};
use crate::codec::{ErrorHandlingDeserializer, panic_message};
use crate::error::DomainResult as Result;
use bon::Builder;
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 轮询与提交间隔的下限，零值按此处理
const MIN_TICK: Duration = Duration::from_millis(1);

/// 无已提交位点时的起始位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoOffsetReset {
    #[default]
    Earliest,
    Latest,
}

/// 监听容器配置
#[derive(Debug, Clone, Builder)]
pub struct ContainerConfig {
    #[builder(into)]
    pub group_id: String,
    pub topics: Vec<String>,
    /// 成员任务数
    #[builder(default = 1)]
    pub concurrency: usize,
    #[builder(default)]
    pub auto_offset_reset: AutoOffsetReset,
    #[builder(default = true)]
    pub enable_auto_commit: bool,
    #[builder(default = Duration::from_millis(1000))]
    pub auto_commit_interval: Duration,
    /// 单次拉取的最大记录数
    #[builder(default = 500)]
    pub max_poll_records: usize,
    #[builder(default = Duration::from_millis(50))]
    pub poll_interval: Duration,
    /// 超过该时长未拉取分配的成员会被剔除
    #[builder(default = Duration::from_secs(300))]
    pub max_poll_interval: Duration,
}

#[derive(Builder)]
pub struct ListenerContainer<T>
where
    T: Send + 'static,
{
    message_log: Arc<dyn MessageLog>,
    deserializer: ErrorHandlingDeserializer<T>,
    listener: Arc<dyn RecordListener<T>>,
    config: ContainerConfig,
}

impl<T> ListenerContainer<T>
where
    T: Send + 'static,
{
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 启动全部成员任务，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> ContainerHandle {
        let token = CancellationToken::new();
        let concurrency = self.config.concurrency.max(1);
        let instance = uuid::Uuid::new_v4().simple().to_string();

        let mut members = Vec::with_capacity(concurrency);
        let mut tasks = Vec::with_capacity(concurrency);
        for index in 0..concurrency {
            let member_id = format!(
                "{}-{}-{}",
                self.listener.listener_name(),
                &instance[..8],
                index
            );
            members.push(member_id.clone());

            let member = Member {
                id: member_id,
                container: Arc::clone(&self),
                generation: None,
                positions: BTreeMap::new(),
                uncommitted: false,
            };
            tasks.push(tokio::spawn(member.run(token.clone())));
        }

        tracing::info!(
            group_id = %self.config.group_id,
            topics = ?self.config.topics,
            concurrency,
            "listener container started"
        );
        ContainerHandle {
            token,
            tasks,
            members,
        }
    }
}

/// 单个消费组成员的运行状态
struct Member<T>
where
    T: Send + 'static,
{
    id: String,
    container: Arc<ListenerContainer<T>>,
    generation: Option<u64>,
    /// 每个分区下一条待拉取的位点
    positions: BTreeMap<TopicPartition, u64>,
    uncommitted: bool,
}

impl<T> Member<T>
where
    T: Send + 'static,
{
    fn group_id(&self) -> &str {
        &self.container.config.group_id
    }

    fn log(&self) -> &Arc<dyn MessageLog> {
        &self.container.message_log
    }

    async fn run(mut self, token: CancellationToken) {
        if let Err(e) = self.join().await {
            tracing::error!(member = %self.id, error = %e, "failed to join consumer group");
        }

        let config = self.container.config.clone();
        let mut poll_ticker = time::interval(config.poll_interval.max(MIN_TICK));
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commit_ticker = time::interval(config.auto_commit_interval.max(MIN_TICK));
        commit_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = commit_ticker.tick(), if config.enable_auto_commit => {
                    self.commit().await;
                }
                _ = poll_ticker.tick() => {
                    self.poll().await;
                    if !config.enable_auto_commit {
                        self.commit().await;
                    }
                }
            }
        }

        self.commit().await;
        if let Err(e) = self.log().leave_group(self.group_id(), &self.id).await {
            tracing::warn!(member = %self.id, error = %e, "failed to leave consumer group");
        }
        tracing::info!(member = %self.id, "consumer member stopped");
    }

    async fn join(&mut self) -> Result<()> {
        let config = &self.container.config;
        self.container
            .message_log
            .join_group(
                &config.group_id,
                &self.id,
                &config.topics,
                config.max_poll_interval,
            )
            .await?;
        self.generation = None;
        self.positions.clear();
        self.uncommitted = false;
        tracing::info!(member = %self.id, group_id = %config.group_id, "joined consumer group");
        Ok(())
    }

    async fn poll(&mut self) {
        let outcome = self.log().assignment(self.group_id(), &self.id).await;
        let assignment = match outcome {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                tracing::warn!(member = %self.id, "evicted from consumer group, rejoining");
                if let Err(e) = self.join().await {
                    tracing::error!(member = %self.id, error = %e, "failed to rejoin consumer group");
                }
                return;
            }
            Err(e) => {
                tracing::warn!(member = %self.id, error = %e, "failed to fetch assignment");
                return;
            }
        };

        if self.generation != Some(assignment.generation) {
            self.rebalance(assignment).await;
        }

        let max_records = self.container.config.max_poll_records.max(1);
        let mut budget = max_records;
        let partitions: Vec<(TopicPartition, u64)> = self
            .positions
            .iter()
            .map(|(tp, pos)| (tp.clone(), *pos))
            .collect();

        for (tp, position) in partitions {
            if budget == 0 {
                break;
            }
            let records = match self.log().fetch(&tp, position, budget).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(member = %self.id, partition = %tp, error = %e, "fetch failed");
                    continue;
                }
            };
            budget = budget.saturating_sub(records.len());

            for record in records {
                let next = record.offset + 1;
                self.dispatch(&record).await;
                self.positions.insert(tp.clone(), next);
                self.uncommitted = true;
            }
        }
    }

    /// 分配变化：先提交旧位置，再按新分配重建拉取起点
    async fn rebalance(&mut self, assignment: Assignment) {
        self.commit().await;

        let mut positions = BTreeMap::new();
        for tp in assignment.partitions {
            match self.initial_position(&tp).await {
                Ok(position) => {
                    positions.insert(tp, position);
                }
                Err(e) => {
                    tracing::warn!(member = %self.id, partition = %tp, error = %e, "failed to resolve start offset");
                }
            }
        }

        tracing::info!(
            member = %self.id,
            generation = assignment.generation,
            partitions = ?positions.keys().map(ToString::to_string).collect::<Vec<_>>(),
            "partitions assigned"
        );
        self.positions = positions;
        self.generation = Some(assignment.generation);
        self.uncommitted = false;
    }

    async fn initial_position(&self, tp: &TopicPartition) -> Result<u64> {
        if let Some(committed) = self.log().committed_offset(self.group_id(), tp).await? {
            return Ok(committed);
        }
        match self.container.config.auto_offset_reset {
            AutoOffsetReset::Earliest => Ok(0),
            AutoOffsetReset::Latest => self.log().end_offset(tp).await,
        }
    }

    async fn dispatch(&self, record: &ConsumerRecord) {
        let delivery =
            self.container
                .deserializer
                .deserialize(&record.topic, &record.headers, &record.value);
        let listener = &self.container.listener;

        let outcome = AssertUnwindSafe(listener.on_record(record, delivery))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    listener = listener.listener_name(),
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "listener failed, record skipped"
                );
            }
            Err(panic) => {
                tracing::error!(
                    listener = listener.listener_name(),
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    panic = %panic_message(&*panic),
                    "listener panicked, record skipped"
                );
            }
        }
    }

    async fn commit(&mut self) {
        if !self.uncommitted || self.positions.is_empty() {
            return;
        }
        let offsets: Vec<(TopicPartition, u64)> = self
            .positions
            .iter()
            .map(|(tp, pos)| (tp.clone(), *pos))
            .collect();

        match self.log().commit_offsets(self.group_id(), &offsets).await {
            Ok(()) => {
                self.uncommitted = false;
                tracing::debug!(member = %self.id, count = offsets.len(), "offsets committed");
            }
            Err(e) => {
                tracing::warn!(member = %self.id, error = %e, "offset commit failed");
            }
        }
    }
}

/// 容器运行句柄：用于优雅关闭与等待任务结束
pub struct ContainerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    members: Vec<String>,
}

impl ContainerHandle {
    pub fn member_ids(&self) -> &[String] {
        &self.members
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for (member, t) in self.members.iter().zip(tasks) {
            if let Err(e) = t.await {
                tracing::error!(member = %member, error = %e, "consumer member task failed");
            }
        }
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Delivery, StringDeserializer};
    use crate::eventing::{InMemoryMessageLog, ProducerRecord};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct SpyListener {
        seen: Mutex<Vec<(u32, String)>>,
        failed: AtomicUsize,
    }

    #[async_trait]
    impl RecordListener<String> for SpyListener {
        fn listener_name(&self) -> &str {
            "spy"
        }

        async fn on_record(
            &self,
            record: &ConsumerRecord,
            value: Delivery<String>,
        ) -> anyhow::Result<()> {
            let value = match value {
                Delivery::Value(v) => v,
                Delivery::Failed(_) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            };
            if value == "panic" {
                panic!("listener exploded");
            }
            if value == "error" {
                anyhow::bail!("listener rejected");
            }
            self.seen.lock().unwrap().push((record.partition, value));
            Ok(())
        }
    }

    fn record(key: &str, value: &'static [u8]) -> ProducerRecord {
        ProducerRecord {
            topic: "t".into(),
            key: Some(key.into()),
            value: Bytes::from_static(value),
            headers: Default::default(),
        }
    }

    fn config(concurrency: usize) -> ContainerConfig {
        ContainerConfig::builder()
            .group_id("g")
            .topics(vec!["t".into()])
            .concurrency(concurrency)
            .auto_commit_interval(Duration::from_millis(50))
            .poll_interval(Duration::from_millis(10))
            .build()
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            while !f() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn zero_intervals_still_consume() {
        let log = Arc::new(InMemoryMessageLog::new(1));
        log.append(record("k", b"a")).await.unwrap();

        let listener = Arc::new(SpyListener::default());
        let container = Arc::new(
            ListenerContainer::builder()
                .message_log(log.clone())
                .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
                .listener(listener.clone())
                .config(
                    ContainerConfig::builder()
                        .group_id("g")
                        .topics(vec!["t".into()])
                        .auto_commit_interval(Duration::ZERO)
                        .poll_interval(Duration::ZERO)
                        .build(),
                )
                .build(),
        );
        let handle = container.start();

        wait_until(|| listener.seen.lock().unwrap().len() == 1).await;
        handle.shutdown();
        handle.join().await;

        assert_eq!(*listener.seen.lock().unwrap(), vec![(0, "a".to_string())]);
        let tp = TopicPartition::new("t", 0);
        assert_eq!(log.committed_offset("g", &tp).await.unwrap(), Some(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_do_not_stall_consumption() {
        let log = Arc::new(InMemoryMessageLog::new(1));
        for value in [&b"a"[..], b"\xff\xfe", b"panic", b"b", b"error", b"c"] {
            log.append(record("k", value)).await.unwrap();
        }

        let listener = Arc::new(SpyListener::default());
        let container = Arc::new(
            ListenerContainer::builder()
                .message_log(log.clone())
                .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
                .listener(listener.clone())
                .config(config(1))
                .build(),
        );
        let handle = container.start();

        wait_until(|| listener.seen.lock().unwrap().len() == 3).await;
        handle.shutdown();
        handle.join().await;

        let seen: Vec<String> = listener
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(listener.failed.load(Ordering::Relaxed), 1);

        // 关闭时提交已处理位点
        let tp = TopicPartition::new("t", 0);
        assert_eq!(log.committed_offset("g", &tp).await.unwrap(), Some(6));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn members_split_partitions_and_keep_order() {
        let log = Arc::new(InMemoryMessageLog::new(4));
        let listener = Arc::new(SpyListener::default());
        let container = Arc::new(
            ListenerContainer::builder()
                .message_log(log.clone())
                .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
                .listener(listener.clone())
                .config(config(2))
                .build(),
        );
        let handle = container.start();
        assert_eq!(handle.member_ids().len(), 2);

        // 两个成员都入组后再写入，避免分配过渡期的重复投递
        let _ = tokio::time::timeout(Duration::from_secs(3), async {
            while log.group_members("g").await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut expected = Vec::new();
        for i in 0..40 {
            let key = format!("ORD-{}", i % 8);
            let value = format!("{key}:{i}");
            expected.push(value.clone());
            log.append(ProducerRecord {
                topic: "t".into(),
                key: Some(key),
                value: Bytes::from(value),
                headers: Default::default(),
            })
            .await
            .unwrap();
        }

        wait_until(|| listener.seen.lock().unwrap().len() >= 40).await;
        handle.shutdown();
        handle.join().await;

        let seen = listener.seen.lock().unwrap().clone();
        let values: HashSet<&String> = seen.iter().map(|(_, v)| v).collect();
        assert_eq!(values.len(), 40);

        // 同一键内保持写入顺序
        for k in 0..8 {
            let key = format!("ORD-{k}:");
            let per_key: Vec<&String> = seen
                .iter()
                .map(|(_, v)| v)
                .filter(|v| v.starts_with(&key))
                .collect();
            let want: Vec<&String> = expected.iter().filter(|v| v.starts_with(&key)).collect();
            assert_eq!(per_key, want);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resumes_from_committed_offset() {
        let log = Arc::new(InMemoryMessageLog::new(1));
        for value in [&b"a"[..], b"b", b"c"] {
            log.append(record("k", value)).await.unwrap();
        }
        log.commit_offsets("g", &[(TopicPartition::new("t", 0), 2)])
            .await
            .unwrap();

        let listener = Arc::new(SpyListener::default());
        let container = Arc::new(
            ListenerContainer::builder()
                .message_log(log.clone())
                .deserializer(ErrorHandlingDeserializer::new(StringDeserializer))
                .listener(listener.clone())
                .config(config(1))
                .build(),
        );
        let handle = container.start();
        wait_until(|| !listener.seen.lock().unwrap().is_empty()).await;
        handle.shutdown();
        handle.join().await;

        let seen = listener.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(0, "c".to_string())]);
    }
}
