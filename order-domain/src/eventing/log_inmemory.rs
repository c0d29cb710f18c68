//! 内存版分区消息日志（InMemoryMessageLog）
//!
//! 满足 `MessageLog` 协议的轻量实现，典型用途：测试环境、示例与本地开发。
//! - 主题在首次使用时按默认分区数自动创建；
//! - 有键消息按键哈希选择分区，无键消息轮询分区；
//! - 消费组分配采用轮询：按成员 ID 排序后依次分得排序后的分区；
//! - 成员超过 `max_poll_interval` 未拉取分配即被剔除，分区重新分配。
//!
use super::log::{Assignment, MessageLog};
use super::record::{ConsumerRecord, ProducerRecord, RecordMetadata, TopicPartition};
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct Topic {
    partitions: Vec<Vec<ConsumerRecord>>,
    round_robin: u32,
}

struct Member {
    topics: Vec<String>,
    last_seen: Instant,
    max_poll_interval: Duration,
}

#[derive(Default)]
struct Group {
    generation: u64,
    members: BTreeMap<String, Member>,
    committed: HashMap<TopicPartition, u64>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Topic>,
    groups: HashMap<String, Group>,
    failing_appends: u32,
}

impl State {
    fn topic_mut(&mut self, name: &str, default_partitions: u32) -> &mut Topic {
        self.topics.entry(name.to_string()).or_insert_with(|| Topic {
            partitions: vec![Vec::new(); default_partitions as usize],
            round_robin: 0,
        })
    }
}

/// 简单的内存消息日志实现
#[derive(Clone)]
pub struct InMemoryMessageLog {
    state: Arc<Mutex<State>>,
    default_partitions: u32,
}

impl Default for InMemoryMessageLog {
    fn default() -> Self {
        Self::new(3)
    }
}

impl InMemoryMessageLog {
    /// 创建内存日志，`default_partitions` 为自动建主题时的分区数
    pub fn new(default_partitions: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            default_partitions: default_partitions.max(1),
        }
    }

    /// 故障注入：接下来的 `count` 次追加返回瞬时错误
    pub async fn fail_next_appends(&self, count: u32) {
        self.state.lock().await.failing_appends = count;
    }

    /// 当前消费组的成员 ID（按字典序）
    pub async fn group_members(&self, group_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .groups
            .get(group_id)
            .map(|g| g.members.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn pick_partition(topic: &mut Topic, key: Option<&str>) -> u32 {
        let count = topic.partitions.len() as u32;
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % u64::from(count)) as u32
            }
            None => {
                let partition = topic.round_robin % count;
                topic.round_robin = topic.round_robin.wrapping_add(1);
                partition
            }
        }
    }

    fn evict_expired(group_id: &str, group: &mut Group, now: Instant) {
        let expired: Vec<String> = group
            .members
            .iter()
            .filter(|(_, m)| now.duration_since(m.last_seen) > m.max_poll_interval)
            .map(|(id, _)| id.clone())
            .collect();

        for member_id in expired {
            group.members.remove(&member_id);
            group.generation += 1;
            tracing::warn!(
                group_id,
                member_id,
                generation = group.generation,
                "member exceeded max poll interval, evicted from group"
            );
        }
    }

    fn assign(
        topics: &mut HashMap<String, Topic>,
        default_partitions: u32,
        group: &Group,
        member_id: &str,
    ) -> Vec<TopicPartition> {
        let subscribed: BTreeSet<&String> =
            group.members.values().flat_map(|m| m.topics.iter()).collect();

        let mut all: Vec<TopicPartition> = Vec::new();
        for name in subscribed {
            let count = topics
                .entry(name.clone())
                .or_insert_with(|| Topic {
                    partitions: vec![Vec::new(); default_partitions as usize],
                    round_robin: 0,
                })
                .partitions
                .len() as u32;
            all.extend((0..count).map(|p| TopicPartition::new(name.clone(), p)));
        }
        all.sort();

        let Some(index) = group.members.keys().position(|id| id == member_id) else {
            return Vec::new();
        };
        let member_topics = &group.members[member_id].topics;
        let members = group.members.len();

        all.into_iter()
            .enumerate()
            .filter(|(i, tp)| i % members == index && member_topics.contains(&tp.topic))
            .map(|(_, tp)| tp)
            .collect()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        let mut state = self.state.lock().await;
        if state.failing_appends > 0 {
            state.failing_appends -= 1;
            return Err(DomainError::message_log("leader not available"));
        }

        let topic = state.topic_mut(&record.topic, self.default_partitions);
        let partition = Self::pick_partition(topic, record.key.as_deref());
        let log = &mut topic.partitions[partition as usize];
        let offset = log.len() as u64;

        log.push(ConsumerRecord {
            topic: record.topic.clone(),
            partition,
            offset,
            key: record.key,
            value: record.value,
            headers: record.headers,
            timestamp: Utc::now(),
        });

        Ok(RecordMetadata {
            topic: record.topic,
            partition,
            offset,
        })
    }

    async fn fetch(
        &self,
        partition: &TopicPartition,
        offset: u64,
        max_records: usize,
    ) -> Result<Vec<ConsumerRecord>> {
        let mut state = self.state.lock().await;
        let topic = state.topic_mut(&partition.topic, self.default_partitions);
        let log = topic
            .partitions
            .get(partition.partition as usize)
            .ok_or_else(|| DomainError::message_log(format!("unknown partition {partition}")))?;

        let start = (offset as usize).min(log.len());
        let end = start.saturating_add(max_records).min(log.len());
        Ok(log[start..end].to_vec())
    }

    async fn end_offset(&self, partition: &TopicPartition) -> Result<u64> {
        let mut state = self.state.lock().await;
        let topic = state.topic_mut(&partition.topic, self.default_partitions);
        topic
            .partitions
            .get(partition.partition as usize)
            .map(|log| log.len() as u64)
            .ok_or_else(|| DomainError::message_log(format!("unknown partition {partition}")))
    }

    async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        max_poll_interval: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let group = state.groups.entry(group_id.to_string()).or_default();
        group.members.insert(
            member_id.to_string(),
            Member {
                topics: topics.to_vec(),
                last_seen: Instant::now(),
                max_poll_interval,
            },
        );
        group.generation += 1;
        tracing::info!(
            group_id,
            member_id,
            generation = group.generation,
            "member joined group"
        );
        Ok(())
    }

    async fn assignment(&self, group_id: &str, member_id: &str) -> Result<Option<Assignment>> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(group) = state.groups.get_mut(group_id) else {
            return Ok(None);
        };
        Self::evict_expired(group_id, group, now);

        let Some(member) = group.members.get_mut(member_id) else {
            return Ok(None);
        };
        member.last_seen = now;

        let partitions = Self::assign(&mut state.topics, self.default_partitions, group, member_id);
        Ok(Some(Assignment {
            generation: group.generation,
            partitions,
        }))
    }

    async fn leave_group(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(group) = state.groups.get_mut(group_id) {
            if group.members.remove(member_id).is_some() {
                group.generation += 1;
                tracing::info!(group_id, member_id, "member left group");
            }
        }
        Ok(())
    }

    async fn commit_offsets(&self, group_id: &str, offsets: &[(TopicPartition, u64)]) -> Result<()> {
        let mut state = self.state.lock().await;
        let group = state.groups.entry(group_id.to_string()).or_default();
        for (partition, offset) in offsets {
            group.committed.insert(partition.clone(), *offset);
        }
        Ok(())
    }

    async fn committed_offset(
        &self,
        group_id: &str,
        partition: &TopicPartition,
    ) -> Result<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(partition).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::record::Headers;
    use bytes::Bytes;

    fn record(topic: &str, key: Option<&str>, value: &str) -> ProducerRecord {
        ProducerRecord {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            value: Bytes::from(value.to_string()),
            headers: Headers::new(),
        }
    }

    #[tokio::test]
    async fn same_key_lands_in_same_partition_in_order() {
        let log = InMemoryMessageLog::new(4);
        let mut partitions = BTreeSet::new();
        for i in 0..5 {
            let ack = log
                .append(record("orders", Some("ORD-1"), &format!("v{i}")))
                .await
                .unwrap();
            partitions.insert(ack.partition);
            assert_eq!(ack.offset, i);
        }
        assert_eq!(partitions.len(), 1);

        let tp = TopicPartition::new("orders", *partitions.iter().next().unwrap());
        let fetched = log.fetch(&tp, 2, 10).await.unwrap();
        let values: Vec<_> = fetched.iter().map(|r| r.value.clone()).collect();
        assert_eq!(values, vec![Bytes::from("v2"), Bytes::from("v3"), Bytes::from("v4")]);
        assert_eq!(log.end_offset(&tp).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn members_receive_disjoint_partitions() {
        let log = InMemoryMessageLog::new(4);
        let topics = vec!["orders".to_string()];
        let interval = Duration::from_secs(30);
        log.join_group("g", "m-1", &topics, interval).await.unwrap();
        log.join_group("g", "m-2", &topics, interval).await.unwrap();

        let a = log.assignment("g", "m-1").await.unwrap().unwrap();
        let b = log.assignment("g", "m-2").await.unwrap().unwrap();
        assert_eq!(a.partitions.len(), 2);
        assert_eq!(b.partitions.len(), 2);
        assert!(a.partitions.iter().all(|p| !b.partitions.contains(p)));

        // 另一个消费组独立看到全部分区
        log.join_group("other", "m-x", &topics, interval).await.unwrap();
        let all = log.assignment("other", "m-x").await.unwrap().unwrap();
        assert_eq!(all.partitions.len(), 4);
    }

    #[tokio::test]
    async fn silent_member_is_evicted_and_partitions_reassigned() {
        let log = InMemoryMessageLog::new(2);
        let topics = vec!["orders".to_string()];
        log.join_group("g", "m-1", &topics, Duration::from_millis(50))
            .await
            .unwrap();
        log.join_group("g", "m-2", &topics, Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let survivor = log.assignment("g", "m-2").await.unwrap().unwrap();
        assert_eq!(survivor.partitions.len(), 2);
        assert_eq!(log.assignment("g", "m-1").await.unwrap(), None);
        assert_eq!(log.group_members("g").await, vec!["m-2".to_string()]);
    }

    #[tokio::test]
    async fn committed_offsets_are_per_group() {
        let log = InMemoryMessageLog::default();
        let tp = TopicPartition::new("orders", 0);
        log.commit_offsets("g1", &[(tp.clone(), 7)]).await.unwrap();

        assert_eq!(log.committed_offset("g1", &tp).await.unwrap(), Some(7));
        assert_eq!(log.committed_offset("g2", &tp).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let log = InMemoryMessageLog::default();
        log.fail_next_appends(1).await;

        let err = log.append(record("t", None, "x")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(log.append(record("t", None, "x")).await.is_ok());
    }
}
