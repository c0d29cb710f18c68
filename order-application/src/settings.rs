//! 运行配置（Settings）
//!
//! 从环境变量读取（开发环境可放在 `.env`），未设置时使用默认值。
//!
use anyhow::{Context, Result};
use bon::Builder;
use dotenvy::dotenv;
use order_domain::cdc::{DEFAULT_CHANGE_TOPIC, DEFAULT_GROUP_ID};
use std::env;
use std::time::Duration;

pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";
pub const DEFAULT_SCHEMA_REGISTRY_URL: &str = "http://localhost:8081";
pub const DEFAULT_ORDER_EVENTS_TOPIC: &str = "order-events";
pub const DEFAULT_BINARY_EVENTS_TOPIC: &str = "order-events-binary";

#[derive(Debug, Clone, Builder)]
pub struct Settings {
    #[builder(into, default = DEFAULT_BOOTSTRAP_SERVERS.to_string())]
    pub bootstrap_servers: String,
    #[builder(into, default = DEFAULT_SCHEMA_REGISTRY_URL.to_string())]
    pub schema_registry_url: String,
    #[builder(into, default = DEFAULT_CHANGE_TOPIC.to_string())]
    pub cdc_topic: String,
    #[builder(into, default = DEFAULT_GROUP_ID.to_string())]
    pub cdc_group_id: String,
    #[builder(into, default = DEFAULT_ORDER_EVENTS_TOPIC.to_string())]
    pub order_events_topic: String,
    #[builder(into, default = DEFAULT_BINARY_EVENTS_TOPIC.to_string())]
    pub binary_events_topic: String,
    /// 每个监听容器的成员任务数
    #[builder(default = 1)]
    pub listener_concurrency: usize,
    #[builder(default = Duration::from_millis(1000))]
    pub auto_commit_interval: Duration,
    /// 新建主题的分区数
    #[builder(default = 3)]
    pub topic_partitions: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Settings {
    /// 从环境变量加载
    pub fn from_env() -> Result<Self> {
        // 开发环境下先加载 .env（若存在）
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意键值来源加载，便于测试
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let listener_concurrency: usize = text("LISTENER_CONCURRENCY", "1")
            .parse()
            .context("LISTENER_CONCURRENCY must be a valid number")?;
        if listener_concurrency == 0 {
            anyhow::bail!("LISTENER_CONCURRENCY must be at least 1");
        }

        let auto_commit_ms: u64 = text("AUTO_COMMIT_INTERVAL_MS", "1000")
            .parse()
            .context("AUTO_COMMIT_INTERVAL_MS must be a valid number")?;
        if auto_commit_ms == 0 {
            anyhow::bail!("AUTO_COMMIT_INTERVAL_MS must be at least 1");
        }

        let topic_partitions: u32 = text("TOPIC_PARTITIONS", "3")
            .parse()
            .context("TOPIC_PARTITIONS must be a valid number")?;

        Ok(Self {
            bootstrap_servers: text("BOOTSTRAP_SERVERS", DEFAULT_BOOTSTRAP_SERVERS),
            schema_registry_url: text("SCHEMA_REGISTRY_URL", DEFAULT_SCHEMA_REGISTRY_URL),
            cdc_topic: text("CDC_TOPIC", DEFAULT_CHANGE_TOPIC),
            cdc_group_id: text("CDC_GROUP_ID", DEFAULT_GROUP_ID),
            order_events_topic: text("ORDER_EVENTS_TOPIC", DEFAULT_ORDER_EVENTS_TOPIC),
            binary_events_topic: text("BINARY_EVENTS_TOPIC", DEFAULT_BINARY_EVENTS_TOPIC),
            listener_concurrency,
            auto_commit_interval: Duration::from_millis(auto_commit_ms),
            topic_partitions: topic_partitions.max(1),
        })
    }
}
