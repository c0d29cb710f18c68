//! 变更捕获（cdc）
//!
//! 外部捕获代理把 `orders` 表的提交变更扁平化后发布到变更主题；
//! 本模块负责把变更消息解码为带默认值的 `ChangeRecord`，并在消费侧
//! 隔离单条消息的失败：
//! - `decode_change_message`：纯函数，原始文本 → 记录或 `DecodeFailure`；
//! - `ChangeConsumer`：监听变更主题，解码后交给可插拔的 `ChangeSink`；
//! - `ChangeMessage`：把订单渲染为变更消息的线上形态（用于测试与演示）。
//!
mod consumer;
mod decoder;
mod message;

pub use consumer::{ChangeConsumer, ChangeConsumerStats, ChangeSink, LoggingChangeSink};
pub use decoder::{ChangeRecord, DecodeFailure, decode_change_message};
pub use message::ChangeMessage;

/// 变更处理器默认的消费组
pub const DEFAULT_GROUP_ID: &str = "order-cdc-processor";

/// 默认变更主题
pub const DEFAULT_CHANGE_TOPIC: &str = "dbserver1.public.orders";

/// 变更主题命名：`<database>.<schema>.<table>`
pub fn change_topic(database: &str, schema: &str, table: &str) -> String {
    format!("{database}.{schema}.{table}")
}
