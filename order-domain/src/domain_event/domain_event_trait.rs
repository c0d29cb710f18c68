use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型的稳定名称，写入文本编码的类型头，供通用消费者还原具体类型
    const TYPE: &'static str;

    /// 事件载荷版本（用于 Schema 演进）
    const VERSION: u32;

    /// 分区键：同一键的事件落在同一分区，保证相对顺序
    fn key(&self) -> &str;
}
