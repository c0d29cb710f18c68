//! 实体（Entity）基础抽象
//!
//! 为持久化记录提供统一的标识（Id）与版本（optimistic locking）能力，
//! 存储在提交时通过回调写入新版本与提交时间。
//!
use crate::value_object::Version;
use chrono::{DateTime, Utc};
use std::{fmt::Display, hash::Hash, str::FromStr};

/// 具备唯一标识与版本的实体抽象
pub trait Entity: Clone + Send + Sync {
    /// 实体标识类型，要求可解析、可显示与可哈希
    type Id: FromStr + Clone + Display + Eq + Hash + Send + Sync;

    /// 获取实体标识
    fn id(&self) -> &Self::Id;

    /// 获取读取时的版本（提交时据此做乐观并发校验）
    fn version(&self) -> Version;

    /// 是否已持久化；未持久化的实体只能以插入方式提交
    fn is_persisted(&self) -> bool;

    /// 插入提交成功后的回调
    fn mark_inserted(&mut self, committed_at: DateTime<Utc>);

    /// 更新提交成功后的回调，`version` 为提交后的新版本
    fn mark_updated(&mut self, version: Version, committed_at: DateTime<Utc>);
}
