//! 领域层统一错误定义
//!
//! 覆盖订单写入（重复/参数/并发冲突）、编解码与 Schema 注册、消息日志等
//! 最小必要集合，便于在各实现层统一转换为 `DomainError`。
//!
//! 变更消息的解码失败不在此列：它是消费边界内的普通值
//! （见 [`crate::cdc::DecodeFailure`]），从不向调用方传播。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 订单写入 ---
    #[error("duplicate entity: id={id}")]
    DuplicateEntity { id: String },
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("concurrency conflict: id={id}, expected={expected}, actual={actual}")]
    ConcurrencyConflict {
        id: String,
        expected: u64,
        actual: u64,
    },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 序列化/编解码 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("codec error: {reason}")]
    Codec { reason: String },
    #[error("schema registry error: {reason}")]
    SchemaRegistry { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 消息日志/生产者 ---
    #[error("message log error: {reason}")]
    MessageLog { reason: String },
    #[error("producer error: {reason}")]
    Producer { reason: String },

    // --- 仓储/持久化 ---
    #[error("repository error: {reason}")]
    Repository { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
}

impl DomainError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    pub fn schema_registry(reason: impl Into<String>) -> Self {
        Self::SchemaRegistry {
            reason: reason.into(),
        }
    }

    pub fn message_log(reason: impl Into<String>) -> Self {
        Self::MessageLog {
            reason: reason.into(),
        }
    }

    /// 是否为可重试的瞬时错误（生产者按有限次数重试）
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::MessageLog { .. } | Self::Database { .. })
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for DomainError {
    fn from(err: std::num::ParseIntError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<rust_decimal::Error> for DomainError {
    fn from(err: rust_decimal::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::error::EncodeError> for DomainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        DomainError::Codec {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::error::DecodeError> for DomainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        DomainError::Codec {
            reason: err.to_string(),
        }
    }
}
