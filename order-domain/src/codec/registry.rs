//! Schema 注册中心
//!
//! 注册中心本身是外部服务；这里定义访问接口 `SchemaRegistry`，
//! 并提供进程内实现 `InMemorySchemaRegistry` 用于测试与本地运行。
//!
//! 规则：
//! - 主题 `t` 的值 Schema 注册在 `t-value` 主体下；
//! - 同一主体重复注册相同 Schema 返回既有 ID；
//! - 新版本与最新版本共有的字段必须保持类型不变，否则拒绝注册；
//! - 相同 Schema 在不同主体下共享同一个全局 ID。
//!
use crate::error::{DomainError, DomainResult as Result};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// 字段类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Long,
    Decimal { precision: u8, scale: u8 },
    Enum { symbols: Vec<String> },
    TimestampMillis,
    Optional(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            FieldType::Enum { symbols } => write!(f, "enum[{}]", symbols.join(",")),
            FieldType::TimestampMillis => f.write_str("timestamp-millis"),
            FieldType::Optional(inner) => write!(f, "optional<{inner}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// 记录 Schema：有序字段列表，字段顺序即编码顺序
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 以 `self` 为新版本，检查与 `previous` 的兼容性
    fn check_compatible_with(&self, previous: &Schema) -> Result<()> {
        for field in &self.fields {
            if let Some(old) = previous.field(&field.name) {
                if old.field_type != field.field_type {
                    return Err(DomainError::schema_registry(format!(
                        "incompatible schema {}: field `{}` changed from {} to {}",
                        self.name, field.name, old.field_type, field.field_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 已注册的 Schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSchema {
    pub id: u32,
    pub subject: String,
    pub version: u32,
    pub schema: Arc<Schema>,
}

/// 主题的值 Schema 主体名
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

/// Schema 注册中心接口
pub trait SchemaRegistry: Send + Sync {
    /// 注册（或返回既有的）Schema
    fn register(&self, subject: &str, schema: &Schema) -> Result<RegisteredSchema>;

    /// 查询 Schema 是否已在主体下注册，不做注册
    fn lookup(&self, subject: &str, schema: &Schema) -> Result<Option<RegisteredSchema>>;

    /// 按全局 ID 取 Schema，未知 ID 返回 `SchemaRegistry` 错误
    fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema>;

    fn latest(&self, subject: &str) -> Result<Option<RegisteredSchema>>;
}

/// 进程内 Schema 注册中心
#[derive(Debug)]
pub struct InMemorySchemaRegistry {
    subjects: DashMap<String, Vec<RegisteredSchema>>,
    by_id: DashMap<u32, Arc<Schema>>,
    next_id: AtomicU32,
}

impl Default for InMemorySchemaRegistry {
    fn default() -> Self {
        Self {
            subjects: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.subjects.iter().map(|e| e.key().clone()).collect();
        subjects.sort();
        subjects
    }

    pub fn versions(&self, subject: &str) -> Vec<RegisteredSchema> {
        self.subjects
            .get(subject)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    fn global_id(&self, schema: &Schema) -> u32 {
        self.by_id
            .iter()
            .find(|e| e.value().as_ref() == schema)
            .map(|e| *e.key())
            .unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn register(&self, subject: &str, schema: &Schema) -> Result<RegisteredSchema> {
        // entry 持有分片锁，同一主体的注册串行执行
        let mut versions = self.subjects.entry(subject.to_string()).or_default();

        if let Some(existing) = versions.iter().find(|r| r.schema.as_ref() == schema) {
            return Ok(existing.clone());
        }
        if let Some(latest) = versions.last() {
            schema.check_compatible_with(&latest.schema)?;
        }

        let id = self.global_id(schema);
        let schema = Arc::new(schema.clone());
        self.by_id.entry(id).or_insert_with(|| Arc::clone(&schema));

        let registered = RegisteredSchema {
            id,
            subject: subject.to_string(),
            version: versions.len() as u32 + 1,
            schema,
        };
        versions.push(registered.clone());

        tracing::info!(
            subject,
            id,
            version = registered.version,
            "schema registered"
        );
        Ok(registered)
    }

    fn lookup(&self, subject: &str, schema: &Schema) -> Result<Option<RegisteredSchema>> {
        Ok(self.subjects.get(subject).and_then(|versions| {
            versions
                .iter()
                .find(|r| r.schema.as_ref() == schema)
                .cloned()
        }))
    }

    fn schema_by_id(&self, id: u32) -> Result<RegisteredSchema> {
        let schema = self
            .by_id
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DomainError::schema_registry(format!("unknown schema id {id}")))?;

        let owner = self.subjects.iter().find_map(|e| {
            e.value()
                .iter()
                .find(|r| r.id == id)
                .map(|r| (r.subject.clone(), r.version))
        });
        let (subject, version) = owner.unwrap_or_default();

        Ok(RegisteredSchema {
            id,
            subject,
            version,
            schema,
        })
    }

    fn latest(&self, subject: &str) -> Result<Option<RegisteredSchema>> {
        Ok(self
            .subjects
            .get(subject)
            .and_then(|versions| versions.last().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_v1() -> Schema {
        Schema::new(
            "OrderEvent",
            vec![
                Field::new("order_id", FieldType::String),
                Field::new("quantity", FieldType::Int),
            ],
        )
    }

    #[test]
    fn subject_naming() {
        assert_eq!(value_subject("orders-binary"), "orders-binary-value");
    }

    #[test]
    fn identical_schema_reuses_id() {
        let registry = InMemorySchemaRegistry::new();
        let first = registry.register("orders-value", &schema_v1()).unwrap();
        let again = registry.register("orders-value", &schema_v1()).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.version, 1);

        // 其他主体下相同 Schema 共享全局 ID
        let other = registry.register("archive-value", &schema_v1()).unwrap();
        assert_eq!(other.id, first.id);
        assert_eq!(other.version, 1);
        assert_eq!(registry.subjects(), vec!["archive-value", "orders-value"]);
    }

    #[test]
    fn compatible_evolution_adds_version() {
        let registry = InMemorySchemaRegistry::new();
        let v1 = registry.register("orders-value", &schema_v1()).unwrap();

        let mut evolved = schema_v1();
        evolved.fields.push(Field::new(
            "note",
            FieldType::Optional(Box::new(FieldType::String)),
        ));
        let v2 = registry.register("orders-value", &evolved).unwrap();

        assert_ne!(v1.id, v2.id);
        assert_eq!(v2.version, 2);
        assert_eq!(registry.latest("orders-value").unwrap().unwrap(), v2);
        assert_eq!(registry.schema_by_id(v1.id).unwrap().schema.as_ref(), &schema_v1());
    }

    #[test]
    fn type_change_is_rejected() {
        let registry = InMemorySchemaRegistry::new();
        registry.register("orders-value", &schema_v1()).unwrap();

        let broken = Schema::new(
            "OrderEvent",
            vec![
                Field::new("order_id", FieldType::String),
                Field::new("quantity", FieldType::Long),
            ],
        );
        match registry.register("orders-value", &broken).unwrap_err() {
            DomainError::SchemaRegistry { reason } => assert!(reason.contains("quantity")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(registry.versions("orders-value").len(), 1);
    }

    #[test]
    fn lookup_and_unknown_id() {
        let registry = InMemorySchemaRegistry::new();
        assert_eq!(registry.lookup("orders-value", &schema_v1()).unwrap(), None);
        assert!(registry.schema_by_id(42).is_err());
        assert!(registry.latest("orders-value").unwrap().is_none());
    }
}
