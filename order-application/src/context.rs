use bon::Builder;
use uuid::Uuid;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用所需的横切信息：
/// - 关联追踪 `correlation_id`：进入服务的每个 span 都会带上它；
/// - 执行者 `actor_id`（可选）：用于审计日志。
///
/// 典型用法：
/// ```rust
/// use order_application::context::AppContext;
///
/// let ctx = AppContext::builder()
///     .correlation_id("cor-123")
///     .actor_id("u-1")
///     .build();
/// assert_eq!(ctx.correlation_id, "cor-123");
///
/// // 未指定时自动生成
/// let ctx = AppContext::new();
/// assert!(!ctx.correlation_id.is_empty());
/// ```
#[derive(Clone, Debug, Builder)]
pub struct AppContext {
    #[builder(into, default = Uuid::new_v4().to_string())]
    pub correlation_id: String,
    #[builder(into)]
    pub actor_id: Option<String>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}
