//! 订单变更中继应用层（order-application）
//!
//! 在领域层之上组织用例：订单写入服务、事件发布器、运行配置与事件通道装配。
//!
pub mod channels;
pub mod command;
pub mod context;
pub mod error;
pub mod order_service;
pub mod publisher;
pub mod settings;

pub use channels::EventChannels;
pub use order_service::OrderWriteService;
pub use publisher::{BinaryOrderEventPublisher, OrderEventPublisher};
pub use settings::Settings;
