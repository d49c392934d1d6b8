//! # Infrastructure Common
//!
//! 插件框架的公共类型，供抽象层与实现层共享。
//!
//! ## 核心内容
//!
//! - [`ModuleDescriptor`] - 模块描述符（标识、版本、依赖）
//! - [`ModuleState`] - 模块生命周期状态
//! - [`Properties`] / [`Filter`] - 服务属性与 LDAP 风格过滤表达式
//! - [`ServiceReference`] 等句柄 - 可复制、可校验的注册表句柄
//! - [`EventBus`] - 同步、隔离异常的事件总线
//! - 错误类型与框架配置
//!
//! 本 crate 不持有任何全局状态：注册表由调用方显式构造并传递。

pub mod configuration;
pub mod errors;
pub mod events;
pub mod filter;
pub mod handles;
pub mod lifecycle;
pub mod metadata;
pub mod properties;
pub mod version;

pub use configuration::*;
pub use errors::*;
pub use events::*;
pub use filter::*;
pub use handles::*;
pub use lifecycle::*;
pub use metadata::*;
pub use properties::*;
pub use version::*;
