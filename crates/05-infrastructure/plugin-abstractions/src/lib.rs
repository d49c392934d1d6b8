//! # Plugin Abstractions
//!
//! 插件框架抽象层，定义模块、服务与扩展之间的协作接口。
//!
//! ## 核心接口
//!
//! - [`Activator`] - 模块启动/停止钩子
//! - [`ModuleContext`] - 模块访问框架的入口
//! - [`ServiceTrackerCustomizer`] - 服务跟踪器定制策略
//! - [`ExtensionPointFilter`] - 扩展点过滤谓词
//! - [`ServiceObject`] - 类型擦除的服务提供者

pub mod activator;
pub mod context;
pub mod extension;
pub mod service;
pub mod tracker;

pub use activator::*;
pub use context::*;
pub use extension::*;
pub use service::*;
pub use tracker::*;
