//! # Plugin Impl
//!
//! 插件框架具体实现：模块注册表、服务注册表、服务跟踪器与扩展注册表。
//!
//! 三个注册表各自持有独立的锁，所有钩子与监听器都在锁外同步调用，
//! 因此钩子内部可以安全地回调任意注册表。
//!
//! ```ignore
//! let framework = Framework::new("workbench");
//! let module = framework.install(descriptor, activator)?;
//! framework.modules().resolve(module)?;
//! framework.modules().start(module)?;
//! ```

pub mod context;
pub mod extension_registry;
pub mod framework;
pub mod module_registry;
pub mod service_registry;
pub mod tracker;

pub use context::ModuleContextImpl;
pub use extension_registry::{ExtensionRegistry, RemovedContributions};
pub use framework::Framework;
pub use module_registry::{ModuleInfo, ModuleRegistry};
pub use service_registry::ServiceRegistry;
pub use tracker::{ServiceTracker, TypedTracker};
