//! # 插件框架组合层
//!
//! 负责把配置、日志与插件框架组合成一个可运行的宿主。
//!
//! ## 主要功能
//!
//! - **框架构建器**: 使用构建者模式组装配置源、日志与初始模块
//! - **配置源管理**: TOML/JSON 文件与环境变量的叠加加载
//! - **生命周期管理**: 批量解析、按依赖顺序启动与逆序关闭
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use infrastructure_composition::FrameworkBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = FrameworkBuilder::new()
//!         .add_optional_config_file("config/plugins.toml")
//!         .add_config_env_vars("PLUGIN")
//!         .enable_logging()
//!         .build()
//!         .await?;
//!
//!     let report = runtime.start().await?;
//!     println!("启动失败的模块: {}", report.start_failures.len());
//!
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config_sources;
pub mod runtime;

#[cfg(test)]
mod tests;

// 重新导出主要类型
pub use builder::{initialize_logging, FrameworkBuilder};
pub use config_sources::{ConfigSourceDescriptor, ConfigSourceType, ConfigSources, DEFAULT_ENV_PREFIX};
pub use runtime::{FrameworkRuntime, RuntimeStatus, RuntimeSummary, StartReport};

// 重新导出错误类型
pub use infrastructure_common::FrameworkError;
