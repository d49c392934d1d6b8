//! 框架构建器

use crate::config_sources::ConfigSources;
use crate::runtime::FrameworkRuntime;
use infrastructure_common::{
    FrameworkConfig, FrameworkError, FrameworkResult, LogFormat, LoggingConfig, ModuleDescriptor,
    ModuleHandle,
};
use plugin_abstractions::Activator;
use plugin_impl::Framework;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 待安装的模块
struct PendingModule {
    descriptor: ModuleDescriptor,
    activator: Option<Arc<dyn Activator>>,
}

/// 框架构建器
///
/// 使用建造者模式组装配置源、日志与初始模块，构建 [`FrameworkRuntime`]
pub struct FrameworkBuilder {
    /// 配置源
    config_sources: ConfigSources,
    /// 直接指定的配置，优先于配置源
    config: Option<FrameworkConfig>,
    /// 是否初始化全局日志
    logging_enabled: bool,
    /// 覆盖配置中的日志设置
    logging_override: Option<LoggingConfig>,
    /// 初始模块，按添加顺序安装
    modules: Vec<PendingModule>,
}

impl FrameworkBuilder {
    /// 创建新的框架构建器
    pub fn new() -> Self {
        Self {
            config_sources: ConfigSources::new(),
            config: None,
            logging_enabled: false,
            logging_override: None,
            modules: Vec::new(),
        }
    }

    /// 添加配置文件（TOML 或 JSON，按扩展名识别）
    pub fn add_config_file<P: AsRef<Path>>(mut self, path: P) -> FrameworkResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameworkError::BootstrapFailed {
                message: format!("配置文件不存在: {}", path.display()),
            });
        }

        info!("添加配置文件: {}", path.display());
        self.config_sources = self.config_sources.add_file(path, true);
        Ok(self)
    }

    /// 添加可选配置文件，文件不存在时忽略
    pub fn add_optional_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_sources = self.config_sources.add_file(path, false);
        self
    }

    /// 添加环境变量配置源
    pub fn add_config_env_vars<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config_sources = self.config_sources.add_env_vars(prefix);
        self
    }

    /// 直接指定框架配置，忽略配置源
    pub fn with_config(mut self, config: FrameworkConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 启用日志初始化，使用配置中的日志设置
    pub fn enable_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    /// 启用日志初始化并覆盖配置中的日志设置
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_override = Some(config);
        self.logging_enabled = true;
        self
    }

    /// 添加带激活器的模块
    pub fn add_module<A>(mut self, descriptor: ModuleDescriptor, activator: A) -> Self
    where
        A: Activator + 'static,
    {
        debug!("添加模块: {}", descriptor.label());
        self.modules.push(PendingModule {
            descriptor,
            activator: Some(Arc::new(activator)),
        });
        self
    }

    /// 添加没有激活器的模块
    pub fn add_passive_module(mut self, descriptor: ModuleDescriptor) -> Self {
        debug!("添加模块: {}", descriptor.label());
        self.modules.push(PendingModule {
            descriptor,
            activator: None,
        });
        self
    }

    /// 构建框架运行时
    ///
    /// 加载配置、初始化日志（如启用）、创建框架并安装初始模块。模块在
    /// [`FrameworkRuntime::start`] 时才解析和启动。
    pub async fn build(self) -> FrameworkResult<FrameworkRuntime> {
        let mut config = match self.config {
            Some(config) => {
                crate::config_sources::validate(&config)?;
                config
            }
            None => self.config_sources.load()?,
        };
        if let Some(logging) = self.logging_override {
            config.logging = logging;
        }

        // 只有在明确启用时才初始化日志，避免测试中重复初始化
        if self.logging_enabled {
            initialize_logging(&config.logging)?;
        }

        info!(framework = %config.framework.name, "开始构建插件框架");
        let framework = Framework::with_settings(&config.framework);

        let mut installed: Vec<ModuleHandle> = Vec::with_capacity(self.modules.len());
        for module in self.modules {
            let handle = framework
                .modules()
                .register(module.descriptor, module.activator)?;
            installed.push(handle);
        }

        info!(
            framework = %config.framework.name,
            modules = installed.len(),
            "插件框架构建完成"
        );
        Ok(FrameworkRuntime::new(framework, config))
    }
}

impl Default for FrameworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 初始化全局日志系统
///
/// 全局订阅者已存在时返回错误，调用方可以选择忽略。
pub fn initialize_logging(config: &LoggingConfig) -> FrameworkResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level).map_err(|e| {
        FrameworkError::BootstrapFailed {
            message: format!("日志级别无效: {}", e),
        }
    })?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids);

    match config.format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Pretty => subscriber.try_init(),
    }
    .map_err(|e| FrameworkError::BootstrapFailed {
        message: format!("日志初始化失败: {}", e),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}
