//! 框架运行时
//!
//! 在异步宿主中驱动框架生命周期。注册表操作与激活器钩子是同步的，
//! 批量启动和停止放在阻塞线程池中执行，避免阻塞异步工作线程。

use crate::builder::FrameworkBuilder;
use infrastructure_common::{
    FrameworkConfig, FrameworkError, FrameworkResult, ModuleError, ModuleHandle, ModuleState,
};
use plugin_impl::Framework;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    /// 已构建
    Initialized,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
}

/// 启动报告
#[derive(Debug, Default)]
pub struct StartReport {
    /// 解析失败的模块
    pub resolve_failures: Vec<(ModuleHandle, ModuleError)>,
    /// 启动失败的模块
    pub start_failures: Vec<(ModuleHandle, ModuleError)>,
}

impl StartReport {
    pub fn is_clean(&self) -> bool {
        self.resolve_failures.is_empty() && self.start_failures.is_empty()
    }
}

/// 框架概况
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSummary {
    pub modules: usize,
    pub active_modules: usize,
    pub services: usize,
    pub extension_points: usize,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// 框架运行时
pub struct FrameworkRuntime {
    framework: Framework,
    config: FrameworkConfig,
    status: Arc<RwLock<RuntimeStatus>>,
    started_at: Arc<RwLock<Option<chrono::DateTime<chrono::Utc>>>>,
}

impl FrameworkRuntime {
    /// 创建框架构建器
    pub fn builder() -> FrameworkBuilder {
        FrameworkBuilder::new()
    }

    pub(crate) fn new(framework: Framework, config: FrameworkConfig) -> Self {
        Self {
            framework,
            config,
            status: Arc::new(RwLock::new(RuntimeStatus::Initialized)),
            started_at: Arc::new(RwLock::new(None)),
        }
    }

    /// 框架实例
    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    /// 生效的配置
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// 当前状态
    pub async fn status(&self) -> RuntimeStatus {
        *self.status.read().await
    }

    /// 启动框架
    ///
    /// 按配置解析全部已安装模块并按依赖顺序启动。单个模块失败不会中止启动，
    /// 失败记录在返回的报告中。
    pub async fn start(&self) -> FrameworkResult<StartReport> {
        {
            let mut status = self.status.write().await;
            if !matches!(*status, RuntimeStatus::Initialized | RuntimeStatus::Stopped) {
                return Err(FrameworkError::BootstrapFailed {
                    message: format!("运行时状态不允许启动: {:?}", *status),
                });
            }
            *status = RuntimeStatus::Starting;
        }

        info!(framework = %self.framework.name(), "启动插件框架");

        let settings = self.config.framework.clone();
        let framework = self.framework.clone();
        let report = tokio::task::spawn_blocking(move || {
            let mut report = StartReport::default();
            if settings.auto_resolve {
                report.resolve_failures = framework.modules().resolve_all();
            }
            if settings.auto_start {
                report.start_failures = framework.modules().start_all();
            }
            report
        })
        .await
        .map_err(|e| FrameworkError::BootstrapFailed {
            message: format!("启动任务执行失败: {}", e),
        })?;

        for (handle, error) in report.resolve_failures.iter().chain(&report.start_failures) {
            warn!(module = %handle, %error, "模块未能启动");
        }

        *self.started_at.write().await = Some(chrono::Utc::now());
        *self.status.write().await = RuntimeStatus::Running;

        info!(
            framework = %self.framework.name(),
            failures = report.resolve_failures.len() + report.start_failures.len(),
            "插件框架启动完成"
        );
        Ok(report)
    }

    /// 停止框架
    ///
    /// 按依赖逆序停止全部激活模块。任一模块的停止钩子失败时模块仍被停止，
    /// 失败汇总为 `ShutdownFailed` 返回。
    pub async fn stop(&self) -> FrameworkResult<()> {
        {
            let mut status = self.status.write().await;
            if *status != RuntimeStatus::Running {
                return Ok(());
            }
            *status = RuntimeStatus::Stopping;
        }

        info!(framework = %self.framework.name(), "停止插件框架");

        let failures = if self.config.framework.stop_on_shutdown {
            let framework = self.framework.clone();
            tokio::task::spawn_blocking(move || framework.shutdown())
                .await
                .map_err(|e| FrameworkError::ShutdownFailed {
                    message: format!("停止任务执行失败: {}", e),
                })?
        } else {
            Vec::new()
        };

        *self.status.write().await = RuntimeStatus::Stopped;

        if failures.is_empty() {
            info!(framework = %self.framework.name(), "插件框架已停止");
            return Ok(());
        }

        let message = failures
            .iter()
            .map(|(handle, error)| format!("{}: {}", handle, error))
            .collect::<Vec<_>>()
            .join("; ");
        error!(framework = %self.framework.name(), %message, "部分模块停止失败");
        Err(FrameworkError::ShutdownFailed { message })
    }

    /// 框架概况
    pub async fn summary(&self) -> RuntimeSummary {
        let modules = self.framework.modules().modules();
        RuntimeSummary {
            modules: modules.len(),
            active_modules: modules
                .iter()
                .filter(|module| module.state == ModuleState::Active)
                .count(),
            services: self.framework.services().service_count(),
            extension_points: self.framework.extensions().get_extension_points(None).len(),
            started_at: *self.started_at.read().await,
        }
    }
}

impl std::fmt::Debug for FrameworkRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkRuntime")
            .field("framework", &self.framework)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
