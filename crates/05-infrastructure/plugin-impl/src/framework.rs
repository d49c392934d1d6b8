//! 框架上下文对象
//!
//! 显式构造、显式销毁的进程级状态：一个框架实例拥有三个相互独立的注册表，
//! 测试中可以并存多个互不干扰的实例。

use crate::extension_registry::ExtensionRegistry;
use crate::module_registry::ModuleRegistry;
use crate::service_registry::ServiceRegistry;
use infrastructure_common::{FrameworkSettings, ModuleDescriptor, ModuleError, ModuleHandle, ModuleResult};
use plugin_abstractions::Activator;
use std::sync::Arc;
use tracing::info;

/// 插件框架
#[derive(Debug, Clone)]
pub struct Framework {
    name: String,
    modules: Arc<ModuleRegistry>,
    services: Arc<ServiceRegistry>,
    extensions: Arc<ExtensionRegistry>,
}

impl Framework {
    /// 创建空框架
    pub fn new(name: impl Into<String>) -> Self {
        let services = Arc::new(ServiceRegistry::new());
        let extensions = Arc::new(ExtensionRegistry::new());
        let modules = ModuleRegistry::new(services.clone(), extensions.clone());
        Self {
            name: name.into(),
            modules,
            services,
            extensions,
        }
    }

    /// 按框架设置创建
    pub fn with_settings(settings: &FrameworkSettings) -> Self {
        let framework = Self::new(settings.name.clone());
        framework
            .services
            .set_event_logging(settings.log_service_events);
        framework
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// 安装模块
    pub fn install<A>(&self, descriptor: ModuleDescriptor, activator: A) -> ModuleResult<ModuleHandle>
    where
        A: Activator + 'static,
    {
        self.modules.register(descriptor, Some(Arc::new(activator)))
    }

    /// 安装没有激活器的模块
    pub fn install_passive(&self, descriptor: ModuleDescriptor) -> ModuleResult<ModuleHandle> {
        self.modules.register(descriptor, None)
    }

    /// 停止全部激活模块，返回失败的模块及原因
    pub fn shutdown(&self) -> Vec<(ModuleHandle, ModuleError)> {
        info!(framework = %self.name, "关闭框架");
        self.modules.stop_all()
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::with_settings(&FrameworkSettings::default())
    }
}
