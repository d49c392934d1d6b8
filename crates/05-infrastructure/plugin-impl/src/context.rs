//! 模块上下文实现

use crate::extension_registry::ExtensionRegistry;
use crate::module_registry::ModuleRegistry;
use crate::service_registry::ServiceRegistry;
use infrastructure_common::{
    ExtensionError, ExtensionHandle, ExtensionResult, ModuleDescriptor, ModuleHandle, Properties,
    ServiceError, ServiceRegistration, ServiceReference, ServiceResult, VersionRange,
};
use plugin_abstractions::{ConfigurationElement, ModuleContext, ServiceObject};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// 模块激活期间的上下文
///
/// 由模块注册表在 `Start` 时创建，在 `Stop` 完成或启动失败后失效。
pub struct ModuleContextImpl {
    module: ModuleHandle,
    descriptor: Arc<ModuleDescriptor>,
    valid: AtomicBool,
    services: Arc<ServiceRegistry>,
    extensions: Arc<ExtensionRegistry>,
    modules: Weak<ModuleRegistry>,
}

impl ModuleContextImpl {
    pub(crate) fn new(
        module: ModuleHandle,
        descriptor: Arc<ModuleDescriptor>,
        services: Arc<ServiceRegistry>,
        extensions: Arc<ExtensionRegistry>,
        modules: Weak<ModuleRegistry>,
    ) -> Self {
        Self {
            module,
            descriptor,
            valid: AtomicBool::new(true),
            services,
            extensions,
            modules,
        }
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    fn check_service_access(&self) -> ServiceResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ServiceError::InvalidContext {
                module: self.descriptor.label(),
            })
        }
    }

    fn check_extension_access(&self) -> ExtensionResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ExtensionError::InvalidContext {
                module: self.descriptor.label(),
            })
        }
    }
}

impl ModuleContext for ModuleContextImpl {
    fn module(&self) -> ModuleHandle {
        self.module
    }

    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn register_service(
        &self,
        interfaces: &[&str],
        provider: ServiceObject,
        properties: Properties,
    ) -> ServiceResult<ServiceRegistration> {
        self.check_service_access()?;
        self.services
            .register_service(self.module, interfaces, provider, properties)
    }

    fn set_service_properties(
        &self,
        registration: &ServiceRegistration,
        properties: Properties,
    ) -> ServiceResult<()> {
        self.check_service_access()?;
        self.services.set_properties(registration, properties)
    }

    fn unregister_service(&self, registration: &ServiceRegistration) {
        // 失效后仍允许注销，注册表会在停止时兜底清理
        self.services.unregister(registration);
    }

    fn get_service_references(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> ServiceResult<Vec<ServiceReference>> {
        self.check_service_access()?;
        self.services.get_service_references(interface, filter)
    }

    fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject> {
        if !self.is_valid() {
            return None;
        }
        self.services.get_service(reference)
    }

    fn register_extension_point(&self, point_id: &str, schema: Option<&str>) -> ExtensionResult<()> {
        self.check_extension_access()?;
        self.extensions
            .register_extension_point(self.module, point_id, schema)
            .map(|_| ())
    }

    fn register_extension(
        &self,
        target_point_id: &str,
        configuration: Vec<ConfigurationElement>,
    ) -> ExtensionResult<ExtensionHandle> {
        self.check_extension_access()?;
        self.extensions
            .register_extension(self.module, target_point_id, configuration)
    }

    fn find_module(&self, symbolic_name: &str, range: &VersionRange) -> Option<ModuleHandle> {
        self.modules.upgrade()?.find_module(symbolic_name, range)
    }
}

impl std::fmt::Debug for ModuleContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContextImpl")
            .field("module", &self.module)
            .field("symbolic_name", &self.descriptor.symbolic_name)
            .field("valid", &self.is_valid())
            .finish()
    }
}
