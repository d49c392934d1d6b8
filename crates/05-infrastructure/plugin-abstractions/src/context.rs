//! 模块上下文
//!
//! 模块在激活期间访问框架的唯一入口。上下文随模块停止而失效，
//! 失效后的注册类调用返回 `InvalidContext`。

use crate::extension::ConfigurationElement;
use crate::service::ServiceObject;
use infrastructure_common::{
    ExtensionHandle, ExtensionResult, ModuleDescriptor, ModuleHandle, Properties,
    ServiceRegistration, ServiceReference, ServiceResult, VersionRange,
};
use std::sync::Arc;

/// 模块上下文 trait
pub trait ModuleContext: Send + Sync {
    /// 所属模块
    fn module(&self) -> ModuleHandle;

    /// 所属模块的描述符
    fn descriptor(&self) -> &ModuleDescriptor;

    /// 上下文是否仍然有效
    fn is_valid(&self) -> bool;

    /// 以当前模块的名义注册服务
    fn register_service(
        &self,
        interfaces: &[&str],
        provider: ServiceObject,
        properties: Properties,
    ) -> ServiceResult<ServiceRegistration>;

    /// 替换服务属性
    fn set_service_properties(
        &self,
        registration: &ServiceRegistration,
        properties: Properties,
    ) -> ServiceResult<()>;

    /// 注销服务（幂等）
    fn unregister_service(&self, registration: &ServiceRegistration);

    /// 查询服务引用，按排名降序、服务标识升序排列
    fn get_service_references(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> ServiceResult<Vec<ServiceReference>>;

    /// 获取服务对象，服务已注销时返回 `None`
    fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject>;

    /// 声明扩展点
    fn register_extension_point(&self, point_id: &str, schema: Option<&str>)
        -> ExtensionResult<()>;

    /// 向扩展点贡献扩展，扩展点可以尚未声明
    fn register_extension(
        &self,
        target_point_id: &str,
        configuration: Vec<ConfigurationElement>,
    ) -> ExtensionResult<ExtensionHandle>;

    /// 查找版本范围内最高版本的模块
    fn find_module(&self, symbolic_name: &str, range: &VersionRange) -> Option<ModuleHandle>;
}

/// 类型化的上下文便捷方法
pub trait ModuleContextExt: ModuleContext {
    /// 以单个接口注册类型化服务
    fn register<T>(
        &self,
        interface: &str,
        provider: Arc<T>,
        properties: Properties,
    ) -> ServiceResult<ServiceRegistration>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_service(&[interface], ServiceObject::new(provider), properties)
    }

    /// 获取接口下排名最高且类型匹配的服务
    fn service<T>(&self, interface: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let references = self.get_service_references(interface, None).ok()?;
        references
            .iter()
            .find_map(|reference| self.get_service(reference)?.downcast::<T>())
    }
}

impl<C: ModuleContext + ?Sized> ModuleContextExt for C {}
