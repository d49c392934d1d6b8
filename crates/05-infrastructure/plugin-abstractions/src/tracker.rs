//! 服务跟踪器定制接口

use crate::service::ServiceObject;
use infrastructure_common::ServiceReference;
use std::marker::PhantomData;
use std::sync::Arc;

/// 服务跟踪器定制器
///
/// 跟踪器在服务进入、修改、离开匹配集合时回调。钩子中的 panic 会被跟踪器捕获并记录。
pub trait ServiceTrackerCustomizer: Send + Sync + 'static {
    /// 缓存在跟踪器中的适配对象
    type Tracked: Clone + Send + Sync + 'static;

    /// 服务进入匹配集合；返回 `None` 表示不跟踪该服务
    fn adding_service(
        &self,
        reference: &ServiceReference,
        service: ServiceObject,
    ) -> Option<Self::Tracked>;

    /// 已跟踪服务的属性修改后仍然匹配
    fn modified_service(&self, _reference: &ServiceReference, _tracked: &Self::Tracked) {}

    /// 服务离开匹配集合
    fn removed_service(&self, _reference: &ServiceReference, _tracked: Self::Tracked) {}
}

/// 默认定制器：把服务对象转型为 `Arc<T>`，类型不符的服务不跟踪
pub struct TypedCustomizer<T: ?Sized> {
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> TypedCustomizer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Default for TypedCustomizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ServiceTrackerCustomizer for TypedCustomizer<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    type Tracked = Arc<T>;

    fn adding_service(&self, _reference: &ServiceReference, service: ServiceObject) -> Option<Arc<T>> {
        service.downcast::<T>()
    }
}

/// 原样跟踪服务对象的定制器
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectCustomizer;

impl ServiceTrackerCustomizer for ObjectCustomizer {
    type Tracked = ServiceObject;

    fn adding_service(&self, _reference: &ServiceReference, service: ServiceObject) -> Option<ServiceObject> {
        Some(service)
    }
}
