//! 类型擦除的服务对象

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 服务提供者对象
///
/// 包装任意 `Arc<T>`（`T` 可以是 trait 对象）。取回时需要以注册时的同一类型 `T` 进行向下转型。
///
/// 注册表只在注册期间持有一份克隆：注销（包括模块停止时的批量注销）会释放这份克隆，
/// 之后提供者的生命周期只取决于调用方仍持有的 `Arc`。注册表不会因此通知持有者，
/// 需要感知注销的调用方应使用服务监听器或服务跟踪器。
#[derive(Clone)]
pub struct ServiceObject {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServiceObject {
    /// 包装服务提供者
    pub fn new<T>(provider: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(provider),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 向下转型为注册时的类型
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<Arc<T>>().cloned()
    }

    /// 注册时的类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 是否为同一次包装产生的对象
    pub fn ptr_eq(&self, other: &ServiceObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObject")
            .field("type_name", &self.type_name)
            .finish()
    }
}
