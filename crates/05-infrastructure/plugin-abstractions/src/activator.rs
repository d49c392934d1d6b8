//! 模块激活器

use crate::context::ModuleContext;
use infrastructure_common::BoxError;
use std::sync::Arc;

/// 激活器钩子的返回类型
pub type ActivatorResult = Result<(), BoxError>;

/// 模块激活器
///
/// 模块注册表只在 `Start`/`Stop` 状态转换期间调用激活器。
/// 钩子返回错误（或 panic）会使本次转换失败，但不影响注册表本身。
pub trait Activator: Send + Sync {
    /// 模块启动，通常在此注册服务和扩展
    fn start(&self, context: &Arc<dyn ModuleContext>) -> ActivatorResult;

    /// 模块停止，应注销自己注册的服务
    fn stop(&self, context: &Arc<dyn ModuleContext>) -> ActivatorResult;
}

type Hook = Box<dyn Fn(&Arc<dyn ModuleContext>) -> ActivatorResult + Send + Sync>;

/// 基于闭包的激活器
pub struct FnActivator {
    on_start: Hook,
    on_stop: Hook,
}

impl FnActivator {
    /// 使用启动和停止闭包创建激活器
    pub fn new<S, T>(on_start: S, on_stop: T) -> Self
    where
        S: Fn(&Arc<dyn ModuleContext>) -> ActivatorResult + Send + Sync + 'static,
        T: Fn(&Arc<dyn ModuleContext>) -> ActivatorResult + Send + Sync + 'static,
    {
        Self {
            on_start: Box::new(on_start),
            on_stop: Box::new(on_stop),
        }
    }

    /// 只关心启动的激活器
    pub fn on_start<S>(on_start: S) -> Self
    where
        S: Fn(&Arc<dyn ModuleContext>) -> ActivatorResult + Send + Sync + 'static,
    {
        Self::new(on_start, |_| Ok(()))
    }
}

impl Activator for FnActivator {
    fn start(&self, context: &Arc<dyn ModuleContext>) -> ActivatorResult {
        (self.on_start)(context)
    }

    fn stop(&self, context: &Arc<dyn ModuleContext>) -> ActivatorResult {
        (self.on_stop)(context)
    }
}

impl std::fmt::Debug for FnActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnActivator").finish_non_exhaustive()
    }
}
