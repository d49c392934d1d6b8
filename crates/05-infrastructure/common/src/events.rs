//! 注册表事件与同步事件总线

use crate::handles::{ListenerId, ModuleHandle, ServiceReference};
use crate::lifecycle::ModuleState;
use crate::properties::Properties;
use crate::version::Version;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// 监听器回调类型
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// 同步事件总线
///
/// 事件在发布线程上依次投递给各监听器，投递前先复制监听器快照并释放锁，
/// 因此监听器内部可以安全地回调注册表或增删监听器。
/// 单个监听器 panic 会被捕获并记录，不影响其余监听器。
pub struct EventBus<E> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> EventBus<E> {
    /// 创建事件总线，`name` 仅用于日志
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 订阅事件
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        debug!(bus = self.name, listener = %id, "注册事件监听器");
        id
    }

    /// 取消订阅，返回监听器是否存在
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    /// 当前监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// 按订阅顺序投递事件，返回执行失败的监听器数量
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<_> = self.listeners.lock().clone();

        let mut failures = 0;
        for (id, listener) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                failures += 1;
                error!(
                    bus = self.name,
                    listener = %id,
                    panic = %panic_message(payload.as_ref()),
                    "事件监听器执行失败"
                );
            }
        }
        failures
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// 提取 panic 负载中的消息文本
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// 模块事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleEventKind {
    Installed,
    Resolved,
    Unresolved,
    Starting,
    Started,
    Stopping,
    Stopped,
    Uninstalled,
}

/// 模块事件
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    pub kind: ModuleEventKind,
    pub module: ModuleHandle,
    pub symbolic_name: String,
    pub version: Version,
    /// 事件发生后的模块状态
    pub state: ModuleState,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 服务事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEventKind {
    /// 服务已注册
    Registered,
    /// 服务属性已修改，且修改后仍匹配监听器过滤器
    Modified,
    /// 服务属性已修改，修改前匹配但修改后不再匹配
    ModifiedEndMatch,
    /// 服务即将注销，事件投递时 `GetService` 已返回空
    Unregistering,
}

/// 服务事件
///
/// 携带事件发生时的属性快照；属性修改事件同时携带修改前的属性，
/// 便于监听器自行判断过滤器匹配状态的变化。
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    pub reference: ServiceReference,
    pub properties: Arc<Properties>,
    pub previous: Option<Arc<Properties>>,
}

impl ServiceEvent {
    /// 以新类型复制事件
    pub fn with_kind(&self, kind: ServiceEventKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}
