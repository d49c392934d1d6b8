//! 服务跟踪器
//!
//! 维护与过滤器匹配的服务的实时视图。跟踪器先订阅注册表事件再做初始扫描，
//! 扫描期间到达的事件与扫描结果按服务标识去重。定制器钩子总是在跟踪器锁之外调用。
//! 关闭时等待其他线程上进行中的钩子（包括 adding 钩子补发的 removed 钩子）完成。

use crate::service_registry::ServiceRegistry;
use infrastructure_common::{
    panic_message, Filter, ListenerId, ServiceEvent, ServiceEventKind, ServiceId,
    ServiceReference, ServiceResult,
};
use parking_lot::{Condvar, Mutex};
use plugin_abstractions::{ServiceTrackerCustomizer, TypedCustomizer};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// 按类型转型的跟踪器
pub type TypedTracker<T> = ServiceTracker<TypedCustomizer<T>>;

struct TrackedEntry<T> {
    reference: ServiceReference,
    tracked: T,
}

/// 正在执行 adding 钩子的服务
struct PendingAdd {
    id: ServiceId,
    generation: u64,
    thread: ThreadId,
    /// adding 期间服务已被移除
    cancelled: bool,
}

/// 在锁外执行的 modified/removed 钩子
struct RunningHook {
    generation: u64,
    thread: ThreadId,
}

struct TrackerState<T> {
    open: bool,
    /// 每次打开递增，用于丢弃上一轮遗留的事件
    generation: u64,
    listener: Option<ListenerId>,
    /// 按加入顺序
    tracked: Vec<TrackedEntry<T>>,
    adding: Vec<PendingAdd>,
    running: Vec<RunningHook>,
    tracking_count: u64,
}

impl<T: Clone> TrackerState<T> {
    fn best(&self) -> Option<&TrackedEntry<T>> {
        self.tracked
            .iter()
            .min_by(|a, b| a.reference.selection_order(&b.reference))
    }

    fn ordered(&self) -> Vec<&TrackedEntry<T>> {
        let mut entries: Vec<_> = self.tracked.iter().collect();
        entries.sort_by(|a, b| a.reference.selection_order(&b.reference));
        entries
    }

    fn position(&self, id: ServiceId) -> Option<usize> {
        self.tracked.iter().position(|entry| entry.reference.id == id)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.open && self.generation == generation
    }

    /// 当前打开周期内正在加入的服务
    fn pending_mut(&mut self, id: ServiceId) -> Option<&mut PendingAdd> {
        let generation = self.generation;
        self.adding
            .iter_mut()
            .find(|pending| pending.id == id && pending.generation == generation)
    }

    fn finish_add(&mut self, id: ServiceId, generation: u64) {
        self.adding
            .retain(|pending| !(pending.id == id && pending.generation == generation));
    }

    fn is_adding(&self, id: ServiceId) -> bool {
        self.adding
            .iter()
            .any(|pending| pending.id == id && pending.generation == self.generation)
    }

    fn enter_hook(&mut self, generation: u64) {
        self.running.push(RunningHook {
            generation,
            thread: thread::current().id(),
        });
    }

    fn leave_hook(&mut self, generation: u64) {
        let current = thread::current().id();
        if let Some(index) = self
            .running
            .iter()
            .position(|hook| hook.generation == generation && hook.thread == current)
        {
            self.running.swap_remove(index);
        }
    }

    /// 其他线程上是否仍有属于该周期的钩子
    fn busy_elsewhere(&self, generation: u64, current: ThreadId) -> bool {
        self.adding
            .iter()
            .any(|pending| pending.generation == generation && pending.thread != current)
            || self
                .running
                .iter()
                .any(|hook| hook.generation == generation && hook.thread != current)
    }
}

struct TrackerInner<C: ServiceTrackerCustomizer> {
    registry: Arc<ServiceRegistry>,
    interface: String,
    filter: Filter,
    customizer: C,
    state: Mutex<TrackerState<C::Tracked>>,
    changed: Condvar,
}

/// 服务跟踪器
///
/// 状态机：`Closed → Open → Closed`，关闭后允许重新打开，重新打开会清空缓存。
/// 跟踪器被丢弃时自动关闭。
pub struct ServiceTracker<C: ServiceTrackerCustomizer> {
    inner: Arc<TrackerInner<C>>,
}

impl<C: ServiceTrackerCustomizer> ServiceTracker<C> {
    /// 创建跟踪接口 `interface` 且满足可选过滤表达式的跟踪器
    pub fn new(
        registry: Arc<ServiceRegistry>,
        interface: &str,
        filter: Option<&str>,
        customizer: C,
    ) -> ServiceResult<Self> {
        let filter = filter.map(Filter::parse).transpose()?;
        Ok(Self::with_filter(registry, interface, filter, customizer))
    }

    /// 使用已解析的过滤器创建跟踪器
    pub fn with_filter(
        registry: Arc<ServiceRegistry>,
        interface: &str,
        filter: Option<Filter>,
        customizer: C,
    ) -> Self {
        let object_class = Filter::object_class(interface);
        let filter = match filter {
            Some(filter) => object_class.and(filter),
            None => object_class,
        };

        Self {
            inner: Arc::new(TrackerInner {
                registry,
                interface: interface.to_string(),
                filter,
                customizer,
                state: Mutex::new(TrackerState {
                    open: false,
                    generation: 0,
                    listener: None,
                    tracked: Vec::new(),
                    adding: Vec::new(),
                    running: Vec::new(),
                    tracking_count: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// 开始跟踪
    ///
    /// 同步扫描当前已注册的匹配服务，按排名降序、服务标识升序调用 adding 钩子后返回。
    /// 已打开时为空操作。
    pub fn open(&self) {
        let inner = &self.inner;
        let generation = {
            let mut state = inner.state.lock();
            if state.open {
                return;
            }
            state.open = true;
            state.generation += 1;
            state.tracked.clear();
            state.tracking_count = 0;
            state.generation
        };

        let weak = Arc::downgrade(inner);
        let listener = inner
            .registry
            .add_filtered_listener(Some(inner.filter.clone()), move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(event, generation);
                }
            });

        let stale = {
            let mut state = inner.state.lock();
            if state.is_current(generation) {
                state.listener = Some(listener);
                false
            } else {
                true
            }
        };
        if stale {
            inner.registry.remove_service_listener(listener);
            return;
        }

        debug!(interface = %inner.interface, filter = %inner.filter, "服务跟踪器已打开");

        for reference in inner.registry.find_references(&inner.interface, Some(&inner.filter)) {
            inner.track(reference, generation);
        }
    }

    /// 停止跟踪
    ///
    /// 对每个仍被跟踪的服务按加入顺序调用 removed 钩子后清空缓存；重复调用为空操作。
    /// 返回前等待其他线程上进行中的钩子完成，进行中的 adding 钩子会补发 removed 钩子，
    /// 返回后不再有钩子调用；在定制器钩子内部调用时不等待本线程的钩子。
    pub fn close(&self) {
        let inner = &self.inner;
        let (listener, entries, generation) = {
            let mut state = inner.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            (
                state.listener.take(),
                std::mem::take(&mut state.tracked),
                state.generation,
            )
        };

        if let Some(listener) = listener {
            inner.registry.remove_service_listener(listener);
        }
        for entry in entries {
            inner.removed(&entry.reference, entry.tracked);
        }
        inner.changed.notify_all();

        let current = thread::current().id();
        let mut state = inner.state.lock();
        while state.busy_elsewhere(generation, current) {
            inner.changed.wait(&mut state);
        }
        drop(state);

        debug!(interface = %inner.interface, "服务跟踪器已关闭");
    }

    /// 是否处于打开状态
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// 当前跟踪的对象，按排名降序
    pub fn get_services(&self) -> Vec<C::Tracked> {
        let state = self.inner.state.lock();
        state
            .ordered()
            .into_iter()
            .map(|entry| entry.tracked.clone())
            .collect()
    }

    /// 排名最高的跟踪对象
    pub fn get_service(&self) -> Option<C::Tracked> {
        self.inner
            .state
            .lock()
            .best()
            .map(|entry| entry.tracked.clone())
    }

    /// 当前跟踪的服务引用，按排名降序
    pub fn service_references(&self) -> Vec<ServiceReference> {
        let state = self.inner.state.lock();
        state.ordered().into_iter().map(|entry| entry.reference).collect()
    }

    /// 跟踪的服务数量
    pub fn size(&self) -> usize {
        self.inner.state.lock().tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 本次打开以来跟踪集合的变更次数
    pub fn tracking_count(&self) -> u64 {
        self.inner.state.lock().tracking_count
    }

    /// 等待至少一个服务被跟踪
    ///
    /// 超时或跟踪器已关闭时返回当前的最佳对象（可能为空）。
    pub fn wait_for_service(&self, timeout: Duration) -> Option<C::Tracked> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(entry) = state.best() {
                return Some(entry.tracked.clone());
            }
            if !state.open {
                return None;
            }
            if self
                .inner
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.best().map(|entry| entry.tracked.clone());
            }
        }
    }

    /// 跟踪器使用的完整过滤器
    pub fn filter(&self) -> &Filter {
        &self.inner.filter
    }

    /// 定制器
    pub fn customizer(&self) -> &C {
        &self.inner.customizer
    }
}

impl<T> ServiceTracker<TypedCustomizer<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    /// 跟踪接口下可转型为 `Arc<T>` 的服务
    pub fn typed(registry: Arc<ServiceRegistry>, interface: &str) -> Self {
        Self::with_filter(registry, interface, None, TypedCustomizer::new())
    }
}

impl<C: ServiceTrackerCustomizer> Drop for ServiceTracker<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: ServiceTrackerCustomizer> std::fmt::Debug for ServiceTracker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTracker")
            .field("interface", &self.inner.interface)
            .field("filter", &self.inner.filter.to_string())
            .field("open", &self.is_open())
            .field("size", &self.size())
            .finish()
    }
}

impl<C: ServiceTrackerCustomizer> TrackerInner<C> {
    fn on_event(&self, event: &ServiceEvent, generation: u64) {
        match event.kind {
            ServiceEventKind::Registered => self.track(event.reference, generation),
            ServiceEventKind::Modified => self.modified(event.reference, generation),
            ServiceEventKind::ModifiedEndMatch | ServiceEventKind::Unregistering => {
                self.untrack(event.reference, generation);
            }
        }
    }

    fn track(&self, reference: ServiceReference, generation: u64) {
        {
            let mut state = self.state.lock();
            if !state.is_current(generation)
                || state.position(reference.id).is_some()
                || state.is_adding(reference.id)
            {
                return;
            }
            state.adding.push(PendingAdd {
                id: reference.id,
                generation,
                thread: thread::current().id(),
                cancelled: false,
            });
        }

        let tracked = self.registry.get_service(&reference).and_then(|service| {
            self.guarded("adding_service", &reference, || {
                self.customizer.adding_service(&reference, service)
            })
            .flatten()
        });

        let mut state = self.state.lock();
        let cancelled = state.adding.iter().any(|pending| {
            pending.id == reference.id && pending.generation == generation && pending.cancelled
        });

        match tracked {
            Some(tracked) if cancelled || !state.is_current(generation) => {
                // removed 钩子完成前保留进行中记录，close 据此等待
                drop(state);
                self.removed(&reference, tracked);
                self.state.lock().finish_add(reference.id, generation);
            }
            Some(tracked) => {
                state.finish_add(reference.id, generation);
                state.tracked.push(TrackedEntry { reference, tracked });
                state.tracking_count += 1;
                drop(state);
                debug!(service = %reference.id, interface = %self.interface, "开始跟踪服务");
            }
            None => {
                state.finish_add(reference.id, generation);
                drop(state);
            }
        }
        self.changed.notify_all();
    }

    fn modified(&self, reference: ServiceReference, generation: u64) {
        let tracked = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                return;
            }
            match state.position(reference.id) {
                Some(index) => {
                    state.tracking_count += 1;
                    state.enter_hook(generation);
                    let entry = &mut state.tracked[index];
                    entry.reference = reference;
                    Some(entry.tracked.clone())
                }
                None if state.is_adding(reference.id) => return,
                None => None,
            }
        };

        match tracked {
            Some(tracked) => {
                self.guarded("modified_service", &reference, || {
                    self.customizer.modified_service(&reference, &tracked);
                });
                self.state.lock().leave_hook(generation);
                self.changed.notify_all();
            }
            // 修改后开始匹配
            None => self.track(reference, generation),
        }
    }

    fn untrack(&self, reference: ServiceReference, generation: u64) {
        let entry = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                return;
            }
            if let Some(pending) = state.pending_mut(reference.id) {
                pending.cancelled = true;
                return;
            }
            match state.position(reference.id) {
                Some(index) => {
                    state.tracking_count += 1;
                    state.enter_hook(generation);
                    state.tracked.remove(index)
                }
                None => return,
            }
        };

        debug!(service = %reference.id, interface = %self.interface, "停止跟踪服务");
        self.removed(&entry.reference, entry.tracked);
        self.state.lock().leave_hook(generation);
        self.changed.notify_all();
    }

    fn removed(&self, reference: &ServiceReference, tracked: C::Tracked) {
        self.guarded("removed_service", reference, || {
            self.customizer.removed_service(reference, tracked);
        });
    }

    /// 执行定制器钩子，捕获并记录 panic
    fn guarded<R>(&self, hook: &str, reference: &ServiceReference, f: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => Some(result),
            Err(payload) => {
                error!(
                    hook,
                    service = %reference.id,
                    interface = %self.interface,
                    panic = %panic_message(payload.as_ref()),
                    "服务跟踪器定制器执行失败"
                );
                None
            }
        }
    }
}
