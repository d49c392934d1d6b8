//! 模块注册表
//!
//! 管理模块的安装、依赖解析与生命周期。激活器钩子在注册表锁之外执行，
//! 钩子失败（返回错误或 panic）只影响本次状态转换。

use crate::context::ModuleContextImpl;
use crate::extension_registry::ExtensionRegistry;
use crate::service_registry::ServiceRegistry;
use infrastructure_common::{
    panic_message, EventBus, ListenerId, ModuleDescriptor, ModuleError, ModuleEvent,
    ModuleEventKind, ModuleHandle, ModuleResult, ModuleState, VersionRange,
};
use parking_lot::Mutex;
use plugin_abstractions::{Activator, ActivatorResult, ModuleContext};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

struct ModuleRecord {
    descriptor: Arc<ModuleDescriptor>,
    state: ModuleState,
    activator: Option<Arc<dyn Activator>>,
    /// 解析得到的依赖模块，与声明顺序一致
    wiring: Vec<ModuleHandle>,
    context: Option<Arc<ModuleContextImpl>>,
}

struct ModuleTable {
    next_handle: u64,
    modules: BTreeMap<ModuleHandle, ModuleRecord>,
}

impl ModuleTable {
    fn record(&self, handle: ModuleHandle) -> ModuleResult<&ModuleRecord> {
        self.modules
            .get(&handle)
            .ok_or(ModuleError::ModuleNotFound {
                module_id: handle.raw(),
            })
    }

    fn record_mut(&mut self, handle: ModuleHandle) -> ModuleResult<&mut ModuleRecord> {
        self.modules
            .get_mut(&handle)
            .ok_or(ModuleError::ModuleNotFound {
                module_id: handle.raw(),
            })
    }

    /// 版本范围内的最高版本
    fn best_match(&self, symbolic_name: &str, range: &VersionRange) -> Option<ModuleHandle> {
        self.modules
            .iter()
            .filter(|(_, record)| {
                record.descriptor.symbolic_name == symbolic_name
                    && range.includes(&record.descriptor.version)
            })
            .max_by(|(_, a), (_, b)| a.descriptor.version.cmp(&b.descriptor.version))
            .map(|(handle, _)| *handle)
    }

    fn name_of(&self, handle: ModuleHandle) -> String {
        self.modules
            .get(&handle)
            .map_or_else(|| handle.to_string(), |record| record.descriptor.symbolic_name.clone())
    }

    /// 直接依赖 `handle` 且处于激活状态的模块，按安装顺序倒序
    fn active_dependents(&self, handle: ModuleHandle) -> Vec<ModuleHandle> {
        self.modules
            .iter()
            .rev()
            .filter(|(_, record)| record.state == ModuleState::Active && record.wiring.contains(&handle))
            .map(|(dependent, _)| *dependent)
            .collect()
    }

    /// 深度优先规划解析顺序：依赖先于依赖者
    fn plan_resolution(
        &self,
        handle: ModuleHandle,
        stack: &mut Vec<ModuleHandle>,
        plan: &mut Vec<(ModuleHandle, Vec<ModuleHandle>)>,
    ) -> ModuleResult<()> {
        let record = self.record(handle)?;
        if record.state.is_resolved() || plan.iter().any(|(planned, _)| *planned == handle) {
            return Ok(());
        }
        if let Some(start) = stack.iter().position(|visiting| *visiting == handle) {
            let chain = stack[start..]
                .iter()
                .chain(std::iter::once(&handle))
                .map(|visiting| self.name_of(*visiting))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ModuleError::CyclicDependency { chain });
        }

        stack.push(handle);
        let mut wiring = Vec::with_capacity(record.descriptor.dependencies.len());
        for dependency in &record.descriptor.dependencies {
            let target = self
                .best_match(&dependency.symbolic_name, &dependency.version_range)
                .ok_or_else(|| ModuleError::UnresolvedDependency {
                    module: record.descriptor.label(),
                    dependency: dependency.symbolic_name.clone(),
                    range: dependency.version_range.to_string(),
                })?;
            self.plan_resolution(target, stack, plan)?;
            wiring.push(target);
        }
        stack.pop();

        plan.push((handle, wiring));
        Ok(())
    }
}

/// 模块快照
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub handle: ModuleHandle,
    pub descriptor: Arc<ModuleDescriptor>,
    pub state: ModuleState,
}

/// 模块注册表
pub struct ModuleRegistry {
    self_ref: Weak<ModuleRegistry>,
    table: Mutex<ModuleTable>,
    services: Arc<ServiceRegistry>,
    extensions: Arc<ExtensionRegistry>,
    events: EventBus<ModuleEvent>,
}

impl ModuleRegistry {
    /// 创建模块注册表，模块停止时清理其在服务与扩展注册表中的残留
    pub fn new(services: Arc<ServiceRegistry>, extensions: Arc<ExtensionRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            table: Mutex::new(ModuleTable {
                next_handle: 1,
                modules: BTreeMap::new(),
            }),
            services,
            extensions,
            events: EventBus::new("module"),
        })
    }

    /// 安装模块，模块进入 `Installed`
    pub fn register(
        &self,
        descriptor: ModuleDescriptor,
        activator: Option<Arc<dyn Activator>>,
    ) -> ModuleResult<ModuleHandle> {
        let descriptor = Arc::new(descriptor);
        let handle = {
            let mut table = self.table.lock();
            if table.modules.values().any(|record| {
                record.descriptor.symbolic_name == descriptor.symbolic_name
                    && record.descriptor.version == descriptor.version
            }) {
                return Err(ModuleError::DuplicateModule {
                    symbolic_name: descriptor.symbolic_name.clone(),
                    version: descriptor.version.to_string(),
                });
            }

            let handle = ModuleHandle::new(table.next_handle);
            table.next_handle += 1;
            table.modules.insert(
                handle,
                ModuleRecord {
                    descriptor: descriptor.clone(),
                    state: ModuleState::Installed,
                    activator,
                    wiring: Vec::new(),
                    context: None,
                },
            );
            handle
        };

        info!(module = %handle, symbolic_name = %descriptor.symbolic_name, version = %descriptor.version, "安装模块");
        self.emit(ModuleEventKind::Installed, handle, &descriptor, ModuleState::Installed);
        Ok(handle)
    }

    /// 解析模块及其尚未解析的依赖
    ///
    /// 依赖按拓扑顺序先于依赖者进入 `Resolved`；失败时不修改任何模块状态。
    pub fn resolve(&self, handle: ModuleHandle) -> ModuleResult<()> {
        let resolved = {
            let mut table = self.table.lock();
            let mut plan = Vec::new();
            table.plan_resolution(handle, &mut Vec::new(), &mut plan)?;

            let mut resolved = Vec::with_capacity(plan.len());
            for (planned, wiring) in plan {
                let record = table.record_mut(planned)?;
                record.state = ModuleState::Resolved;
                record.wiring = wiring;
                resolved.push((planned, record.descriptor.clone()));
            }
            resolved
        };

        for (planned, descriptor) in resolved {
            info!(module = %planned, symbolic_name = %descriptor.symbolic_name, "模块已解析");
            self.emit(ModuleEventKind::Resolved, planned, &descriptor, ModuleState::Resolved);
        }
        Ok(())
    }

    /// 解析全部已安装模块，返回失败的模块及原因
    pub fn resolve_all(&self) -> Vec<(ModuleHandle, ModuleError)> {
        let installed: Vec<_> = {
            let table = self.table.lock();
            table
                .modules
                .iter()
                .filter(|(_, record)| record.state == ModuleState::Installed)
                .map(|(handle, _)| *handle)
                .collect()
        };

        let mut failures = Vec::new();
        for handle in installed {
            if self.state(handle) != Some(ModuleState::Installed) {
                continue;
            }
            if let Err(error) = self.resolve(handle) {
                warn!(module = %handle, %error, "模块解析失败");
                failures.push((handle, error));
            }
        }
        failures
    }

    /// 启动模块
    ///
    /// 要求模块处于 `Resolved` 且全部依赖处于 `Active`。激活器失败时模块回到 `Resolved`，
    /// 其注册的服务与扩展被清理，错误返回给调用方。钩子返回后在锁内再次确认依赖仍然激活，
    /// 否则调用停止钩子撤销激活并返回 `DependencyNotActive`。
    pub fn start(&self, handle: ModuleHandle) -> ModuleResult<()> {
        let (descriptor, activator, context) = {
            let mut table = self.table.lock();
            let record = table.record(handle)?;
            if record.state != ModuleState::Resolved {
                return Err(ModuleError::invalid_transition(
                    record.descriptor.label(),
                    record.state,
                    ModuleState::Starting,
                ));
            }
            for dependency in &record.wiring {
                let dependency = table.record(*dependency)?;
                if dependency.state != ModuleState::Active {
                    return Err(ModuleError::DependencyNotActive {
                        module: record.descriptor.label(),
                        dependency: dependency.descriptor.label(),
                    });
                }
            }

            let descriptor = record.descriptor.clone();
            let context = Arc::new(ModuleContextImpl::new(
                handle,
                descriptor.clone(),
                self.services.clone(),
                self.extensions.clone(),
                self.self_ref.clone(),
            ));

            let record = table.record_mut(handle)?;
            record.state = ModuleState::Starting;
            record.context = Some(context.clone());
            (descriptor, record.activator.clone(), context)
        };

        info!(module = %handle, symbolic_name = %descriptor.symbolic_name, "启动模块");
        self.emit(ModuleEventKind::Starting, handle, &descriptor, ModuleState::Starting);

        let outcome = match &activator {
            Some(activator) => {
                let context: Arc<dyn ModuleContext> = context.clone();
                run_hook(|| activator.start(&context))
            }
            None => Ok(()),
        };

        if let Err(source) = outcome {
            error!(module = %handle, symbolic_name = %descriptor.symbolic_name, error = %source, "模块激活器启动失败");
            self.abort_start(handle, &descriptor, &context);
            return Err(ModuleError::ActivatorFailed {
                module: descriptor.label(),
                source,
            });
        }

        if let Err(error) = self.complete_activation(handle) {
            // 启动期间依赖被停止，撤销本次激活
            warn!(module = %handle, symbolic_name = %descriptor.symbolic_name, %error, "依赖在启动期间停止，撤销激活");
            if let Some(activator) = &activator {
                let stop_context: Arc<dyn ModuleContext> = context.clone();
                if let Err(source) = run_hook(|| activator.stop(&stop_context)) {
                    warn!(module = %handle, error = %source, "撤销激活时停止钩子失败");
                }
            }
            self.abort_start(handle, &descriptor, &context);
            return Err(error);
        }

        info!(module = %handle, symbolic_name = %descriptor.symbolic_name, "模块已激活");
        self.emit(ModuleEventKind::Started, handle, &descriptor, ModuleState::Active);
        Ok(())
    }

    /// 启动失败：失效上下文、清理残留并回到 `Resolved`
    fn abort_start(
        &self,
        handle: ModuleHandle,
        descriptor: &ModuleDescriptor,
        context: &ModuleContextImpl,
    ) {
        context.invalidate();
        self.cleanup(handle, descriptor);
        self.transition(handle, ModuleState::Resolved, true);
        self.emit(ModuleEventKind::Stopped, handle, descriptor, ModuleState::Resolved);
    }

    /// 停止模块
    ///
    /// 先停止依赖本模块的激活模块，再调用激活器 stop，随后强制注销模块残留的服务与扩展。
    /// 激活器失败时模块仍回到 `Resolved`，错误返回给调用方。
    pub fn stop(&self, handle: ModuleHandle) -> ModuleResult<()> {
        // 依赖者可能在停止期间完成激活，进入 Stopping 前重新检查
        let (descriptor, activator, context) = loop {
            let dependents = {
                let mut table = self.table.lock();
                let record = table.record(handle)?;
                if record.state != ModuleState::Active {
                    return Err(ModuleError::invalid_transition(
                        record.descriptor.label(),
                        record.state,
                        ModuleState::Stopping,
                    ));
                }
                let dependents = table.active_dependents(handle);
                if dependents.is_empty() {
                    let record = table.record_mut(handle)?;
                    record.state = ModuleState::Stopping;
                    break (
                        record.descriptor.clone(),
                        record.activator.clone(),
                        record.context.clone(),
                    );
                }
                dependents
            };

            for dependent in dependents {
                debug!(module = %handle, dependent = %dependent, "先停止依赖模块");
                if let Err(error) = self.stop(dependent) {
                    warn!(module = %handle, dependent = %dependent, %error, "停止依赖模块失败");
                }
            }
        };

        info!(module = %handle, symbolic_name = %descriptor.symbolic_name, "停止模块");
        self.emit(ModuleEventKind::Stopping, handle, &descriptor, ModuleState::Stopping);

        let outcome = match (&activator, &context) {
            (Some(activator), Some(context)) => {
                let context: Arc<dyn ModuleContext> = context.clone();
                run_hook(|| activator.stop(&context))
            }
            _ => Ok(()),
        };

        if let Some(context) = &context {
            context.invalidate();
        }
        self.cleanup(handle, &descriptor);
        self.transition(handle, ModuleState::Resolved, true);
        self.emit(ModuleEventKind::Stopped, handle, &descriptor, ModuleState::Resolved);

        outcome.map_err(|source| {
            error!(module = %handle, symbolic_name = %descriptor.symbolic_name, error = %source, "模块激活器停止失败");
            ModuleError::ActivatorFailed {
                module: descriptor.label(),
                source,
            }
        })
    }

    /// 卸载模块
    ///
    /// 激活中的模块返回 `ModuleActive`；解析时连接到本模块的模块（含传递依赖者）退回 `Installed`。
    pub fn unregister(&self, handle: ModuleHandle) -> ModuleResult<()> {
        let (descriptor, unresolved) = {
            let mut table = self.table.lock();
            let record = table.record(handle)?;
            if matches!(
                record.state,
                ModuleState::Starting | ModuleState::Active | ModuleState::Stopping
            ) {
                return Err(ModuleError::ModuleActive {
                    module: record.descriptor.label(),
                });
            }
            let descriptor = record.descriptor.clone();
            table.modules.remove(&handle);

            let mut removed = BTreeSet::from([handle]);
            let mut unresolved = Vec::new();
            loop {
                let mut changed = false;
                for (dependent, record) in table.modules.iter_mut() {
                    if record.state == ModuleState::Resolved
                        && record.wiring.iter().any(|wired| removed.contains(wired))
                    {
                        record.state = ModuleState::Installed;
                        record.wiring.clear();
                        removed.insert(*dependent);
                        unresolved.push((*dependent, record.descriptor.clone()));
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }
            (descriptor, unresolved)
        };

        self.cleanup(handle, &descriptor);
        for (dependent, dependent_descriptor) in unresolved {
            info!(module = %dependent, dependency = %descriptor.symbolic_name, "依赖被卸载，模块退回未解析状态");
            self.emit(ModuleEventKind::Unresolved, dependent, &dependent_descriptor, ModuleState::Installed);
        }

        info!(module = %handle, symbolic_name = %descriptor.symbolic_name, "卸载模块");
        self.emit(ModuleEventKind::Uninstalled, handle, &descriptor, ModuleState::Uninstalled);
        Ok(())
    }

    /// 查找版本范围内的最高版本模块
    pub fn find_module(&self, symbolic_name: &str, range: &VersionRange) -> Option<ModuleHandle> {
        self.table.lock().best_match(symbolic_name, range)
    }

    /// 已解析模块的启动顺序（依赖在前），同层按安装顺序
    pub fn start_order(&self) -> Vec<ModuleHandle> {
        fn visit(
            table: &ModuleTable,
            handle: ModuleHandle,
            visited: &mut BTreeSet<ModuleHandle>,
            order: &mut Vec<ModuleHandle>,
        ) {
            if !visited.insert(handle) {
                return;
            }
            if let Some(record) = table.modules.get(&handle) {
                for dependency in &record.wiring {
                    visit(table, *dependency, visited, order);
                }
                if record.state.is_resolved() {
                    order.push(handle);
                }
            }
        }

        let table = self.table.lock();
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        for (handle, record) in &table.modules {
            if record.state.is_resolved() {
                visit(&table, *handle, &mut visited, &mut order);
            }
        }
        order
    }

    /// 按启动顺序启动全部 `Resolved` 模块，返回失败的模块及原因
    pub fn start_all(&self) -> Vec<(ModuleHandle, ModuleError)> {
        let mut failures = Vec::new();
        for handle in self.start_order() {
            if self.state(handle) != Some(ModuleState::Resolved) {
                continue;
            }
            if let Err(error) = self.start(handle) {
                warn!(module = %handle, %error, "模块启动失败");
                failures.push((handle, error));
            }
        }
        failures
    }

    /// 按启动顺序的逆序停止全部激活模块，返回失败的模块及原因
    pub fn stop_all(&self) -> Vec<(ModuleHandle, ModuleError)> {
        let mut failures = Vec::new();
        for handle in self.start_order().into_iter().rev() {
            if self.state(handle) != Some(ModuleState::Active) {
                continue;
            }
            if let Err(error) = self.stop(handle) {
                warn!(module = %handle, %error, "模块停止失败");
                failures.push((handle, error));
            }
        }
        failures
    }

    /// 全部模块快照，按安装顺序
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.table
            .lock()
            .modules
            .iter()
            .map(|(handle, record)| ModuleInfo {
                handle: *handle,
                descriptor: record.descriptor.clone(),
                state: record.state,
            })
            .collect()
    }

    /// 模块当前状态，模块不存在（含已卸载）时返回 `None`
    pub fn state(&self, handle: ModuleHandle) -> Option<ModuleState> {
        self.table.lock().modules.get(&handle).map(|record| record.state)
    }

    /// 模块描述符
    pub fn descriptor(&self, handle: ModuleHandle) -> Option<Arc<ModuleDescriptor>> {
        self.table
            .lock()
            .modules
            .get(&handle)
            .map(|record| record.descriptor.clone())
    }

    /// 解析得到的依赖模块
    pub fn wiring(&self, handle: ModuleHandle) -> Vec<ModuleHandle> {
        self.table
            .lock()
            .modules
            .get(&handle)
            .map(|record| record.wiring.clone())
            .unwrap_or_default()
    }

    /// 激活期间的模块上下文
    pub fn context(&self, handle: ModuleHandle) -> Option<Arc<dyn ModuleContext>> {
        let context: Arc<dyn ModuleContext> = self.table.lock().modules.get(&handle)?.context.clone()?;
        Some(context)
    }

    /// 订阅模块事件
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModuleEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// 在锁内确认依赖仍然激活并完成 `Starting -> Active`
    fn complete_activation(&self, handle: ModuleHandle) -> ModuleResult<()> {
        let mut table = self.table.lock();
        let record = table.record(handle)?;
        let inactive = record.wiring.iter().find(|dependency| {
            table
                .modules
                .get(*dependency)
                .map_or(true, |dependency| dependency.state != ModuleState::Active)
        });
        if let Some(dependency) = inactive {
            return Err(ModuleError::DependencyNotActive {
                module: record.descriptor.label(),
                dependency: table
                    .modules
                    .get(dependency)
                    .map_or_else(|| dependency.to_string(), |record| record.descriptor.label()),
            });
        }

        let record = table.record_mut(handle)?;
        debug_assert!(record.state.can_transition_to(ModuleState::Active));
        record.state = ModuleState::Active;
        Ok(())
    }

    /// 记录状态转换，`release_context` 为真时同时释放模块上下文
    fn transition(&self, handle: ModuleHandle, state: ModuleState, release_context: bool) {
        let mut table = self.table.lock();
        if let Some(record) = table.modules.get_mut(&handle) {
            debug_assert!(record.state.can_transition_to(state));
            record.state = state;
            if release_context {
                record.context = None;
            }
        }
    }

    fn cleanup(&self, handle: ModuleHandle, descriptor: &ModuleDescriptor) {
        let services = self.services.unregister_all(handle);
        if services > 0 {
            warn!(
                module = %handle,
                symbolic_name = %descriptor.symbolic_name,
                services,
                "模块未注销的服务已被强制注销"
            );
        }

        let removed = self.extensions.remove_module_contributions(handle);
        if !removed.is_empty() {
            debug!(
                module = %handle,
                points = removed.points.len(),
                extensions = removed.extensions.len(),
                "已移除模块的扩展贡献"
            );
        }
    }

    fn emit(
        &self,
        kind: ModuleEventKind,
        handle: ModuleHandle,
        descriptor: &ModuleDescriptor,
        state: ModuleState,
    ) {
        self.events.publish(&ModuleEvent {
            kind,
            module: handle,
            symbolic_name: descriptor.symbolic_name.clone(),
            version: descriptor.version.clone(),
            state,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.table.lock().modules.len())
            .field("events", &self.events)
            .finish()
    }
}

/// 执行激活器钩子，panic 转换为错误
fn run_hook(hook: impl FnOnce() -> ActivatorResult) -> ActivatorResult {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(format!("激活器 panic: {}", panic_message(payload.as_ref())).into()),
    }
}
