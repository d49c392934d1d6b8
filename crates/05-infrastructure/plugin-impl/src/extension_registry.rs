//! 扩展注册表
//!
//! 扩展可以先于目标扩展点注册，查询时才按扩展点标识关联。

use infrastructure_common::{
    EventBus, ExtensionError, ExtensionHandle, ExtensionResult, ListenerId, ModuleHandle,
};
use parking_lot::Mutex;
use plugin_abstractions::{
    ConfigurationElement, Extension, ExtensionPoint, ExtensionPointFilter, RegistryEvent,
};
use std::sync::Arc;
use tracing::{debug, info};

struct ExtensionTable {
    next_handle: u64,
    /// 按声明顺序
    points: Vec<Arc<ExtensionPoint>>,
    /// 按贡献顺序
    extensions: Vec<Arc<Extension>>,
}

impl ExtensionTable {
    fn point(&self, point_id: &str) -> Option<&Arc<ExtensionPoint>> {
        self.points.iter().find(|point| point.id == point_id)
    }
}

/// 模块移除时清理掉的贡献
#[derive(Debug, Default)]
pub struct RemovedContributions {
    pub points: Vec<Arc<ExtensionPoint>>,
    pub extensions: Vec<Arc<Extension>>,
}

impl RemovedContributions {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.extensions.is_empty()
    }
}

/// 扩展注册表
pub struct ExtensionRegistry {
    table: Mutex<ExtensionTable>,
    events: EventBus<RegistryEvent>,
}

fn validate_point_id(point_id: &str) -> ExtensionResult<()> {
    if point_id.trim().is_empty() || point_id.chars().any(char::is_whitespace) {
        return Err(ExtensionError::InvalidPointId {
            point_id: point_id.to_string(),
        });
    }
    Ok(())
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(ExtensionTable {
                next_handle: 1,
                points: Vec::new(),
                extensions: Vec::new(),
            }),
            events: EventBus::new("extension"),
        }
    }

    /// 声明扩展点，标识在所有模块间唯一
    pub fn register_extension_point(
        &self,
        owner: ModuleHandle,
        point_id: &str,
        schema: Option<&str>,
    ) -> ExtensionResult<Arc<ExtensionPoint>> {
        validate_point_id(point_id)?;

        let point = {
            let mut table = self.table.lock();
            if table.point(point_id).is_some() {
                return Err(ExtensionError::DuplicatePoint {
                    point_id: point_id.to_string(),
                });
            }
            let point = Arc::new(ExtensionPoint {
                id: point_id.to_string(),
                owner,
                schema: schema.map(str::to_string),
            });
            table.points.push(point.clone());
            point
        };

        info!(point = point_id, owner = %owner, "声明扩展点");
        self.events
            .publish(&RegistryEvent::ExtensionPointAdded(point.clone()));
        Ok(point)
    }

    /// 贡献扩展，目标扩展点可以尚未声明
    pub fn register_extension(
        &self,
        contributor: ModuleHandle,
        target_point_id: &str,
        configuration: Vec<ConfigurationElement>,
    ) -> ExtensionResult<ExtensionHandle> {
        validate_point_id(target_point_id)?;

        let (extension, bound) = {
            let mut table = self.table.lock();
            let handle = ExtensionHandle::new(table.next_handle);
            table.next_handle += 1;
            let extension = Arc::new(Extension {
                handle,
                contributor,
                target_point_id: target_point_id.to_string(),
                configuration,
            });
            table.extensions.push(extension.clone());
            (extension, table.point(target_point_id).is_some())
        };

        info!(
            extension = %extension.handle,
            contributor = %contributor,
            point = target_point_id,
            bound,
            "贡献扩展"
        );
        self.events
            .publish(&RegistryEvent::ExtensionAdded(extension.clone()));
        Ok(extension.handle)
    }

    /// 移除单个扩展
    pub fn remove_extension(&self, handle: ExtensionHandle) -> bool {
        let removed = {
            let mut table = self.table.lock();
            table
                .extensions
                .iter()
                .position(|extension| extension.handle == handle)
                .map(|index| table.extensions.remove(index))
        };

        match removed {
            Some(extension) => {
                debug!(extension = %handle, "移除扩展");
                self.events.publish(&RegistryEvent::ExtensionRemoved(extension));
                true
            }
            None => false,
        }
    }

    /// 查询扩展点下的扩展，保持贡献顺序
    ///
    /// 扩展点不存在或过滤器不匹配时返回空；`None` 与空过滤器匹配所有扩展点。
    /// 过滤器在注册表锁之外求值。
    pub fn get_extensions(
        &self,
        point_id: &str,
        filter: Option<&dyn ExtensionPointFilter>,
    ) -> Vec<Arc<Extension>> {
        let (point, extensions) = {
            let table = self.table.lock();
            let Some(point) = table.point(point_id).cloned() else {
                return Vec::new();
            };
            let extensions: Vec<_> = table
                .extensions
                .iter()
                .filter(|extension| extension.target_point_id == point_id)
                .cloned()
                .collect();
            (point, extensions)
        };

        match filter {
            Some(filter) if !filter.is_null() && !filter.matches(&point) => Vec::new(),
            _ => extensions,
        }
    }

    /// 查询满足过滤器的扩展点，按声明顺序
    pub fn get_extension_points(&self, filter: Option<&dyn ExtensionPointFilter>) -> Vec<Arc<ExtensionPoint>> {
        let points = self.table.lock().points.clone();
        match filter {
            Some(filter) if !filter.is_null() => points
                .into_iter()
                .filter(|point| filter.matches(point))
                .collect(),
            _ => points,
        }
    }

    /// 按标识查询扩展点
    pub fn get_extension_point(&self, point_id: &str) -> Option<Arc<ExtensionPoint>> {
        self.table.lock().point(point_id).cloned()
    }

    /// 扩展点下全部扩展的顶层配置元素，按贡献顺序展开
    pub fn get_configuration_elements_for(&self, point_id: &str) -> Vec<ConfigurationElement> {
        self.get_extensions(point_id, None)
            .iter()
            .flat_map(|extension| extension.configuration.iter().cloned())
            .collect()
    }

    /// 模块贡献的全部扩展（包括尚未绑定的）
    pub fn extensions_of(&self, contributor: ModuleHandle) -> Vec<Arc<Extension>> {
        self.table
            .lock()
            .extensions
            .iter()
            .filter(|extension| extension.contributor == contributor)
            .cloned()
            .collect()
    }

    /// 原子地移除模块声明的扩展点与贡献的扩展
    ///
    /// 其他模块指向被移除扩展点的扩展保留，但不再能通过扩展点查询到。
    pub fn remove_module_contributions(&self, module: ModuleHandle) -> RemovedContributions {
        let removed = {
            let mut table = self.table.lock();
            let (points, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.points)
                .into_iter()
                .partition(|point| point.owner == module);
            table.points = kept;

            let (extensions, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.extensions)
                .into_iter()
                .partition(|extension| extension.contributor == module);
            table.extensions = kept;

            RemovedContributions { points, extensions }
        };

        if !removed.is_empty() {
            info!(
                module = %module,
                points = removed.points.len(),
                extensions = removed.extensions.len(),
                "移除模块贡献"
            );
        }
        for extension in &removed.extensions {
            self.events
                .publish(&RegistryEvent::ExtensionRemoved(extension.clone()));
        }
        for point in &removed.points {
            self.events
                .publish(&RegistryEvent::ExtensionPointRemoved(point.clone()));
        }
        removed
    }

    /// 订阅注册表变更事件
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("ExtensionRegistry")
            .field("points", &table.points.len())
            .field("extensions", &table.extensions.len())
            .finish()
    }
}
