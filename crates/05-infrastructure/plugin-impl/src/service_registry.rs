//! 服务注册表
//!
//! 按接口标识索引服务提供者。所有修改在同一把锁内完成，事件在释放锁之后
//! 于调用线程上同步投递。

use infrastructure_common::{
    EventBus, Filter, ListenerId, ModuleHandle, Properties, PropertyValue, ServiceError,
    ServiceEvent, ServiceEventKind, ServiceId, ServiceReference, ServiceRegistration,
    ServiceResult, OBJECTCLASS, SERVICE_ID,
};
use parking_lot::Mutex;
use plugin_abstractions::ServiceObject;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 注册表内部的服务记录
struct ServiceEntry {
    owner: ModuleHandle,
    interfaces: Vec<String>,
    properties: Arc<Properties>,
    provider: ServiceObject,
}

impl ServiceEntry {
    fn reference(&self, id: ServiceId) -> ServiceReference {
        ServiceReference {
            id,
            owner: self.owner,
            ranking: self.properties.ranking(),
        }
    }

    fn provides(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|candidate| candidate == interface)
    }
}

struct ServiceTable {
    next_id: u64,
    services: BTreeMap<ServiceId, ServiceEntry>,
}

/// 服务注册表
pub struct ServiceRegistry {
    table: Mutex<ServiceTable>,
    events: EventBus<ServiceEvent>,
    log_events: AtomicBool,
}

impl ServiceRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            table: Mutex::new(ServiceTable {
                next_id: 1,
                services: BTreeMap::new(),
            }),
            events: EventBus::new("service"),
            log_events: AtomicBool::new(false),
        }
    }

    /// 是否以 debug 级别记录每个服务事件
    pub fn set_event_logging(&self, enabled: bool) {
        self.log_events.store(enabled, Ordering::Relaxed);
    }

    /// 注册服务
    ///
    /// 注册表设置 `objectClass` 与 `service.id` 两个标准属性，覆盖调用方传入的同名属性。
    pub fn register_service(
        &self,
        owner: ModuleHandle,
        interfaces: &[&str],
        provider: ServiceObject,
        mut properties: Properties,
    ) -> ServiceResult<ServiceRegistration> {
        if interfaces.is_empty() {
            return Err(ServiceError::invalid_provider("接口集合为空"));
        }
        if interfaces.iter().any(|interface| interface.trim().is_empty()) {
            return Err(ServiceError::invalid_provider("接口标识不能为空字符串"));
        }

        let mut unique: Vec<String> = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            if !unique.iter().any(|existing| existing == interface) {
                unique.push((*interface).to_string());
            }
        }

        let (reference, properties) = {
            let mut table = self.table.lock();
            let id = ServiceId::new(table.next_id);
            table.next_id += 1;

            properties.insert(
                OBJECTCLASS,
                PropertyValue::List(unique.iter().map(|i| PropertyValue::from(i.as_str())).collect()),
            );
            properties.insert(SERVICE_ID, id.raw());
            let properties = Arc::new(properties);

            let entry = ServiceEntry {
                owner,
                interfaces: unique,
                properties: properties.clone(),
                provider,
            };
            let reference = entry.reference(id);
            table.services.insert(id, entry);
            (reference, properties)
        };

        info!(
            service = %reference.id,
            owner = %owner,
            interfaces = ?interfaces,
            ranking = reference.ranking,
            "注册服务"
        );

        self.dispatch(ServiceEvent {
            kind: ServiceEventKind::Registered,
            reference,
            properties,
            previous: None,
        });

        Ok(ServiceRegistration {
            id: reference.id,
            owner,
        })
    }

    /// 注销服务，重复注销为空操作，返回本次是否实际移除
    pub fn unregister(&self, registration: &ServiceRegistration) -> bool {
        let removed = {
            let mut table = self.table.lock();
            match table.services.get(&registration.id) {
                Some(entry) if entry.owner == registration.owner => {
                    table.services.remove(&registration.id)
                }
                _ => None,
            }
        };

        match removed {
            Some(entry) => {
                info!(service = %registration.id, owner = %registration.owner, "注销服务");
                self.dispatch(ServiceEvent {
                    kind: ServiceEventKind::Unregistering,
                    reference: entry.reference(registration.id),
                    properties: entry.properties,
                    previous: None,
                });
                true
            }
            None => {
                debug!(service = %registration.id, "服务已注销，忽略重复注销");
                false
            }
        }
    }

    /// 替换服务属性（保留标准属性）
    pub fn set_properties(
        &self,
        registration: &ServiceRegistration,
        mut properties: Properties,
    ) -> ServiceResult<()> {
        let (reference, current, previous) = {
            let mut table = self.table.lock();
            let entry = table
                .services
                .get_mut(&registration.id)
                .filter(|entry| entry.owner == registration.owner)
                .ok_or_else(|| ServiceError::ServiceUnregistered {
                    service: registration.id.to_string(),
                })?;

            if let Some(object_class) = entry.properties.get(OBJECTCLASS) {
                properties.insert(OBJECTCLASS, object_class.clone());
            }
            properties.insert(SERVICE_ID, registration.id.raw());

            let current = Arc::new(properties);
            let previous = std::mem::replace(&mut entry.properties, current.clone());
            (entry.reference(registration.id), current, previous)
        };

        debug!(service = %registration.id, ranking = reference.ranking, "服务属性已修改");

        self.dispatch(ServiceEvent {
            kind: ServiceEventKind::Modified,
            reference,
            properties: current,
            previous: Some(previous),
        });
        Ok(())
    }

    /// 查询服务引用
    ///
    /// 结果按排名降序、服务标识升序排列；过滤表达式语法错误立即返回。
    pub fn get_service_references(
        &self,
        interface: &str,
        filter: Option<&str>,
    ) -> ServiceResult<Vec<ServiceReference>> {
        let filter = filter.map(Filter::parse).transpose()?;
        Ok(self.find_references(interface, filter.as_ref()))
    }

    /// 使用已解析的过滤器查询服务引用
    pub fn find_references(&self, interface: &str, filter: Option<&Filter>) -> Vec<ServiceReference> {
        let mut references: Vec<_> = {
            let table = self.table.lock();
            table
                .services
                .iter()
                .filter(|(_, entry)| entry.provides(interface))
                .filter(|(_, entry)| filter.map_or(true, |filter| filter.matches(&entry.properties)))
                .map(|(id, entry)| entry.reference(*id))
                .collect()
        };
        references.sort_by(ServiceReference::selection_order);
        references
    }

    /// 接口下排名最高的服务引用
    pub fn get_service_reference(&self, interface: &str) -> Option<ServiceReference> {
        self.find_references(interface, None).into_iter().next()
    }

    /// 获取服务对象，服务已注销时返回 `None`
    pub fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject> {
        self.table
            .lock()
            .services
            .get(&reference.id)
            .map(|entry| entry.provider.clone())
    }

    /// 服务当前属性
    pub fn get_properties(&self, reference: &ServiceReference) -> Option<Arc<Properties>> {
        self.table
            .lock()
            .services
            .get(&reference.id)
            .map(|entry| entry.properties.clone())
    }

    /// 模块注册的全部服务，按注册顺序
    pub fn registered_services(&self, owner: ModuleHandle) -> Vec<ServiceReference> {
        self.table
            .lock()
            .services
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(id, entry)| entry.reference(*id))
            .collect()
    }

    /// 注销模块的全部服务，返回注销数量
    pub fn unregister_all(&self, owner: ModuleHandle) -> usize {
        let removed: Vec<_> = {
            let mut table = self.table.lock();
            let ids: Vec<_> = table
                .services
                .iter()
                .filter(|(_, entry)| entry.owner == owner)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.services.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &removed {
            info!(service = %id, owner = %owner, "注销服务");
            self.dispatch(ServiceEvent {
                kind: ServiceEventKind::Unregistering,
                reference: entry.reference(*id),
                properties: entry.properties.clone(),
                previous: None,
            });
        }
        removed.len()
    }

    /// 已注册服务数量
    pub fn service_count(&self) -> usize {
        self.table.lock().services.len()
    }

    /// 添加服务监听器（过滤表达式形式）
    pub fn add_service_listener<F>(&self, filter: Option<&str>, listener: F) -> ServiceResult<ListenerId>
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        let filter = filter.map(Filter::parse).transpose()?;
        Ok(self.add_filtered_listener(filter, listener))
    }

    /// 添加服务监听器
    ///
    /// 带过滤器时只投递匹配的事件；属性修改后不再匹配的服务以 `ModifiedEndMatch` 投递，
    /// 修改后开始匹配的服务以 `Modified` 投递。
    pub fn add_filtered_listener<F>(&self, filter: Option<Filter>, listener: F) -> ListenerId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        match filter {
            None => self.events.subscribe(listener),
            Some(filter) => self.events.subscribe(move |event: &ServiceEvent| {
                if filter.matches(&event.properties) {
                    listener(event);
                } else if event.kind == ServiceEventKind::Modified
                    && event
                        .previous
                        .as_deref()
                        .is_some_and(|previous| filter.matches(previous))
                {
                    listener(&event.with_kind(ServiceEventKind::ModifiedEndMatch));
                }
            }),
        }
    }

    /// 移除服务监听器
    pub fn remove_service_listener(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    fn dispatch(&self, event: ServiceEvent) {
        if self.log_events.load(Ordering::Relaxed) {
            debug!(
                kind = ?event.kind,
                service = %event.reference.id,
                owner = %event.reference.owner,
                properties = ?event.properties,
                "服务事件"
            );
        }
        self.events.publish(&event);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_count())
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: ModuleHandle = ModuleHandle::new(1);

    fn provider(value: &str) -> ServiceObject {
        ServiceObject::new(Arc::new(value.to_string()))
    }

    fn register(registry: &ServiceRegistry, interface: &str, ranking: i64) -> ServiceRegistration {
        registry
            .register_service(
                OWNER,
                &[interface],
                provider(interface),
                Properties::new().with("service.ranking", ranking),
            )
            .unwrap()
    }

    fn recorder(registry: &ServiceRegistry, filter: Option<&str>) -> Arc<Mutex<Vec<(ServiceEventKind, u64)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry
            .add_service_listener(filter, move |event| {
                sink.lock().push((event.kind, event.reference.id.raw()));
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_register_assigns_monotonic_ids_and_standard_properties() {
        let registry = ServiceRegistry::new();
        let first = register(&registry, "Foo", 0);
        let second = register(&registry, "Foo", 0);
        assert!(second.id > first.id);

        let reference = registry.get_service_reference("Foo").unwrap();
        let properties = registry.get_properties(&reference).unwrap();
        assert_eq!(properties.get("service.id").and_then(PropertyValue::as_integer), Some(1));
        assert!(Filter::parse("(objectclass=Foo)").unwrap().matches(&properties));
    }

    #[test]
    fn test_invalid_provider() {
        let registry = ServiceRegistry::new();
        let result = registry.register_service(OWNER, &[], provider("x"), Properties::new());
        assert!(matches!(result, Err(ServiceError::InvalidProvider { .. })));

        let result = registry.register_service(OWNER, &["Foo", " "], provider("x"), Properties::new());
        assert!(matches!(result, Err(ServiceError::InvalidProvider { .. })));
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn test_references_ordered_by_ranking_then_id() {
        let registry = ServiceRegistry::new();
        let low = register(&registry, "Foo", 1);
        let high = register(&registry, "Foo", 10);
        let tie = register(&registry, "Foo", 1);

        let ids: Vec<_> = registry
            .get_service_references("Foo", None)
            .unwrap()
            .into_iter()
            .map(|reference| reference.id)
            .collect();
        assert_eq!(ids, vec![high.id, low.id, tie.id]);
    }

    #[test]
    fn test_malformed_filter_fails_synchronously() {
        let registry = ServiceRegistry::new();
        register(&registry, "Foo", 0);
        let result = registry.get_service_references("Foo", Some("(service.ranking>=1"));
        assert!(matches!(result, Err(ServiceError::InvalidFilter(_))));
    }

    #[test]
    fn test_filter_by_properties() {
        let registry = ServiceRegistry::new();
        register(&registry, "Foo", 1);
        let high = register(&registry, "Foo", 10);

        let references = registry
            .get_service_references("Foo", Some("(service.ranking>=5)"))
            .unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].id, high.id);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ServiceRegistry::new();
        let seen = recorder(&registry, None);
        let registration = register(&registry, "Foo", 0);
        let reference = registry.get_service_reference("Foo").unwrap();

        assert!(registry.unregister(&registration));
        assert!(!registry.unregister(&registration));
        assert!(registry.get_service(&reference).is_none());

        let kinds: Vec<_> = seen.lock().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![ServiceEventKind::Registered, ServiceEventKind::Unregistering]);
    }

    #[test]
    fn test_get_service_is_empty_during_unregistering_event() {
        let registry = Arc::new(ServiceRegistry::new());
        let observed = Arc::new(Mutex::new(None));

        let registry_ref = Arc::downgrade(&registry);
        let sink = observed.clone();
        registry.add_filtered_listener(None, move |event| {
            if event.kind == ServiceEventKind::Unregistering {
                if let Some(registry) = registry_ref.upgrade() {
                    *sink.lock() = Some(registry.get_service(&event.reference).is_none());
                }
            }
        });

        let registration = register(&registry, "Foo", 0);
        registry.unregister(&registration);
        assert_eq!(*observed.lock(), Some(true));
    }

    #[test]
    fn test_modified_end_match_for_filtered_listener() {
        let registry = ServiceRegistry::new();
        let seen = recorder(&registry, Some("(color=red)"));

        let registration = registry
            .register_service(OWNER, &["Foo"], provider("x"), Properties::new().with("color", "red"))
            .unwrap();
        registry
            .set_properties(&registration, Properties::new().with("color", "blue"))
            .unwrap();
        registry
            .set_properties(&registration, Properties::new().with("color", "green"))
            .unwrap();
        registry
            .set_properties(&registration, Properties::new().with("color", "red"))
            .unwrap();

        let kinds: Vec<_> = seen.lock().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                ServiceEventKind::Registered,
                ServiceEventKind::ModifiedEndMatch,
                ServiceEventKind::Modified,
            ]
        );
    }

    #[test]
    fn test_set_properties_keeps_standard_properties() {
        let registry = ServiceRegistry::new();
        let registration = register(&registry, "Foo", 0);
        registry
            .set_properties(&registration, Properties::new().with("objectClass", "Bar"))
            .unwrap();

        assert!(registry.get_service_reference("Foo").is_some());
        assert!(registry.get_service_reference("Bar").is_none());

        registry.unregister(&registration);
        let result = registry.set_properties(&registration, Properties::new());
        assert!(matches!(result, Err(ServiceError::ServiceUnregistered { .. })));
    }

    #[test]
    fn test_unregister_all_by_owner() {
        let registry = ServiceRegistry::new();
        register(&registry, "Foo", 0);
        register(&registry, "Bar", 0);
        registry
            .register_service(ModuleHandle::new(2), &["Foo"], provider("other"), Properties::new())
            .unwrap();

        assert_eq!(registry.registered_services(OWNER).len(), 2);
        assert_eq!(registry.unregister_all(OWNER), 2);
        assert_eq!(registry.unregister_all(OWNER), 0);
        assert_eq!(registry.service_count(), 1);
    }

    #[test]
    fn test_unregister_releases_provider_clone() {
        let registry = ServiceRegistry::new();
        let shared = Arc::new("shared".to_string());
        let registration = registry
            .register_service(OWNER, &["Foo"], ServiceObject::new(shared.clone()), Properties::new())
            .unwrap();
        assert_eq!(Arc::strong_count(&shared), 2);

        let reference = registry.get_service_reference("Foo").unwrap();
        let held = registry.get_service(&reference).unwrap().downcast::<String>().unwrap();
        assert_eq!(Arc::strong_count(&shared), 3);

        registry.unregister(&registration);
        assert_eq!(Arc::strong_count(&shared), 2);
        assert_eq!(held.as_str(), "shared");
        drop(held);
        assert_eq!(Arc::strong_count(&shared), 1);

        // 按模块批量注销同样释放
        let bulk = Arc::new("bulk".to_string());
        registry
            .register_service(OWNER, &["Foo"], ServiceObject::new(bulk.clone()), Properties::new())
            .unwrap();
        registry.unregister_all(OWNER);
        assert_eq!(Arc::strong_count(&bulk), 1);
    }
}
