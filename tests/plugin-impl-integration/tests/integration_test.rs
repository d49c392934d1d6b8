//! 插件框架跨 crate 场景测试
use infrastructure_common::{
    Dependency, ModuleDescriptor, ModuleError, ModuleEventKind, ModuleState,
    Properties, ServiceEventKind, ServiceReference, Version, SERVICE_RANKING,
};
use parking_lot::Mutex;
use plugin_abstractions::{
    ConfigurationElement, FnActivator, ModuleContextExt, NullFilter, ServiceObject,
    ServiceTrackerCustomizer,
};
use plugin_impl::{Framework, ServiceTracker, TypedTracker};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

/// 测试服务
trait Foo: Send + Sync {
    fn label(&self) -> String;
}

struct FooImpl(&'static str);

impl Foo for FooImpl {
    fn label(&self) -> String {
        self.0.to_string()
    }
}

fn foo(label: &'static str) -> Arc<dyn Foo> {
    Arc::new(FooImpl(label))
}

fn descriptor(name: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(name, Version::new(1, 0, 0))
}

/// 按顺序记录回调的定制器
struct RecordingCustomizer {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ServiceTrackerCustomizer for RecordingCustomizer {
    type Tracked = ServiceObject;

    fn adding_service(&self, reference: &ServiceReference, service: ServiceObject) -> Option<ServiceObject> {
        self.calls.lock().push(format!("adding {}", reference.id));
        Some(service)
    }

    fn modified_service(&self, reference: &ServiceReference, _tracked: &ServiceObject) {
        self.calls.lock().push(format!("modified {}", reference.id));
    }

    fn removed_service(&self, reference: &ServiceReference, _tracked: ServiceObject) {
        self.calls.lock().push(format!("removed {}", reference.id));
    }
}

#[test]
fn test_dependency_must_be_present_and_active() {
    let framework = Framework::new("deps");
    let modules = framework.modules();

    let app = framework
        .install_passive(descriptor("A").with_dependency(Dependency::any("B")))
        .unwrap();
    assert!(matches!(
        modules.resolve(app),
        Err(ModuleError::UnresolvedDependency { ref dependency, .. }) if dependency == "B"
    ));
    assert_eq!(modules.state(app), Some(ModuleState::Installed));

    let base = framework.install_passive(descriptor("B")).unwrap();
    modules.resolve(app).unwrap();
    assert_eq!(modules.state(base), Some(ModuleState::Resolved));
    assert_eq!(modules.wiring(app), vec![base]);

    // 依赖未激活时不能启动
    assert!(matches!(
        modules.start(app),
        Err(ModuleError::DependencyNotActive { .. })
    ));
    assert_eq!(modules.state(app), Some(ModuleState::Resolved));

    modules.start(base).unwrap();
    modules.start(app).unwrap();
    assert_eq!(modules.state(app), Some(ModuleState::Active));

    // 停止依赖会先停止依赖它的模块
    modules.stop(base).unwrap();
    assert_eq!(modules.state(app), Some(ModuleState::Resolved));
    assert_eq!(modules.state(base), Some(ModuleState::Resolved));
}

#[test]
fn test_cyclic_dependency_reports_chain() {
    let framework = Framework::new("cycle");
    let a = framework
        .install_passive(descriptor("A").with_dependency(Dependency::any("B")))
        .unwrap();
    framework
        .install_passive(descriptor("B").with_dependency(Dependency::any("A")))
        .unwrap();

    match framework.modules().resolve(a) {
        Err(ModuleError::CyclicDependency { chain }) => assert_eq!(chain, "A -> B -> A"),
        other => panic!("期望循环依赖错误，实际: {:?}", other),
    }
}

#[test]
fn test_tracker_sees_one_add_and_one_remove() {
    let framework = Framework::new("tracker");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let customizer = RecordingCustomizer {
        calls: calls.clone(),
    };

    let tracker =
        ServiceTracker::new(framework.services().clone(), "Foo", None, customizer).unwrap();
    tracker.open();

    let registration = framework
        .services()
        .register_service(owner, &["Foo"], ServiceObject::new(foo("a")), Properties::new())
        .unwrap();
    framework.services().unregister(&registration);
    tracker.close();

    let id = registration.id;
    assert_eq!(
        *calls.lock(),
        vec![format!("adding {}", id), format!("removed {}", id)]
    );
}

#[test]
fn test_double_unregister_is_noop() {
    let framework = Framework::new("unregister");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let removals = Arc::new(AtomicUsize::new(0));

    let counter = removals.clone();
    framework
        .services()
        .add_service_listener(None, move |event| {
            if event.kind == ServiceEventKind::Unregistering {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let registration = framework
        .services()
        .register_service(owner, &["Foo"], ServiceObject::new(foo("a")), Properties::new())
        .unwrap();

    assert!(framework.services().unregister(&registration));
    assert!(!framework.services().unregister(&registration));
    assert_eq!(removals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_references_ordered_by_ranking_then_id() {
    let framework = Framework::new("ranking");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let services = framework.services();

    let mut expected = Vec::new();
    for (label, ranking) in [("low", -5), ("first-zero", 0), ("high", 20), ("second-zero", 0)] {
        let registration = services
            .register_service(
                owner,
                &["Foo"],
                ServiceObject::new(foo(label)),
                Properties::new().with(SERVICE_RANKING, ranking),
            )
            .unwrap();
        expected.push((ranking, registration.id));
    }
    expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let references = services.get_service_references("Foo", None).unwrap();
    let actual: Vec<_> = references.iter().map(|r| (r.ranking, r.id)).collect();
    assert_eq!(actual, expected);

    let labels: Vec<_> = references
        .iter()
        .filter_map(|r| services.get_service(r)?.downcast::<dyn Foo>())
        .map(|service| service.label())
        .collect();
    assert_eq!(labels, vec!["high", "first-zero", "second-zero", "low"]);
}

#[test]
fn test_late_bound_extension() {
    let framework = Framework::new("extensions");
    let ui = framework.install_passive(descriptor("org.blueberry.ui")).unwrap();
    let contributor = framework.install_passive(descriptor("org.mitk.views")).unwrap();
    let extensions = framework.extensions();

    let handle = extensions
        .register_extension(
            contributor,
            "org.blueberry.ui.views",
            vec![ConfigurationElement::new("view").with_attribute("id", "datamanager")],
        )
        .unwrap();
    assert!(extensions.get_extensions("org.blueberry.ui.views", Some(&NullFilter)).is_empty());

    extensions
        .register_extension_point(ui, "org.blueberry.ui.views", None)
        .unwrap();

    let found = extensions.get_extensions("org.blueberry.ui.views", Some(&NullFilter));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].handle, handle);
    assert_eq!(found[0].configuration[0].attribute("id"), Some("datamanager"));
}

#[test]
fn test_module_service_tracker_lifecycle() -> anyhow::Result<()> {
    let framework = Framework::new("lifecycle");
    let m1 = framework.install(
        descriptor("M1"),
        FnActivator::on_start(|context| {
            context.register("Foo", foo("from-m1"), Properties::new().with(SERVICE_RANKING, 5))?;
            Ok(())
        }),
    )?;

    framework.modules().resolve(m1)?;
    framework.modules().start(m1)?;
    assert_eq!(framework.modules().state(m1), Some(ModuleState::Active));

    let tracker = TypedTracker::<dyn Foo>::typed(framework.services().clone(), "Foo");
    tracker.open();
    let service = tracker.get_service().expect("M1 的服务应被跟踪");
    assert_eq!(service.label(), "from-m1");
    assert_eq!(tracker.service_references()[0].ranking, 5);

    framework.modules().stop(m1)?;
    assert!(tracker.get_service().is_none());
    assert!(tracker.is_empty());
    assert_eq!(framework.services().service_count(), 0);
    Ok(())
}

#[test]
fn test_higher_ranking_from_other_module_wins() {
    let framework = Framework::new("two-modules");
    let services = framework.services();
    let low = framework.install_passive(descriptor("low")).unwrap();
    let high = framework.install_passive(descriptor("high")).unwrap();

    services
        .register_service(
            low,
            &["Foo"],
            ServiceObject::new(foo("low")),
            Properties::new().with(SERVICE_RANKING, 1),
        )
        .unwrap();
    services
        .register_service(
            high,
            &["Foo"],
            ServiceObject::new(foo("high")),
            Properties::new().with(SERVICE_RANKING, 10),
        )
        .unwrap();

    let references = services.get_service_references("Foo", None).unwrap();
    assert_eq!(references.len(), 2);
    assert_eq!(references[0].ranking, 10);
    assert_eq!(references[0].owner, high);
    assert_eq!(services.get_service_reference("Foo"), Some(references[0]));
}

#[test]
fn test_duplicate_module_rejected() {
    let framework = Framework::new("duplicates");
    framework.install_passive(descriptor("X")).unwrap();

    let result = framework.install_passive(descriptor("X"));
    assert!(matches!(
        result,
        Err(ModuleError::DuplicateModule { ref symbolic_name, .. }) if symbolic_name == "X"
    ));

    // 同名不同版本可以共存
    framework
        .install_passive(ModuleDescriptor::new("X", Version::new(2, 0, 0)))
        .unwrap();
    assert_eq!(framework.modules().modules().len(), 2);
}

#[test]
fn test_failed_activator_leaves_module_resolved() {
    let framework = Framework::new("failing");
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    framework
        .modules()
        .add_listener(move |event| recorded.lock().push(event.kind));

    let handle = framework
        .install(
            descriptor("broken"),
            FnActivator::on_start(|context| {
                context.register("Foo", foo("partial"), Properties::new())?;
                Err("启动失败".into())
            }),
        )
        .unwrap();
    framework.modules().resolve(handle).unwrap();

    let result = framework.modules().start(handle);
    assert!(matches!(result, Err(ModuleError::ActivatorFailed { .. })));
    assert_eq!(framework.modules().state(handle), Some(ModuleState::Resolved));
    assert_eq!(framework.services().service_count(), 0);
    assert_eq!(
        *events.lock(),
        vec![
            ModuleEventKind::Installed,
            ModuleEventKind::Resolved,
            ModuleEventKind::Starting,
            ModuleEventKind::Stopped,
        ]
    );
}

#[test]
fn test_shutdown_stops_in_reverse_dependency_order() {
    let framework = Framework::new("shutdown");
    let order = Arc::new(Mutex::new(Vec::new()));

    let stopping = |name: &'static str| {
        let order = order.clone();
        FnActivator::new(
            |_| Ok(()),
            move |_| {
                order.lock().push(name);
                Ok(())
            },
        )
    };

    framework
        .install(
            descriptor("app").with_dependency(Dependency::any("core")),
            stopping("app"),
        )
        .unwrap();
    framework.install(descriptor("core"), stopping("core")).unwrap();

    assert!(framework.modules().resolve_all().is_empty());
    assert!(framework.modules().start_all().is_empty());
    assert!(framework.shutdown().is_empty());

    assert_eq!(*order.lock(), vec!["app", "core"]);
    let states: Vec<ModuleState> = framework
        .modules()
        .modules()
        .iter()
        .map(|module| module.state)
        .collect();
    assert_eq!(states, vec![ModuleState::Resolved, ModuleState::Resolved]);
}

#[test]
fn test_unregister_unresolves_dependents() {
    let framework = Framework::new("uninstall");
    let modules = framework.modules();
    let base = framework.install_passive(descriptor("base")).unwrap();
    let app = framework
        .install_passive(descriptor("app").with_dependency(Dependency::any("base")))
        .unwrap();

    modules.resolve(app).unwrap();
    modules.start(base).unwrap();
    assert!(matches!(
        modules.unregister(base),
        Err(ModuleError::ModuleActive { .. })
    ));

    modules.stop(base).unwrap();
    modules.unregister(base).unwrap();
    assert_eq!(modules.state(base), None);
    assert_eq!(modules.state(app), Some(ModuleState::Installed));
    assert!(matches!(
        modules.start(base),
        Err(ModuleError::ModuleNotFound { .. })
    ));
}

#[test]
fn test_start_racing_stop_never_leaves_dependent_active() {
    for _ in 0..50 {
        let framework = Framework::new("start-stop");
        let modules = framework.modules();
        let base = framework.install_passive(descriptor("base")).unwrap();
        let app = framework
            .install(
                descriptor("app").with_dependency(Dependency::any("base")),
                FnActivator::on_start(|context| {
                    context.register("Foo", foo("app"), Properties::new())?;
                    Ok(())
                }),
            )
            .unwrap();
        modules.resolve(app).unwrap();
        modules.start(base).unwrap();

        let barrier = Barrier::new(2);
        let (started, stopped) = thread::scope(|scope| {
            let starter = scope.spawn(|| {
                barrier.wait();
                modules.start(app)
            });
            let stopper = scope.spawn(|| {
                barrier.wait();
                modules.stop(base)
            });
            (starter.join().unwrap(), stopper.join().unwrap())
        });

        assert!(stopped.is_ok());
        assert!(
            matches!(started, Ok(()) | Err(ModuleError::DependencyNotActive { .. })),
            "意外的启动结果: {:?}",
            started
        );
        assert_eq!(modules.state(base), Some(ModuleState::Resolved));
        assert_eq!(modules.state(app), Some(ModuleState::Resolved));
        assert_eq!(framework.services().service_count(), 0);
    }
}

/// removed 钩子阻塞直到放行的定制器
struct GatedCustomizer {
    calls: Arc<Mutex<Vec<String>>>,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ServiceTrackerCustomizer for GatedCustomizer {
    type Tracked = ServiceObject;

    fn adding_service(&self, reference: &ServiceReference, service: ServiceObject) -> Option<ServiceObject> {
        self.calls.lock().push(format!("adding {}", reference.id));
        Some(service)
    }

    fn removed_service(&self, reference: &ServiceReference, _tracked: ServiceObject) {
        self.entered.lock().send(()).unwrap();
        self.release.lock().recv().unwrap();
        self.calls.lock().push(format!("removed {}", reference.id));
    }
}

#[test]
fn test_close_waits_for_removal_delivered_on_other_thread() {
    let framework = Framework::new("close-race");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let tracker = ServiceTracker::new(
        framework.services().clone(),
        "Foo",
        None,
        GatedCustomizer {
            calls: calls.clone(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        },
    )
    .unwrap();
    tracker.open();

    let registration = framework
        .services()
        .register_service(owner, &["Foo"], ServiceObject::new(foo("a")), Properties::new())
        .unwrap();

    thread::scope(|scope| {
        let unregistering = scope.spawn(|| framework.services().unregister(&registration));
        entered_rx.recv().unwrap();

        let closer = scope.spawn(|| {
            tracker.close();
            calls.lock().push("closed".to_string());
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.lock().len(), 1, "removed 钩子完成前 close 已返回");

        release_tx.send(()).unwrap();
        closer.join().unwrap();
        assert!(unregistering.join().unwrap());
    });

    let id = registration.id;
    assert_eq!(
        *calls.lock(),
        vec![format!("adding {}", id), format!("removed {}", id), "closed".to_string()]
    );
}

#[test]
fn test_close_racing_event_delivery_stops_callbacks() {
    let framework = Framework::new("close-events");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let services = framework.services();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tracker = ServiceTracker::new(
        services.clone(),
        "Foo",
        None,
        RecordingCustomizer {
            calls: calls.clone(),
        },
    )
    .unwrap();
    tracker.open();

    let at_close = thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    let registration = services
                        .register_service(owner, &["Foo"], ServiceObject::new(foo("x")), Properties::new())
                        .unwrap();
                    services.unregister(&registration);
                }
            });
        }
        thread::sleep(Duration::from_millis(5));
        tracker.close();
        calls.lock().len()
    });

    // close 返回后没有任何钩子调用
    let calls = calls.lock();
    assert_eq!(calls.len(), at_close);

    let added: BTreeSet<_> = calls.iter().filter_map(|call| call.strip_prefix("adding ")).collect();
    let removed: BTreeSet<_> = calls.iter().filter_map(|call| call.strip_prefix("removed ")).collect();
    assert_eq!(added, removed);
    assert_eq!(calls.len(), added.len() * 2);
    assert!(tracker.is_empty());
}

#[test]
fn test_concurrent_register_unregister_keeps_tracker_in_sync() {
    let framework = Framework::new("churn");
    let owner = framework.install_passive(descriptor("M")).unwrap();
    let services = framework.services();
    let tracker = TypedTracker::<dyn Foo>::typed(services.clone(), "Foo");
    tracker.open();

    thread::scope(|scope| {
        for worker in 0..4i64 {
            scope.spawn(move || {
                let mut kept = Vec::new();
                for round in 0..50i64 {
                    let registration = services
                        .register_service(
                            owner,
                            &["Foo"],
                            ServiceObject::new(foo("churn")),
                            Properties::new().with(SERVICE_RANKING, (worker * 7 + round) % 5),
                        )
                        .unwrap();
                    if round % 2 == 0 {
                        services.unregister(&registration);
                    } else {
                        kept.push(registration);
                    }
                }
                // 再注销一部分，使最终集合依赖交错顺序
                for registration in kept.iter().step_by(3) {
                    services.unregister(registration);
                }
            });
        }
    });

    let registered: Vec<_> = services
        .get_service_references("Foo", None)
        .unwrap()
        .into_iter()
        .map(|reference| reference.id)
        .collect();
    let tracked: Vec<_> = tracker
        .service_references()
        .into_iter()
        .map(|reference| reference.id)
        .collect();

    assert!(!registered.is_empty());
    assert_eq!(tracked, registered);
    assert_eq!(tracker.size(), services.service_count());
    tracker.close();
}
