//! 框架构建器与运行时集成测试

use crate::builder::FrameworkBuilder;
use crate::runtime::RuntimeStatus;
use infrastructure_common::{
    Dependency, FrameworkConfig, FrameworkError, LoggingConfig, ModuleDescriptor, ModuleState,
    Properties, Version,
};
use plugin_abstractions::{FnActivator, ModuleContextExt};
use std::sync::Arc;
use std::sync::Once;
use tempfile::NamedTempFile;
use tokio::fs;

static INIT_LOGGER: Once = Once::new();

/// 初始化测试日志系统（只初始化一次）
fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init()
            .ok(); // 忽略初始化失败的错误
    });
}

fn descriptor(name: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(name, Version::new(1, 0, 0))
}

fn publishing(interface: &'static str) -> FnActivator {
    FnActivator::on_start(move |context| {
        context.register(interface, Arc::new(interface.to_string()), Properties::new())?;
        Ok(())
    })
}

/// 测试从配置文件构建并按依赖顺序启动
#[tokio::test]
async fn test_build_from_config_and_start() {
    init_test_logger();

    let temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    fs::write(
        temp_file.path(),
        "[framework]\nname = \"workbench\"\nlog_service_events = true\n",
    )
    .await
    .unwrap();

    let runtime = FrameworkBuilder::new()
        .add_config_file(temp_file.path())
        .expect("添加配置文件应该成功")
        .add_module(
            descriptor("app").with_dependency(Dependency::any("core")),
            publishing("App"),
        )
        .add_module(descriptor("core"), publishing("Core"))
        .build()
        .await
        .unwrap();

    assert_eq!(runtime.framework().name(), "workbench");
    assert_eq!(runtime.status().await, RuntimeStatus::Initialized);

    let report = runtime.start().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(runtime.status().await, RuntimeStatus::Running);

    let summary = runtime.summary().await;
    assert_eq!(summary.modules, 2);
    assert_eq!(summary.active_modules, 2);
    assert_eq!(summary.services, 2);
    assert!(summary.started_at.is_some());

    runtime.stop().await.unwrap();
    assert_eq!(runtime.status().await, RuntimeStatus::Stopped);
    assert_eq!(runtime.framework().services().service_count(), 0);
}

/// 测试启动失败被记录在报告中而不中止其他模块
#[tokio::test]
async fn test_start_report_collects_failures() {
    let runtime = FrameworkBuilder::new()
        .with_config(FrameworkConfig::default())
        .add_module(descriptor("healthy"), publishing("Healthy"))
        .add_module(
            descriptor("faulty"),
            FnActivator::on_start(|_| Err("初始化失败".into())),
        )
        .add_passive_module(descriptor("orphan").with_dependency(Dependency::any("missing")))
        .build()
        .await
        .unwrap();

    let report = runtime.start().await.unwrap();
    assert_eq!(report.resolve_failures.len(), 1);
    assert_eq!(report.start_failures.len(), 1);

    let modules = runtime.framework().modules().modules();
    let state_of = |name: &str| {
        modules
            .iter()
            .find(|module| module.descriptor.symbolic_name == name)
            .map(|module| module.state)
    };
    assert_eq!(state_of("healthy"), Some(ModuleState::Active));
    assert_eq!(state_of("faulty"), Some(ModuleState::Resolved));
    assert_eq!(state_of("orphan"), Some(ModuleState::Installed));

    runtime.stop().await.unwrap();
}

/// 测试关闭自动启动后模块保持已解析
#[tokio::test]
async fn test_auto_start_disabled() {
    let mut config = FrameworkConfig::default();
    config.framework.auto_start = false;

    let runtime = FrameworkBuilder::new()
        .with_config(config)
        .add_passive_module(descriptor("lazy"))
        .build()
        .await
        .unwrap();

    runtime.start().await.unwrap();
    let modules = runtime.framework().modules().modules();
    assert_eq!(modules[0].state, ModuleState::Resolved);

    // 重复启动被拒绝
    assert!(matches!(
        runtime.start().await,
        Err(FrameworkError::BootstrapFailed { .. })
    ));
}

/// 测试停止钩子失败汇总为关闭错误
#[tokio::test]
async fn test_stop_failure_reported() {
    let runtime = FrameworkBuilder::new()
        .add_module(
            descriptor("sticky"),
            FnActivator::new(|_| Ok(()), |_| Err("无法释放资源".into())),
        )
        .build()
        .await
        .unwrap();

    runtime.start().await.unwrap();
    let result = runtime.stop().await;
    assert!(matches!(result, Err(FrameworkError::ShutdownFailed { ref message }) if message.contains("无法释放资源")));

    // 模块仍然回到已解析状态
    let modules = runtime.framework().modules().modules();
    assert_eq!(modules[0].state, ModuleState::Resolved);
}

/// 测试缺失的配置文件和重复模块
#[tokio::test]
async fn test_builder_errors() {
    let result = FrameworkBuilder::new().add_config_file("/nonexistent/plugins.toml");
    assert!(matches!(result, Err(FrameworkError::BootstrapFailed { .. })));

    let result = FrameworkBuilder::new()
        .add_passive_module(descriptor("X"))
        .add_passive_module(descriptor("X"))
        .build()
        .await;
    assert!(matches!(result, Err(FrameworkError::Module { .. })));

    let temp_file = NamedTempFile::new().unwrap();
    let result = FrameworkBuilder::new()
        .with_config(FrameworkConfig {
            logging: LoggingConfig {
                level: "plugin_impl=verbose".to_string(),
                ..LoggingConfig::default()
            },
            ..FrameworkConfig::default()
        })
        .add_optional_config_file(temp_file.path())
        .build()
        .await;
    assert!(matches!(result, Err(FrameworkError::Config { .. })));
}
