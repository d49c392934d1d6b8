//! # 示例应用程序
//!
//! 演示插件框架：模块依赖解析、服务注册与跟踪、扩展点与扩展贡献

mod modules;

use clap::Parser;
use infrastructure_common::{LoggingConfig, SERVICE_DESCRIPTION};
use infrastructure_composition::{FrameworkBuilder, FrameworkRuntime, DEFAULT_ENV_PREFIX};
use plugin_abstractions::PointIdPrefixFilter;
use plugin_impl::TypedTracker;
use std::path::PathBuf;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "插件框架示例宿主")]
struct Args {
    /// 配置文件路径（TOML 或 JSON）
    #[arg(short, long, default_value = "example-app/config/plugins.toml")]
    config: PathBuf,

    /// 日志过滤指令，覆盖配置文件
    #[arg(long)]
    log_level: Option<String>,

    /// 展示后立即退出，不等待 Ctrl-C
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = build_runtime(&args).await?;
    info!("启动插件框架示例宿主");

    let report = runtime.start().await?;
    for (handle, error) in report.resolve_failures.iter().chain(&report.start_failures) {
        println!("模块 {} 未能启动: {}", handle, error);
    }

    print_modules(&runtime);
    print_services(&runtime);
    print_extensions(&runtime);
    demonstrate_tracker(&runtime);

    if !args.once {
        println!("按 Ctrl-C 退出");
        tokio::signal::ctrl_c().await?;
        info!("收到退出信号，正在关闭");
    }

    runtime.stop().await?;
    println!("{:?}", runtime.summary().await);
    Ok(())
}

/// 构建框架运行时
async fn build_runtime(args: &Args) -> anyhow::Result<FrameworkRuntime> {
    let mut builder = FrameworkBuilder::new()
        .add_optional_config_file(&args.config)
        .add_config_env_vars(DEFAULT_ENV_PREFIX);

    builder = match &args.log_level {
        Some(level) => builder.with_logging(LoggingConfig {
            level: level.clone(),
            ..LoggingConfig::development()
        }),
        None => builder.enable_logging(),
    };

    let runtime = modules::install(builder).build().await?;
    Ok(runtime)
}

fn print_modules(runtime: &FrameworkRuntime) {
    println!("\n== 模块 ==");
    for module in runtime.framework().modules().modules() {
        println!(
            "{:<4} {:<40} {:<8} {}",
            module.handle.raw(),
            module.descriptor.symbolic_name,
            module.descriptor.version.to_string(),
            module.state
        );
    }
}

fn print_services(runtime: &FrameworkRuntime) {
    println!("\n== 服务 ==");
    let services = runtime.framework().services();
    for interface in [modules::DATA_STORAGE, modules::RENDERING_MANAGER] {
        let references = services
            .get_service_references(interface, None)
            .unwrap_or_default();
        for reference in references {
            let description = services
                .get_properties(&reference)
                .and_then(|properties| properties.get(SERVICE_DESCRIPTION).map(|value| value.to_string()))
                .unwrap_or_default();
            println!(
                "{:<20} {:<12} ranking={:<4} owner={} {}",
                interface, reference.id, reference.ranking, reference.owner, description
            );
        }
    }
}

fn print_extensions(runtime: &FrameworkRuntime) {
    println!("\n== 扩展点 ==");
    let extensions = runtime.framework().extensions();
    let filter = PointIdPrefixFilter("org.blueberry.".to_string());
    for point in extensions.get_extension_points(Some(&filter)) {
        println!("{} (owner={})", point.id, point.owner);
        for element in extensions.get_configuration_elements_for(&point.id) {
            println!(
                "  <{} id={:?} name={:?}>",
                element.name,
                element.attribute("id").unwrap_or_default(),
                element.attribute("name").unwrap_or_default()
            );
        }
    }
}

fn demonstrate_tracker(runtime: &FrameworkRuntime) {
    println!("\n== 服务跟踪 ==");
    let tracker = TypedTracker::<dyn modules::DataStorage>::typed(
        runtime.framework().services().clone(),
        modules::DATA_STORAGE,
    );
    tracker.open();
    match tracker.get_service() {
        Some(storage) => println!("最佳数据存储: {} ({} 个节点)", storage.name(), storage.node_count()),
        None => println!("没有可用的数据存储"),
    }
    println!("跟踪中的数据存储: {}", tracker.size());
    tracker.close();
}
