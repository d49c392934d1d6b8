//! 示例模块
//!
//! 一个运行时模块声明视图扩展点，两个数据管理模块各自发布数据存储服务并贡献视图，
//! 渲染模块依赖数据管理模块并在启动时消费排名最高的数据存储。

use infrastructure_common::{
    Dependency, ModuleDescriptor, Properties, Version, VersionRange, SERVICE_DESCRIPTION,
    SERVICE_RANKING,
};
use infrastructure_composition::FrameworkBuilder;
use plugin_abstractions::{ConfigurationElement, FnActivator, ModuleContextExt};
use std::sync::Arc;
use tracing::info;

pub const DATA_STORAGE: &str = "org.mitk.DataStorage";
pub const RENDERING_MANAGER: &str = "org.mitk.RenderingManager";
pub const VIEWS_POINT: &str = "org.blueberry.ui.views";

/// 数据存储服务
pub trait DataStorage: Send + Sync {
    fn name(&self) -> &str;
    fn node_count(&self) -> usize;
}

/// 渲染管理服务
pub trait RenderingManager: Send + Sync {
    fn request_update(&self) -> String;
}

struct InMemoryStorage {
    name: String,
    nodes: usize,
}

impl DataStorage for InMemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_count(&self) -> usize {
        self.nodes
    }
}

struct StorageRenderer {
    storage: Arc<dyn DataStorage>,
}

impl RenderingManager for StorageRenderer {
    fn request_update(&self) -> String {
        format!("渲染 {} 中的 {} 个节点", self.storage.name(), self.storage.node_count())
    }
}

fn view(id: &str, name: &str) -> ConfigurationElement {
    ConfigurationElement::new("view")
        .with_attribute("id", id)
        .with_attribute("name", name)
        .with_attribute("category", "org.mitk.views.general")
}

fn storage_module(
    symbolic_name: &'static str,
    storage_name: &'static str,
    nodes: usize,
    ranking: i64,
) -> (ModuleDescriptor, FnActivator) {
    let descriptor = ModuleDescriptor::new(symbolic_name, Version::new(1, 0, 0))
        .with_name(storage_name)
        .with_dependency(Dependency::new(
            "org.blueberry.core.runtime",
            VersionRange::at_least(Version::new(1, 0, 0)),
        ));

    let activator = FnActivator::on_start(move |context| {
        let storage: Arc<dyn DataStorage> = Arc::new(InMemoryStorage {
            name: storage_name.to_string(),
            nodes,
        });
        context.register(
            DATA_STORAGE,
            storage,
            Properties::new()
                .with(SERVICE_RANKING, ranking)
                .with(SERVICE_DESCRIPTION, storage_name),
        )?;
        context.register_extension(
            VIEWS_POINT,
            vec![view(&format!("{}.view", symbolic_name), storage_name)],
        )?;
        info!(module = symbolic_name, "数据存储已发布");
        Ok(())
    });

    (descriptor, activator)
}

/// 向构建器添加全部示例模块
pub fn install(builder: FrameworkBuilder) -> FrameworkBuilder {
    let runtime = ModuleDescriptor::new("org.blueberry.core.runtime", Version::new(1, 2, 0))
        .with_name("BlueBerry Runtime")
        .with_vendor("DKFZ");
    let runtime_activator = FnActivator::on_start(|context| {
        context.register_extension_point(VIEWS_POINT, Some("schema/views.exsd"))?;
        Ok(())
    });

    let (local, local_activator) =
        storage_module("org.mitk.gui.qt.datamanager", "本地数据存储", 3, 10);
    let (remote, remote_activator) =
        storage_module("org.mitk.gui.qt.remotedata", "远程数据存储", 12, 1);

    let renderer = ModuleDescriptor::new("org.mitk.gui.qt.render", Version::new(0, 9, 0))
        .with_name("渲染窗口")
        .with_dependency(Dependency::any("org.mitk.gui.qt.datamanager"));
    let renderer_activator = FnActivator::on_start(|context| {
        let storage = context
            .service::<dyn DataStorage>(DATA_STORAGE)
            .ok_or("没有可用的数据存储")?;
        let manager: Arc<dyn RenderingManager> = Arc::new(StorageRenderer { storage });
        info!("{}", manager.request_update());
        context.register(RENDERING_MANAGER, manager, Properties::new())?;
        Ok(())
    });

    // 渲染模块先于依赖安装，启动顺序仍由依赖关系决定
    builder
        .add_module(renderer, renderer_activator)
        .add_module(local, local_activator)
        .add_module(remote, remote_activator)
        .add_module(runtime, runtime_activator)
}
