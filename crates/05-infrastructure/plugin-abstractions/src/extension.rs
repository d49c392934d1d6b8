//! 扩展点与扩展
//!
//! 配置元素树是声明式来源（XML、JSON 等）解析后的通用标签树，
//! 注册表只处理解析后的结构。

use infrastructure_common::{ExtensionHandle, ModuleHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 配置元素（名称、属性、文本值、有序子元素）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationElement {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub children: Vec<ConfigurationElement>,
}

impl ConfigurationElement {
    /// 创建配置元素
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 添加属性
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 设置文本值
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// 追加子元素
    pub fn with_child(mut self, child: ConfigurationElement) -> Self {
        self.children.push(child);
        self
    }

    /// 读取属性
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 按名称筛选直接子元素，保持原有顺序
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigurationElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// 扩展点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPoint {
    /// 全局唯一的扩展点标识
    pub id: String,
    /// 声明扩展点的模块
    pub owner: ModuleHandle,
    /// 可选的模式描述
    pub schema: Option<String>,
}

/// 扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub handle: ExtensionHandle,
    /// 贡献扩展的模块
    pub contributor: ModuleHandle,
    /// 目标扩展点标识
    pub target_point_id: String,
    /// 有序配置元素
    pub configuration: Vec<ConfigurationElement>,
}

/// 扩展点过滤器
pub trait ExtensionPointFilter: Send + Sync {
    /// 扩展点是否满足条件
    fn matches(&self, point: &ExtensionPoint) -> bool;

    /// 空过滤器匹配所有扩展点
    fn is_null(&self) -> bool {
        false
    }
}

/// 匹配所有扩展点
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFilter;

impl ExtensionPointFilter for NullFilter {
    fn matches(&self, _point: &ExtensionPoint) -> bool {
        true
    }

    fn is_null(&self) -> bool {
        true
    }
}

/// 按声明模块过滤
#[derive(Debug, Clone, Copy)]
pub struct OwnerFilter(pub ModuleHandle);

impl ExtensionPointFilter for OwnerFilter {
    fn matches(&self, point: &ExtensionPoint) -> bool {
        point.owner == self.0
    }
}

/// 按扩展点标识前缀过滤（如 `org.blueberry.ui.`）
#[derive(Debug, Clone)]
pub struct PointIdPrefixFilter(pub String);

impl ExtensionPointFilter for PointIdPrefixFilter {
    fn matches(&self, point: &ExtensionPoint) -> bool {
        point.id.starts_with(&self.0)
    }
}

impl<F> ExtensionPointFilter for F
where
    F: Fn(&ExtensionPoint) -> bool + Send + Sync,
{
    fn matches(&self, point: &ExtensionPoint) -> bool {
        self(point)
    }
}

/// 扩展注册表变更事件
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    ExtensionPointAdded(Arc<ExtensionPoint>),
    ExtensionPointRemoved(Arc<ExtensionPoint>),
    ExtensionAdded(Arc<Extension>),
    ExtensionRemoved(Arc<Extension>),
}
