//! 模块描述符
//!
//! 由打包层提供的静态元数据：标识、版本与声明的依赖。

use crate::version::{Version, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 模块依赖声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// 依赖模块的符号名
    pub symbolic_name: String,
    /// 可接受的版本范围
    #[serde(default)]
    pub version_range: VersionRange,
}

impl Dependency {
    /// 创建依赖声明
    pub fn new(symbolic_name: impl Into<String>, version_range: VersionRange) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version_range,
        }
    }

    /// 接受任意版本的依赖
    pub fn any(symbolic_name: impl Into<String>) -> Self {
        Self::new(symbolic_name, VersionRange::any())
    }
}

/// 模块描述符
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 符号名，与版本共同构成唯一标识
    pub symbolic_name: String,
    /// 模块版本
    pub version: Version,
    /// 显示名称
    #[serde(default)]
    pub name: Option<String>,
    /// 模块描述
    #[serde(default)]
    pub description: Option<String>,
    /// 供应商
    #[serde(default)]
    pub vendor: Option<String>,
    /// 有序依赖列表
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// 额外的清单头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ModuleDescriptor {
    /// 创建新的模块描述符
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
            name: None,
            description: None,
            vendor: None,
            dependencies: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// 设置显示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设置描述
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 设置供应商
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// 添加依赖
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// 添加清单头
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// `符号名 版本` 形式的标签，用于日志和错误信息
    pub fn label(&self) -> String {
        format!("{} {}", self.symbolic_name, self.version)
    }
}
