//! 模块生命周期状态

use serde::{Deserialize, Serialize};
use std::fmt;

/// 模块加载状态
///
/// 正常路径为 `Installed → Resolved → Starting → Active → Stopping → Resolved`，
/// 未激活时可以卸载进入 `Uninstalled`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// 已安装，依赖尚未解析
    Installed,
    /// 依赖已解析
    Resolved,
    /// 正在执行激活器 start
    Starting,
    /// 运行中
    Active,
    /// 正在执行激活器 stop
    Stopping,
    /// 已卸载
    Uninstalled,
}

impl ModuleState {
    /// 检查状态转换是否合法
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;

        matches!(
            (self, next),
            (Installed, Resolved)
                | (Installed, Uninstalled)
                // 依赖被卸载后退回未解析
                | (Resolved, Installed)
                | (Resolved, Starting)
                | (Resolved, Uninstalled)
                | (Starting, Active)
                // 激活器失败
                | (Starting, Resolved)
                | (Active, Stopping)
                | (Stopping, Resolved)
        )
    }

    /// 依赖是否已解析（含运行中状态）
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            ModuleState::Resolved | ModuleState::Starting | ModuleState::Active | ModuleState::Stopping
        )
    }
}

impl Default for ModuleState {
    fn default() -> Self {
        Self::Installed
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installed => "Installed",
            Self::Resolved => "Resolved",
            Self::Starting => "Starting",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
            Self::Uninstalled => "Uninstalled",
        };
        f.write_str(name)
    }
}
