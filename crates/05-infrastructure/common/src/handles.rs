//! 注册表对外暴露的轻量句柄
//!
//! 所有标识都来自单调递增计数器且永不复用，因此句柄本身即可作为代际校验：
//! 记录被移除后，持有旧句柄的调用方只会得到"不存在"，不会访问到新记录。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// 模块句柄
    ModuleHandle,
    "module"
);
id_type!(
    /// 服务标识，对应 `service.id` 属性
    ServiceId,
    "service"
);
id_type!(
    /// 扩展句柄
    ExtensionHandle,
    "extension"
);
id_type!(
    /// 事件监听器标识
    ListenerId,
    "listener"
);

/// 服务注册凭据，仅由注册服务的模块持有
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceRegistration {
    pub id: ServiceId,
    pub owner: ModuleHandle,
}

/// 服务引用
///
/// 查询时刻的快照：`ranking` 反映查询时的 `service.ranking`。
/// 相等性与哈希只看服务标识。
#[derive(Debug, Clone, Copy)]
pub struct ServiceReference {
    pub id: ServiceId,
    pub owner: ModuleHandle,
    pub ranking: i32,
}

impl ServiceReference {
    /// 服务选择顺序：排名降序，其次服务标识升序（先注册者优先）
    pub fn selection_order(&self, other: &Self) -> Ordering {
        other
            .ranking
            .cmp(&self.ranking)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<ServiceRegistration> for ServiceId {
    fn from(registration: ServiceRegistration) -> Self {
        registration.id
    }
}

impl From<ServiceReference> for ServiceId {
    fn from(reference: ServiceReference) -> Self {
        reference.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: u64, ranking: i32) -> ServiceReference {
        ServiceReference {
            id: ServiceId::new(id),
            owner: ModuleHandle::new(1),
            ranking,
        }
    }

    #[test]
    fn test_selection_order() {
        let mut references = vec![reference(3, 0), reference(1, 0), reference(2, 10)];
        references.sort_by(ServiceReference::selection_order);
        let ids: Vec<_> = references.iter().map(|r| r.id.raw()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_equality_ignores_ranking_snapshot() {
        assert_eq!(reference(5, 0), reference(5, 100));
    }
}
