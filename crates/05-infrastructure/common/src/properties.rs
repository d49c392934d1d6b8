//! 服务属性
//!
//! 属性键大小写不敏感，但保留首次写入时的原始拼写；
//! 迭代顺序按小写键排序，保证同一进程内输出稳定。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 服务接口标识列表属性
pub const OBJECTCLASS: &str = "objectClass";
/// 服务唯一标识属性
pub const SERVICE_ID: &str = "service.id";
/// 服务排名属性
pub const SERVICE_RANKING: &str = "service.ranking";
/// 服务描述属性
pub const SERVICE_DESCRIPTION: &str = "service.description";

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// 以字符串形式读取
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// 以整数形式读取
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// 以布尔形式读取
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// 以列表形式读取
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// 属性映射（键大小写不敏感）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, PropertyValue>", into = "BTreeMap<String, PropertyValue>")]
pub struct Properties {
    entries: BTreeMap<String, (String, PropertyValue)>,
}

impl Properties {
    /// 创建空属性映射
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加属性
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入属性，返回被覆盖的旧值
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        let key = key.into();
        let folded = key.to_lowercase();
        match self.entries.get_mut(&folded) {
            Some((_, existing)) => Some(std::mem::replace(existing, value.into())),
            None => {
                self.entries.insert(folded, (key, value.into()));
                None
            }
        }
    }

    /// 获取属性值
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(&key.to_lowercase()).map(|(_, value)| value)
    }

    /// 移除属性
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(&key.to_lowercase()).map(|(_, value)| value)
    }

    /// 是否包含属性
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// 按原始键名迭代
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 服务排名，缺失或非整数时为 0
    pub fn ranking(&self) -> i32 {
        self.get(SERVICE_RANKING)
            .and_then(PropertyValue::as_integer)
            .map(|ranking| ranking.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
            .unwrap_or(0)
    }
}

impl From<BTreeMap<String, PropertyValue>> for Properties {
    fn from(map: BTreeMap<String, PropertyValue>) -> Self {
        let mut properties = Self::new();
        for (key, value) in map {
            properties.insert(key, value);
        }
        properties
    }
}

impl From<Properties> for BTreeMap<String, PropertyValue> {
    fn from(properties: Properties) -> Self {
        properties.entries.into_values().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = Self::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut properties = Properties::new().with("Vendor", "dkfz");
        assert_eq!(properties.get("vendor"), Some(&PropertyValue::from("dkfz")));

        let previous = properties.insert("VENDOR", "mitk");
        assert_eq!(previous, Some(PropertyValue::from("dkfz")));
        assert_eq!(properties.len(), 1);

        // 原始拼写保留
        let keys: Vec<_> = properties.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["Vendor"]);
    }

    #[test]
    fn test_ranking_defaults_to_zero() {
        assert_eq!(Properties::new().ranking(), 0);
        assert_eq!(Properties::new().with(SERVICE_RANKING, "high").ranking(), 0);
        assert_eq!(Properties::new().with(SERVICE_RANKING, 7).ranking(), 7);
        assert_eq!(
            Properties::new().with(SERVICE_RANKING, i64::MAX).ranking(),
            i32::MAX
        );
    }

    #[test]
    fn test_deserialize_from_json() {
        let properties: Properties =
            serde_json::from_str(r#"{"name": "reader", "priority": 3, "tags": ["a", "b"]}"#)
                .unwrap();
        assert_eq!(properties.get("NAME").and_then(PropertyValue::as_str), Some("reader"));
        assert_eq!(properties.get("priority").and_then(PropertyValue::as_integer), Some(3));
        assert_eq!(properties.get("tags").and_then(PropertyValue::as_list).map(<[_]>::len), Some(2));
    }
}
