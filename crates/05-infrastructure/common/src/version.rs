//! 语义化版本与版本范围

use crate::errors::VersionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 模块版本（主版本.次版本.修订号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl Version {
    /// 创建新版本
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// 空版本 0.0.0
    pub const fn empty() -> Self {
        Self::new(0, 0, 0)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    /// 缺省的段按 0 处理，例如 `"1.2"` 解析为 `1.2.0`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidVersion {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 3];
        let mut count = 0;
        for segment in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = segment.parse().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// 版本范围
///
/// 支持 OSGi 风格的区间写法：
///
/// - `"1.0"` 表示 `>= 1.0.0`
/// - `"[1.0,2.0)"` 表示 `1.0.0 <= v < 2.0.0`
/// - `"(1.0,2.0]"` 表示 `1.0.0 < v <= 2.0.0`
/// - `""` 或 `"*"` 匹配任意版本
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Option<(Version, bool)>,
}

impl VersionRange {
    /// 匹配任意版本
    pub fn any() -> Self {
        Self::at_least(Version::empty())
    }

    /// `>= floor`
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
        }
    }

    /// `[floor, ceiling)`
    pub fn between(floor: Version, ceiling: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: Some((ceiling, false)),
        }
    }

    /// 仅匹配指定版本
    pub fn exact(version: Version) -> Self {
        Self {
            floor: version,
            floor_inclusive: true,
            ceiling: Some((version, true)),
        }
    }

    /// 检查版本是否在范围内
    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        if !above_floor {
            return false;
        }

        match self.ceiling {
            None => true,
            Some((ceiling, true)) => *version <= ceiling,
            Some((ceiling, false)) => *version < ceiling,
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::InvalidRange {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let floor_inclusive = match trimmed.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => {
                let floor = trimmed.parse().map_err(|_| invalid())?;
                return Ok(Self::at_least(floor));
            }
        };
        let ceiling_inclusive = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid()),
        };

        let body = &trimmed[1..trimmed.len() - 1];
        let (low, high) = body.split_once(',').ok_or_else(invalid)?;
        let floor: Version = low.parse().map_err(|_| invalid())?;
        let ceiling: Version = high.parse().map_err(|_| invalid())?;
        if ceiling < floor {
            return Err(invalid());
        }

        Ok(Self {
            floor,
            floor_inclusive,
            ceiling: Some((ceiling, ceiling_inclusive)),
        })
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ceiling {
            None => write!(f, "{}", self.floor),
            Some((ceiling, ceiling_inclusive)) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if ceiling_inclusive { ']' } else { ')' },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_fills_missing_segments() {
        assert_eq!("1".parse::<Version>().unwrap(), Version::new(1, 0, 0));
        assert_eq!("1.2".parse::<Version>().unwrap(), Version::new(1, 2, 0));
        assert_eq!("1.2.3".parse::<Version>().unwrap(), Version::new(1, 2, 3));
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("a.b".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 10, 0) > Version::new(1, 9, 9));
        assert!(Version::new(2, 0, 0) > Version::new(1, 99, 99));
    }

    #[test]
    fn test_range_bounds() {
        let range: VersionRange = "[1.0,2.0)".parse().unwrap();
        assert!(range.includes(&Version::new(1, 0, 0)));
        assert!(range.includes(&Version::new(1, 9, 9)));
        assert!(!range.includes(&Version::new(2, 0, 0)));

        let range: VersionRange = "(1.0,2.0]".parse().unwrap();
        assert!(!range.includes(&Version::new(1, 0, 0)));
        assert!(range.includes(&Version::new(2, 0, 0)));

        let range: VersionRange = "1.5".parse().unwrap();
        assert!(!range.includes(&Version::new(1, 4, 0)));
        assert!(range.includes(&Version::new(7, 0, 0)));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!("[2.0,1.0]".parse::<VersionRange>().is_err());
        assert!("[1.0,2.0".parse::<VersionRange>().is_err());
    }

    #[test]
    fn test_range_display_is_canonical() {
        let range: VersionRange = "[1,2)".parse().unwrap();
        assert_eq!(range.to_string(), "[1.0.0,2.0.0)");
        assert_eq!(VersionRange::any().to_string(), "0.0.0");
    }
}
