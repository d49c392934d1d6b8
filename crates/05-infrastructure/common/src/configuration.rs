//! 框架配置

use serde::{Deserialize, Serialize};

/// 框架顶层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// 框架运行行为
    pub framework: FrameworkSettings,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 框架运行行为配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    /// 框架实例名称
    pub name: String,
    /// 启动时解析所有已安装模块
    pub auto_resolve: bool,
    /// 启动时按依赖顺序激活所有已解析模块
    pub auto_start: bool,
    /// 关闭时按依赖逆序停止所有模块
    pub stop_on_shutdown: bool,
    /// 以 debug 级别记录每个服务事件
    pub log_service_events: bool,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            name: "plugin-framework".to_string(),
            auto_resolve: true,
            auto_start: true,
            stop_on_shutdown: true,
            log_service_events: false,
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` 过滤指令，例如 `"info,plugin_impl=debug"`
    pub level: String,
    /// 输出格式
    pub format: LogFormat,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: true,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            show_target: false,
            show_thread_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: FrameworkConfig =
            serde_json::from_str(r#"{ "framework": { "auto_start": false }, "logging": { "format": "json" } }"#)
                .unwrap();
        assert!(!config.framework.auto_start);
        assert!(config.framework.auto_resolve);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }
}
