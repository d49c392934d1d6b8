//! 配置源管理
//!
//! 按添加顺序叠加配置源，后添加的覆盖先添加的，最终绑定为 [`FrameworkConfig`]。

use infrastructure_common::{ConfigError, ConfigResult, FrameworkConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "PLUGIN";

/// 配置源类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSourceType {
    /// TOML 文件
    Toml,
    /// JSON 文件
    Json,
    /// 环境变量，`PREFIX_SECTION__KEY` 形式
    Environment,
}

/// 配置源描述
#[derive(Debug, Clone)]
pub struct ConfigSourceDescriptor {
    /// 配置源类型
    pub source_type: ConfigSourceType,
    /// 文件路径或环境变量前缀
    pub location: String,
    /// 文件缺失时是否报错
    pub required: bool,
}

/// 配置源集合
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    sources: Vec<ConfigSourceDescriptor>,
}

impl ConfigSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加 TOML 文件
    pub fn add_toml_file<P: AsRef<Path>>(self, path: P, required: bool) -> Self {
        self.push_file(ConfigSourceType::Toml, path.as_ref(), required)
    }

    /// 添加 JSON 文件
    pub fn add_json_file<P: AsRef<Path>>(self, path: P, required: bool) -> Self {
        self.push_file(ConfigSourceType::Json, path.as_ref(), required)
    }

    /// 按扩展名添加配置文件，`.json` 以外一律按 TOML 处理
    pub fn add_file<P: AsRef<Path>>(self, path: P, required: bool) -> Self {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json {
            self.add_json_file(path, required)
        } else {
            self.add_toml_file(path, required)
        }
    }

    /// 添加环境变量配置源
    pub fn add_env_vars(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!("添加环境变量配置源，前缀: {}", prefix);
        self.sources.push(ConfigSourceDescriptor {
            source_type: ConfigSourceType::Environment,
            location: prefix,
            required: false,
        });
        self
    }

    /// 已添加的配置源
    pub fn sources(&self) -> &[ConfigSourceDescriptor] {
        &self.sources
    }

    /// 加载并校验框架配置
    pub fn load(&self) -> ConfigResult<FrameworkConfig> {
        let mut builder = config::Config::builder();

        for source in &self.sources {
            match source.source_type {
                ConfigSourceType::Toml | ConfigSourceType::Json => {
                    let path = PathBuf::from(&source.location);
                    if source.required && !path.exists() {
                        return Err(ConfigError::FileNotFound {
                            path: source.location.clone(),
                        });
                    }
                    let format = if source.source_type == ConfigSourceType::Json {
                        config::FileFormat::Json
                    } else {
                        config::FileFormat::Toml
                    };
                    builder = builder.add_source(
                        config::File::from(path)
                            .format(format)
                            .required(source.required),
                    );
                }
                ConfigSourceType::Environment => {
                    builder = builder.add_source(
                        config::Environment::with_prefix(&source.location)
                            .prefix_separator("_")
                            .separator("__")
                            .try_parsing(true),
                    );
                }
            }
        }

        let settings = builder.build().map_err(|e| ConfigError::ParseError {
            source: Box::new(e),
        })?;
        let config: FrameworkConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigError::ParseError {
                    source: Box::new(e),
                })?;

        validate(&config)?;
        info!(
            framework = %config.framework.name,
            sources = self.sources.len(),
            "框架配置加载完成"
        );
        Ok(config)
    }

    fn push_file(mut self, source_type: ConfigSourceType, path: &Path, required: bool) -> Self {
        debug!("添加配置文件: {} ({:?})", path.display(), source_type);
        self.sources.push(ConfigSourceDescriptor {
            source_type,
            location: path.to_string_lossy().to_string(),
            required,
        });
        self
    }
}

/// 校验框架配置
pub fn validate(config: &FrameworkConfig) -> ConfigResult<()> {
    if config.framework.name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            message: "framework.name 不能为空".to_string(),
        });
    }
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::ValidationError {
            message: format!("logging.level 无效: {}", e),
        });
    }
    Ok(())
}
