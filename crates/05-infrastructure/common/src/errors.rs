//! 错误类型定义

use thiserror::Error;

/// 装箱的外部错误（激活器等钩子返回）
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        #[source]
        source: BoxError,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 过滤表达式语法错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("过滤表达式无效: {message} (位置 {position}, 表达式 \"{filter}\")")]
pub struct FilterError {
    /// 原始表达式
    pub filter: String,
    /// 出错位置（字节偏移）
    pub position: usize,
    /// 错误描述
    pub message: String,
}

impl FilterError {
    /// 创建新的语法错误
    pub fn new(filter: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            position,
            message: message.into(),
        }
    }
}

/// 版本解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("版本格式无效: {input}")]
    InvalidVersion { input: String },

    #[error("版本范围格式无效: {input}")]
    InvalidRange { input: String },
}

/// 模块注册表错误类型
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("模块已注册: {symbolic_name} {version}")]
    DuplicateModule {
        symbolic_name: String,
        version: String,
    },

    #[error("模块 {module} 的依赖无法解析: {dependency} {range}")]
    UnresolvedDependency {
        module: String,
        dependency: String,
        range: String,
    },

    #[error("检测到循环依赖: {chain}")]
    CyclicDependency { chain: String },

    #[error("模块仍处于激活状态: {module}")]
    ModuleActive { module: String },

    #[error("模块不存在: {module_id}")]
    ModuleNotFound { module_id: u64 },

    #[error("模块 {module} 无法从 {from} 转换到 {to}")]
    InvalidStateTransition {
        module: String,
        from: String,
        to: String,
    },

    #[error("模块 {module} 的依赖未激活: {dependency}")]
    DependencyNotActive { module: String, dependency: String },

    #[error("模块 {module} 的激活器执行失败: {source}")]
    ActivatorFailed {
        module: String,
        #[source]
        source: BoxError,
    },
}

/// 服务注册表错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("服务提供者无效: {message}")]
    InvalidProvider { message: String },

    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    #[error("服务已注销: {service}")]
    ServiceUnregistered { service: String },

    #[error("模块上下文已失效: {module}")]
    InvalidContext { module: String },
}

/// 扩展注册表错误类型
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("扩展点已声明: {point_id}")]
    DuplicatePoint { point_id: String },

    #[error("扩展点标识无效: {point_id}")]
    InvalidPointId { point_id: String },

    #[error("模块上下文已失效: {module}")]
    InvalidContext { module: String },
}

/// 框架错误类型
#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("配置错误: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("模块错误: {source}")]
    Module {
        #[from]
        source: ModuleError,
    },

    #[error("服务错误: {source}")]
    Service {
        #[from]
        source: ServiceError,
    },

    #[error("扩展错误: {source}")]
    Extension {
        #[from]
        source: ExtensionError,
    },

    #[error("框架启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("框架关闭失败: {message}")]
    ShutdownFailed { message: String },
}

impl ModuleError {
    /// 创建非法状态转换错误
    pub fn invalid_transition(
        module: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidStateTransition {
            module: module.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl ServiceError {
    /// 创建无效提供者错误
    pub fn invalid_provider(message: impl Into<String>) -> Self {
        Self::InvalidProvider {
            message: message.into(),
        }
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ModuleResult<T> = Result<T, ModuleError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
pub type ExtensionResult<T> = Result<T, ExtensionError>;
pub type FrameworkResult<T> = Result<T, FrameworkError>;
