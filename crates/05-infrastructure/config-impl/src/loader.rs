//! 分层配置加载器
//!
//! 加载顺序：内置默认值 → TOML 文件 → JSON 文件 → 环境变量，后加载的覆盖先加载的

use crate::settings::RuntimeConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tether_common::{ConfigError, ConfigResult};
use tracing::{debug, error, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "TETHER";

/// 运行时配置加载器
#[derive(Debug, Clone)]
pub struct RuntimeConfigLoader {
    toml_file: Option<PathBuf>,
    json_file: Option<PathBuf>,
    env_prefix: Option<String>,
    env_source: Option<HashMap<String, String>>,
}

impl Default for RuntimeConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfigLoader {
    /// 创建加载器，默认读取 `TETHER_` 前缀的环境变量
    pub fn new() -> Self {
        Self {
            toml_file: None,
            json_file: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
            env_source: None,
        }
    }

    /// 添加 TOML 配置文件
    #[must_use]
    pub fn with_toml_file(mut self, path: impl AsRef<Path>) -> Self {
        self.toml_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// 添加 JSON 配置文件
    #[must_use]
    pub fn with_json_file(mut self, path: impl AsRef<Path>) -> Self {
        self.json_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// 设置环境变量前缀
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 使用指定的变量表代替进程环境
    #[must_use]
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// 不读取环境变量
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// 加载并验证配置
    pub fn load(&self) -> ConfigResult<RuntimeConfig> {
        let defaults = Config::try_from(&RuntimeConfig::default()).map_err(parse_error)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &self.toml_file {
            builder = builder.add_source(file_source(path, FileFormat::Toml)?);
        }
        if let Some(path) = &self.json_file {
            builder = builder.add_source(file_source(path, FileFormat::Json)?);
        }
        if let Some(prefix) = &self.env_prefix {
            debug!("读取环境变量配置: {}_*", prefix);
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            );
        }

        let config: RuntimeConfig = builder
            .build()
            .and_then(|built| built.try_deserialize::<RuntimeConfig>())
            .map_err(|e| {
                error!("配置加载失败: {}", e);
                parse_error(e)
            })?;

        config.validate()?;
        info!(
            "运行时配置加载完成: root_scope={}, max_resolution_depth={}",
            config.graph.root_scope, config.graph.max_resolution_depth
        );
        Ok(config)
    }
}

fn file_source(
    path: &Path,
    format: FileFormat,
) -> ConfigResult<File<config::FileSourceFile, FileFormat>> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    debug!("加载配置文件: {}", path.display());
    Ok(File::from(path).format(format).required(true))
}

fn parse_error(e: config::ConfigError) -> ConfigError {
    ConfigError::ParseError {
        source: Box::new(e),
    }
}
