//! 运行时构建器

use std::sync::Arc;

use tether_common::{GraphError, RuntimeError, RuntimeResult};
use tether_config::{RuntimeConfig, RuntimeConfigLoader};
use tether_graph::{Graph, GraphModule, GraphSettings, Provider, ProviderRegistry};
use tether_mvc::{install_global_runtime, MvcRuntime, StateKeeper};
use tracing::{debug, error, info, warn};

use crate::host::TetherRuntime;
use crate::logging::LoggingConfig;

/// 运行时构建器
///
/// 使用建造者模式组装配置、提供者注册表、对象图和 MVC 运行时。
/// 注册冲突在注册时立即返回错误。
pub struct RuntimeBuilder {
    /// 显式给出的配置
    config: Option<RuntimeConfig>,
    /// 配置加载器
    loader: Option<RuntimeConfigLoader>,
    /// 提供者注册表
    registry: ProviderRegistry,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: LoggingConfig,
    /// 是否安装为全局运行时
    install_global: bool,
}

impl RuntimeBuilder {
    /// 创建新的运行时构建器
    pub fn new() -> Self {
        Self {
            config: None,
            loader: None,
            registry: ProviderRegistry::new(),
            logging_enabled: false,
            logging_config: LoggingConfig::default(),
            install_global: false,
        }
    }

    /// 使用给定的配置
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 构建时通过加载器读取配置，显式配置优先
    pub fn with_loader(mut self, loader: RuntimeConfigLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// 注册提供者
    pub fn register(mut self, provider: impl Into<Provider>) -> RuntimeResult<Self> {
        self.registry.register(provider)?;
        Ok(self)
    }

    /// 注册模块中的全部提供者
    pub fn add_module(mut self, module: &dyn GraphModule) -> RuntimeResult<Self> {
        let count = self.registry.register_module(module)?;
        debug!("添加模块: {} ({} 个提供者)", module.name(), count);
        Ok(self)
    }

    /// 允许类型的隐式默认构造
    pub fn allow_implicit<T>(mut self) -> Self
    where
        T: Default + Send + Sync + 'static,
    {
        self.registry.allow_implicit::<T>();
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = config;
        self.logging_enabled = true;
        self
    }

    /// 构建完成后安装为全局运行时
    pub fn install_global(mut self, enabled: bool) -> Self {
        self.install_global = enabled;
        self
    }

    /// 构建运行时
    pub fn build(self) -> RuntimeResult<TetherRuntime> {
        // 只有在明确配置了日志时才初始化日志，测试中重复初始化只记录警告
        if self.logging_enabled {
            if let Err(err) = self.logging_config.init() {
                warn!("{}", err);
            }
        }
        info!("开始构建运行时");

        let config = match (self.config, &self.loader) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(loader)) => loader.load()?,
            (None, None) => RuntimeConfig::default(),
        };

        let settings = GraphSettings {
            root_scope: config.graph.root_scope.clone(),
            max_resolution_depth: config.graph.max_resolution_depth,
        };
        let graph = Graph::new(self.registry, settings);

        if config.graph.validate_on_build {
            validate_graph(&graph)?;
        }

        let mut keeper = StateKeeper::new().with_warn_on_discard(config.state_keeper.warn_on_discard);
        if let Some(ttl) = config.state_keeper.record_ttl() {
            keeper = keeper.with_ttl(ttl);
        }

        let runtime = Arc::new(
            MvcRuntime::new(Arc::new(graph), Arc::new(keeper))
                .with_warn_on_dropped(config.events.warn_on_dropped),
        );
        if self.install_global {
            install_global_runtime(runtime.clone());
        }

        info!(
            "运行时构建完成: 根作用域 {}, {} 个提供者",
            config.graph.root_scope,
            runtime.graph().descriptors().len()
        );
        Ok(TetherRuntime::new(runtime, config, self.install_global))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_graph(graph: &Graph) -> RuntimeResult<()> {
    let Err(mut errors) = graph.validate() else {
        debug!("对象图验证通过");
        return Ok(());
    };

    for err in &errors {
        error!("对象图验证失败: {}", err);
    }
    if errors.len() == 1 {
        if let Some(err) = errors.pop() {
            return Err(err.into());
        }
    }
    let messages: Vec<String> = errors.iter().map(GraphError::to_string).collect();
    Err(RuntimeError::BootstrapFailed {
        message: format!("对象图验证失败: {}", messages.join("; ")),
    })
}
