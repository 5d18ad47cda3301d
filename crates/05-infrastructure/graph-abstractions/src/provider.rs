//! 提供者抽象
//!
//! 提供者为一个 [`Key`] 持有工厂函数、可选的声明作用域以及所需依赖键的集合

use crate::dependencies::ResolvedDependencies;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tether_common::{BoxError, ComponentDescriptor, Disposable, Instance, Key, ScopeName};

/// 类型擦除的工厂函数
pub type FactoryFn = Arc<dyn Fn(&ResolvedDependencies) -> Result<Instance, BoxError> + Send + Sync>;

/// 类型擦除的销毁钩子
pub type DisposerFn = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// 提供者
///
/// 注册后不可变，克隆只复制引用
#[derive(Clone)]
pub struct Provider {
    key: Key,
    type_name: &'static str,
    factory: FactoryFn,
    scope: Option<ScopeName>,
    dependencies: Vec<Key>,
    overridable: bool,
    disposer: Option<DisposerFn>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("overridable", &self.overridable)
            .field("disposer", &self.disposer.as_ref().map(|_| "<function>"))
            .field("factory", &"<function>")
            .finish()
    }
}

impl Provider {
    /// 使用依赖感知的工厂创建提供者
    ///
    /// 工厂执行前，声明的依赖都已按深度优先顺序解析完毕
    pub fn of<T, F>(factory: F) -> ProviderBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolvedDependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(
            move |deps: &ResolvedDependencies| -> Result<Instance, BoxError> {
                factory(deps).map(|value| Arc::new(value) as Instance)
            },
        );
        ProviderBuilder::new(factory)
    }

    /// 使用无依赖的构造函数创建提供者
    pub fn from_fn<T, F>(constructor: F) -> ProviderBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::of(move |_| Ok(constructor()))
    }

    /// 使用 [`Default`] 创建提供者
    pub fn default_of<T>() -> ProviderBuilder<T>
    where
        T: Default + Send + Sync + 'static,
    {
        Self::from_fn(T::default)
    }

    /// 始终提供同一个实例
    pub fn instance<T>(value: Arc<T>) -> ProviderBuilder<T>
    where
        T: Send + Sync + 'static,
    {
        let factory: FactoryFn =
            Arc::new(move |_: &ResolvedDependencies| -> Result<Instance, BoxError> {
                Ok(value.clone() as Instance)
            });
        ProviderBuilder::new(factory)
    }

    /// 绑定键
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// 实现类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 声明的作用域
    pub fn scope(&self) -> Option<&ScopeName> {
        self.scope.as_ref()
    }

    /// 声明的依赖
    pub fn dependencies(&self) -> &[Key] {
        &self.dependencies
    }

    /// 是否允许被覆盖
    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    /// 销毁钩子
    pub fn disposer(&self) -> Option<&DisposerFn> {
        self.disposer.as_ref()
    }

    /// 调用工厂创建实例
    pub fn create(&self, dependencies: &ResolvedDependencies) -> Result<Instance, BoxError> {
        (self.factory)(dependencies)
    }

    /// 以新的限定符复制提供者，类型标签保持不变
    #[must_use]
    pub fn rekeyed(&self, key: Key) -> Self {
        debug_assert_eq!(key.type_tag(), self.key.type_tag());
        Self {
            key,
            ..self.clone()
        }
    }

    /// 生成组件描述符
    pub fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor {
            key: self.key.clone(),
            type_name: self.type_name,
            scope: self.scope.clone(),
            dependencies: self.dependencies.clone(),
            overridable: self.overridable,
            disposable: self.disposer.is_some(),
        }
    }
}

/// 类型化的提供者构建器
pub struct ProviderBuilder<T> {
    provider: Provider,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ProviderBuilder<T>
where
    T: Send + Sync + 'static,
{
    fn new(factory: FactoryFn) -> Self {
        Self {
            provider: Provider {
                key: Key::of::<T>(),
                type_name: std::any::type_name::<T>(),
                factory,
                scope: None,
                dependencies: Vec::new(),
                overridable: false,
                disposer: None,
            },
            _marker: PhantomData,
        }
    }

    /// 设置限定符
    #[must_use]
    pub fn qualified(mut self, qualifier: impl AsRef<str>) -> Self {
        self.provider.key = Key::qualified::<T>(qualifier);
        self
    }

    /// 声明作用域
    #[must_use]
    pub fn in_scope(mut self, scope: impl Into<ScopeName>) -> Self {
        self.provider.scope = Some(scope.into());
        self
    }

    /// 声明依赖
    #[must_use]
    pub fn depends_on(mut self, key: Key) -> Self {
        if !self.provider.dependencies.contains(&key) {
            self.provider.dependencies.push(key);
        }
        self
    }

    /// 批量声明依赖
    #[must_use]
    pub fn depends_on_all(self, keys: impl IntoIterator<Item = Key>) -> Self {
        keys.into_iter().fold(self, Self::depends_on)
    }

    /// 允许后续注册覆盖此绑定
    #[must_use]
    pub fn overridable(mut self) -> Self {
        self.provider.overridable = true;
        self
    }

    /// 完成构建
    pub fn build(self) -> Provider {
        self.provider
    }
}

impl<T> ProviderBuilder<T>
where
    T: Disposable,
{
    /// 实例移出缓存时调用 [`Disposable::dispose`]
    #[must_use]
    pub fn disposable(mut self) -> Self {
        let disposer: DisposerFn = Arc::new(|instance: &Instance| -> Result<(), BoxError> {
            match (**instance).downcast_ref::<T>() {
                Some(value) => value.dispose(),
                None => Err(format!("实例不是 {}", std::any::type_name::<T>()).into()),
            }
        });
        self.provider.disposer = Some(disposer);
        self
    }
}

impl<T> From<ProviderBuilder<T>> for Provider
where
    T: Send + Sync + 'static,
{
    fn from(builder: ProviderBuilder<T>) -> Self {
        builder.build()
    }
}
