//! 解析器抽象接口
//!
//! 提供依赖解析、释放以及解析上下文

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tether_common::{
    display_chain, GraphError, GraphResult, Key, ScopeChain, ScopeName,
};

/// 解析结果
///
/// 记录实例以及它实际落入的作用域，释放时需要同一个作用域
#[derive(Debug)]
pub struct Resolved<T: ?Sized = dyn Any + Send + Sync> {
    /// 实例
    pub value: Arc<T>,
    /// 实例所在作用域
    pub scope: ScopeName,
    /// 本次解析是否新建了实例
    pub created: bool,
}

impl<T: ?Sized> Clone for Resolved<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            scope: self.scope.clone(),
            created: self.created,
        }
    }
}

/// 释放结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// 作用域未持有该键，释放为空操作
    NotHeld,
    /// 仍有其他持有者
    Retained {
        /// 剩余引用计数
        remaining: usize,
    },
    /// 引用计数归零，实例已移出缓存并执行了销毁钩子
    Disposed,
}

/// 解析器 trait
///
/// 负责解析组件依赖并创建实例
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 解析指定键的实例（类型擦除）
    async fn resolve_instance(&self, key: &Key, chain: &ScopeChain) -> GraphResult<Resolved>;

    /// 释放实例，并级联释放为它获取的依赖
    async fn release(&self, key: &Key, scope: &ScopeName) -> GraphResult<ReleaseOutcome>;

    /// 检查是否存在可用的提供者
    fn can_resolve(&self, key: &Key) -> bool;
}

/// 类型化解析扩展
#[async_trait]
pub trait ResolverExt: Resolver {
    /// 解析并向下转型为具体类型
    ///
    /// 转型失败时会归还刚获取的引用
    async fn resolve_as<T>(&self, key: &Key, chain: &ScopeChain) -> GraphResult<Resolved<T>>
    where
        T: Send + Sync + 'static,
    {
        let resolved = self.resolve_instance(key, chain).await?;
        match resolved.value.downcast::<T>() {
            Ok(value) => Ok(Resolved {
                value,
                scope: resolved.scope,
                created: resolved.created,
            }),
            Err(_) => {
                self.release(key, &resolved.scope).await?;
                Err(GraphError::TypeMismatch {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                })
            }
        }
    }

    /// 在单一作用域内解析
    async fn resolve_in<T>(&self, key: &Key, scope: &ScopeName) -> GraphResult<Resolved<T>>
    where
        T: Send + Sync + 'static,
    {
        self.resolve_as::<T>(key, &ScopeChain::single(scope.clone()))
            .await
    }
}

impl<R: Resolver + ?Sized> ResolverExt for R {}

/// 解析上下文
///
/// 记录当前解析链，用于检测循环依赖和限制解析深度
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    chain: Vec<Key>,
    max_depth: usize,
}

impl ResolutionContext {
    /// 创建新的解析上下文
    pub fn new(max_depth: usize) -> Self {
        Self {
            chain: Vec::new(),
            max_depth,
        }
    }

    /// 添加键到解析链
    pub fn push(&mut self, key: &Key) -> GraphResult<()> {
        if self.chain.contains(key) {
            return Err(GraphError::cyclic(self.describe_with(key)));
        }
        if self.chain.len() >= self.max_depth {
            return Err(GraphError::ResolutionDepthExceeded {
                key: key.to_string(),
                max_depth: self.max_depth,
            });
        }
        self.chain.push(key.clone());
        Ok(())
    }

    /// 从解析链中移除最后一个键
    pub fn pop(&mut self) {
        self.chain.pop();
    }

    /// 当前深度
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// 当前解析链的描述
    pub fn describe(&self) -> String {
        display_chain(&self.chain)
    }

    /// 追加一个键后的解析链描述
    pub fn describe_with(&self, key: &Key) -> String {
        display_chain(self.chain.iter().chain(std::iter::once(key)))
    }
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new(256)
    }
}
