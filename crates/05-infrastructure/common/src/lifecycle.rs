//! 作用域与组件生命周期

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 根作用域的默认名称
pub const ROOT_SCOPE: &str = "root";

/// 作用域名称
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ScopeName(Arc<str>);

impl ScopeName {
    /// 创建作用域名称
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// 根作用域
    pub fn root() -> Self {
        Self::new(ROOT_SCOPE)
    }

    /// 名称字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScopeName {
    fn default() -> Self {
        Self::root()
    }
}

impl From<&str> for ScopeName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<ScopeName> for String {
    fn from(value: ScopeName) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 请求方的作用域链
///
/// 由外到内排列，最后一个元素是最内层作用域
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeChain {
    scopes: Vec<ScopeName>,
}

impl ScopeChain {
    /// 创建空作用域链
    pub fn new() -> Self {
        Self::default()
    }

    /// 只包含一个作用域的链
    pub fn single(scope: impl Into<ScopeName>) -> Self {
        Self {
            scopes: vec![scope.into()],
        }
    }

    /// 只包含根作用域的链
    pub fn root() -> Self {
        Self::single(ScopeName::root())
    }

    /// 在最内层追加子作用域，返回新链
    #[must_use]
    pub fn child(&self, scope: impl Into<ScopeName>) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(scope.into());
        Self { scopes }
    }

    /// 最内层作用域
    pub fn innermost(&self) -> Option<&ScopeName> {
        self.scopes.last()
    }

    /// 最外层作用域
    pub fn outermost(&self) -> Option<&ScopeName> {
        self.scopes.first()
    }

    /// 是否包含指定作用域
    pub fn contains(&self, scope: &ScopeName) -> bool {
        self.scopes.contains(scope)
    }

    /// 截断到指定作用域（包含），作用域不在链上时返回只含该作用域的链
    #[must_use]
    pub fn up_to(&self, scope: &ScopeName) -> Self {
        match self.scopes.iter().position(|name| name == scope) {
            Some(index) => Self {
                scopes: self.scopes[..=index].to_vec(),
            },
            None => Self::single(scope.clone()),
        }
    }

    /// 由外到内遍历
    pub fn iter(&self) -> impl Iterator<Item = &ScopeName> {
        self.scopes.iter()
    }

    /// 链长度
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.scopes.iter().map(ScopeName::as_str).collect();
        write!(f, "[{}]", names.join(" > "))
    }
}

/// 作用域生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeState {
    /// 活跃
    #[default]
    Active,
    /// 即将销毁（为重建而销毁时状态已保存）
    WillDestroy {
        /// 是否为重建而销毁
        for_recreation: bool,
    },
    /// 已销毁
    Destroyed,
}

/// 组件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// 控制器，服务于一个视图
    Controller,
    /// 管理器，在多个控制器之间共享状态
    Manager,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("controller"),
            Self::Manager => f.write_str("manager"),
        }
    }
}
