//! 组件基础接口定义
//!
//! 提供对象图中实例的类型擦除表示、销毁钩子和组件描述符

use crate::errors::BoxError;
use crate::key::Key;
use crate::lifecycle::ScopeName;
use std::any::Any;
use std::sync::Arc;

/// 类型擦除的组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 销毁钩子 trait
///
/// 实例引用计数归零被移出作用域缓存时调用，每个实例恰好调用一次
pub trait Disposable: Send + Sync + 'static {
    /// 释放实例持有的资源
    fn dispose(&self) -> Result<(), BoxError>;
}

/// 组件描述符
///
/// 描述一个已注册绑定的静态信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    /// 绑定键
    pub key: Key,
    /// 实现类型名称
    pub type_name: &'static str,
    /// 声明的作用域
    pub scope: Option<ScopeName>,
    /// 声明的依赖
    pub dependencies: Vec<Key>,
    /// 是否允许被后续注册覆盖
    pub overridable: bool,
    /// 是否带销毁钩子
    pub disposable: bool,
}
