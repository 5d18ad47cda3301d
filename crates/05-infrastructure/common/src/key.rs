//! 依赖键定义
//!
//! 提供类型标签 [`TypeTag`] 与查找键 [`Key`]，注册表、作用域缓存和对象图都以 [`Key`] 作为统一的查找单元

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 类型标签
///
/// 相等性只由 [`TypeId`] 决定，名称仅用于诊断输出
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// 从类型获取类型标签
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 类型ID
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 完整类型名称（包含模块路径）
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 简短的类型名称（不包含模块路径，保留泛型参数的简短形式）
    pub fn short_name(&self) -> String {
        shorten_type_name(self.name)
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// 去掉类型名称中每一段的模块路径
///
/// `a::b::StateCell<c::NoteModel>` -> `StateCell<NoteModel>`
fn shorten_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();

    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

/// 依赖查找键
///
/// 由声明类型与可选限定符组成，两者结构相等即视为同一个键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    type_tag: TypeTag,
    qualifier: Option<Arc<str>>,
}

impl Key {
    /// 创建无限定符的键
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_tag: TypeTag::of::<T>(),
            qualifier: None,
        }
    }

    /// 创建带限定符的键
    pub fn qualified<T: ?Sized + 'static>(qualifier: impl AsRef<str>) -> Self {
        Self::of::<T>().with_qualifier(qualifier)
    }

    /// 从类型标签创建键
    pub fn from_tag(type_tag: TypeTag, qualifier: Option<&str>) -> Self {
        Self {
            type_tag,
            qualifier: qualifier.map(Arc::from),
        }
    }

    /// 返回替换了限定符的新键
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl AsRef<str>) -> Self {
        self.qualifier = Some(Arc::from(qualifier.as_ref()));
        self
    }

    /// 返回去掉限定符的新键
    #[must_use]
    pub fn unqualified(&self) -> Self {
        Self {
            type_tag: self.type_tag,
            qualifier: None,
        }
    }

    /// 类型标签
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    /// 限定符
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// 是否为指定类型的键
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_tag.id() == TypeId::of::<T>()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}@{}", self.type_tag, qualifier),
            None => write!(f, "{}", self.type_tag),
        }
    }
}

/// 将解析链格式化为 `A -> B -> C`
pub fn display_chain<'a>(chain: impl IntoIterator<Item = &'a Key>) -> String {
    chain
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoteModel;
    struct Wrapper<T>(T);

    #[test]
    fn test_key_identity_is_structural() {
        assert_eq!(Key::of::<NoteModel>(), Key::of::<NoteModel>());
        assert_eq!(
            Key::qualified::<NoteModel>("note"),
            Key::of::<NoteModel>().with_qualifier("note")
        );
        assert_ne!(Key::qualified::<NoteModel>("a"), Key::qualified::<NoteModel>("b"));
        assert_ne!(Key::of::<NoteModel>(), Key::of::<String>());
    }

    #[test]
    fn test_unqualified_drops_qualifier() {
        let key = Key::qualified::<NoteModel>("note");
        assert_eq!(key.unqualified(), Key::of::<NoteModel>());
        assert_eq!(key.qualifier(), Some("note"));
    }

    #[test]
    fn test_display_uses_short_names() {
        assert_eq!(Key::qualified::<NoteModel>("note").to_string(), "NoteModel@note");
        assert_eq!(
            Key::of::<Wrapper<NoteModel>>().to_string(),
            "Wrapper<NoteModel>"
        );
    }

    #[test]
    fn test_display_chain() {
        let chain = [Key::of::<NoteModel>(), Key::qualified::<String>("x")];
        assert_eq!(display_chain(&chain), "NoteModel -> String@x");
    }
}
