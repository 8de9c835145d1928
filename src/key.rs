//! Type keys identifying registration slots
//!
//! A [`TypeKey`] is a semantic type plus an optional [`Tag`]. The untagged key
//! is the "default" mapping for a type; tagged keys are addressed explicitly.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque discriminator for multiple registrations of the same type.
///
/// ```rust
/// use scoped_injector::Tag;
///
/// let primary = Tag::from("primary");
/// assert_eq!(primary, Tag::new(String::from("primary")));
/// assert_eq!(primary.to_string(), "primary");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Tag(TagRepr);

#[derive(Clone, PartialEq, Eq, Hash)]
enum TagRepr {
    Named(Arc<str>),
    SliceItem(usize),
}

impl Tag {
    /// Create a named tag.
    #[inline]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(TagRepr::Named(name.into()))
    }

    /// Positional tag used for the `index`-th item of an aggregate view.
    #[inline]
    pub(crate) fn slice_item(index: usize) -> Self {
        Self(TagRepr::SliceItem(index))
    }

    /// The name of a named tag.
    pub fn name(&self) -> Option<&str> {
        match &self.0 {
            TagRepr::Named(name) => Some(name),
            TagRepr::SliceItem(_) => None,
        }
    }

    /// Whether this tag addresses an aggregate item.
    #[inline]
    pub fn is_slice_item(&self) -> bool {
        matches!(self.0, TagRepr::SliceItem(_))
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TagRepr::Named(name) => f.write_str(name),
            TagRepr::SliceItem(index) => write!(f, "#{index}"),
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TagRepr::Named(name) => write!(f, "Tag({name:?})"),
            TagRepr::SliceItem(index) => write!(f, "Tag(#{index})"),
        }
    }
}

/// Identifies a registration slot: a type and an optional tag.
///
/// Equality and hashing only consider the `TypeId` and the tag; the type name
/// is carried for display.
///
/// ```rust
/// use scoped_injector::TypeKey;
///
/// struct Database;
///
/// let plain = TypeKey::of::<Database>();
/// let tagged = TypeKey::of::<Database>().with_tag("replica");
/// assert_ne!(plain, tagged);
/// assert_eq!(plain, tagged.untagged());
/// ```
#[derive(Clone)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
    tag: Option<Tag>,
}

impl TypeKey {
    /// Untagged key for `S`.
    #[inline]
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            tag: None,
        }
    }

    /// Tagged key for `S`.
    #[inline]
    pub fn tagged<S: ?Sized + 'static>(tag: impl Into<Tag>) -> Self {
        Self::of::<S>().with_tag(tag)
    }

    /// Same type, with `tag` replacing any existing tag.
    #[inline]
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Same type without a tag.
    #[inline]
    pub fn untagged(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            tag: None,
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Whether both keys name the same type, ignoring tags.
    #[inline]
    pub fn same_type(&self, other: &TypeKey) -> bool {
        self.type_id == other.type_id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.tag == other.tag
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}[{}]", self.type_name, tag),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    trait Greeter {}
    struct English;

    #[test]
    fn test_untagged_and_tagged_are_distinct() {
        let mut keys = HashSet::new();
        keys.insert(TypeKey::of::<English>());
        keys.insert(TypeKey::tagged::<English>("x"));
        keys.insert(TypeKey::tagged::<English>("x"));

        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&TypeKey::of::<English>()));
    }

    #[test]
    fn test_trait_object_keys() {
        let key = TypeKey::of::<dyn Greeter>();
        assert_ne!(key, TypeKey::of::<English>());
        assert!(key.type_name().contains("Greeter"));
    }

    #[test]
    fn test_display() {
        let key = TypeKey::tagged::<English>("primary");
        assert!(key.to_string().ends_with("English[primary]"));

        let item = TypeKey::of::<English>().with_tag(Tag::slice_item(2));
        assert!(item.to_string().ends_with("English[#2]"));
        assert!(item.tag().is_some_and(Tag::is_slice_item));
    }

    #[test]
    fn test_slice_item_never_equals_named_tag() {
        assert_ne!(Tag::slice_item(0), Tag::new("#0"));
        assert_eq!(Tag::new("#0").name(), Some("#0"));
        assert_eq!(Tag::slice_item(0).name(), None);
    }
}
