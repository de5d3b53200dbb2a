//! Node annotations produced by type analysis
//!
//! Every expression node (and constructor declaration) carries a meta cell
//! that starts out empty and is filled in exactly once by the analyzers:
//! a resolved type, an lvalue flag, and a set of compilation tags that the
//! C backend consumes when choosing how to lower the node.
#![allow(dead_code)]

use std::mem::discriminant;

use crate::types::{ClassId, MethodSlot, Type};

/// A write-once annotation recording a resolution decision
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// The call dispatches dynamically through the virtual table
    VirtualCall,
    /// The call resolves statically to a superclass implementation
    SuperCall { class: ClassId, slot: MethodSlot },
    /// Resolved binding of a call (or implement-block definition) to a method
    MethodBinding { class: ClassId, slot: MethodSlot },
    /// Resolved constructor for a `new` expression
    ConstructorCall { class: ClassId, ctor: usize },
    /// This constructor delegates to another constructor before its own body
    PriorConstructor { class: ClassId, ctor: usize },
    /// A dereference applied directly to a constructor call
    NewObjectDereference,
    /// Field access through a pointer dereference
    IndirectFieldAccess,
    /// Method call through a pointer dereference
    IndirectMethodCall,
    /// No such method; compile the call as a function-pointer field access
    CompileAsFieldAccess,
    /// Call site bound to a monomorphized generic instance
    GenericInstance { name: String },
}

/// Analysis results attached to a syntax node
#[derive(Debug, Clone, Default)]
pub struct NodeMeta {
    ty: Option<Type>,
    lvalue: bool,
    tags: Vec<Tag>,
    failure: bool,
}

impl NodeMeta {
    /// Set the resolved type. Idempotent: the first type sticks.
    pub fn set_type(&mut self, ty: Type) {
        if self.ty.is_none() {
            self.ty = Some(ty);
        }
    }

    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }

    /// Whether this node has already been typed
    pub fn is_typed(&self) -> bool {
        self.ty.is_some()
    }

    pub fn set_lvalue(&mut self, lvalue: bool) {
        self.lvalue = lvalue;
    }

    pub fn is_lvalue(&self) -> bool {
        self.lvalue
    }

    /// Attach a tag. Write-once per tag kind: a second tag of the same kind
    /// is ignored.
    pub fn add_tag(&mut self, tag: Tag) {
        if !self.tags.iter().any(|t| discriminant(t) == discriminant(&tag)) {
            self.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.iter().any(|t| discriminant(t) == discriminant(tag))
    }

    /// Find the first tag matching the given predicate
    pub fn find_tag(&self, pred: impl Fn(&Tag) -> bool) -> Option<&Tag> {
        self.tags.iter().find(|t| pred(t))
    }

    /// Mark this node as the point where analysis failed
    pub fn set_failure_point(&mut self) {
        self.failure = true;
    }

    pub fn is_failure_point(&self) -> bool {
        self.failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    #[test]
    fn test_set_type_is_idempotent() {
        let mut meta = NodeMeta::default();
        meta.set_type(Type::Primitive(Primitive::Int));
        meta.set_type(Type::Primitive(Primitive::Double));
        assert_eq!(meta.ty(), Some(&Type::Primitive(Primitive::Int)));
    }

    #[test]
    fn test_tags_write_once_per_kind() {
        let mut meta = NodeMeta::default();
        meta.add_tag(Tag::GenericInstance { name: "first".into() });
        meta.add_tag(Tag::GenericInstance { name: "second".into() });
        meta.add_tag(Tag::VirtualCall);
        assert_eq!(
            meta.find_tag(|t| matches!(t, Tag::GenericInstance { .. })),
            Some(&Tag::GenericInstance { name: "first".into() })
        );
        assert!(meta.has_tag(&Tag::VirtualCall));
    }
}
