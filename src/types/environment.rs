//! Type environment: the per-run registry of compound types
//!
//! Structs and classes are arena entries referenced by stable ids; ancestor
//! links are ids as well, which keeps the class hierarchy an acyclic graph
//! with no owning references between a class and its superclass artifacts.
#![allow(dead_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frontend::ast::TypeExpr;
use crate::types::type_system::{Primitive, Type};
use crate::utils::{Error, Result};

/// Default name of the generated virtual-table field
const DEFAULT_VTABLE_FIELD: &str = "__vtable";

// ==================== Identifiers ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

/// A compound type reference usable as a member-table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundRef {
    Struct(StructId),
    Class(ClassId),
}

/// Position of a method within its declaring class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSlot {
    Concrete(usize),
    Virtual(usize),
}

/// Member visibility tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

// ==================== Definitions ====================

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub anonymous: bool,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub ret: Type,
    /// Declared parameters, excluding the implicit object parameter
    pub params: Vec<(String, Type)>,
    pub visibility: Visibility,
    pub has_body: bool,
}

impl MethodSig {
    /// The method viewed as a function-pointer type (no object parameter)
    pub fn fn_pointer(&self) -> Type {
        Type::FunctionPointer {
            ret: Box::new(self.ret.clone()),
            params: self.params.iter().map(|(_, t)| t.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CtorSig {
    pub params: Vec<(String, Type)>,
    pub visibility: Visibility,
    pub has_body: bool,
}

/// A generated forwarding method for an inherited, non-overridden virtual
#[derive(Debug, Clone)]
pub struct GeneratedSuper {
    pub name: String,
    pub ret: Type,
    pub params: Vec<(String, Type)>,
    /// The class whose implementation the forwarder invokes
    pub target: ClassId,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<ClassId>,
    pub fields: Vec<FieldDecl>,
    /// Concrete (non-overridable) methods, declared order
    pub methods: Vec<MethodSig>,
    /// Virtual methods, declared order
    pub virtuals: Vec<MethodSig>,
    pub constructors: Vec<CtorSig>,
    /// Filled in by lowering, empty until then
    pub generated_supers: Vec<GeneratedSuper>,
}

/// One entry of a class's virtual table
#[derive(Debug, Clone)]
pub struct VtableSlot {
    pub name: String,
    pub ret: Type,
    pub params: Vec<(String, Type)>,
    /// The class providing the implementation this slot points at
    pub impl_class: ClassId,
}

// ==================== Environment ====================

/// Named type lookup, compound arenas, and backend configuration
pub struct TypeEnvironment {
    structs: Vec<StructDef>,
    struct_names: HashMap<String, StructId>,
    classes: Vec<ClassDef>,
    class_names: HashMap<String, ClassId>,
    aliases: HashMap<String, Type>,
    vtable_field: String,
}

impl TypeEnvironment {
    pub fn new() -> Self {
        Self {
            structs: Vec::new(),
            struct_names: HashMap::new(),
            classes: Vec::new(),
            class_names: HashMap::new(),
            aliases: HashMap::new(),
            vtable_field: DEFAULT_VTABLE_FIELD.to_string(),
        }
    }

    pub fn with_vtable_field(name: &str) -> Self {
        let mut env = Self::new();
        env.vtable_field = name.to_string();
        env
    }

    /// Name of the generated virtual-table pointer field
    pub fn vtable_field(&self) -> &str {
        &self.vtable_field
    }

    // ==================== Aliases & boolean ====================

    pub fn declare_alias(&mut self, name: &str, ty: Type) -> Result<()> {
        if self.aliases.contains_key(name) {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        self.aliases.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name)
    }

    /// Declare the standard `boolean` alias
    pub fn define_standard_boolean(&mut self) {
        self.aliases
            .entry("boolean".to_string())
            .or_insert(Type::Primitive(Primitive::Bool));
    }

    pub fn is_standard_boolean_defined(&self) -> bool {
        self.aliases.contains_key("boolean")
    }

    /// The type of comparison results: the declared `boolean` alias when the
    /// environment defines one, an unsigned short otherwise
    pub fn boolean_type(&self) -> Type {
        if self.is_standard_boolean_defined() {
            Type::Named("boolean".to_string())
        } else {
            Type::Primitive(Primitive::UnsignedShort)
        }
    }

    // ==================== Structs ====================

    pub fn declare_struct(
        &mut self,
        name: &str,
        fields: Vec<(String, Type)>,
        anonymous: bool,
    ) -> Result<StructId> {
        if !anonymous && self.struct_names.contains_key(name) {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        let id = StructId(self.structs.len());
        self.structs.push(StructDef { name: name.to_string(), anonymous, fields });
        if !anonymous {
            self.struct_names.insert(name.to_string(), id);
        }
        Ok(id)
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0]
    }

    pub fn lookup_struct(&self, name: &str) -> Option<StructId> {
        self.struct_names.get(name).copied()
    }

    // ==================== Classes ====================

    /// Register an empty class shell so member types can refer to it
    pub fn declare_class(&mut self, name: &str, superclass: Option<ClassId>) -> Result<ClassId> {
        if self.class_names.contains_key(name) {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        let id = ClassId(self.classes.len());
        self.classes.push(ClassDef {
            name: name.to_string(),
            superclass,
            fields: Vec::new(),
            methods: Vec::new(),
            virtuals: Vec::new(),
            constructors: Vec::new(),
            generated_supers: Vec::new(),
        });
        self.class_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDef {
        &mut self.classes[id.0]
    }

    pub fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    /// The inheritance chain from this class outward to the root
    pub fn lineage(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(sup) = self.class(current).superclass {
            chain.push(sup);
            current = sup;
        }
        chain
    }

    /// The inheritance chain from the root inward to this class
    pub fn reverse_inheritance_order(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = self.lineage(id);
        chain.reverse();
        chain
    }

    /// Whether `ancestor` is a strict ancestor of `id`
    pub fn is_ancestor(&self, ancestor: ClassId, id: ClassId) -> bool {
        ancestor != id && self.lineage(id).contains(&ancestor)
    }

    /// All fields in layout order: root class first, most-derived last
    pub fn all_fields(&self, id: ClassId) -> Vec<(ClassId, FieldDecl)> {
        let mut fields = Vec::new();
        for class in self.reverse_inheritance_order(id) {
            for field in &self.class(class).fields {
                fields.push((class, field.clone()));
            }
        }
        fields
    }

    // ==================== Method resolution ====================

    pub fn method_sig(&self, class: ClassId, slot: MethodSlot) -> &MethodSig {
        match slot {
            MethodSlot::Concrete(i) => &self.class(class).methods[i],
            MethodSlot::Virtual(i) => &self.class(class).virtuals[i],
        }
    }

    fn match_in_class(&self, class: ClassId, name: &str, args: &[Type]) -> Option<MethodSlot> {
        let def = self.class(class);
        let matches = |sig: &MethodSig| {
            sig.name == name
                && sig.params.len() == args.len()
                && sig
                    .params
                    .iter()
                    .zip(args)
                    .all(|((_, p), a)| p.is_assignable_from(a, self))
        };
        if let Some(i) = def.methods.iter().position(matches) {
            return Some(MethodSlot::Concrete(i));
        }
        def.virtuals.iter().position(matches).map(MethodSlot::Virtual)
    }

    /// Resolve a method overload against this class's lineage; the nearest
    /// declaring class wins
    pub fn resolve_method(
        &self,
        id: ClassId,
        name: &str,
        args: &[Type],
    ) -> Option<(ClassId, MethodSlot)> {
        for class in self.lineage(id) {
            if let Some(slot) = self.match_in_class(class, name, args) {
                return Some((class, slot));
            }
        }
        None
    }

    /// Resolve a method starting at the superclass, for `super` calls
    pub fn resolve_super_method(
        &self,
        id: ClassId,
        name: &str,
        args: &[Type],
    ) -> Option<(ClassId, MethodSlot)> {
        let sup = self.class(id).superclass?;
        self.resolve_method(sup, name, args)
    }

    /// Resolve a constructor overload; constructors are never inherited
    pub fn resolve_constructor(&self, id: ClassId, args: &[Type]) -> Option<usize> {
        self.class(id).constructors.iter().position(|ctor| {
            ctor.params.len() == args.len()
                && ctor
                    .params
                    .iter()
                    .zip(args)
                    .all(|((_, p), a)| p.is_assignable_from(a, self))
        })
    }

    // ==================== Virtual table ====================

    /// The virtual-table layout: inherited slots first (base order), each
    /// pointing at the most-derived implementation by name+signature
    pub fn vtable_layout(&self, id: ClassId) -> Vec<VtableSlot> {
        let mut layout: Vec<VtableSlot> = match self.class(id).superclass {
            Some(sup) => self.vtable_layout(sup),
            None => Vec::new(),
        };
        for sig in &self.class(id).virtuals {
            let overridden = layout.iter_mut().find(|slot| {
                slot.name == sig.name
                    && slot.params.len() == sig.params.len()
                    && slot
                        .params
                        .iter()
                        .zip(&sig.params)
                        .all(|((_, a), (_, b))| a.is_exact(b, self))
            });
            match overridden {
                Some(slot) => slot.impl_class = id,
                None => layout.push(VtableSlot {
                    name: sig.name.clone(),
                    ret: sig.ret.clone(),
                    params: sig.params.clone(),
                    impl_class: id,
                }),
            }
        }
        layout
    }

    // ==================== Type expression resolution ====================

    /// Resolve a declared-type expression to a type
    pub fn resolve(&self, expr: &TypeExpr) -> Result<Type> {
        self.resolve_with_vars(expr, &[])
    }

    /// Resolve with a set of in-scope generic type variables
    pub fn resolve_with_vars(&self, expr: &TypeExpr, vars: &[String]) -> Result<Type> {
        match expr {
            TypeExpr::Named(name) => {
                if vars.iter().any(|v| v == name) {
                    return Ok(Type::GenericParam(name.clone()));
                }
                if let Some(p) = primitive_by_name(name) {
                    return Ok(Type::Primitive(p));
                }
                if self.aliases.contains_key(name) {
                    return Ok(Type::Named(name.clone()));
                }
                if let Some(id) = self.lookup_struct(name) {
                    return Ok(Type::Struct(id));
                }
                if let Some(id) = self.lookup_class(name) {
                    return Ok(Type::Class(id));
                }
                Err(Error::IdentifierDoesNotExist { name: name.clone(), span: None })
            }
            TypeExpr::Pointer(inner) => {
                Ok(Type::pointer(self.resolve_with_vars(inner, vars)?))
            }
            TypeExpr::Array(elem, extent) => Ok(Type::Array {
                elem: Box::new(self.resolve_with_vars(elem, vars)?),
                extent: *extent,
            }),
            TypeExpr::FunctionPointer { ret, params } => Ok(Type::FunctionPointer {
                ret: Box::new(self.resolve_with_vars(ret, vars)?),
                params: params
                    .iter()
                    .map(|p| self.resolve_with_vars(p, vars))
                    .collect::<Result<Vec<_>>>()?,
            }),
            TypeExpr::Const(inner) => {
                Ok(Type::Const(Box::new(self.resolve_with_vars(inner, vars)?)))
            }
            // generic instantiations are resolved by the analyzers, which
            // also hold the generic registry
            TypeExpr::Generic { name, .. } => Err(Error::InvalidType {
                name: format!("{}<...>", name),
                span: None,
            }),
        }
    }
}

impl Default for TypeEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

fn primitive_by_name(name: &str) -> Option<Primitive> {
    Some(match name {
        "void" => Primitive::Void,
        "bool" => Primitive::Bool,
        "char" => Primitive::Char,
        "short" => Primitive::Short,
        "int" => Primitive::Int,
        "long" => Primitive::Long,
        "unsigned short" => Primitive::UnsignedShort,
        "unsigned int" => Primitive::UnsignedInt,
        "unsigned long" => Primitive::UnsignedLong,
        "float" => Primitive::Float,
        "double" => Primitive::Double,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env_with_hierarchy() -> (TypeEnvironment, ClassId, ClassId) {
        let mut env = TypeEnvironment::new();
        let base = env.declare_class("Base", None).unwrap();
        env.class_mut(base).virtuals.push(MethodSig {
            name: "area".to_string(),
            ret: Type::INT,
            params: vec![],
            visibility: Visibility::Public,
            has_body: true,
        });
        env.class_mut(base).virtuals.push(MethodSig {
            name: "print".to_string(),
            ret: Type::VOID,
            params: vec![],
            visibility: Visibility::Public,
            has_body: true,
        });
        let derived = env.declare_class("Derived", Some(base)).unwrap();
        env.class_mut(derived).virtuals.push(MethodSig {
            name: "area".to_string(),
            ret: Type::INT,
            params: vec![],
            visibility: Visibility::Public,
            has_body: true,
        });
        (env, base, derived)
    }

    #[test]
    fn test_lineage_orders() {
        let (env, base, derived) = env_with_hierarchy();
        assert_eq!(env.lineage(derived), vec![derived, base]);
        assert_eq!(env.reverse_inheritance_order(derived), vec![base, derived]);
        assert!(env.is_ancestor(base, derived));
        assert!(!env.is_ancestor(derived, base));
        assert!(!env.is_ancestor(base, base));
    }

    #[test]
    fn test_override_takes_single_vtable_slot() {
        let (env, base, derived) = env_with_hierarchy();
        let layout = env.vtable_layout(derived);
        assert_eq!(layout.len(), 2);
        let area = layout.iter().find(|s| s.name == "area").unwrap();
        assert_eq!(area.impl_class, derived);
        let print = layout.iter().find(|s| s.name == "print").unwrap();
        assert_eq!(print.impl_class, base);
    }

    #[test]
    fn test_method_resolution_prefers_most_derived() {
        let (env, base, derived) = env_with_hierarchy();
        let (owner, _) = env.resolve_method(derived, "area", &[]).unwrap();
        assert_eq!(owner, derived);
        let (owner, _) = env.resolve_method(derived, "print", &[]).unwrap();
        assert_eq!(owner, base);
        let (owner, _) = env.resolve_super_method(derived, "area", &[]).unwrap();
        assert_eq!(owner, base);
    }

    #[test]
    fn test_boolean_fallback() {
        let mut env = TypeEnvironment::new();
        assert_eq!(env.boolean_type(), Type::Primitive(Primitive::UnsignedShort));
        env.define_standard_boolean();
        assert_eq!(env.boolean_type(), Type::Named("boolean".to_string()));
        assert!(env.boolean_type().is_primitive(&env));
    }

    #[test]
    fn test_class_redeclaration_fails() {
        let mut env = TypeEnvironment::new();
        env.declare_class("Point", None).unwrap();
        assert!(matches!(
            env.declare_class("Point", None),
            Err(crate::utils::Error::Redeclaration { .. })
        ));
    }
}
