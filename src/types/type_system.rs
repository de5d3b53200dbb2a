//! Type model for Cinder
//!
//! Types are immutable once constructed. Compound types live in the
//! [`TypeEnvironment`] arena and are referenced by stable ids, so the
//! inheritance graph stays acyclic. Every structural query unwraps
//! const-qualification and named aliases transparently; declaration text
//! generation keeps them visible.
#![allow(dead_code)]

use crate::types::environment::TypeEnvironment;
use crate::types::{ClassId, StructId};
use crate::utils::{Error, Result};

/// Pointers and function pointers on the C targets Cinder supports
const POINTER_SIZE: u64 = 8;

// ==================== Primitives ====================

/// Primitive (non-aggregate) types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    UnsignedShort,
    UnsignedInt,
    UnsignedLong,
    Float,
    Double,
}

impl Primitive {
    /// Get the size in bytes
    pub fn size_of(self) -> u64 {
        match self {
            Self::Bool | Self::Char => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
            Self::Long | Self::UnsignedLong | Self::Double => 8,
            Self::Void => 0,
        }
    }

    /// Check if this is an integer type
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Char
                | Self::Short
                | Self::Int
                | Self::Long
                | Self::UnsignedShort
                | Self::UnsignedInt
                | Self::UnsignedLong
        )
    }

    /// Check if this is a floating-point type
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Arithmetic types participate in binary operations; void does not
    pub fn is_arithmetic(self) -> bool {
        self != Self::Void
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::UnsignedShort | Self::UnsignedInt | Self::UnsignedLong)
    }

    pub fn c_name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "char",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::UnsignedShort => "unsigned short",
            Self::UnsignedInt => "unsigned int",
            Self::UnsignedLong => "unsigned long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

// ==================== Types ====================

/// A resolved Cinder type
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(Primitive),
    Pointer(Box<Type>),
    Array { elem: Box<Type>, extent: Option<u64> },
    FunctionPointer { ret: Box<Type>, params: Vec<Type> },
    /// Const-qualified wrapper; transparent to structural queries
    Const(Box<Type>),
    /// Named alias; redirects through the environment's alias table
    Named(String),
    Struct(StructId),
    Class(ClassId),
    /// A type variable inside a generic template
    GenericParam(String),
}

impl Type {
    pub fn pointer(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub const VOID: Type = Type::Primitive(Primitive::Void);
    pub const CHAR: Type = Type::Primitive(Primitive::Char);
    pub const INT: Type = Type::Primitive(Primitive::Int);
    pub const LONG: Type = Type::Primitive(Primitive::Long);
    pub const DOUBLE: Type = Type::Primitive(Primitive::Double);
    pub const UNSIGNED_LONG: Type = Type::Primitive(Primitive::UnsignedLong);

    /// Strip const qualification and named aliases for structural queries
    pub fn unwrap_all<'a>(&'a self, env: &'a TypeEnvironment) -> &'a Type {
        match self {
            Type::Const(inner) => inner.unwrap_all(env),
            Type::Named(name) => match env.alias(name) {
                Some(target) => target.unwrap_all(env),
                None => self,
            },
            _ => self,
        }
    }

    /// Resolve named aliases only, keeping const qualification visible
    pub fn unwrap_alias<'a>(&'a self, env: &'a TypeEnvironment) -> &'a Type {
        match self {
            Type::Named(name) => match env.alias(name) {
                Some(target) => target.unwrap_alias(env),
                None => self,
            },
            _ => self,
        }
    }

    /// Unwrap a single const level, as binary operation results do
    pub fn strip_const(self) -> Type {
        match self {
            Type::Const(inner) => *inner,
            other => other,
        }
    }

    /// Non-compound types: primitives, pointers, arrays, function pointers.
    /// Gates operator applicability.
    pub fn is_primitive(&self, env: &TypeEnvironment) -> bool {
        matches!(
            self.unwrap_all(env),
            Type::Primitive(_)
                | Type::Pointer(_)
                | Type::Array { .. }
                | Type::FunctionPointer { .. }
        )
    }

    pub fn is_pointer(&self, env: &TypeEnvironment) -> bool {
        matches!(self.unwrap_all(env), Type::Pointer(_))
    }

    pub fn is_pointer_or_array(&self, env: &TypeEnvironment) -> bool {
        matches!(self.unwrap_all(env), Type::Pointer(_) | Type::Array { .. })
    }

    /// Increment and decrement only apply to pointers, long, unsigned,
    /// plain int, and char
    pub fn supports_increment(&self, env: &TypeEnvironment) -> bool {
        match self.unwrap_all(env) {
            Type::Pointer(_) => true,
            Type::Primitive(p) => {
                matches!(p, Primitive::Long | Primitive::Int | Primitive::Char)
                    || p.is_unsigned()
            }
            _ => false,
        }
    }

    // ==================== Compatibility ====================

    /// Structural, asymmetric assignability: can a value of `other` be
    /// assigned into a slot of `self`?
    pub fn is_assignable_from(&self, other: &Type, env: &TypeEnvironment) -> bool {
        let to = self.unwrap_all(env);
        let from = other.unwrap_all(env);
        match (to, from) {
            (Type::Primitive(a), Type::Primitive(b)) => {
                a == b || (a.is_arithmetic() && b.is_arithmetic())
            }
            (Type::Pointer(a), Type::Pointer(b)) => {
                matches!(a.unwrap_all(env), Type::Primitive(Primitive::Void))
                    || matches!(b.unwrap_all(env), Type::Primitive(Primitive::Void))
                    || a.is_assignable_from(b, env)
            }
            // array-to-pointer decay
            (Type::Pointer(a), Type::Array { elem, .. }) => a.is_assignable_from(elem, env),
            (Type::Array { elem: a, extent: ea }, Type::Array { elem: b, extent: eb }) => {
                a.is_assignable_from(b, env)
                    && (ea.is_none() || eb.is_none() || ea == eb)
            }
            (
                Type::FunctionPointer { ret: ra, params: pa },
                Type::FunctionPointer { ret: rb, params: pb },
            ) => {
                pa.len() == pb.len()
                    && ra.is_assignable_from(rb, env)
                    && pa.iter().zip(pb).all(|(a, b)| a.is_assignable_from(b, env))
            }
            (Type::Struct(a), Type::Struct(b)) => {
                a == b || {
                    let (sa, sb) = (env.struct_def(*a), env.struct_def(*b));
                    !sa.anonymous && !sb.anonymous && sa.name == sb.name
                }
            }
            (Type::Class(a), Type::Class(b)) => a == b || env.is_ancestor(*a, *b),
            (Type::GenericParam(a), Type::GenericParam(b)) => a == b,
            _ => false,
        }
    }

    /// Two types are exact iff each is assignable from the other
    pub fn is_exact(&self, other: &Type, env: &TypeEnvironment) -> bool {
        self.is_assignable_from(other, env) && other.is_assignable_from(self, env)
    }

    // ==================== Size ====================

    /// Byte size of a valid type; fails if any member type is invalid
    pub fn data_size(&self, env: &TypeEnvironment) -> Result<u64> {
        match self {
            Type::Primitive(Primitive::Void) => Err(Error::InvalidType {
                name: "void".into(),
                span: None,
            }),
            Type::Primitive(p) => Ok(p.size_of()),
            Type::Pointer(_) | Type::FunctionPointer { .. } => Ok(POINTER_SIZE),
            Type::Array { elem, extent } => match extent {
                Some(n) => Ok(n * elem.data_size(env)?),
                None => Ok(POINTER_SIZE),
            },
            Type::Const(inner) => inner.data_size(env),
            Type::Named(name) => match env.alias(name) {
                Some(target) => target.data_size(env),
                None => Err(Error::InvalidType { name: name.clone(), span: None }),
            },
            Type::Struct(id) => {
                let mut sum = 0;
                for (_, ty) in &env.struct_def(*id).fields {
                    sum += ty.data_size(env)?;
                }
                Ok(sum)
            }
            Type::Class(id) => {
                // vtable pointer first, then the flattened field layout
                let mut sum = POINTER_SIZE;
                for (_, field) in env.all_fields(*id) {
                    sum += field.ty.data_size(env)?;
                }
                Ok(sum)
            }
            Type::GenericParam(name) => Err(Error::InvalidType {
                name: name.clone(),
                span: None,
            }),
        }
    }

    // ==================== C text ====================

    /// The bare C type text, e.g. `struct Point *`
    pub fn c_type(&self, env: &TypeEnvironment) -> String {
        match self {
            Type::Primitive(p) => p.c_name().to_string(),
            Type::Pointer(inner) => format!("{} *", inner.c_type(env)),
            Type::Array { elem, extent } => match extent {
                Some(n) => format!("{}[{}]", elem.c_type(env), n),
                None => format!("{}[]", elem.c_type(env)),
            },
            Type::FunctionPointer { ret, params } => {
                let params: Vec<String> = params.iter().map(|p| p.c_type(env)).collect();
                format!("{} (*)({})", ret.c_type(env), params.join(", "))
            }
            Type::Const(inner) => format!("const {}", inner.c_type(env)),
            Type::Named(name) => name.clone(),
            Type::Struct(id) => format!("struct {}", env.struct_def(*id).name),
            Type::Class(id) => format!("struct {}", env.class(*id).name),
            Type::GenericParam(name) => name.clone(),
        }
    }

    /// A C declaration of `ident` with this type, e.g. `int (*f)(char)`
    pub fn c_declaration(&self, ident: &str, env: &TypeEnvironment) -> String {
        match self {
            Type::FunctionPointer { ret, params } => {
                let params: Vec<String> = params.iter().map(|p| p.c_type(env)).collect();
                format!("{} (*{})({})", ret.c_type(env), ident, params.join(", "))
            }
            Type::Array { elem, extent } => match extent {
                Some(n) => format!("{} {}[{}]", elem.c_type(env), ident, n),
                None => format!("{} {}[]", elem.c_type(env), ident),
            },
            Type::Const(inner) => format!("const {}", inner.c_declaration(ident, env)),
            _ => format!("{} {}", self.c_type(env), ident),
        }
    }

    /// Human-readable description used in diagnostics
    pub fn describe(&self, env: &TypeEnvironment) -> String {
        self.c_type(env)
    }
}

/// Format a type list the way call signatures print in diagnostics
pub fn describe_types(types: &[Type], env: &TypeEnvironment) -> String {
    let parts: Vec<String> = types.iter().map(|t| t.describe(env)).collect();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exactness_is_mutual_assignability() {
        let env = TypeEnvironment::new();
        let cases = [
            (Type::INT, Type::LONG),
            (Type::INT, Type::pointer(Type::CHAR)),
            (Type::pointer(Type::CHAR), Type::pointer(Type::VOID)),
            (
                Type::pointer(Type::INT),
                Type::Array { elem: Box::new(Type::INT), extent: Some(4) },
            ),
            (Type::Const(Box::new(Type::INT)), Type::INT),
        ];
        for (a, b) in &cases {
            assert_eq!(
                a.is_exact(b, &env),
                a.is_assignable_from(b, &env) && b.is_assignable_from(a, &env),
                "exactness must equal mutual assignability for {:?} / {:?}",
                a,
                b
            );
        }
    }

    #[test]
    fn test_array_decays_one_way() {
        let env = TypeEnvironment::new();
        let array = Type::Array { elem: Box::new(Type::INT), extent: Some(4) };
        let ptr = Type::pointer(Type::INT);
        assert!(ptr.is_assignable_from(&array, &env));
        assert!(!array.is_assignable_from(&ptr, &env));
        assert!(!ptr.is_exact(&array, &env));
    }

    #[test]
    fn test_const_and_alias_unwrap_transparently() {
        let mut env = TypeEnvironment::new();
        env.declare_alias("myint", Type::INT).unwrap();
        let alias = Type::Named("myint".into());
        let constant = Type::Const(Box::new(Type::INT));
        assert!(alias.is_exact(&Type::INT, &env));
        assert!(constant.is_exact(&Type::INT, &env));
        assert!(alias.is_primitive(&env));
        assert_eq!(alias.data_size(&env).unwrap(), 4);
    }

    #[test]
    fn test_data_size_of_invalid_member_fails() {
        let env = TypeEnvironment::new();
        assert!(Type::VOID.data_size(&env).is_err());
        assert!(Type::Named("nothing".into()).data_size(&env).is_err());
        assert_eq!(Type::pointer(Type::VOID).data_size(&env).unwrap(), 8);
    }

    #[test]
    fn test_function_pointer_declaration_text() {
        let env = TypeEnvironment::new();
        let fp = Type::FunctionPointer {
            ret: Box::new(Type::INT),
            params: vec![Type::CHAR, Type::pointer(Type::DOUBLE)],
        };
        assert_eq!(fp.c_declaration("f", &env), "int (*f)(char, double *)");
    }
}
