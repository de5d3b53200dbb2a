//! Type model and type environment

pub mod environment;
pub mod type_system;

pub use environment::{
    ClassDef, ClassId, CompoundRef, CtorSig, FieldDecl, GeneratedSuper, MethodSig, MethodSlot,
    StructDef, StructId, TypeEnvironment, Visibility, VtableSlot,
};
pub use type_system::{describe_types, Primitive, Type};
