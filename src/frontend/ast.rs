//! Untyped syntax tree consumed from the external parser
//!
//! Parsing happens outside this crate: the driver reads a serialized tree
//! (serde) and hands it to the analyzers. Every expression node carries an
//! empty [`NodeMeta`] placeholder that analysis fills in.
#![allow(dead_code)]

use crate::frontend::token::Token;
use crate::middle::tree::NodeMeta;
use crate::types::Visibility;
use crate::utils::Span;
use serde::{Deserialize, Serialize};

// ==================== Type Expressions ====================

/// A declared-type expression, resolved against the type environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// A primitive, typedef, struct, class, or in-scope type-variable name
    Named(String),
    Pointer(Box<TypeExpr>),
    Array(Box<TypeExpr>, Option<u64>),
    FunctionPointer { ret: Box<TypeExpr>, params: Vec<TypeExpr> },
    Const(Box<TypeExpr>),
    /// Generic class instantiation, e.g. `Box<int>`
    Generic { name: String, args: Vec<TypeExpr> },
}

impl TypeExpr {
    pub fn pointer(inner: TypeExpr) -> TypeExpr {
        TypeExpr::Pointer(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Named(name.into())
    }
}

// ==================== Operators ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Assign,
    AddAssign,
    SubAssign,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// Comparison and logical operators yield the environment boolean type
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Neq
                | Self::Lt
                | Self::Lte
                | Self::Gt
                | Self::Gte
                | Self::LogicalAnd
                | Self::LogicalOr
        )
    }

    pub fn c_symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Assign => "=",
            Self::AddAssign => "+=",
            Self::SubAssign => "-=",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
}

impl UnaryOp {
    pub fn is_increment(self) -> bool {
        matches!(self, Self::PreIncrement | Self::PreDecrement)
    }

    pub fn c_symbol(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Not => "!",
            Self::BitNot => "~",
            Self::PreIncrement => "++",
            Self::PreDecrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

impl PostfixOp {
    pub fn c_symbol(self) -> &'static str {
        match self {
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

// ==================== Expressions ====================

/// An expression node: syntax plus an analysis placeholder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub token: Token,
    #[serde(skip)]
    pub meta: NodeMeta,
}

impl Expr {
    pub fn new(kind: ExprKind, token: Token) -> Self {
        Self { kind, token, meta: NodeMeta::default() }
    }

    pub fn span(&self) -> Span {
        self.token.span
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Numeric or character literal; the image is classified during analysis
    Literal,
    /// String literal (image without quotes)
    StringLit,
    /// Variable reference; the name is the token image
    Identifier,
    /// The `super` reference inside a class body
    Super,
    Sizeof(TypeExpr),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Postfix { op: PostfixOp, operand: Box<Expr> },
    Dereference(Box<Expr>),
    AddressOf(Box<Expr>),
    Cast { target: TypeExpr, operand: Box<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    FieldAccess { object: Box<Expr>, field: String },
    MethodCall { object: Box<Expr>, method: String, args: Vec<Expr> },
    Ternary { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// `new T(...)`; the target type must denote a pointer to a class
    ConstructorCall { target: TypeExpr, args: Vec<Expr> },
    /// Explicit generic function instantiation, e.g. `swap<int>(a, b)`
    GenericCall { name: String, type_args: Vec<TypeExpr>, args: Vec<Expr> },
}

// ==================== Statements ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Declaration {
        name: String,
        ty: TypeExpr,
        init: Option<Expr>,
        token: Token,
    },
    Expression(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    While { cond: Expr, body: Box<Stmt> },
    Return { value: Option<Expr>, token: Token },
}

// ==================== Declarations ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

/// Free function or method definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub ret: TypeExpr,
    pub params: Vec<Param>,
    /// Absent for abstract methods and extern declarations
    pub body: Option<Stmt>,
    pub token: Token,
    #[serde(skip)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub visibility: Visibility,
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDecl {
    pub visibility: Visibility,
    pub is_virtual: bool,
    pub decl: FunctionDecl,
}

/// Which constructor a delegating constructor forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorKind {
    Super,
    This,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorCtor {
    pub kind: PriorKind,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtorDecl {
    pub visibility: Visibility,
    pub params: Vec<Param>,
    /// Delegation to a prior constructor, if any
    pub prior: Option<PriorCtor>,
    pub body: Option<Stmt>,
    pub token: Token,
    #[serde(skip)]
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDecl>,
    pub constructors: Vec<CtorDecl>,
    pub token: Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<(String, TypeExpr)>,
    pub token: Token,
}

/// An `implement` block: method bodies defined outside the class body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementDecl {
    /// Must resolve to a pointer-to-class type
    pub target: TypeExpr,
    pub methods: Vec<FunctionDecl>,
    pub token: Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericFunctionDecl {
    pub type_params: Vec<String>,
    pub decl: FunctionDecl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericClassDecl {
    pub type_params: Vec<String>,
    pub decl: ClassDecl,
}

/// Top-level items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(FunctionDecl),
    GenericFunction(GenericFunctionDecl),
    Class(ClassDecl),
    GenericClass(GenericClassDecl),
    Struct(StructDecl),
    Typedef { name: String, ty: TypeExpr, token: Token },
    Global(Stmt),
    Implement(ImplementDecl),
}

/// A complete program (compilation unit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}
