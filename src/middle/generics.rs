//! Generic registry: declaration and monomorphization of templates
//!
//! Each distinct (qualified name, type-parameter arity) pair registers one
//! template. Instantiating with concrete types substitutes the type
//! variables through the template's declared-type expressions and yields a
//! specialized declaration ready for normal analysis, plus the concrete
//! function-pointer type of the instance.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::frontend::ast::{
    ClassDecl, Expr, ExprKind, FunctionDecl, Stmt, TypeExpr,
};
use crate::types::{describe_types, Type, TypeEnvironment};
use crate::utils::{Error, Result};

/// A registered generic function template
#[derive(Debug, Clone)]
pub struct GenericFunction {
    pub decl: FunctionDecl,
    pub type_params: Vec<String>,
}

/// A registered generic class template
#[derive(Debug, Clone)]
pub struct GenericClass {
    pub decl: ClassDecl,
    pub type_params: Vec<String>,
}

/// A monomorphized, analyzed function instance awaiting lowering
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub decl: FunctionDecl,
}

#[derive(Default)]
pub struct GenericRegistry {
    functions: HashMap<(String, usize), GenericFunction>,
    classes: HashMap<(String, usize), GenericClass>,
    produced: HashSet<String>,
    instances: Vec<Instance>,
}

impl GenericRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Declaration ====================

    /// Register a generic function template. The signature must resolve
    /// under the template's own type variables.
    pub fn declare_function(
        &mut self,
        decl: FunctionDecl,
        type_params: Vec<String>,
        env: &TypeEnvironment,
    ) -> Result<()> {
        let key = (decl.name.clone(), type_params.len());
        if self.functions.contains_key(&key) {
            return Err(Error::GenericRedeclaration { name: key.0, arity: key.1 });
        }
        env.resolve_with_vars(&decl.ret, &type_params)?;
        for param in &decl.params {
            env.resolve_with_vars(&param.ty, &type_params)?;
        }
        self.functions.insert(key, GenericFunction { decl, type_params });
        Ok(())
    }

    pub fn declare_class(
        &mut self,
        decl: ClassDecl,
        type_params: Vec<String>,
    ) -> Result<()> {
        let key = (decl.name.clone(), type_params.len());
        if self.classes.contains_key(&key) {
            return Err(Error::GenericRedeclaration { name: key.0, arity: key.1 });
        }
        self.classes.insert(key, GenericClass { decl, type_params });
        Ok(())
    }

    // ==================== Instantiation ====================

    fn check_concrete(&self, name: &str, args: &[Type], env: &TypeEnvironment) -> Result<()> {
        let valid = args
            .iter()
            .all(|ty| !contains_type_var(ty) && ty.data_size(env).is_ok());
        if !valid {
            return Err(Error::IllegalParameterTypes {
                found: format!("{}<{}>", name, describe_types(args, env)),
                span: None,
            });
        }
        Ok(())
    }

    /// Monomorphize a generic function for a concrete argument-type list.
    /// Returns the concrete function-pointer type, plus the specialized
    /// declaration the first time this instance is produced.
    pub fn instantiate(
        &mut self,
        name: &str,
        type_args: &[Type],
        env: &TypeEnvironment,
    ) -> Result<(String, Type, Option<FunctionDecl>)> {
        let key = (name.to_string(), type_args.len());
        let Some(template) = self.functions.get(&key) else {
            let expected = self
                .functions
                .keys()
                .find(|(n, _)| n == name)
                .map(|(_, arity)| *arity);
            return Err(Error::IncorrectParameterTypeCount {
                found: type_args.len(),
                expected,
                span: None,
            });
        };
        self.check_concrete(name, type_args, env)?;

        let substitution = build_substitution(&template.type_params, type_args, env);
        let mangled = mangle(name, type_args, env);
        let mut specialized = template.decl.clone();
        specialized.name = mangled.clone();
        subst_function(&mut specialized, &substitution);

        let fn_type = Type::FunctionPointer {
            ret: Box::new(env.resolve(&specialized.ret)?),
            params: specialized
                .params
                .iter()
                .map(|p| env.resolve(&p.ty))
                .collect::<Result<Vec<_>>>()?,
        };

        if self.produced.contains(&mangled) {
            return Ok((mangled, fn_type, None));
        }
        debug!("monomorphizing {} as {}", name, mangled);
        self.produced.insert(mangled.clone());
        Ok((mangled, fn_type, Some(specialized)))
    }

    /// Monomorphize a generic class for a concrete argument-type list. The
    /// caller registers and analyzes the returned declaration like any
    /// other class.
    pub fn instantiate_class(
        &mut self,
        name: &str,
        type_args: &[Type],
        env: &TypeEnvironment,
    ) -> Result<(String, Option<ClassDecl>)> {
        let key = (name.to_string(), type_args.len());
        let Some(template) = self.classes.get(&key) else {
            let expected = self
                .classes
                .keys()
                .find(|(n, _)| n == name)
                .map(|(_, arity)| *arity);
            return Err(Error::IncorrectParameterTypeCount {
                found: type_args.len(),
                expected,
                span: None,
            });
        };
        self.check_concrete(name, type_args, env)?;

        let substitution = build_substitution(&template.type_params, type_args, env);
        let mangled = mangle(name, type_args, env);
        if self.produced.contains(&mangled) {
            return Ok((mangled, None));
        }
        self.produced.insert(mangled.clone());

        let mut specialized = template.decl.clone();
        specialized.name = mangled.clone();
        for field in &mut specialized.fields {
            subst_type_expr(&mut field.ty, &substitution);
        }
        for method in &mut specialized.methods {
            subst_function(&mut method.decl, &substitution);
        }
        for ctor in &mut specialized.constructors {
            for param in &mut ctor.params {
                subst_type_expr(&mut param.ty, &substitution);
            }
            if let Some(body) = &mut ctor.body {
                subst_stmt(body, &substitution);
            }
        }
        Ok((mangled, Some(specialized)))
    }

    /// Record an analyzed instance for lowering
    pub fn record_instance(&mut self, name: String, decl: FunctionDecl) {
        self.instances.push(Instance { name, decl });
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }
}

// ==================== Substitution ====================

fn build_substitution(
    params: &[String],
    args: &[Type],
    env: &TypeEnvironment,
) -> HashMap<String, TypeExpr> {
    params
        .iter()
        .cloned()
        .zip(args.iter().map(|ty| type_to_expr(ty, env)))
        .collect()
}

fn contains_type_var(ty: &Type) -> bool {
    match ty {
        Type::GenericParam(_) => true,
        Type::Pointer(inner) | Type::Const(inner) => contains_type_var(inner),
        Type::Array { elem, .. } => contains_type_var(elem),
        Type::FunctionPointer { ret, params } => {
            contains_type_var(ret) || params.iter().any(contains_type_var)
        }
        _ => false,
    }
}

/// Render a concrete type back into a declared-type expression
fn type_to_expr(ty: &Type, env: &TypeEnvironment) -> TypeExpr {
    match ty {
        Type::Primitive(p) => TypeExpr::Named(p.c_name().to_string()),
        Type::Pointer(inner) => TypeExpr::pointer(type_to_expr(inner, env)),
        Type::Array { elem, extent } => {
            TypeExpr::Array(Box::new(type_to_expr(elem, env)), *extent)
        }
        Type::FunctionPointer { ret, params } => TypeExpr::FunctionPointer {
            ret: Box::new(type_to_expr(ret, env)),
            params: params.iter().map(|p| type_to_expr(p, env)).collect(),
        },
        Type::Const(inner) => TypeExpr::Const(Box::new(type_to_expr(inner, env))),
        Type::Named(name) | Type::GenericParam(name) => TypeExpr::Named(name.clone()),
        Type::Struct(id) => TypeExpr::Named(env.struct_def(*id).name.clone()),
        Type::Class(id) => TypeExpr::Named(env.class(*id).name.clone()),
    }
}

/// Mangle an instance name from the concrete types, keeping it a C identifier
pub(crate) fn mangle(name: &str, args: &[Type], env: &TypeEnvironment) -> String {
    let mut out = String::from(name);
    for arg in args {
        out.push_str("__");
        out.extend(
            arg.c_type(env)
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' }),
        );
    }
    out
}

fn subst_type_expr(expr: &mut TypeExpr, map: &HashMap<String, TypeExpr>) {
    match expr {
        TypeExpr::Named(name) => {
            if let Some(replacement) = map.get(name) {
                *expr = replacement.clone();
            }
        }
        TypeExpr::Pointer(inner) | TypeExpr::Const(inner) => subst_type_expr(inner, map),
        TypeExpr::Array(elem, _) => subst_type_expr(elem, map),
        TypeExpr::FunctionPointer { ret, params } => {
            subst_type_expr(ret, map);
            for p in params {
                subst_type_expr(p, map);
            }
        }
        TypeExpr::Generic { args, .. } => {
            for a in args {
                subst_type_expr(a, map);
            }
        }
    }
}

fn subst_function(decl: &mut FunctionDecl, map: &HashMap<String, TypeExpr>) {
    subst_type_expr(&mut decl.ret, map);
    for param in &mut decl.params {
        subst_type_expr(&mut param.ty, map);
    }
    if let Some(body) = &mut decl.body {
        subst_stmt(body, map);
    }
}

fn subst_stmt(stmt: &mut Stmt, map: &HashMap<String, TypeExpr>) {
    match stmt {
        Stmt::Declaration { ty, init, .. } => {
            subst_type_expr(ty, map);
            if let Some(init) = init {
                subst_expr(init, map);
            }
        }
        Stmt::Expression(expr) => subst_expr(expr, map),
        Stmt::Block(stmts) => stmts.iter_mut().for_each(|s| subst_stmt(s, map)),
        Stmt::If { cond, then_body, else_body } => {
            subst_expr(cond, map);
            subst_stmt(then_body, map);
            if let Some(else_body) = else_body {
                subst_stmt(else_body, map);
            }
        }
        Stmt::While { cond, body } => {
            subst_expr(cond, map);
            subst_stmt(body, map);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                subst_expr(value, map);
            }
        }
    }
}

fn subst_expr(expr: &mut Expr, map: &HashMap<String, TypeExpr>) {
    match &mut expr.kind {
        ExprKind::Sizeof(ty) => subst_type_expr(ty, map),
        ExprKind::Binary { lhs, rhs, .. } => {
            subst_expr(lhs, map);
            subst_expr(rhs, map);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Postfix { operand, .. } => {
            subst_expr(operand, map);
        }
        ExprKind::Dereference(inner) | ExprKind::AddressOf(inner) => subst_expr(inner, map),
        ExprKind::Cast { target, operand } => {
            subst_type_expr(target, map);
            subst_expr(operand, map);
        }
        ExprKind::Index { base, index } => {
            subst_expr(base, map);
            subst_expr(index, map);
        }
        ExprKind::Call { callee, args } => {
            subst_expr(callee, map);
            args.iter_mut().for_each(|a| subst_expr(a, map));
        }
        ExprKind::FieldAccess { object, .. } => subst_expr(object, map),
        ExprKind::MethodCall { object, args, .. } => {
            subst_expr(object, map);
            args.iter_mut().for_each(|a| subst_expr(a, map));
        }
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            subst_expr(cond, map);
            subst_expr(then_expr, map);
            subst_expr(else_expr, map);
        }
        ExprKind::ConstructorCall { target, args } => {
            subst_type_expr(target, map);
            args.iter_mut().for_each(|a| subst_expr(a, map));
        }
        ExprKind::GenericCall { type_args, args, .. } => {
            type_args.iter_mut().for_each(|t| subst_type_expr(t, map));
            args.iter_mut().for_each(|a| subst_expr(a, map));
        }
        ExprKind::Literal
        | ExprKind::StringLit
        | ExprKind::Identifier
        | ExprKind::Super => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Param;
    use crate::frontend::token::Token;
    use crate::middle::tree::NodeMeta;
    use pretty_assertions::assert_eq;

    fn swap_template() -> FunctionDecl {
        FunctionDecl {
            name: "swap".to_string(),
            ret: TypeExpr::named("void"),
            params: vec![
                Param { name: "a".to_string(), ty: TypeExpr::pointer(TypeExpr::named("T")) },
                Param { name: "b".to_string(), ty: TypeExpr::pointer(TypeExpr::named("T")) },
            ],
            body: Some(Stmt::Block(vec![])),
            token: Token::synthetic("swap"),
            meta: NodeMeta::default(),
        }
    }

    #[test]
    fn test_generic_redeclaration_fails() {
        let env = TypeEnvironment::new();
        let mut registry = GenericRegistry::new();
        registry
            .declare_function(swap_template(), vec!["T".to_string()], &env)
            .unwrap();
        assert!(matches!(
            registry.declare_function(swap_template(), vec!["U".to_string()], &env),
            Err(Error::GenericRedeclaration { .. })
        ));
    }

    #[test]
    fn test_wrong_arity_always_fails() {
        let env = TypeEnvironment::new();
        let mut registry = GenericRegistry::new();
        registry
            .declare_function(swap_template(), vec!["T".to_string()], &env)
            .unwrap();
        for args in [vec![], vec![Type::INT, Type::LONG]] {
            assert!(matches!(
                registry.instantiate("swap", &args, &env),
                Err(Error::IncorrectParameterTypeCount { .. })
            ));
        }
    }

    #[test]
    fn test_instantiation_substitutes_and_mangles() {
        let env = TypeEnvironment::new();
        let mut registry = GenericRegistry::new();
        registry
            .declare_function(swap_template(), vec!["T".to_string()], &env)
            .unwrap();
        let (name, fn_type, decl) = registry.instantiate("swap", &[Type::INT], &env).unwrap();
        assert_eq!(name, "swap__int");
        let decl = decl.unwrap();
        assert_eq!(decl.params[0].ty, TypeExpr::pointer(TypeExpr::named("int")));
        assert_eq!(
            fn_type,
            Type::FunctionPointer {
                ret: Box::new(Type::VOID),
                params: vec![Type::pointer(Type::INT), Type::pointer(Type::INT)],
            }
        );
        // the same instance is only produced once
        let (_, _, again) = registry.instantiate("swap", &[Type::INT], &env).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_non_concrete_types_are_illegal() {
        let env = TypeEnvironment::new();
        let mut registry = GenericRegistry::new();
        registry
            .declare_function(swap_template(), vec!["T".to_string()], &env)
            .unwrap();
        assert!(matches!(
            registry.instantiate("swap", &[Type::GenericParam("U".to_string())], &env),
            Err(Error::IllegalParameterTypes { .. })
        ));
        assert!(matches!(
            registry.instantiate("swap", &[Type::VOID], &env),
            Err(Error::IllegalParameterTypes { .. })
        ));
    }
}
