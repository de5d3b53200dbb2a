//! Expression type analysis
//!
//! A recursive bottom-up pass: every expression node gets a resolved type,
//! an lvalue flag, and the compilation tags lowering depends on. Analysis
//! is fail-fast; the node where it stops is marked as the failure point.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::frontend::ast::{Expr, ExprKind, TypeExpr, UnaryOp};
use crate::middle::check::{resolve_declared, FunctionAnalyzer};
use crate::middle::scope::ScopeTracker;
use crate::middle::tree::Tag;
use crate::middle::CompilationContext;
use crate::types::{describe_types, CompoundRef, MethodSlot, Primitive, Type};
use crate::utils::{Error, Result};

/// The resolved type of an analyzed node
pub fn typed(expr: &Expr) -> Result<Type> {
    expr.meta.ty().cloned().ok_or_else(|| Error::InvalidType {
        name: "untyped expression".to_string(),
        span: Some(expr.span()),
    })
}

pub struct ExpressionAnalyzer<'a> {
    ctx: &'a mut CompilationContext,
    scope: Rc<RefCell<ScopeTracker>>,
}

impl<'a> ExpressionAnalyzer<'a> {
    pub fn new(ctx: &'a mut CompilationContext, scope: Rc<RefCell<ScopeTracker>>) -> Self {
        Self { ctx, scope }
    }

    /// Resolve a declared-type expression, instantiating generic classes on
    /// demand
    pub fn resolve_type(&mut self, expr: &TypeExpr) -> Result<Type> {
        resolve_declared(self.ctx, &self.scope, expr)
    }

    fn analyze_child(&mut self, child: &mut Expr) -> Result<()> {
        self.analyze(child).map_err(|e| {
            child.meta.set_failure_point();
            e
        })
    }

    pub fn analyze(&mut self, node: &mut Expr) -> Result<()> {
        if node.meta.is_typed() {
            return Ok(());
        }
        let span = node.span();
        match &mut node.kind {
            // ==================== Leaves ====================
            ExprKind::Literal => {
                let image = node.token.image.clone();
                let ty = if is_float_literal(&image) {
                    Type::DOUBLE
                } else if is_integer_literal(&image) {
                    Type::LONG
                } else if is_char_literal(&image) {
                    Type::CHAR
                } else {
                    node.meta.set_failure_point();
                    return Err(Error::IllegalTypesForOperation {
                        op: "literal".to_string(),
                        types: image,
                        span: Some(span),
                    });
                };
                node.meta.set_type(ty);
            }
            ExprKind::StringLit => {
                node.meta.set_type(Type::pointer(Type::CHAR));
            }
            ExprKind::Identifier => {
                let name = node.token.image.clone();
                let ty = {
                    let scope = self.scope.borrow();
                    if !scope.variable_exists(&name) {
                        return Err(Error::IdentifierDoesNotExist {
                            name,
                            span: Some(span),
                        });
                    }
                    scope.lookup(&name)
                };
                let ty = ty.ok_or(Error::IdentifierDoesNotExist {
                    name: name.clone(),
                    span: Some(span),
                })?;
                let ty = ty.unwrap_alias(&self.ctx.env).clone();
                node.meta.set_type(ty);
                node.meta.set_lvalue(true);
            }
            ExprKind::Super => {
                let ty = self.scope.borrow().lookup("super").ok_or(
                    Error::IdentifierDoesNotExist {
                        name: "super".to_string(),
                        span: Some(span),
                    },
                )?;
                node.meta.set_type(ty);
            }
            ExprKind::Sizeof(target) => {
                let target = target.clone();
                self.resolve_type(&target)?;
                node.meta.set_type(Type::UNSIGNED_LONG);
            }

            // ==================== Operators ====================
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.analyze_child(lhs)?;
                self.analyze_child(rhs)?;
                let lt = typed(lhs)?;
                let rt = typed(rhs)?;
                let env = &self.ctx.env;
                if !lt.is_primitive(env) || !rt.is_primitive(env) {
                    return Err(Error::IllegalTypesForOperation {
                        op: op.c_symbol().to_string(),
                        types: describe_types(&[lt, rt], env),
                        span: Some(span),
                    });
                }
                if op.is_comparison() {
                    node.meta.set_type(env.boolean_type());
                    node.meta.set_lvalue(false);
                } else {
                    // pointer arithmetic wins; otherwise a floating operand
                    // dominates an integral one, left side on tie
                    let result = if rt.is_pointer(env) {
                        rt.clone()
                    } else if !lt.is_pointer(env) && is_floating(&rt, env) && !is_floating(&lt, env)
                    {
                        rt.clone()
                    } else {
                        lt.clone()
                    };
                    node.meta
                        .set_lvalue(lt.is_pointer_or_array(env) || rt.is_pointer_or_array(env));
                    node.meta.set_type(result.strip_const());
                }
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                self.analyze_child(operand)?;
                let ty = typed(operand)?;
                let env = &self.ctx.env;
                if !ty.is_primitive(env) {
                    return Err(Error::IllegalTypesForOperation {
                        op: op.c_symbol().to_string(),
                        types: ty.describe(env),
                        span: Some(span),
                    });
                }
                let result = if op.is_increment() {
                    if !ty.supports_increment(env) {
                        return Err(Error::IllegalTypesForOperation {
                            op: op.c_symbol().to_string(),
                            types: ty.describe(env),
                            span: Some(span),
                        });
                    }
                    ty.clone()
                } else if op == UnaryOp::Not {
                    Type::INT
                } else {
                    ty.clone()
                };
                node.meta.set_type(result);
                let lvalue = operand.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }
            ExprKind::Postfix { op, operand } => {
                let op = *op;
                self.analyze_child(operand)?;
                let ty = typed(operand)?;
                let env = &self.ctx.env;
                if !ty.is_primitive(env) || !ty.supports_increment(env) {
                    return Err(Error::IllegalTypesForOperation {
                        op: op.c_symbol().to_string(),
                        types: ty.describe(env),
                        span: Some(span),
                    });
                }
                node.meta.set_type(ty);
                let lvalue = operand.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }

            // ==================== Pointers ====================
            ExprKind::Dereference(operand) => {
                self.analyze_child(operand)?;
                let ty = typed(operand)?;
                let env = &self.ctx.env;
                let Type::Pointer(pointee) = ty.unwrap_all(env).clone() else {
                    return Err(Error::IllegalTypesForOperation {
                        op: "*".to_string(),
                        types: ty.describe(env),
                        span: Some(span),
                    });
                };
                if matches!(pointee.unwrap_all(env), Type::Primitive(Primitive::Void)) {
                    return Err(Error::VoidDereference { span: Some(span) });
                }
                if matches!(operand.kind, ExprKind::ConstructorCall { .. }) {
                    node.meta.add_tag(Tag::NewObjectDereference);
                }
                // named pointees resolve through the environment's table
                let pointee = pointee.unwrap_alias(env).clone();
                node.meta.set_type(pointee);
                let lvalue = operand.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }
            ExprKind::AddressOf(operand) => {
                self.analyze_child(operand)?;
                if !operand.meta.is_lvalue() {
                    return Err(Error::IllegalLValue { span: Some(span) });
                }
                node.meta.set_type(Type::pointer(typed(operand)?));
                node.meta.set_lvalue(true);
            }
            ExprKind::Cast { target, operand } => {
                let target = target.clone();
                let target_ty = self.resolve_type(&target)?;
                self.analyze_child(operand)?;
                let from = typed(operand)?;
                let env = &self.ctx.env;
                if !target_ty.is_assignable_from(&from, env)
                    && !from.is_assignable_from(&target_ty, env)
                {
                    return Err(Error::IllegalCast {
                        from: from.describe(env),
                        to: target_ty.describe(env),
                        span: Some(span),
                    });
                }
                node.meta.set_type(target_ty);
                let lvalue = operand.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }
            ExprKind::Index { base, index } => {
                self.analyze_child(base)?;
                self.analyze_child(index)?;
                let bt = typed(base)?;
                let it = typed(index)?;
                let env = &self.ctx.env;
                let mut is_const = false;
                let source = match bt.unwrap_alias(env).clone() {
                    Type::Const(inner) => {
                        is_const = true;
                        inner.unwrap_alias(env).clone()
                    }
                    other => other,
                };
                let indexable = (source.is_primitive(env) && it.is_primitive(env))
                    || source.is_pointer(env);
                if !indexable {
                    return Err(Error::IllegalTypesForOperation {
                        op: "[]".to_string(),
                        types: describe_types(&[bt, it], env),
                        span: Some(span),
                    });
                }
                let next = match source {
                    Type::Array { elem, .. } => *elem,
                    Type::Pointer(pointee) => *pointee,
                    other => {
                        return Err(Error::IllegalTypesForOperation {
                            op: "[]".to_string(),
                            types: other.describe(env),
                            span: Some(span),
                        })
                    }
                };
                let next = if is_const { Type::Const(Box::new(next)) } else { next };
                node.meta.set_type(next);
                let lvalue = base.meta.is_lvalue() || index.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }

            // ==================== Calls ====================
            ExprKind::Call { callee, args } => {
                self.analyze_child(callee)?;
                for arg in args.iter_mut() {
                    self.analyze_child(arg)?;
                }
                let ct = typed(callee)?;
                let env = &self.ctx.env;
                let Type::FunctionPointer { ret, .. } = ct.unwrap_all(env).clone() else {
                    return Err(Error::IllegalTypesForOperation {
                        op: "call".to_string(),
                        types: ct.describe(env),
                        span: Some(span),
                    });
                };
                node.meta.set_type(*ret);
                node.meta.set_lvalue(false);
            }
            ExprKind::GenericCall { name, type_args, args } => {
                let name = name.clone();
                let type_args = type_args.clone();
                for arg in args.iter_mut() {
                    self.analyze_child(arg)?;
                }
                let concrete = type_args
                    .iter()
                    .map(|t| self.resolve_type(t))
                    .collect::<Result<Vec<_>>>()?;
                let ctx = &mut *self.ctx;
                let (mangled, fn_type, fresh) =
                    ctx.generics.instantiate(&name, &concrete, &ctx.env)?;
                if let Some(mut decl) = fresh {
                    let scope = Rc::new(RefCell::new(self.scope.borrow().child()));
                    FunctionAnalyzer::new(self.ctx, scope).analyze(&mut decl)?;
                    self.ctx.generics.record_instance(mangled.clone(), decl);
                }
                let Type::FunctionPointer { ret, .. } = &fn_type else {
                    return Err(Error::InvalidType {
                        name: mangled,
                        span: Some(span),
                    });
                };
                node.meta.set_type((**ret).clone());
                node.meta.set_lvalue(false);
                node.meta.add_tag(Tag::GenericInstance { name: mangled });
            }

            // ==================== Members ====================
            ExprKind::FieldAccess { object, field } => {
                let field = field.clone();
                self.analyze_child(object)?;
                let ot = typed(object)?;
                let env = &self.ctx.env;
                let compound = match ot.unwrap_all(env) {
                    Type::Struct(id) => CompoundRef::Struct(*id),
                    Type::Class(id) => CompoundRef::Class(*id),
                    _ => {
                        return Err(Error::IllegalAccess {
                            owner: ot.describe(env),
                            name: field,
                            signature: String::new(),
                            span: Some(span),
                        })
                    }
                };
                if matches!(object.kind, ExprKind::Dereference(_)) {
                    node.meta.add_tag(Tag::IndirectFieldAccess);
                }
                let scope = self.scope.borrow();
                let resolved = match compound {
                    CompoundRef::Class(id) => scope.class_field_type(id, &field, env),
                    CompoundRef::Struct(_) => scope.field_type(compound, &field, env),
                };
                let Some(ty) = resolved else {
                    return Err(Error::IllegalAccess {
                        owner: ot.describe(env),
                        name: field,
                        signature: String::new(),
                        span: Some(span),
                    });
                };
                drop(scope);
                node.meta.set_type(ty);
                let lvalue = object.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }
            ExprKind::MethodCall { object, method, args } => {
                let method = method.clone();
                self.analyze_child(object)?;
                let mut is_super_call = false;
                if let ExprKind::Dereference(inner) = &object.kind {
                    node.meta.add_tag(Tag::IndirectMethodCall);
                    if matches!(inner.kind, ExprKind::Super) {
                        is_super_call = true;
                    }
                }
                for arg in args.iter_mut() {
                    self.analyze_child(arg)?;
                }
                let arg_tys = args.iter().map(typed).collect::<Result<Vec<_>>>()?;
                let ot = typed(object)?;
                let env = &self.ctx.env;

                // a field holding a callable degrades to a direct invocation
                if let Type::FunctionPointer { ret, params } = ot.unwrap_all(env) {
                    if params.len() != arg_tys.len()
                        || !params.iter().zip(&arg_tys).all(|(p, a)| p.is_exact(a, env))
                    {
                        return Err(Error::IncorrectType {
                            expected: describe_types(params, env),
                            got: describe_types(&arg_tys, env),
                            span: Some(span),
                        });
                    }
                    node.meta.set_type((**ret).clone());
                    node.meta.set_lvalue(false);
                    return Ok(());
                }

                let class = match ot.unwrap_all(env) {
                    Type::Class(id) => Some(*id),
                    _ => None,
                };
                let resolution = class.and_then(|id| {
                    let visible = self
                        .scope
                        .borrow()
                        .class_method_type(id, &method, env)
                        .is_some();
                    if visible {
                        env.resolve_method(id, &method, &arg_tys)
                    } else {
                        None
                    }
                });
                match resolution {
                    Some((owner, slot)) => {
                        let sig = env.method_sig(owner, slot);
                        node.meta.set_type(sig.ret.clone());
                        node.meta.set_lvalue(false);
                        if is_super_call {
                            node.meta.add_tag(Tag::SuperCall { class: owner, slot });
                        } else {
                            if matches!(slot, MethodSlot::Virtual(_)) {
                                node.meta.add_tag(Tag::VirtualCall);
                            }
                            node.meta.add_tag(Tag::MethodBinding { class: owner, slot });
                        }
                    }
                    None => {
                        // fall back to a function-pointer field of that name
                        let compound = match ot.unwrap_all(env) {
                            Type::Struct(id) => Some(CompoundRef::Struct(*id)),
                            Type::Class(id) => Some(CompoundRef::Class(*id)),
                            _ => None,
                        };
                        let field_ty = compound.and_then(|owner| {
                            let scope = self.scope.borrow();
                            match owner {
                                CompoundRef::Class(id) => {
                                    scope.class_field_type(id, &method, env)
                                }
                                CompoundRef::Struct(_) => scope.field_type(owner, &method, env),
                            }
                        });
                        if let Some(field_ty) = field_ty {
                            if let Type::FunctionPointer { ret, .. } = field_ty.unwrap_all(env) {
                                node.meta.add_tag(Tag::CompileAsFieldAccess);
                                node.meta.set_type((**ret).clone());
                                node.meta.set_lvalue(false);
                                return Ok(());
                            }
                        }
                        debug!("no method {} visible on {}", method, ot.describe(env));
                        return Err(Error::IllegalAccess {
                            owner: ot.describe(env),
                            name: method,
                            signature: format!("({})", describe_types(&arg_tys, env)),
                            span: Some(span),
                        });
                    }
                }
            }

            // ==================== Control ====================
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                self.analyze_child(cond)?;
                self.analyze_child(then_expr)?;
                self.analyze_child(else_expr)?;
                let ct = typed(cond)?;
                let lt = typed(then_expr)?;
                let rt = typed(else_expr)?;
                let env = &self.ctx.env;
                if !ct.is_primitive(env) {
                    return Err(Error::IllegalTypesForOperation {
                        op: "?:".to_string(),
                        types: ct.describe(env),
                        span: Some(span),
                    });
                }
                let left_general = lt.is_assignable_from(&rt, env);
                let right_general = rt.is_assignable_from(&lt, env);
                let result = if left_general {
                    lt.clone()
                } else if right_general {
                    rt.clone()
                } else {
                    return Err(Error::IncorrectType {
                        expected: lt.describe(env),
                        got: rt.describe(env),
                        span: Some(span),
                    });
                };
                node.meta.set_type(result);
                let lvalue = then_expr.meta.is_lvalue() && else_expr.meta.is_lvalue();
                node.meta.set_lvalue(lvalue);
            }
            ExprKind::ConstructorCall { target, args } => {
                let target = target.clone();
                let declared = self.resolve_type(&target)?;
                for arg in args.iter_mut() {
                    self.analyze_child(arg)?;
                }
                let arg_tys = args.iter().map(typed).collect::<Result<Vec<_>>>()?;
                let env = &self.ctx.env;
                let class = match declared.unwrap_all(env) {
                    Type::Pointer(pointee) => match pointee.unwrap_all(env) {
                        Type::Class(id) => Some(*id),
                        _ => None,
                    },
                    _ => None,
                };
                let Some(class) = class else {
                    return Err(Error::IllegalTypesForOperation {
                        op: "new".to_string(),
                        types: declared.describe(env),
                        span: Some(span),
                    });
                };
                let Some(ctor) = env.resolve_constructor(class, &arg_tys) else {
                    return Err(Error::NoConstructor {
                        class: env.class(class).name.clone(),
                        signature: describe_types(&arg_tys, env),
                        span: Some(span),
                    });
                };
                node.meta.add_tag(Tag::ConstructorCall { class, ctor });
                node.meta.set_type(Type::pointer(Type::Class(class)));
                node.meta.set_lvalue(false);
            }
        }
        Ok(())
    }
}

fn is_floating(ty: &Type, env: &crate::types::TypeEnvironment) -> bool {
    matches!(ty.unwrap_all(env), Type::Primitive(p) if p.is_float())
}

// ==================== Literal classification ====================

fn is_integer_literal(s: &str) -> bool {
    if let Some(hex) = s.strip_prefix("0x") {
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else if let Some(bin) = s.strip_prefix("0b") {
        !bin.is_empty() && bin.chars().all(|c| c == '0' || c == '1')
    } else {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    }
}

fn is_float_literal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let Some(dot) = s.find('.') else { return false };
    let (whole, frac) = (&s[..dot], &s[dot + 1..]);
    (!whole.is_empty() || !frac.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit())
}

fn is_char_literal(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    matches!(chars.as_slice(), ['\'', c, '\''] if *c != '\\')
        || matches!(chars.as_slice(), ['\'', '\\', _, '\''])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::BinaryOp;
    use crate::frontend::token::Token;
    use crate::types::TypeEnvironment;
    use pretty_assertions::assert_eq;

    fn ctx() -> CompilationContext {
        CompilationContext::new(TypeEnvironment::new())
    }

    fn expr(kind: ExprKind, image: &str) -> Expr {
        Expr::new(kind, Token::synthetic(image))
    }

    fn lit(image: &str) -> Expr {
        expr(ExprKind::Literal, image)
    }

    fn analyze_in(ctx: &mut CompilationContext, scope: Rc<RefCell<ScopeTracker>>, node: &mut Expr) -> Result<()> {
        ExpressionAnalyzer::new(ctx, scope).analyze(node)
    }

    fn analyze(node: &mut Expr) -> Result<()> {
        let mut ctx = ctx();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        analyze_in(&mut ctx, scope, node)
    }

    #[test]
    fn test_literal_classification() {
        let mut int = lit("42");
        analyze(&mut int).unwrap();
        assert_eq!(int.meta.ty(), Some(&Type::LONG));

        let mut float = lit("2.5");
        analyze(&mut float).unwrap();
        assert_eq!(float.meta.ty(), Some(&Type::DOUBLE));

        let mut ch = lit("'a'");
        analyze(&mut ch).unwrap();
        assert_eq!(ch.meta.ty(), Some(&Type::CHAR));

        let mut bad = lit("@#!");
        assert!(analyze(&mut bad).is_err());
        assert!(bad.meta.is_failure_point());
    }

    #[test]
    fn test_string_literal_is_char_pointer() {
        let mut s = expr(ExprKind::StringLit, "abc");
        analyze(&mut s).unwrap();
        assert_eq!(s.meta.ty(), Some(&Type::pointer(Type::CHAR)));
    }

    #[test]
    fn test_float_dominates_in_addition() {
        // 1 + 2.5 resolves to double and is not an lvalue
        let mut sum = expr(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(lit("1")),
                rhs: Box::new(lit("2.5")),
            },
            "+",
        );
        analyze(&mut sum).unwrap();
        assert_eq!(sum.meta.ty(), Some(&Type::DOUBLE));
        assert!(!sum.meta.is_lvalue());
    }

    #[test]
    fn test_pointer_arithmetic_takes_precedence() {
        let mut ctx = ctx();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        scope
            .borrow_mut()
            .declare_variable("p", Type::pointer(Type::CHAR), false)
            .unwrap();
        let mut sum = expr(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(lit("1")),
                rhs: Box::new(expr(ExprKind::Identifier, "p")),
            },
            "+",
        );
        analyze_in(&mut ctx, scope, &mut sum).unwrap();
        assert_eq!(sum.meta.ty(), Some(&Type::pointer(Type::CHAR)));
        assert!(sum.meta.is_lvalue());
    }

    #[test]
    fn test_comparison_yields_environment_boolean() {
        let mut cmp = expr(
            ExprKind::Binary {
                op: BinaryOp::Lt,
                lhs: Box::new(lit("1")),
                rhs: Box::new(lit("2")),
            },
            "<",
        );
        let mut context = ctx();
        context.env.define_standard_boolean();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        analyze_in(&mut context, scope, &mut cmp).unwrap();
        assert_eq!(cmp.meta.ty(), Some(&Type::Named("boolean".to_string())));
    }

    #[test]
    fn test_undeclared_identifier_fails() {
        let mut id = expr(ExprKind::Identifier, "ghost");
        assert!(matches!(
            analyze(&mut id),
            Err(Error::IdentifierDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_void_dereference_is_distinct_error() {
        let mut ctx = ctx();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        scope
            .borrow_mut()
            .declare_variable("p", Type::pointer(Type::VOID), false)
            .unwrap();
        let mut deref = expr(
            ExprKind::Dereference(Box::new(expr(ExprKind::Identifier, "p"))),
            "*",
        );
        assert!(matches!(
            analyze_in(&mut ctx, scope, &mut deref),
            Err(Error::VoidDereference { .. })
        ));
    }

    #[test]
    fn test_address_of_requires_lvalue() {
        let mut addr = expr(ExprKind::AddressOf(Box::new(lit("3"))), "&");
        assert!(matches!(analyze(&mut addr), Err(Error::IllegalLValue { .. })));

        let mut ctx = ctx();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        scope
            .borrow_mut()
            .declare_variable("x", Type::INT, false)
            .unwrap();
        let mut addr = expr(
            ExprKind::AddressOf(Box::new(expr(ExprKind::Identifier, "x"))),
            "&",
        );
        analyze_in(&mut ctx, scope, &mut addr).unwrap();
        assert_eq!(addr.meta.ty(), Some(&Type::pointer(Type::INT)));
        assert!(addr.meta.is_lvalue());
    }

    #[test]
    fn test_call_requires_function_pointer() {
        let mut ctx = ctx();
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        scope
            .borrow_mut()
            .declare_variable(
                "f",
                Type::FunctionPointer {
                    ret: Box::new(Type::INT),
                    params: vec![Type::LONG],
                },
                false,
            )
            .unwrap();
        let mut call = expr(
            ExprKind::Call {
                callee: Box::new(expr(ExprKind::Identifier, "f")),
                args: vec![lit("1")],
            },
            "f",
        );
        analyze_in(&mut ctx, Rc::clone(&scope), &mut call).unwrap();
        assert_eq!(call.meta.ty(), Some(&Type::INT));
        assert!(!call.meta.is_lvalue());

        let mut bad = expr(
            ExprKind::Call { callee: Box::new(lit("1")), args: vec![] },
            "1",
        );
        assert!(analyze_in(&mut ctx, scope, &mut bad).is_err());
    }

    #[test]
    fn test_ternary_picks_more_general_branch() {
        let mut tern = expr(
            ExprKind::Ternary {
                cond: Box::new(lit("1")),
                then_expr: Box::new(lit("2")),
                else_expr: Box::new(lit("3.5")),
            },
            "?",
        );
        analyze(&mut tern).unwrap();
        // mutually assignable arithmetic branches: left takes precedence
        assert_eq!(tern.meta.ty(), Some(&Type::LONG));
        assert!(!tern.meta.is_lvalue());
    }
}
