//! Expression, statement, and function lowering
//!
//! Walks the type-checked, tag-annotated tree and renders C text. Every
//! dispatch decision was already made by analysis and recorded as a tag;
//! lowering only reads tags, it never re-resolves.

use crate::backend::c::emitter::Emitter;
use crate::frontend::ast::{Expr, ExprKind, FunctionDecl, Stmt, TypeExpr};
use crate::middle::expr::typed;
use crate::middle::generics::mangle;
use crate::middle::tree::Tag;
use crate::types::{Type, TypeEnvironment};
use crate::utils::{Error, Result};

/// Resolve a declared-type expression at lowering time; generic class
/// mentions map onto their monomorphized names
pub fn resolve_for_lowering(env: &TypeEnvironment, expr: &TypeExpr) -> Result<Type> {
    match expr {
        TypeExpr::Generic { name, args } => {
            let concrete = args
                .iter()
                .map(|a| resolve_for_lowering(env, a))
                .collect::<Result<Vec<_>>>()?;
            let mangled = mangle(name, &concrete, env);
            env.lookup_class(&mangled)
                .map(Type::Class)
                .ok_or(Error::ClassNotDefined { name: mangled })
        }
        TypeExpr::Pointer(inner) => Ok(Type::pointer(resolve_for_lowering(env, inner)?)),
        TypeExpr::Const(inner) => {
            Ok(Type::Const(Box::new(resolve_for_lowering(env, inner)?)))
        }
        TypeExpr::Array(elem, extent) => Ok(Type::Array {
            elem: Box::new(resolve_for_lowering(env, elem)?),
            extent: *extent,
        }),
        TypeExpr::FunctionPointer { ret, params } => Ok(Type::FunctionPointer {
            ret: Box::new(resolve_for_lowering(env, ret)?),
            params: params
                .iter()
                .map(|p| resolve_for_lowering(env, p))
                .collect::<Result<Vec<_>>>()?,
        }),
        TypeExpr::Named(_) => env.resolve(expr),
    }
}

// ==================== Expressions ====================

/// The pointer form of a method-call receiver: an explicit dereference
/// unwraps, anything else takes an address
fn object_pointer(env: &TypeEnvironment, object: &Expr) -> Result<String> {
    if let ExprKind::Dereference(inner) = &object.kind {
        expr_text(env, inner)
    } else {
        Ok(format!("(&{})", expr_text(env, object)?))
    }
}

pub(crate) fn args_text(env: &TypeEnvironment, args: &[Expr]) -> Result<String> {
    let parts = args
        .iter()
        .map(|a| expr_text(env, a))
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(", "))
}

pub fn expr_text(env: &TypeEnvironment, expr: &Expr) -> Result<String> {
    match &expr.kind {
        ExprKind::Literal => Ok(expr.token.image.clone()),
        ExprKind::StringLit => Ok(format!("\"{}\"", expr.token.image)),
        ExprKind::Identifier => Ok(expr.token.image.clone()),
        ExprKind::Super => {
            // `super` is `this` viewed as the superclass
            let ty = typed(expr)?;
            Ok(format!("(({}) this)", ty.c_type(env)))
        }
        ExprKind::Sizeof(target) => {
            let ty = resolve_for_lowering(env, target)?;
            Ok(format!("sizeof({})", ty.c_type(env)))
        }
        ExprKind::Binary { op, lhs, rhs } => Ok(format!(
            "({} {} {})",
            expr_text(env, lhs)?,
            op.c_symbol(),
            expr_text(env, rhs)?
        )),
        ExprKind::Unary { op, operand } => {
            Ok(format!("({}{})", op.c_symbol(), expr_text(env, operand)?))
        }
        ExprKind::Postfix { op, operand } => {
            Ok(format!("({}{})", expr_text(env, operand)?, op.c_symbol()))
        }
        ExprKind::Dereference(inner) => Ok(format!("(*{})", expr_text(env, inner)?)),
        ExprKind::AddressOf(inner) => Ok(format!("(&{})", expr_text(env, inner)?)),
        ExprKind::Cast { target, operand } => {
            let ty = resolve_for_lowering(env, target)?;
            Ok(format!("(({}) {})", ty.c_type(env), expr_text(env, operand)?))
        }
        ExprKind::Index { base, index } => Ok(format!(
            "{}[{}]",
            expr_text(env, base)?,
            expr_text(env, index)?
        )),
        ExprKind::Call { callee, args } => Ok(format!(
            "{}({})",
            expr_text(env, callee)?,
            args_text(env, args)?
        )),
        ExprKind::GenericCall { name, args, .. } => {
            let instance = match expr.meta.find_tag(|t| matches!(t, Tag::GenericInstance { .. }))
            {
                Some(Tag::GenericInstance { name }) => name.clone(),
                _ => name.clone(),
            };
            Ok(format!("{}({})", instance, args_text(env, args)?))
        }
        ExprKind::FieldAccess { object, field } => {
            if expr.meta.has_tag(&Tag::IndirectFieldAccess) {
                if let ExprKind::Dereference(inner) = &object.kind {
                    return Ok(format!("{}->{}", expr_text(env, inner)?, field));
                }
            }
            Ok(format!("{}.{}", expr_text(env, object)?, field))
        }
        ExprKind::MethodCall { object, method, args } => {
            method_call_text(env, expr, object, method, args)
        }
        ExprKind::Ternary { cond, then_expr, else_expr } => Ok(format!(
            "({} ? {} : {})",
            expr_text(env, cond)?,
            expr_text(env, then_expr)?,
            expr_text(env, else_expr)?
        )),
        ExprKind::ConstructorCall { args, .. } => {
            let Some(Tag::ConstructorCall { class, ctor }) =
                expr.meta.find_tag(|t| matches!(t, Tag::ConstructorCall { .. }))
            else {
                return Err(Error::InvalidType {
                    name: "unresolved constructor call".to_string(),
                    span: Some(expr.span()),
                });
            };
            let name = &env.class(*class).name;
            let mut call = format!(
                "{}_ctor{}(malloc(sizeof(struct {}))",
                name, ctor, name
            );
            if !args.is_empty() {
                call.push_str(", ");
                call.push_str(&args_text(env, args)?);
            }
            call.push(')');
            Ok(call)
        }
    }
}

fn method_call_text(
    env: &TypeEnvironment,
    node: &Expr,
    object: &Expr,
    method: &str,
    args: &[Expr],
) -> Result<String> {
    // a function-pointer field: plain member call
    if node.meta.has_tag(&Tag::CompileAsFieldAccess) {
        if node.meta.has_tag(&Tag::IndirectMethodCall) {
            if let ExprKind::Dereference(inner) = &object.kind {
                return Ok(format!(
                    "{}->{}({})",
                    expr_text(env, inner)?,
                    method,
                    args_text(env, args)?
                ));
            }
        }
        return Ok(format!(
            "{}.{}({})",
            expr_text(env, object)?,
            method,
            args_text(env, args)?
        ));
    }

    // statically bound super call
    if let Some(Tag::SuperCall { class, slot }) =
        node.meta.find_tag(|t| matches!(t, Tag::SuperCall { .. }))
    {
        let owner = &env.class(*class).name;
        let sig = env.method_sig(*class, *slot);
        let ptr = object_pointer(env, object)?;
        let mut call = format!("{}_{}((struct {} *) {}", owner, sig.name, owner, ptr);
        if !args.is_empty() {
            call.push_str(", ");
            call.push_str(&args_text(env, args)?);
        }
        call.push(')');
        return Ok(call);
    }

    let Some(Tag::MethodBinding { class, slot }) =
        node.meta.find_tag(|t| matches!(t, Tag::MethodBinding { .. }))
    else {
        // degraded direct invocation through a function-pointer object
        return Ok(format!(
            "{}.{}({})",
            expr_text(env, object)?,
            method,
            args_text(env, args)?
        ));
    };
    let ptr = object_pointer(env, object)?;

    // dynamic dispatch through the vtable
    if node.meta.has_tag(&Tag::VirtualCall) {
        let sig = env.method_sig(*class, *slot);
        let mut call = format!(
            "{}->{}->{}({}",
            ptr,
            env.vtable_field(),
            sig.name,
            ptr
        );
        if !args.is_empty() {
            call.push_str(", ");
            call.push_str(&args_text(env, args)?);
        }
        call.push(')');
        return Ok(call);
    }

    // direct call to the owning class's function
    let owner = &env.class(*class).name;
    let sig = env.method_sig(*class, *slot);
    let mut call = format!("{}_{}((struct {} *) {}", owner, sig.name, owner, ptr);
    if !args.is_empty() {
        call.push_str(", ");
        call.push_str(&args_text(env, args)?);
    }
    call.push(')');
    Ok(call)
}

// ==================== Statements ====================

pub fn lower_stmt(em: &mut Emitter, env: &TypeEnvironment, stmt: &Stmt) -> Result<()> {
    match stmt {
        Stmt::Declaration { name, ty, init, .. } => {
            let declared = resolve_for_lowering(env, ty)?;
            match init {
                Some(init) => em.line(&format!(
                    "{} = {};",
                    declared.c_declaration(name, env),
                    expr_text(env, init)?
                )),
                None => em.line(&format!("{};", declared.c_declaration(name, env))),
            }
        }
        Stmt::Expression(expr) => {
            em.line(&format!("{};", expr_text(env, expr)?));
        }
        Stmt::Block(stmts) => {
            em.line("{");
            em.indent();
            for stmt in stmts {
                lower_stmt(em, env, stmt)?;
            }
            em.dedent();
            em.line("}");
        }
        Stmt::If { cond, then_body, else_body } => {
            em.line(&format!("if ({})", expr_text(env, cond)?));
            lower_stmt(em, env, then_body)?;
            if let Some(else_body) = else_body {
                em.line("else");
                lower_stmt(em, env, else_body)?;
            }
        }
        Stmt::While { cond, body } => {
            em.line(&format!("while ({})", expr_text(env, cond)?));
            lower_stmt(em, env, body)?;
        }
        Stmt::Return { value, .. } => match value {
            Some(value) => em.line(&format!("return {};", expr_text(env, value)?)),
            None => em.line("return;"),
        },
    }
    Ok(())
}

// ==================== Functions ====================

pub fn params_text(env: &TypeEnvironment, params: &[(String, Type)]) -> String {
    if params.is_empty() {
        return "void".to_string();
    }
    let parts: Vec<String> = params
        .iter()
        .map(|(name, ty)| ty.c_declaration(name, env))
        .collect();
    parts.join(", ")
}

/// A forward declaration line
pub fn prototype(env: &TypeEnvironment, ret: &Type, name: &str, params: &[(String, Type)]) -> String {
    format!("{} {}({});", ret.c_type(env), name, params_text(env, params))
}

/// Emit a full function definition. The body's statements are emitted
/// inside the braces; a block body is flattened rather than nested.
pub fn emit_function(
    em: &mut Emitter,
    env: &TypeEnvironment,
    prefix: &str,
    ret: &Type,
    name: &str,
    params: &[(String, Type)],
    body: &Stmt,
) -> Result<()> {
    em.line(&format!(
        "{}{} {}({}) {{",
        prefix,
        ret.c_type(env),
        name,
        params_text(env, params)
    ));
    em.indent();
    emit_body(em, env, body)?;
    em.dedent();
    em.line("}");
    em.blank();
    Ok(())
}

pub fn emit_body(em: &mut Emitter, env: &TypeEnvironment, body: &Stmt) -> Result<()> {
    match body {
        Stmt::Block(stmts) => {
            for stmt in stmts {
                lower_stmt(em, env, stmt)?;
            }
            Ok(())
        }
        other => lower_stmt(em, env, other),
    }
}

/// Resolved signature of a declaration, for top-level function emission
pub fn signature_of(
    env: &TypeEnvironment,
    decl: &FunctionDecl,
) -> Result<(Type, Vec<(String, Type)>)> {
    let ret = resolve_for_lowering(env, &decl.ret)?;
    let params = decl
        .params
        .iter()
        .map(|p| Ok((p.name.clone(), resolve_for_lowering(env, &p.ty)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok((ret, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::token::Token;

    fn expr(kind: ExprKind, image: &str) -> Expr {
        Expr::new(kind, Token::synthetic(image))
    }

    #[test]
    fn test_binary_and_index_text() {
        let env = TypeEnvironment::new();
        let node = expr(
            ExprKind::Index {
                base: Box::new(expr(ExprKind::Identifier, "xs")),
                index: Box::new(expr(ExprKind::Literal, "3")),
            },
            "[",
        );
        assert_eq!(expr_text(&env, &node).unwrap(), "xs[3]");
    }

    #[test]
    fn test_indirect_field_access_uses_arrow() {
        let env = TypeEnvironment::new();
        let mut node = expr(
            ExprKind::FieldAccess {
                object: Box::new(expr(
                    ExprKind::Dereference(Box::new(expr(ExprKind::Identifier, "b"))),
                    "*",
                )),
                field: "x".to_string(),
            },
            ".",
        );
        node.meta.add_tag(Tag::IndirectFieldAccess);
        assert_eq!(expr_text(&env, &node).unwrap(), "b->x");

        let plain = expr(
            ExprKind::FieldAccess {
                object: Box::new(expr(ExprKind::Identifier, "p")),
                field: "x".to_string(),
            },
            ".",
        );
        assert_eq!(expr_text(&env, &plain).unwrap(), "p.x");
    }

    #[test]
    fn test_function_emission() {
        let env = TypeEnvironment::new();
        let mut em = Emitter::new();
        let body = Stmt::Return {
            value: Some(expr(ExprKind::Literal, "0")),
            token: Token::synthetic("return"),
        };
        emit_function(&mut em, &env, "", &Type::INT, "main", &[], &body).unwrap();
        let text = em.finish();
        assert!(text.contains("int main(void) {"));
        assert!(text.contains("    return 0;"));
    }
}
