//! Class lowering
//!
//! Translates one fully checked, tag-annotated class into C: the struct
//! equivalent, the virtual-table struct, forward declarations, the
//! synthesized static initializer, method and constructor bodies, generated
//! super forwarders, and this class's own virtual method bodies — strictly
//! in that order, because later steps call declarations emitted earlier.
//! Any failure aborts the whole class's lowering.

use crate::backend::c::emitter::Emitter;
use crate::backend::c::lower::{
    args_text, emit_body, emit_function, params_text, prototype, signature_of,
};
use crate::frontend::ast::{ClassDecl, FunctionDecl};
use crate::middle::tree::Tag;
use crate::types::{ClassId, GeneratedSuper, Primitive, Type, TypeEnvironment};
use crate::utils::{Error, Result};

fn with_self(id: ClassId, params: &[(String, Type)]) -> Vec<(String, Type)> {
    let mut all = vec![("this".to_string(), Type::pointer(Type::Class(id)))];
    all.extend_from_slice(params);
    all
}

pub fn lower_class(
    em: &mut Emitter,
    env: &mut TypeEnvironment,
    id: ClassId,
    decl: &ClassDecl,
) -> Result<()> {
    // step 1: forwarders for inherited virtuals without a local override
    generate_super_methods(env, id);
    let env = &*env;

    emit_struct_and_vtable(em, env, id);
    emit_prototypes(em, env, id);
    emit_init(em, env, id);
    emit_concrete_bodies(em, env, id, decl)?;
    emit_constructors(em, env, id, decl)?;
    emit_generated_supers(em, env, id)?;
    emit_virtual_bodies(em, env, id, decl)?;
    Ok(())
}

fn generate_super_methods(env: &mut TypeEnvironment, id: ClassId) {
    let supers: Vec<GeneratedSuper> = env
        .vtable_layout(id)
        .into_iter()
        .filter(|slot| slot.impl_class != id)
        .map(|slot| GeneratedSuper {
            name: slot.name,
            ret: slot.ret,
            params: slot.params,
            target: slot.impl_class,
        })
        .collect();
    env.class_mut(id).generated_supers = supers;
}

/// Step 2: struct declaration, vtable struct definition, struct definition
fn emit_struct_and_vtable(em: &mut Emitter, env: &TypeEnvironment, id: ClassId) {
    let name = &env.class(id).name;
    em.line(&format!("struct {};", name));
    em.blank();

    em.line(&format!("struct {}_VTable {{", name));
    em.indent();
    for slot in env.vtable_layout(id) {
        let mut params = vec![Type::pointer(Type::Class(id))];
        params.extend(slot.params.iter().map(|(_, ty)| ty.clone()));
        let fp = Type::FunctionPointer { ret: Box::new(slot.ret), params };
        em.line(&format!("{};", fp.c_declaration(&slot.name, env)));
    }
    em.dedent();
    em.line("};");
    em.blank();

    // vtable pointer first, then the flattened field layout, root class
    // fields before derived ones
    em.line(&format!("struct {} {{", name));
    em.indent();
    em.line(&format!("struct {}_VTable * {};", name, env.vtable_field()));
    for (_, field) in env.all_fields(id) {
        em.line(&format!("{};", field.ty.c_declaration(&field.name, env)));
    }
    em.dedent();
    em.line("};");
    em.blank();
}

/// Step 3: forward declarations — concrete methods, virtual methods,
/// constructors, in declaration order
fn emit_prototypes(em: &mut Emitter, env: &TypeEnvironment, id: ClassId) {
    let name = env.class(id).name.clone();
    for sig in env.class(id).methods.iter().chain(&env.class(id).virtuals) {
        em.line(&prototype(
            env,
            &sig.ret,
            &format!("{}_{}", name, sig.name),
            &with_self(id, &sig.params),
        ));
    }
    em.blank();
    let ctor_ret = Type::pointer(Type::Class(id));
    for (i, ctor) in env.class(id).constructors.iter().enumerate() {
        em.line(&prototype(
            env,
            &ctor_ret,
            &format!("{}_ctor{}", name, i),
            &with_self(id, &ctor.params),
        ));
    }
    em.blank();
}

/// Step 4: the synthesized static initializer — wires the vtable slots and
/// pointer, and zeroes field defaults
fn emit_init(em: &mut Emitter, env: &TypeEnvironment, id: ClassId) {
    let name = env.class(id).name.clone();
    em.line(&format!("static struct {}_VTable {}_vtable_table;", name, name));
    em.line(&format!("static void {}_init(struct {} * this) {{", name, name));
    em.indent();
    for slot in env.vtable_layout(id) {
        let impl_name = if slot.impl_class == id {
            format!("{}_{}", name, slot.name)
        } else {
            format!("{}_super_{}", name, slot.name)
        };
        em.line(&format!("{}_vtable_table.{} = {};", name, slot.name, impl_name));
    }
    em.line(&format!("this->{} = &{}_vtable_table;", env.vtable_field(), name));
    for (_, field) in env.all_fields(id) {
        match field.ty.unwrap_all(env) {
            Type::Pointer(_) | Type::FunctionPointer { .. } => {
                em.line(&format!("this->{} = NULL;", field.name));
            }
            Type::Primitive(p) if p.is_arithmetic() => {
                em.line(&format!("this->{} = 0;", field.name));
            }
            _ => {}
        }
    }
    em.dedent();
    em.line("}");
    em.blank();
}

/// Step 5: concrete method bodies in declared order; bodiless methods are
/// abstract and skipped
fn emit_concrete_bodies(
    em: &mut Emitter,
    env: &TypeEnvironment,
    id: ClassId,
    decl: &ClassDecl,
) -> Result<()> {
    let name = env.class(id).name.clone();
    for method in &decl.methods {
        if method.is_virtual {
            continue;
        }
        let Some(body) = &method.decl.body else { continue };
        let (ret, params) = signature_of(env, &method.decl)?;
        emit_function(
            em,
            env,
            "",
            &ret,
            &format!("{}_{}", name, method.decl.name),
            &with_self(id, &params),
            body,
        )?;
    }
    Ok(())
}

/// Step 6: constructor bodies; a delegating constructor emits its prior
/// constructor's call strictly before its own body statements
fn emit_constructors(
    em: &mut Emitter,
    env: &TypeEnvironment,
    id: ClassId,
    decl: &ClassDecl,
) -> Result<()> {
    let name = env.class(id).name.clone();
    let ret = Type::pointer(Type::Class(id));
    for (i, ctor) in decl.constructors.iter().enumerate() {
        let Some(body) = &ctor.body else { continue };
        let params = ctor
            .params
            .iter()
            .map(|p| {
                Ok((
                    p.name.clone(),
                    crate::backend::c::lower::resolve_for_lowering(env, &p.ty)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        em.line(&format!(
            "{} {}_ctor{}({}) {{",
            ret.c_type(env),
            name,
            i,
            params_text(env, &with_self(id, &params))
        ));
        em.indent();
        if let Some(Tag::PriorConstructor { class, ctor: prior }) = ctor
            .meta
            .find_tag(|t| matches!(t, Tag::PriorConstructor { .. }))
        {
            let args = match &ctor.prior {
                Some(p) => args_text(env, &p.args)?,
                None => String::new(),
            };
            let tail = if args.is_empty() { String::new() } else { format!(", {}", args) };
            if *class == id {
                em.line(&format!("{}_ctor{}(this{});", name, prior, tail));
            } else {
                let target = &env.class(*class).name;
                em.line(&format!(
                    "{}_ctor{}((struct {} *) this{});",
                    target, prior, target, tail
                ));
            }
        }
        em.line(&format!("{}_init(this);", name));
        emit_body(em, env, body)?;
        em.line("return this;");
        em.dedent();
        em.line("}");
        em.blank();
    }
    Ok(())
}

/// Step 7: generated super forwarders, emitted as static functions
fn emit_generated_supers(em: &mut Emitter, env: &TypeEnvironment, id: ClassId) -> Result<()> {
    let name = env.class(id).name.clone();
    let supers = env.class(id).generated_supers.clone();
    for gen in supers {
        let target = &env.class(gen.target).name;
        let params = with_self(id, &gen.params);
        em.line(&format!(
            "static {} {}_super_{}({}) {{",
            gen.ret.c_type(env),
            name,
            gen.name,
            params_text(env, &params)
        ));
        em.indent();
        let forwarded: Vec<String> = gen.params.iter().map(|(n, _)| n.clone()).collect();
        let call = if forwarded.is_empty() {
            format!("{}_{}((struct {} *) this)", target, gen.name, target)
        } else {
            format!(
                "{}_{}((struct {} *) this, {})",
                target,
                gen.name,
                target,
                forwarded.join(", ")
            )
        };
        if matches!(gen.ret.unwrap_all(env), Type::Primitive(Primitive::Void)) {
            em.line(&format!("{};", call));
        } else {
            em.line(&format!("return {};", call));
        }
        em.dedent();
        em.line("}");
        em.blank();
    }
    Ok(())
}

/// Step 8: virtual methods declared by exactly this class; inherited
/// virtuals dispatch through the vtable and are never re-emitted
fn emit_virtual_bodies(
    em: &mut Emitter,
    env: &TypeEnvironment,
    id: ClassId,
    decl: &ClassDecl,
) -> Result<()> {
    let name = env.class(id).name.clone();
    for method in &decl.methods {
        if !method.is_virtual {
            continue;
        }
        let Some(body) = &method.decl.body else { continue };
        let (ret, params) = signature_of(env, &method.decl)?;
        emit_function(
            em,
            env,
            "",
            &ret,
            &format!("{}_{}", name, method.decl.name),
            &with_self(id, &params),
            body,
        )?;
    }
    Ok(())
}

/// Lower an `implement`-block definition as its bound method
pub fn lower_implement_method(
    em: &mut Emitter,
    env: &TypeEnvironment,
    func: &FunctionDecl,
) -> Result<()> {
    let Some(Tag::MethodBinding { class, slot }) = func
        .meta
        .find_tag(|t| matches!(t, Tag::MethodBinding { .. }))
    else {
        return Err(Error::IllegalAccess {
            owner: String::new(),
            name: func.name.clone(),
            signature: String::new(),
            span: Some(func.token.span),
        });
    };
    let Some(body) = &func.body else { return Ok(()) };
    let sig = env.method_sig(*class, *slot);
    let (ret, params) = signature_of(env, func)?;
    emit_function(
        em,
        env,
        "",
        &ret,
        &format!("{}_{}", env.class(*class).name, sig.name),
        &with_self(*class, &params),
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{
        CtorDecl, ExprKind, Item, MethodDecl, Param, PriorCtor, PriorKind, Program, Stmt,
        TypeExpr,
    };
    use crate::frontend::token::Token;
    use crate::middle::check::ProgramAnalyzer;
    use crate::middle::tree::NodeMeta;
    use crate::middle::CompilationContext;
    use crate::types::Visibility;

    fn token(image: &str) -> Token {
        Token::synthetic(image)
    }

    fn virtual_method(name: &str, ret: &str, body: Option<Stmt>) -> MethodDecl {
        MethodDecl {
            visibility: Visibility::Public,
            is_virtual: true,
            decl: FunctionDecl {
                name: name.to_string(),
                ret: TypeExpr::named(ret),
                params: vec![],
                body,
                token: token(name),
                meta: NodeMeta::default(),
            },
        }
    }

    fn return_stmt(image: &str) -> Stmt {
        Stmt::Return {
            value: Some(crate::frontend::ast::Expr::new(ExprKind::Literal, token(image))),
            token: token("return"),
        }
    }

    fn hierarchy_program() -> Program {
        let mut base = ClassDecl {
            name: "Base".to_string(),
            superclass: None,
            fields: vec![],
            methods: vec![],
            constructors: vec![],
            token: token("Base"),
        };
        base.methods.push(virtual_method(
            "area",
            "int",
            Some(Stmt::Block(vec![return_stmt("1")])),
        ));
        base.methods
            .push(virtual_method("print", "void", Some(Stmt::Block(vec![]))));
        base.constructors.push(CtorDecl {
            visibility: Visibility::Public,
            params: vec![],
            prior: None,
            body: Some(Stmt::Block(vec![])),
            token: token("Base"),
            meta: NodeMeta::default(),
        });

        let mut derived = ClassDecl {
            name: "Derived".to_string(),
            superclass: Some("Base".to_string()),
            fields: vec![],
            methods: vec![],
            constructors: vec![],
            token: token("Derived"),
        };
        derived.methods.push(virtual_method(
            "area",
            "int",
            Some(Stmt::Block(vec![return_stmt("2")])),
        ));
        derived.constructors.push(CtorDecl {
            visibility: Visibility::Public,
            params: vec![Param { name: "n".to_string(), ty: TypeExpr::named("int") }],
            prior: Some(PriorCtor { kind: PriorKind::Super, args: vec![] }),
            body: Some(Stmt::Block(vec![Stmt::Declaration {
                name: "marker".to_string(),
                ty: TypeExpr::named("int"),
                init: None,
                token: token("marker"),
            }])),
            token: token("Derived"),
            meta: NodeMeta::default(),
        });

        Program { items: vec![Item::Class(base), Item::Class(derived)] }
    }

    fn lower_derived() -> String {
        let mut program = hierarchy_program();
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        ProgramAnalyzer::new(&mut ctx).analyze(&mut program).unwrap();
        let Item::Class(derived) = &program.items[1] else { unreachable!() };
        let id = ctx.env.lookup_class("Derived").unwrap();
        let mut em = Emitter::new();
        lower_class(&mut em, &mut ctx.env, id, derived).unwrap();
        em.finish()
    }

    #[test]
    fn test_override_emits_single_vtable_entry() {
        let text = lower_derived();
        // exactly one vtable entry for the override, pointing at it
        assert_eq!(text.matches("Derived_vtable_table.area = ").count(), 1);
        assert!(text.contains("Derived_vtable_table.area = Derived_area;"));
        // the inherited virtual dispatches through a generated forwarder
        assert!(text.contains("Derived_vtable_table.print = Derived_super_print;"));
        assert!(text.contains("static void Derived_super_print(struct Derived * this)"));
        assert!(text.contains("Base_print((struct Base *) this);"));
        // the inherited body is never re-emitted
        assert!(!text.contains("Derived_print"));
    }

    #[test]
    fn test_vtable_struct_and_layout() {
        let text = lower_derived();
        assert!(text.contains("struct Derived;"));
        assert!(text.contains("struct Derived_VTable {"));
        assert!(text.contains("int (*area)(struct Derived *);"));
        assert!(text.contains("struct Derived_VTable * __vtable;"));
        assert!(text.contains("this->__vtable = &Derived_vtable_table;"));
    }

    #[test]
    fn test_prior_constructor_precedes_body() {
        let text = lower_derived();
        let prior = text
            .find("Base_ctor0((struct Base *) this);")
            .expect("delegated constructor call must be emitted");
        let body = text.find("int marker;").expect("body statement must be emitted");
        assert!(prior < body, "prior constructor call must precede the body");
        // the initializer runs between delegation and the body
        let init = text.find("Derived_init(this);").unwrap();
        assert!(prior < init && init < body);
        assert!(text.contains("return this;"));
    }

    #[test]
    fn test_lowering_order_declarations_before_bodies() {
        let text = lower_derived();
        let proto = text.find("int Derived_area(struct Derived * this);").unwrap();
        let body = text.find("int Derived_area(struct Derived * this) {").unwrap();
        assert!(proto < body);
    }
}
