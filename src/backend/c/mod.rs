//! C backend: lowers a checked, tag-annotated program into C text

pub mod class_lower;
pub mod emitter;
pub mod lower;

pub use emitter::Emitter;

use crate::backend::c::lower::{
    emit_function, lower_stmt, prototype, resolve_for_lowering, signature_of,
};
use crate::frontend::ast::{Item, Program};
use crate::middle::CompilationContext;
use crate::utils::{Error, Result};

/// Lower a whole analyzed program into the emitter, one compilation unit
pub fn lower_program(
    em: &mut Emitter,
    ctx: &mut CompilationContext,
    program: &Program,
) -> Result<()> {
    em.line("/* Generated by the Cinder compiler */");
    em.line("#include <stdlib.h>");
    em.blank();

    // named types first
    for item in &program.items {
        match item {
            Item::Typedef { name, ty, .. } => {
                let resolved = resolve_for_lowering(&ctx.env, ty)?;
                em.line(&format!("typedef {};", resolved.c_declaration(name, &ctx.env)));
            }
            Item::Struct(decl) => {
                em.line(&format!("struct {} {{", decl.name));
                em.indent();
                for (fname, fty) in &decl.fields {
                    let ty = resolve_for_lowering(&ctx.env, fty)?;
                    em.line(&format!("{};", ty.c_declaration(fname, &ctx.env)));
                }
                em.dedent();
                em.line("};");
                em.blank();
            }
            _ => {}
        }
    }

    // forward declarations so definition order stays unconstrained
    for item in &program.items {
        if let Item::Function(decl) = item {
            let (ret, params) = signature_of(&ctx.env, decl)?;
            em.line(&prototype(&ctx.env, &ret, &decl.name, &params));
        }
    }
    for instance in ctx.generics.instances() {
        let (ret, params) = signature_of(&ctx.env, &instance.decl)?;
        em.line(&prototype(&ctx.env, &ret, &instance.name, &params));
    }
    em.blank();

    for item in &program.items {
        if let Item::Global(stmt) = item {
            lower_stmt(em, &ctx.env, stmt)?;
        }
    }
    em.blank();

    // monomorphized classes come first; user classes may mention them
    let class_instances = ctx.class_instances.clone();
    for decl in &class_instances {
        let id = ctx.env.lookup_class(&decl.name).ok_or_else(|| {
            Error::ClassNotDefined { name: decl.name.clone() }
        })?;
        class_lower::lower_class(em, &mut ctx.env, id, decl)?;
    }
    for item in &program.items {
        if let Item::Class(decl) = item {
            let id = ctx.env.lookup_class(&decl.name).ok_or_else(|| {
                Error::ClassNotDefined { name: decl.name.clone() }
            })?;
            class_lower::lower_class(em, &mut ctx.env, id, decl)?;
        }
    }

    // implement-block definitions emit as their bound methods
    for item in &program.items {
        if let Item::Implement(decl) = item {
            for func in &decl.methods {
                class_lower::lower_implement_method(em, &ctx.env, func)?;
            }
        }
    }

    // monomorphized functions, then the program's own functions
    let fn_instances = ctx.generics.instances().to_vec();
    for instance in &fn_instances {
        if let Some(body) = &instance.decl.body {
            let (ret, params) = signature_of(&ctx.env, &instance.decl)?;
            emit_function(em, &ctx.env, "", &ret, &instance.name, &params, body)?;
        }
    }
    for item in &program.items {
        if let Item::Function(decl) = item {
            if let Some(body) = &decl.body {
                let (ret, params) = signature_of(&ctx.env, decl)?;
                emit_function(em, &ctx.env, "", &ret, &decl.name, &params, body)?;
            }
        }
    }
    Ok(())
}
