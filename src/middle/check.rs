//! Declaration-level analyzers
//!
//! Statement blocks, functions, class bodies, implement blocks, and whole
//! programs. Each pass is fail-fast and annotates the tree it walks; class
//! analysis additionally populates the type environment and records the
//! class's scope for later subclasses.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::frontend::ast::{
    ClassDecl, Expr, FunctionDecl, ImplementDecl, Item, Param, PriorKind, Program, Stmt, TypeExpr,
};
use crate::middle::expr::{typed, ExpressionAnalyzer};
use crate::middle::scope::ScopeTracker;
use crate::middle::tree::Tag;
use crate::middle::CompilationContext;
use crate::types::{
    describe_types, CompoundRef, CtorSig, FieldDecl, MethodSig, MethodSlot, Primitive, Type,
};
use crate::utils::{Error, Result};

// ==================== Declared-type resolution ====================

/// Resolve a declared-type expression, monomorphizing generic classes on
/// first use
pub(crate) fn resolve_declared(
    ctx: &mut CompilationContext,
    scope: &Rc<RefCell<ScopeTracker>>,
    expr: &TypeExpr,
) -> Result<Type> {
    match expr {
        TypeExpr::Generic { name, args } => {
            let concrete = args
                .iter()
                .map(|a| resolve_declared(ctx, scope, a))
                .collect::<Result<Vec<_>>>()?;
            let (mangled, fresh) = {
                let ctx_ref = &mut *ctx;
                ctx_ref
                    .generics
                    .instantiate_class(name, &concrete, &ctx_ref.env)?
            };
            if let Some(mut decl) = fresh {
                analyze_class(ctx, scope, &mut decl)?;
                ctx.class_instances.push(decl);
            }
            ctx.env
                .lookup_class(&mangled)
                .map(Type::Class)
                .ok_or(Error::ClassNotDefined { name: mangled })
        }
        TypeExpr::Pointer(inner) => Ok(Type::pointer(resolve_declared(ctx, scope, inner)?)),
        TypeExpr::Const(inner) => {
            Ok(Type::Const(Box::new(resolve_declared(ctx, scope, inner)?)))
        }
        TypeExpr::Array(elem, extent) => Ok(Type::Array {
            elem: Box::new(resolve_declared(ctx, scope, elem)?),
            extent: *extent,
        }),
        TypeExpr::FunctionPointer { ret, params } => Ok(Type::FunctionPointer {
            ret: Box::new(resolve_declared(ctx, scope, ret)?),
            params: params
                .iter()
                .map(|p| resolve_declared(ctx, scope, p))
                .collect::<Result<Vec<_>>>()?,
        }),
        TypeExpr::Named(_) => ctx.env.resolve(expr),
    }
}

// ==================== Statements ====================

pub struct StatementAnalyzer<'a> {
    ctx: &'a mut CompilationContext,
    scope: Rc<RefCell<ScopeTracker>>,
    ret: Type,
}

impl<'a> StatementAnalyzer<'a> {
    pub fn new(ctx: &'a mut CompilationContext, scope: Rc<RefCell<ScopeTracker>>, ret: Type) -> Self {
        Self { ctx, scope, ret }
    }

    pub fn analyze(&mut self, stmt: &mut Stmt) -> Result<()> {
        match stmt {
            Stmt::Declaration { name, ty, init, token } => {
                let declared = resolve_declared(self.ctx, &self.scope, ty)?;
                if let Some(init) = init {
                    ExpressionAnalyzer::new(self.ctx, Rc::clone(&self.scope)).analyze(init)?;
                    let got = typed(init)?;
                    let env = &self.ctx.env;
                    if !declared.is_assignable_from(&got, env) {
                        return Err(Error::IncorrectType {
                            expected: declared.describe(env),
                            got: got.describe(env),
                            span: Some(token.span),
                        });
                    }
                }
                self.scope.borrow_mut().declare_variable(name, declared, false)
            }
            Stmt::Expression(expr) => {
                ExpressionAnalyzer::new(self.ctx, Rc::clone(&self.scope)).analyze(expr)
            }
            Stmt::Block(stmts) => {
                let child = Rc::new(RefCell::new(self.scope.borrow().child()));
                let mut inner = StatementAnalyzer::new(self.ctx, child, self.ret.clone());
                for stmt in stmts {
                    inner.analyze(stmt)?;
                }
                Ok(())
            }
            Stmt::If { cond, then_body, else_body } => {
                self.check_condition(cond)?;
                self.analyze(then_body)?;
                if let Some(else_body) = else_body {
                    self.analyze(else_body)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                self.check_condition(cond)?;
                self.analyze(body)
            }
            Stmt::Return { value, token } => match value {
                Some(value) => {
                    ExpressionAnalyzer::new(self.ctx, Rc::clone(&self.scope)).analyze(value)?;
                    let got = typed(value)?;
                    let env = &self.ctx.env;
                    if !self.ret.is_assignable_from(&got, env) {
                        return Err(Error::IncorrectType {
                            expected: self.ret.describe(env),
                            got: got.describe(env),
                            span: Some(token.span),
                        });
                    }
                    Ok(())
                }
                None => {
                    let env = &self.ctx.env;
                    if matches!(self.ret.unwrap_all(env), Type::Primitive(Primitive::Void)) {
                        Ok(())
                    } else {
                        Err(Error::IncorrectType {
                            expected: self.ret.describe(env),
                            got: "void".to_string(),
                            span: Some(token.span),
                        })
                    }
                }
            },
        }
    }

    fn check_condition(&mut self, cond: &mut Expr) -> Result<()> {
        ExpressionAnalyzer::new(self.ctx, Rc::clone(&self.scope)).analyze(cond)?;
        let ty = typed(cond)?;
        let env = &self.ctx.env;
        if !ty.is_primitive(env) {
            return Err(Error::IllegalTypesForOperation {
                op: "condition".to_string(),
                types: ty.describe(env),
                span: Some(cond.span()),
            });
        }
        Ok(())
    }
}

// ==================== Functions ====================

pub struct FunctionAnalyzer<'a> {
    ctx: &'a mut CompilationContext,
    scope: Rc<RefCell<ScopeTracker>>,
}

impl<'a> FunctionAnalyzer<'a> {
    pub fn new(ctx: &'a mut CompilationContext, scope: Rc<RefCell<ScopeTracker>>) -> Self {
        Self { ctx, scope }
    }

    pub fn analyze(&mut self, decl: &mut FunctionDecl) -> Result<()> {
        debug!("analyzing function {}", decl.name);
        let ret = resolve_declared(self.ctx, &self.scope, &decl.ret)?;
        let fn_scope = Rc::new(RefCell::new(self.scope.borrow().child()));
        for param in &decl.params {
            let ty = resolve_declared(self.ctx, &self.scope, &param.ty)?;
            fn_scope.borrow_mut().declare_variable(&param.name, ty, false)?;
        }
        if let Some(body) = &mut decl.body {
            StatementAnalyzer::new(self.ctx, fn_scope, ret).analyze(body)?;
        }
        Ok(())
    }
}

// ==================== Classes ====================

/// Scope for a method or constructor body: the class scope plus fixed
/// `this`/`super` bindings and the declared parameters
fn method_scope(
    ctx: &mut CompilationContext,
    class_scope: &Rc<RefCell<ScopeTracker>>,
    id: crate::types::ClassId,
    params: &[Param],
) -> Result<Rc<RefCell<ScopeTracker>>> {
    let sup = ctx.env.class(id).superclass;
    let mut scope = class_scope.borrow().child();
    scope.declare_variable("this", Type::pointer(Type::Class(id)), true)?;
    if let Some(sup) = sup {
        scope.declare_variable("super", Type::pointer(Type::Class(sup)), true)?;
    }
    for param in params {
        let ty = resolve_declared(ctx, class_scope, &param.ty)?;
        scope.declare_variable(&param.name, ty, false)?;
    }
    Ok(Rc::new(RefCell::new(scope)))
}

fn analyze_method_body(
    ctx: &mut CompilationContext,
    class_scope: &Rc<RefCell<ScopeTracker>>,
    id: crate::types::ClassId,
    decl: &mut FunctionDecl,
) -> Result<()> {
    if decl.body.is_none() {
        return Ok(());
    }
    let ret = resolve_declared(ctx, class_scope, &decl.ret)?;
    let scope = method_scope(ctx, class_scope, id, &decl.params)?;
    if let Some(body) = &mut decl.body {
        StatementAnalyzer::new(ctx, scope, ret).analyze(body)?;
    }
    Ok(())
}

/// Analyze a class declaration: register the class, record its scope,
/// declare its members into the tier tables, then analyze every body
pub fn analyze_class(
    ctx: &mut CompilationContext,
    scope: &Rc<RefCell<ScopeTracker>>,
    decl: &mut ClassDecl,
) -> Result<crate::types::ClassId> {
    debug!("analyzing class {}", decl.name);
    let sup = match &decl.superclass {
        Some(name) => Some(ctx.env.lookup_class(name).ok_or_else(|| {
            Error::ClassNotDefined { name: name.clone() }
        })?),
        None => None,
    };
    let id = ctx.env.declare_class(&decl.name, sup)?;

    // member signatures go into the class definition first, so bodies can
    // refer to the class itself
    for field in &decl.fields {
        let ty = resolve_declared(ctx, scope, &field.ty)?;
        ctx.env.class_mut(id).fields.push(FieldDecl {
            name: field.name.clone(),
            ty,
            visibility: field.visibility,
        });
    }
    for method in &decl.methods {
        let ret = resolve_declared(ctx, scope, &method.decl.ret)?;
        let mut params = Vec::new();
        for param in &method.decl.params {
            params.push((param.name.clone(), resolve_declared(ctx, scope, &param.ty)?));
        }
        let sig = MethodSig {
            name: method.decl.name.clone(),
            ret,
            params,
            visibility: method.visibility,
            has_body: method.decl.body.is_some(),
        };
        if method.is_virtual {
            ctx.env.class_mut(id).virtuals.push(sig);
        } else {
            ctx.env.class_mut(id).methods.push(sig);
        }
    }
    for ctor in &decl.constructors {
        let mut params = Vec::new();
        for param in &ctor.params {
            params.push((param.name.clone(), resolve_declared(ctx, scope, &param.ty)?));
        }
        ctx.env.class_mut(id).constructors.push(CtorSig {
            params,
            visibility: ctor.visibility,
            has_body: ctor.body.is_some(),
        });
    }

    // derive and record the class scope; the superclass must already have
    // been processed or this fails with ClassNotDefined
    let class_scope = {
        let ctx_ref = &mut *ctx;
        let parent = scope.borrow();
        parent.child_for_class(id, &ctx_ref.env, &mut ctx_ref.class_scopes)?
    };

    // declare members into the tier-appropriate visibility tables
    {
        let owner = CompoundRef::Class(id);
        let fields = ctx.env.class(id).fields.clone();
        let methods = ctx.env.class(id).methods.clone();
        let virtuals = ctx.env.class(id).virtuals.clone();
        let mut cs = class_scope.borrow_mut();
        for field in fields {
            cs.declare_member(owner, true, &field.name, field.ty, field.visibility, &ctx.env)?;
        }
        // overloads share one visibility entry per name; signatures are
        // resolved against the class definition
        let mut declared = std::collections::HashSet::new();
        for sig in methods.iter().chain(&virtuals) {
            if !declared.insert(sig.name.clone()) {
                continue;
            }
            cs.declare_member(owner, false, &sig.name, sig.fn_pointer(), sig.visibility, &ctx.env)?;
        }
    }

    // method bodies
    for method in &mut decl.methods {
        analyze_method_body(ctx, &class_scope, id, &mut method.decl)?;
    }

    // constructors: resolve any prior-constructor delegation, then the body
    for ctor in &mut decl.constructors {
        let ctor_scope = method_scope(ctx, &class_scope, id, &ctor.params)?;
        if let Some(prior) = &mut ctor.prior {
            for arg in prior.args.iter_mut() {
                ExpressionAnalyzer::new(ctx, Rc::clone(&ctor_scope)).analyze(arg)?;
            }
            let arg_tys = prior.args.iter().map(typed).collect::<Result<Vec<_>>>()?;
            let target = match prior.kind {
                PriorKind::Super => sup.ok_or_else(|| Error::NoConstructor {
                    class: decl.name.clone(),
                    signature: describe_types(&arg_tys, &ctx.env),
                    span: Some(ctor.token.span),
                })?,
                PriorKind::This => id,
            };
            let index = ctx.env.resolve_constructor(target, &arg_tys).ok_or_else(|| {
                Error::NoConstructor {
                    class: ctx.env.class(target).name.clone(),
                    signature: describe_types(&arg_tys, &ctx.env),
                    span: Some(ctor.token.span),
                }
            })?;
            ctor.meta.add_tag(Tag::PriorConstructor { class: target, ctor: index });
        }
        if let Some(body) = &mut ctor.body {
            StatementAnalyzer::new(ctx, ctor_scope, Type::VOID).analyze(body)?;
        }
    }

    Ok(id)
}

// ==================== Implement blocks ====================

/// Analyze an `implement` block: each definition must match a method the
/// class already declares
pub fn analyze_implement(
    ctx: &mut CompilationContext,
    scope: &Rc<RefCell<ScopeTracker>>,
    decl: &mut ImplementDecl,
) -> Result<()> {
    let target = resolve_declared(ctx, scope, &decl.target)?;
    let class = {
        let env = &ctx.env;
        match target.unwrap_all(env) {
            Type::Pointer(pointee) => match pointee.unwrap_all(env) {
                Type::Class(id) => Some(*id),
                _ => None,
            },
            _ => None,
        }
    };
    let Some(id) = class else {
        return Err(Error::IllegalTypesForOperation {
            op: "implement".to_string(),
            types: target.describe(&ctx.env),
            span: Some(decl.token.span),
        });
    };
    let class_scope = ctx.class_scopes.get(id).ok_or_else(|| Error::ClassNotDefined {
        name: ctx.env.class(id).name.clone(),
    })?;

    for func in &mut decl.methods {
        let mut param_tys = Vec::new();
        for param in &func.params {
            param_tys.push(resolve_declared(ctx, &class_scope, &param.ty)?);
        }
        let resolution = ctx.env.resolve_method(id, &func.name, &param_tys);
        let Some((owner, slot)) = resolution.filter(|(owner, _)| *owner == id) else {
            return Err(Error::IllegalAccess {
                owner: ctx.env.class(id).name.clone(),
                name: func.name.clone(),
                signature: format!("({})", describe_types(&param_tys, &ctx.env)),
                span: Some(func.token.span),
            });
        };
        func.meta.add_tag(Tag::MethodBinding { class: owner, slot });
        match slot {
            MethodSlot::Concrete(i) => ctx.env.class_mut(id).methods[i].has_body = true,
            MethodSlot::Virtual(i) => ctx.env.class_mut(id).virtuals[i].has_body = true,
        }
        analyze_method_body(ctx, &class_scope, id, func)?;
    }
    Ok(())
}

// ==================== Programs ====================

pub struct ProgramAnalyzer<'a> {
    ctx: &'a mut CompilationContext,
    scope: Rc<RefCell<ScopeTracker>>,
}

impl<'a> ProgramAnalyzer<'a> {
    pub fn new(ctx: &'a mut CompilationContext) -> Self {
        Self {
            ctx,
            scope: Rc::new(RefCell::new(ScopeTracker::new())),
        }
    }

    /// The root scope, for drivers that want to inspect it afterwards
    pub fn scope(&self) -> Rc<RefCell<ScopeTracker>> {
        Rc::clone(&self.scope)
    }

    pub fn analyze(&mut self, program: &mut Program) -> Result<()> {
        for item in &mut program.items {
            match item {
                Item::Class(decl) => {
                    analyze_class(self.ctx, &self.scope, decl)?;
                }
                Item::GenericClass(generic) => {
                    self.ctx
                        .generics
                        .declare_class(generic.decl.clone(), generic.type_params.clone())?;
                }
                Item::Function(decl) => {
                    let ret = resolve_declared(self.ctx, &self.scope, &decl.ret)?;
                    let mut params = Vec::new();
                    for param in &decl.params {
                        params.push(resolve_declared(self.ctx, &self.scope, &param.ty)?);
                    }
                    // first-occurrence registration: the global function
                    // entry, plus a function-pointer variable so the name
                    // works as a value
                    {
                        let mut scope = self.scope.borrow_mut();
                        if !scope.function_exists(&decl.name) {
                            scope.declare_function(&decl.name, ret.clone(), true)?;
                            scope.declare_variable(
                                &decl.name,
                                Type::FunctionPointer { ret: Box::new(ret), params },
                                false,
                            )?;
                        }
                    }
                    FunctionAnalyzer::new(self.ctx, Rc::clone(&self.scope)).analyze(decl)?;
                }
                Item::GenericFunction(generic) => {
                    let ctx = &mut *self.ctx;
                    ctx.generics.declare_function(
                        generic.decl.clone(),
                        generic.type_params.clone(),
                        &ctx.env,
                    )?;
                }
                Item::Struct(decl) => {
                    let mut fields = Vec::new();
                    for (name, ty) in &decl.fields {
                        fields.push((name.clone(), resolve_declared(self.ctx, &self.scope, ty)?));
                    }
                    let id = self.ctx.env.declare_struct(&decl.name, fields, false)?;
                    let mut scope = self.scope.borrow_mut();
                    if !scope.is_tracked(CompoundRef::Struct(id)) {
                        scope.track(CompoundRef::Struct(id));
                        scope.register_compound(id, &self.ctx.env)?;
                    }
                }
                Item::Typedef { name, ty, .. } => {
                    let resolved = resolve_declared(self.ctx, &self.scope, ty)?;
                    self.ctx.env.declare_alias(name, resolved)?;
                }
                Item::Global(stmt) => {
                    StatementAnalyzer::new(self.ctx, Rc::clone(&self.scope), Type::VOID)
                        .analyze(stmt)?;
                }
                Item::Implement(decl) => {
                    analyze_implement(self.ctx, &self.scope, decl)?;
                }
            }
        }
        Ok(())
    }

    /// Entry-point check, applied by drivers that produce an executable
    pub fn require_main(&self) -> Result<()> {
        if self.scope.borrow().function_exists("main") {
            Ok(())
        } else {
            Err(Error::MissingMainFunction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{
        BinaryOp, CtorDecl, ExprKind, FieldDef, MethodDecl, PriorCtor,
    };
    use crate::frontend::token::Token;
    use crate::middle::tree::NodeMeta;
    use crate::types::{TypeEnvironment, Visibility};

    fn expr(kind: ExprKind, image: &str) -> Expr {
        Expr::new(kind, Token::synthetic(image))
    }

    fn func(name: &str, ret: TypeExpr, params: Vec<Param>, body: Option<Stmt>) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            ret,
            params,
            body,
            token: Token::synthetic(name),
            meta: NodeMeta::default(),
        }
    }

    fn field(name: &str, ty: &str) -> FieldDef {
        FieldDef {
            visibility: Visibility::Public,
            name: name.to_string(),
            ty: TypeExpr::named(ty),
        }
    }

    fn class(name: &str, superclass: Option<&str>) -> ClassDecl {
        ClassDecl {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            fields: vec![],
            methods: vec![],
            constructors: vec![],
            token: Token::synthetic(name),
        }
    }

    fn analyze_program(program: &mut Program) -> (CompilationContext, Rc<RefCell<ScopeTracker>>) {
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        let scope = {
            let mut analyzer = ProgramAnalyzer::new(&mut ctx);
            analyzer.analyze(program).unwrap();
            analyzer.scope()
        };
        (ctx, scope)
    }

    #[test]
    fn test_inherited_field_access_through_pointer() {
        let mut a = class("A", None);
        a.fields.push(field("x", "int"));
        let mut b = class("B", Some("A"));
        b.fields.push(field("y", "int"));
        let mut program = Program { items: vec![Item::Class(a), Item::Class(b)] };
        let (mut ctx, scope) = analyze_program(&mut program);

        let b_id = ctx.env.lookup_class("B").unwrap();
        scope
            .borrow_mut()
            .declare_variable("b", Type::pointer(Type::Class(b_id)), false)
            .unwrap();
        let mut access = expr(
            ExprKind::FieldAccess {
                object: Box::new(expr(
                    ExprKind::Dereference(Box::new(expr(ExprKind::Identifier, "b"))),
                    "*",
                )),
                field: "x".to_string(),
            },
            ".",
        );
        ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut access).unwrap();
        assert_eq!(access.meta.ty(), Some(&Type::INT));
        assert!(access.meta.has_tag(&Tag::IndirectFieldAccess));
        assert!(access.meta.is_lvalue());
    }

    #[test]
    fn test_subclass_before_superclass_fails() {
        let mut program = Program {
            items: vec![Item::Class(class("B", Some("A"))), Item::Class(class("A", None))],
        };
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        let mut analyzer = ProgramAnalyzer::new(&mut ctx);
        assert!(matches!(
            analyzer.analyze(&mut program),
            Err(Error::ClassNotDefined { .. })
        ));
    }

    #[test]
    fn test_constructor_overload_must_exist() {
        let mut foo = class("Foo", None);
        foo.constructors.push(CtorDecl {
            visibility: Visibility::Public,
            params: vec![],
            prior: None,
            body: Some(Stmt::Block(vec![])),
            token: Token::synthetic("Foo"),
            meta: NodeMeta::default(),
        });
        let mut program = Program { items: vec![Item::Class(foo)] };
        let (mut ctx, scope) = analyze_program(&mut program);

        let mut bad = expr(
            ExprKind::ConstructorCall {
                target: TypeExpr::pointer(TypeExpr::named("Foo")),
                args: vec![expr(ExprKind::Literal, "1"), expr(ExprKind::Literal, "2")],
            },
            "new",
        );
        assert!(matches!(
            ExpressionAnalyzer::new(&mut ctx, Rc::clone(&scope)).analyze(&mut bad),
            Err(Error::NoConstructor { .. })
        ));

        let mut good = expr(
            ExprKind::ConstructorCall {
                target: TypeExpr::pointer(TypeExpr::named("Foo")),
                args: vec![],
            },
            "new",
        );
        ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut good).unwrap();
        let foo_id = ctx.env.lookup_class("Foo").unwrap();
        assert_eq!(good.meta.ty(), Some(&Type::pointer(Type::Class(foo_id))));
        assert!(good.meta.has_tag(&Tag::ConstructorCall { class: foo_id, ctor: 0 }));
    }

    #[test]
    fn test_delegating_constructor_gets_prior_tag() {
        let mut base = class("Base", None);
        base.constructors.push(CtorDecl {
            visibility: Visibility::Public,
            params: vec![],
            prior: None,
            body: Some(Stmt::Block(vec![])),
            token: Token::synthetic("Base"),
            meta: NodeMeta::default(),
        });
        let mut derived = class("Derived", Some("Base"));
        derived.constructors.push(CtorDecl {
            visibility: Visibility::Public,
            params: vec![],
            prior: Some(PriorCtor { kind: PriorKind::Super, args: vec![] }),
            body: Some(Stmt::Block(vec![])),
            token: Token::synthetic("Derived"),
            meta: NodeMeta::default(),
        });
        let mut program = Program { items: vec![Item::Class(base), Item::Class(derived)] };
        let (ctx, _) = analyze_program(&mut program);

        let base_id = ctx.env.lookup_class("Base").unwrap();
        let Item::Class(derived) = &program.items[1] else { unreachable!() };
        assert_eq!(
            derived.constructors[0]
                .meta
                .find_tag(|t| matches!(t, Tag::PriorConstructor { .. })),
            Some(&Tag::PriorConstructor { class: base_id, ctor: 0 })
        );
    }

    #[test]
    fn test_virtual_call_and_super_call_tags() {
        let mut base = class("Base", None);
        base.methods.push(MethodDecl {
            visibility: Visibility::Public,
            is_virtual: true,
            decl: func("area", TypeExpr::named("int"), vec![], Some(Stmt::Block(vec![]))),
        });
        // a derived method body that calls (*super).area()
        let super_call = expr(
            ExprKind::MethodCall {
                object: Box::new(expr(
                    ExprKind::Dereference(Box::new(expr(ExprKind::Super, "super"))),
                    "*",
                )),
                method: "area".to_string(),
                args: vec![],
            },
            "area",
        );
        let mut derived = class("Derived", Some("Base"));
        derived.methods.push(MethodDecl {
            visibility: Visibility::Public,
            is_virtual: true,
            decl: func(
                "area",
                TypeExpr::named("int"),
                vec![],
                Some(Stmt::Block(vec![Stmt::Return {
                    value: Some(super_call),
                    token: Token::synthetic("return"),
                }])),
            ),
        });
        let mut program = Program { items: vec![Item::Class(base), Item::Class(derived)] };
        let (mut ctx, scope) = analyze_program(&mut program);

        // the super call inside Derived::area resolved statically
        let base_id = ctx.env.lookup_class("Base").unwrap();
        let Item::Class(derived_decl) = &program.items[1] else { unreachable!() };
        let Some(Stmt::Block(stmts)) = &derived_decl.methods[0].decl.body else { unreachable!() };
        let Stmt::Return { value: Some(call), .. } = &stmts[0] else { unreachable!() };
        assert_eq!(
            call.meta.find_tag(|t| matches!(t, Tag::SuperCall { .. })),
            Some(&Tag::SuperCall { class: base_id, slot: MethodSlot::Virtual(0) })
        );
        assert!(!call.meta.has_tag(&Tag::VirtualCall));

        // an outside call through a pointer dispatches virtually
        let derived_id = ctx.env.lookup_class("Derived").unwrap();
        scope
            .borrow_mut()
            .declare_variable("d", Type::pointer(Type::Class(derived_id)), false)
            .unwrap();
        let mut call = expr(
            ExprKind::MethodCall {
                object: Box::new(expr(
                    ExprKind::Dereference(Box::new(expr(ExprKind::Identifier, "d"))),
                    "*",
                )),
                method: "area".to_string(),
                args: vec![],
            },
            "area",
        );
        ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut call).unwrap();
        assert_eq!(call.meta.ty(), Some(&Type::INT));
        assert!(call.meta.has_tag(&Tag::VirtualCall));
        assert!(call.meta.has_tag(&Tag::IndirectMethodCall));
    }

    #[test]
    fn test_missing_method_falls_back_to_callable_field() {
        let mut holder = class("Holder", None);
        holder.fields.push(FieldDef {
            visibility: Visibility::Public,
            name: "cb".to_string(),
            ty: TypeExpr::FunctionPointer {
                ret: Box::new(TypeExpr::named("int")),
                params: vec![],
            },
        });
        let mut program = Program { items: vec![Item::Class(holder)] };
        let (mut ctx, scope) = analyze_program(&mut program);

        let holder_id = ctx.env.lookup_class("Holder").unwrap();
        scope
            .borrow_mut()
            .declare_variable("h", Type::Class(holder_id), false)
            .unwrap();
        let mut call = expr(
            ExprKind::MethodCall {
                object: Box::new(expr(ExprKind::Identifier, "h")),
                method: "cb".to_string(),
                args: vec![],
            },
            "cb",
        );
        ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut call).unwrap();
        assert!(call.meta.has_tag(&Tag::CompileAsFieldAccess));
        assert_eq!(call.meta.ty(), Some(&Type::INT));
    }

    #[test]
    fn test_unknown_method_reports_signature() {
        let mut program = Program { items: vec![Item::Class(class("Empty", None))] };
        let (mut ctx, scope) = analyze_program(&mut program);
        let id = ctx.env.lookup_class("Empty").unwrap();
        scope
            .borrow_mut()
            .declare_variable("e", Type::Class(id), false)
            .unwrap();
        let mut call = expr(
            ExprKind::MethodCall {
                object: Box::new(expr(ExprKind::Identifier, "e")),
                method: "missing".to_string(),
                args: vec![expr(ExprKind::Literal, "1")],
            },
            "missing",
        );
        match ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut call) {
            Err(Error::IllegalAccess { name, signature, .. }) => {
                assert_eq!(name, "missing");
                assert_eq!(signature, "(long)");
            }
            other => panic!("expected IllegalAccess, got {:?}", other),
        }
    }

    #[test]
    fn test_require_main() {
        let mut program = Program {
            items: vec![Item::Function(func(
                "helper",
                TypeExpr::named("void"),
                vec![],
                Some(Stmt::Block(vec![])),
            ))],
        };
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        let mut analyzer = ProgramAnalyzer::new(&mut ctx);
        analyzer.analyze(&mut program).unwrap();
        assert!(matches!(analyzer.require_main(), Err(Error::MissingMainFunction)));

        let mut program = Program {
            items: vec![Item::Function(func(
                "main",
                TypeExpr::named("int"),
                vec![],
                Some(Stmt::Block(vec![Stmt::Return {
                    value: Some(expr(ExprKind::Literal, "0")),
                    token: Token::synthetic("return"),
                }])),
            ))],
        };
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        let mut analyzer = ProgramAnalyzer::new(&mut ctx);
        analyzer.analyze(&mut program).unwrap();
        analyzer.require_main().unwrap();
    }

    #[test]
    fn test_declaration_type_mismatch() {
        let mut stmt = Stmt::Declaration {
            name: "p".to_string(),
            ty: TypeExpr::pointer(TypeExpr::named("int")),
            init: Some(expr(
                ExprKind::Binary {
                    op: BinaryOp::Eq,
                    lhs: Box::new(expr(ExprKind::Literal, "1")),
                    rhs: Box::new(expr(ExprKind::Literal, "2")),
                },
                "==",
            )),
            token: Token::synthetic("p"),
        };
        let mut ctx = CompilationContext::new(TypeEnvironment::new());
        let scope = Rc::new(RefCell::new(ScopeTracker::new()));
        let mut analyzer = StatementAnalyzer::new(&mut ctx, scope, Type::VOID);
        assert!(matches!(
            analyzer.analyze(&mut stmt),
            Err(Error::IncorrectType { .. })
        ));
    }

    #[test]
    fn test_generic_class_instantiation_specializes_fields() {
        // the open gap in the original: generic classes instantiate with the
        // same substitution strategy as generic functions
        let mut boxed = class("Box", None);
        boxed.fields.push(FieldDef {
            visibility: Visibility::Public,
            name: "value".to_string(),
            ty: TypeExpr::named("T"),
        });
        let mut program = Program {
            items: vec![
                Item::GenericClass(crate::frontend::ast::GenericClassDecl {
                    type_params: vec!["T".to_string()],
                    decl: boxed,
                }),
                Item::Global(Stmt::Declaration {
                    name: "b".to_string(),
                    ty: TypeExpr::pointer(TypeExpr::Generic {
                        name: "Box".to_string(),
                        args: vec![TypeExpr::named("int")],
                    }),
                    init: None,
                    token: Token::synthetic("b"),
                }),
            ],
        };
        let (mut ctx, scope) = analyze_program(&mut program);
        let id = ctx.env.lookup_class("Box__int").unwrap();
        assert_eq!(ctx.env.class(id).fields[0].ty, Type::INT);

        // the specialized field is usable like any other
        let mut access = expr(
            ExprKind::FieldAccess {
                object: Box::new(expr(
                    ExprKind::Dereference(Box::new(expr(ExprKind::Identifier, "b"))),
                    "*",
                )),
                field: "value".to_string(),
            },
            ".",
        );
        ExpressionAnalyzer::new(&mut ctx, scope).analyze(&mut access).unwrap();
        assert_eq!(access.meta.ty(), Some(&Type::INT));
    }
}
