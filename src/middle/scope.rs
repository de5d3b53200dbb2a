//! Scope and visibility tracking
//!
//! A scope is six independent mappings: lexical variables, global functions,
//! and public/internal/private member tables keyed by (owning compound,
//! name). Function and public tables are shared by reference across every
//! scope; the other tables are copied and demoted when a child scope is
//! derived. A class's scope is recorded in the per-run [`ClassScopes`] map
//! so that subclass scopes can import its internal tables later.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::Rc;

use log::trace;

use crate::types::{ClassId, CompoundRef, StructId, Type, TypeEnvironment, Visibility};
use crate::utils::{Error, Result};

// ==================== Entries ====================

/// Lifecycle of a tracker entry within one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Declared in this scope; redeclaration is an error
    New,
    /// Inherited from an enclosing scope; may be shadowed exactly once
    Old,
    /// Inherited and immutable; redeclaration is always an error
    Fixed,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub status: EntryStatus,
    pub ty: Type,
}

impl Entry {
    fn new(status: EntryStatus, ty: Type) -> Self {
        Self { status, ty }
    }
}

type MemberKey = (CompoundRef, String);
type SharedTable<K> = Rc<RefCell<HashMap<K, Entry>>>;

fn demoted<K: Clone + Eq + Hash>(map: &HashMap<K, Entry>) -> HashMap<K, Entry> {
    map.iter()
        .map(|(k, e)| {
            let mut entry = e.clone();
            if entry.status == EntryStatus::New {
                entry.status = EntryStatus::Old;
            }
            (k.clone(), entry)
        })
        .collect()
}

// ==================== Class scope registry ====================

/// Per-run map from class to its recorded scope, written once per class
#[derive(Default)]
pub struct ClassScopes {
    map: HashMap<ClassId, Rc<RefCell<ScopeTracker>>>,
}

impl ClassScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a class's scope; the first write sticks
    fn record(&mut self, class: ClassId, scope: Rc<RefCell<ScopeTracker>>) {
        self.map.entry(class).or_insert(scope);
    }

    pub fn get(&self, class: ClassId) -> Option<Rc<RefCell<ScopeTracker>>> {
        self.map.get(&class).map(Rc::clone)
    }
}

// ==================== Tracker ====================

pub struct ScopeTracker {
    // lexical, demoted on child derivation
    variables: HashMap<String, Entry>,
    // program-global, shared by reference
    functions: SharedTable<String>,
    public_fields: SharedTable<MemberKey>,
    public_methods: SharedTable<MemberKey>,
    // hierarchy-internal, demoted on child derivation
    internal_fields: HashMap<MemberKey, Entry>,
    internal_methods: HashMap<MemberKey, Entry>,
    // class-local, demoted on child derivation
    private_fields: HashMap<MemberKey, Entry>,
    private_methods: HashMap<MemberKey, Entry>,
    tracked: HashSet<CompoundRef>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
            functions: Rc::new(RefCell::new(HashMap::new())),
            public_fields: Rc::new(RefCell::new(HashMap::new())),
            public_methods: Rc::new(RefCell::new(HashMap::new())),
            internal_fields: HashMap::new(),
            internal_methods: HashMap::new(),
            private_fields: HashMap::new(),
            private_methods: HashMap::new(),
            tracked: HashSet::new(),
        }
    }

    /// Derive a child scope: lexical and internal/private entries are
    /// demoted, global tables are shared
    pub fn child(&self) -> ScopeTracker {
        ScopeTracker {
            variables: demoted(&self.variables),
            functions: Rc::clone(&self.functions),
            public_fields: Rc::clone(&self.public_fields),
            public_methods: Rc::clone(&self.public_methods),
            internal_fields: demoted(&self.internal_fields),
            internal_methods: demoted(&self.internal_methods),
            private_fields: demoted(&self.private_fields),
            private_methods: demoted(&self.private_methods),
            tracked: self.tracked.clone(),
        }
    }

    /// Derive and record the scope for a class body. Imports the
    /// superclass's internal tables from its recorded scope; the superclass
    /// must have been fully processed first.
    pub fn child_for_class(
        &self,
        owner: ClassId,
        env: &TypeEnvironment,
        scopes: &mut ClassScopes,
    ) -> Result<Rc<RefCell<ScopeTracker>>> {
        let mut child = self.child();
        if let Some(sup) = env.class(owner).superclass {
            let sup_scope = scopes.get(sup).ok_or_else(|| Error::ClassNotDefined {
                name: env.class(sup).name.clone(),
            })?;
            child.import_internals(&sup_scope.borrow());
        }
        let rc = Rc::new(RefCell::new(child));
        scopes.record(owner, Rc::clone(&rc));
        Ok(rc)
    }

    fn import_internals(&mut self, other: &ScopeTracker) {
        self.internal_fields.extend(demoted(&other.internal_fields));
        self.internal_methods.extend(demoted(&other.internal_methods));
    }

    // ==================== Variables & functions ====================

    pub fn variable_exists(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn function_exists(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    pub fn entry_exists(&self, name: &str) -> bool {
        self.variable_exists(name) || self.function_exists(name)
    }

    /// Declare a lexical variable. An existing entry may only be replaced
    /// when its status is OLD (one shadow per derived scope).
    pub fn declare_variable(&mut self, name: &str, ty: Type, fixed: bool) -> Result<()> {
        let status = if fixed { EntryStatus::Fixed } else { EntryStatus::New };
        if !self.entry_exists(name) {
            self.variables.insert(name.to_string(), Entry::new(status, ty));
            return Ok(());
        }
        let existing = if self.function_exists(name) {
            self.functions.borrow()[name].status
        } else {
            self.variables[name].status
        };
        if existing != EntryStatus::Old {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        self.variables.insert(name.to_string(), Entry::new(status, ty));
        Ok(())
    }

    /// Declare a global function; functions are never shadowable
    pub fn declare_function(&mut self, name: &str, ty: Type, fixed: bool) -> Result<()> {
        if self.function_exists(name) {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        let status = if fixed { EntryStatus::Fixed } else { EntryStatus::New };
        self.functions
            .borrow_mut()
            .insert(name.to_string(), Entry::new(status, ty));
        Ok(())
    }

    /// Look up a name, lexical variables first
    pub fn lookup(&self, name: &str) -> Option<Type> {
        if let Some(entry) = self.variables.get(name) {
            return Some(entry.ty.clone());
        }
        self.functions.borrow().get(name).map(|e| e.ty.clone())
    }

    // ==================== Members ====================

    fn visible_in(
        &self,
        owner: CompoundRef,
        name: &str,
        public: &HashMap<MemberKey, Entry>,
        internal: &HashMap<MemberKey, Entry>,
        private: &HashMap<MemberKey, Entry>,
        env: &TypeEnvironment,
    ) -> bool {
        if public.contains_key(&(owner, name.to_string())) {
            return true;
        }
        if let CompoundRef::Class(class) = owner {
            for ancestor in env.reverse_inheritance_order(class) {
                let key = (CompoundRef::Class(ancestor), name.to_string());
                if internal.contains_key(&key) || private.contains_key(&key) {
                    return true;
                }
            }
        }
        false
    }

    pub fn field_visible(&self, owner: CompoundRef, name: &str, env: &TypeEnvironment) -> bool {
        self.visible_in(
            owner,
            name,
            &self.public_fields.borrow(),
            &self.internal_fields,
            &self.private_fields,
            env,
        )
    }

    pub fn method_visible(&self, owner: CompoundRef, name: &str, env: &TypeEnvironment) -> bool {
        self.visible_in(
            owner,
            name,
            &self.public_methods.borrow(),
            &self.internal_methods,
            &self.private_methods,
            env,
        )
    }

    pub fn is_member_visible(
        &self,
        owner: CompoundRef,
        name: &str,
        is_field: bool,
        env: &TypeEnvironment,
    ) -> bool {
        if is_field {
            self.field_visible(owner, name, env)
        } else {
            self.method_visible(owner, name, env)
        }
    }

    /// Declare a member into the tier-appropriate table. Fails if a member
    /// of that name is already visible for the owner.
    pub fn declare_member(
        &mut self,
        owner: CompoundRef,
        is_field: bool,
        name: &str,
        ty: Type,
        tier: Visibility,
        env: &TypeEnvironment,
    ) -> Result<()> {
        if self.is_member_visible(owner, name, is_field, env) {
            return Err(Error::Redeclaration { name: name.to_string(), span: None });
        }
        trace!("declaring {:?} member {} on {:?}", tier, name, owner);
        let key = (owner, name.to_string());
        let entry = Entry::new(EntryStatus::New, ty);
        match (tier, is_field) {
            (Visibility::Public, true) => {
                self.public_fields.borrow_mut().insert(key, entry);
            }
            (Visibility::Public, false) => {
                self.public_methods.borrow_mut().insert(key, entry);
            }
            (Visibility::Internal, true) => {
                self.internal_fields.insert(key, entry);
            }
            (Visibility::Internal, false) => {
                self.internal_methods.insert(key, entry);
            }
            (Visibility::Private, true) => {
                self.private_fields.insert(key, entry);
            }
            (Visibility::Private, false) => {
                self.private_methods.insert(key, entry);
            }
        }
        Ok(())
    }

    /// Resolve a field on exactly this owner, gated by visibility
    pub fn field_type(
        &self,
        owner: CompoundRef,
        name: &str,
        env: &TypeEnvironment,
    ) -> Option<Type> {
        if !self.field_visible(owner, name, env) {
            return None;
        }
        let key = (owner, name.to_string());
        if let Some(entry) = self.public_fields.borrow().get(&key) {
            return Some(entry.ty.clone());
        }
        if let Some(entry) = self.internal_fields.get(&key) {
            return Some(entry.ty.clone());
        }
        self.private_fields.get(&key).map(|e| e.ty.clone())
    }

    /// Resolve a field on a class, walking the lineage from the class
    /// outward to the root
    pub fn class_field_type(
        &self,
        class: ClassId,
        name: &str,
        env: &TypeEnvironment,
    ) -> Option<Type> {
        for owner in env.lineage(class) {
            if let Some(ty) = self.field_type(CompoundRef::Class(owner), name, env) {
                return Some(ty);
            }
        }
        None
    }

    /// Resolve a method on a class in reverse-inheritance order; the
    /// most-derived declaration wins
    pub fn class_method_type(
        &self,
        class: ClassId,
        name: &str,
        env: &TypeEnvironment,
    ) -> Option<Type> {
        let mut found = None;
        for owner in env.reverse_inheritance_order(class) {
            let owner = CompoundRef::Class(owner);
            if !self.method_visible(owner, name, env) {
                continue;
            }
            let key = (owner, name.to_string());
            if let Some(entry) = self.public_methods.borrow().get(&key) {
                found = Some(entry.ty.clone());
            } else if let Some(entry) = self.internal_methods.get(&key) {
                found = Some(entry.ty.clone());
            } else if let Some(entry) = self.private_methods.get(&key) {
                found = Some(entry.ty.clone());
            }
        }
        found
    }

    // ==================== Tracked compound types ====================

    pub fn is_tracked(&self, ty: CompoundRef) -> bool {
        self.tracked.contains(&ty)
    }

    pub fn track(&mut self, ty: CompoundRef) {
        self.tracked.insert(ty);
    }

    /// Register a plain struct's fields as public members, recursively
    /// registering nested compound-typed fields exactly once
    pub fn register_compound(&mut self, id: StructId, env: &TypeEnvironment) -> Result<()> {
        let fields = env.struct_def(id).fields.clone();
        for (fname, fty) in fields {
            self.declare_member(
                CompoundRef::Struct(id),
                true,
                &fname,
                fty.clone(),
                Visibility::Public,
                env,
            )?;
            if let Type::Struct(nested) = fty.unwrap_all(env) {
                let nested = *nested;
                if !self.is_tracked(CompoundRef::Struct(nested)) {
                    self.track(CompoundRef::Struct(nested));
                    self.register_compound(nested, env)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}
