//! Entity to native object cache.
//!
//! [`ObjectCache`] maps each [`EntityKey`] to the one native object that
//! represents it. Lookups are idempotent: asking twice returns the same
//! object. Forward references create declarations that a later definition
//! upgrades in place, and symbol collisions with unrelated objects are
//! diagnosed and resolved by renaming.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use kiln_diagnostic::{Diagnostic, DiagnosticSink, ErrorCode};
use kiln_ir::lowered::{CallConv, FnType, NativeType, Signature};

use crate::entity::EntityKey;
use crate::linkage::{LinkInfo, Linkage, Linker, Visibility};
use crate::native::{Constant, GlobalId, GlobalValue, NativeModule};

/// Function or variable.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ObjectKind {
    Function,
    Variable,
}

/// One row of the final symbol table.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SymbolEntry {
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub kind: ObjectKind,
    pub defined: bool,
}

pub struct ObjectCache<'a> {
    linker: Linker<'a>,
    module: NativeModule,
    functions: FxHashMap<EntityKey, GlobalId>,
    variables: FxHashMap<EntityKey, GlobalId>,
    /// Interned C strings by contents.
    strings: FxHashMap<String, Constant>,
    /// Every object created through the cache, in creation order.
    created: Vec<GlobalId>,
    /// Declarations replaced by a definition, mapped to the live object.
    forwarded: FxHashMap<GlobalId, GlobalId>,
    diagnostics: DiagnosticSink,
}

impl<'a> ObjectCache<'a> {
    pub fn new(linker: Linker<'a>, module: NativeModule) -> Self {
        ObjectCache {
            linker,
            module,
            functions: FxHashMap::default(),
            variables: FxHashMap::default(),
            strings: FxHashMap::default(),
            created: Vec::new(),
            forwarded: FxHashMap::default(),
            diagnostics: DiagnosticSink::new(),
        }
    }

    pub fn linker(&self) -> &Linker<'a> {
        &self.linker
    }

    pub fn module(&self) -> &NativeModule {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut NativeModule {
        &mut self.module
    }

    pub fn link_info(&self, key: &EntityKey) -> LinkInfo {
        self.linker.link_info(key)
    }

    /// The function already created for `key`, if any.
    pub fn lookup_function(&self, key: &EntityKey) -> Option<GlobalId> {
        self.functions.get(key).copied()
    }

    /// The variable already created for `key`, if any.
    pub fn lookup_variable(&self, key: &EntityKey) -> Option<GlobalId> {
        self.variables.get(key).copied()
    }

    /// The function for `key`, declaring it on first use.
    pub fn get_or_create_function(&mut self, key: &EntityKey, sig: &Signature) -> GlobalId {
        if let Some(&id) = self.functions.get(key) {
            return id;
        }
        let info = self.link_info(key);
        let id = self.create_function(&info, sig);
        self.functions.insert(key.clone(), id);
        id
    }

    /// Declare a function with exactly `info`'s name.
    ///
    /// An existing function of the same name and type is reused. Any other
    /// object holding the name is renamed out of the way and the collision
    /// reported.
    pub fn create_function(&mut self, info: &LinkInfo, sig: &Signature) -> GlobalId {
        if let Some(existing) = self.module.lookup(&info.name) {
            if self.module.get(existing).and_then(GlobalValue::fn_type) == Some(&sig.ty) {
                return existing;
            }
            self.report_collision(ErrorCode::E4001, "function", existing, &info.name);
        }
        let id = self
            .module
            .add_function(info.name.as_str(), info.linkage, info.visibility, sig.clone());
        debug!(name = %info.name, linkage = %info.linkage, "created function");
        self.created.push(id);
        id
    }

    /// Declare a variable with exactly `info`'s name. Collisions are handled
    /// as in [`ObjectCache::create_function`], except that a variable is
    /// never reused.
    pub fn create_variable(&mut self, info: &LinkInfo, storage: &NativeType) -> GlobalId {
        if let Some(existing) = self.module.lookup(&info.name) {
            self.report_collision(ErrorCode::E4002, "variable", existing, &info.name);
        }
        let id = self
            .module
            .add_variable(info.name.as_str(), info.linkage, info.visibility, storage.clone());
        debug!(name = %info.name, linkage = %info.linkage, %storage, "created variable");
        self.created.push(id);
        id
    }

    fn report_collision(&mut self, code: ErrorCode, what: &str, existing: GlobalId, name: &str) {
        warn!(name, "{what} collides with existing symbol");
        let _ = self.diagnostics.emit_error(Diagnostic::error(code).with_message(format!(
            "program too clever: {what} collides with existing symbol {name}"
        )));
        self.module.set_name(existing, &format!("{name}.unique"));
    }

    /// The variable for `key`.
    ///
    /// Without a `definition`, an existing variable is returned, cast to
    /// `default` if its storage differs, and a new one is declared with
    /// `default` storage. With a `definition`, an existing variable of that
    /// storage is reused; one of any other storage is replaced by a new
    /// variable and every reference to it is rewritten.
    pub fn get_or_create_variable(
        &mut self,
        key: &EntityKey,
        default: &NativeType,
        definition: Option<&NativeType>,
    ) -> Constant {
        let existing = self.variables.get(key).copied();
        if let Some(old) = existing {
            let storage = self.module.get(old).and_then(GlobalValue::storage);
            match definition {
                Some(def) if storage == Some(def) => return Constant::Global(old),
                Some(_) => self.module.set_name(old, ""),
                None if storage == Some(default) => return Constant::Global(old),
                None => return Constant::cast(Constant::Global(old), default.clone()),
            }
        }

        let info = self.link_info(key);
        let id = self.create_variable(&info, definition.unwrap_or(default));
        if let Some(old) = existing {
            debug!(name = %info.name, "upgrading declaration to definition");
            self.module.replace_all_uses(old, &Constant::Global(id));
            self.module.erase(old);
            self.created.retain(|&c| c != old);
            for target in self.forwarded.values_mut() {
                if *target == old {
                    *target = id;
                }
            }
            self.forwarded.insert(old, id);
        }
        self.variables.insert(key.clone(), id);
        Constant::Global(id)
    }

    /// `value` with references to replaced declarations pointed at their
    /// definitions. Constants held outside the module, such as list
    /// entries, go through this before they are written out.
    pub fn resolve(&self, value: &Constant) -> Constant {
        let mut value = value.clone();
        for (&old, &new) in &self.forwarded {
            if value.mentions(old) {
                value.replace_uses(old, &Constant::Global(new));
            }
        }
        value
    }

    /// A constant variable for `key` with the given alignment.
    pub fn get_or_create_simple_variable(
        &mut self,
        key: &EntityKey,
        storage: &NativeType,
        alignment: u32,
    ) -> GlobalId {
        if let Some(&id) = self.variables.get(key) {
            return id;
        }
        let info = self.link_info(key);
        let id = self.create_variable(&info, storage);
        self.module.set_constant(id, true);
        self.module.set_alignment(id, alignment);
        self.variables.insert(key.clone(), id);
        id
    }

    /// Address of the first byte of a private, nul-terminated copy of `s`.
    /// Equal strings share one object.
    pub fn global_string(&mut self, s: &str) -> Constant {
        if let Some(c) = self.strings.get(s) {
            return c.clone();
        }
        let len = u64::try_from(s.len()).unwrap_or(u64::MAX).saturating_add(1);
        let storage = NativeType::array(NativeType::Int(8), len);
        let id = self
            .module
            .add_variable(".str", Linkage::Private, Visibility::Default, storage);
        self.module.set_constant(id, true);
        self.module.set_initializer(id, Constant::CString(s.to_string()));
        self.created.push(id);
        let address = Constant::element_ptr(Constant::Global(id), &[0, 0]);
        self.strings.insert(s.to_string(), address.clone());
        address
    }

    /// A runtime entry point with the platform C convention.
    pub fn runtime_function(&mut self, name: &str, ty: FnType) -> GlobalId {
        if let Some(id) = self.module.lookup(name) {
            if self.module.get(id).is_some_and(GlobalValue::is_function) {
                return id;
            }
        }
        self.create_function(&LinkInfo::external(name), &Signature::new(ty, CallConv::C))
    }

    /// An internal-use object that no entity key refers to, such as a
    /// side-table array or a category record.
    pub fn add_private_variable(
        &mut self,
        name: &str,
        linkage: Linkage,
        storage: NativeType,
        initializer: Constant,
    ) -> GlobalId {
        let id = self
            .module
            .add_variable(name, linkage, Visibility::Default, storage);
        self.module.set_initializer(id, initializer);
        debug!(name = self.module.name_of(id), "created private variable");
        self.created.push(id);
        id
    }

    /// An internal-use function that no entity key refers to.
    pub fn add_private_function(&mut self, info: &LinkInfo, sig: Signature) -> GlobalId {
        let id = self
            .module
            .add_function(info.name.as_str(), info.linkage, info.visibility, sig);
        debug!(name = self.module.name_of(id), "created function");
        self.created.push(id);
        id
    }

    /// Remove an object created through the cache.
    pub fn erase(&mut self, id: GlobalId) {
        self.module.erase(id);
        self.created.retain(|&c| c != id);
        self.functions.retain(|_, v| *v != id);
        self.variables.retain(|_, v| *v != id);
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    /// The finished module, its symbol table, and collision diagnostics.
    pub fn finish(self) -> (NativeModule, Vec<SymbolEntry>, DiagnosticSink) {
        let symbols = self
            .created
            .iter()
            .filter_map(|&id| self.module.get(id))
            .filter(|value| !value.name.is_empty())
            .map(|value| SymbolEntry {
                name: value.name.clone(),
                linkage: value.linkage,
                visibility: value.visibility,
                kind: if value.is_function() {
                    ObjectKind::Function
                } else {
                    ObjectKind::Variable
                },
                defined: !value.is_declaration(),
            })
            .collect();
        (self.module, symbols, self.diagnostics)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]
mod tests;
