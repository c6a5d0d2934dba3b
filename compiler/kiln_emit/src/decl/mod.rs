//! Declaration emission.
//!
//! [`EmitCx`] holds the per-module emission state: the object cache, the
//! side-table lists and the optional debug info. Declarations are
//! dispatched on their [`DeclKind`]; kinds that upstream phases must have
//! removed from a position are reported as [`EmitError`]s rather than
//! skipped.

mod addr;
mod body;
mod metadata;

use tracing::{debug, trace};

use kiln_ir::lowered::LoweredModule;
use kiln_ir::{DeclId, DeclKind, DeclTable};
use kiln_request::{Evaluator, ExtendedNominalRequest};

use crate::cache::ObjectCache;
use crate::debug::DebugInfo;
use crate::error::{DeclSite, EmitError};
use crate::lists::GlobalLists;
use crate::options::EmitOptions;

pub use metadata::MetadataKind;

/// Emission state for one module.
pub struct EmitCx<'a> {
    pub(crate) decls: &'a DeclTable,
    pub(crate) lowered: &'a LoweredModule,
    pub(crate) evaluator: &'a Evaluator<'a>,
    pub(crate) options: &'a EmitOptions,
    pub(crate) cache: ObjectCache<'a>,
    pub(crate) lists: GlobalLists,
    pub(crate) debug: Option<DebugInfo>,
}

impl<'a> EmitCx<'a> {
    pub fn new(
        evaluator: &'a Evaluator<'a>,
        lowered: &'a LoweredModule,
        options: &'a EmitOptions,
        cache: ObjectCache<'a>,
    ) -> Self {
        EmitCx {
            decls: evaluator.decls(),
            lowered,
            evaluator,
            options,
            cache,
            lists: GlobalLists::new(),
            debug: options.debug_info.then(DebugInfo::new),
        }
    }

    pub fn cache(&self) -> &ObjectCache<'a> {
        &self.cache
    }

    pub fn lists(&self) -> &GlobalLists {
        &self.lists
    }

    pub fn debug_info(&self) -> Option<&DebugInfo> {
        self.debug.as_ref()
    }

    pub fn into_parts(self) -> (ObjectCache<'a>, GlobalLists, Option<DebugInfo>) {
        (self.cache, self.lists, self.debug)
    }

    fn invariant(&self, decl: DeclId, site: DeclSite) -> EmitError {
        EmitError::invariant(
            self.decls.get(decl).kind.describe(),
            self.decls.qualified_name(decl),
            site,
        )
    }

    /// Emit one top-level declaration of a source file.
    pub fn emit_global_decl(&mut self, id: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        let decl = decls.get(id);
        trace!(decl = %decls.qualified_name(id), kind = decl.kind.describe(), "emitting declaration");
        match &decl.kind {
            DeclKind::Extension(_) => self.emit_extension(id),
            DeclKind::Protocol(_) | DeclKind::Enum(_) | DeclKind::Struct(_) | DeclKind::Class(_) => {
                self.emit_type_decl(id)
            }
            DeclKind::Func(_) | DeclKind::Constructor(_) => self.emit_local_decls(id),
            DeclKind::Import { path } => {
                if let Some(debug) = &mut self.debug {
                    debug.emit_import(path.iter().map(|&n| decls.name(n).to_string()).collect());
                }
                Ok(())
            }
            // Storage and initialization of globals come from the lowered
            // module; the rest has no code of its own.
            DeclKind::PatternBinding { .. }
            | DeclKind::Var(_)
            | DeclKind::TopLevelCode
            | DeclKind::TypeAlias { .. }
            | DeclKind::GenericTypeParam { .. }
            | DeclKind::AssociatedType { .. }
            | DeclKind::InfixOperator
            | DeclKind::PrefixOperator
            | DeclKind::PostfixOperator => Ok(()),
            DeclKind::Subscript(_)
            | DeclKind::EnumCase { .. }
            | DeclKind::EnumElement { .. }
            | DeclKind::Destructor => Err(self.invariant(id, DeclSite::ModuleScope)),
        }
    }

    /// Emit the members of a nominal type.
    pub fn emit_members(&mut self, owner: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        for &member in decls.get(owner).members() {
            match &decls.get(member).kind {
                DeclKind::Struct(_) | DeclKind::Enum(_) | DeclKind::Class(_) => {
                    self.emit_type_decl(member)?;
                }
                DeclKind::Func(_) | DeclKind::Constructor(_) => self.emit_local_decls(member)?,
                // Accessors, destructors and payload constructors.
                DeclKind::Var(_)
                | DeclKind::Subscript(_)
                | DeclKind::Destructor
                | DeclKind::EnumElement { .. } => self.emit_lowered_functions_of(member),
                DeclKind::PatternBinding { .. }
                | DeclKind::EnumCase { .. }
                | DeclKind::TypeAlias { .. }
                | DeclKind::GenericTypeParam { .. }
                | DeclKind::AssociatedType { .. } => {}
                DeclKind::Protocol(_)
                | DeclKind::Extension(_)
                | DeclKind::Import { .. }
                | DeclKind::TopLevelCode
                | DeclKind::InfixOperator
                | DeclKind::PrefixOperator
                | DeclKind::PostfixOperator => {
                    return Err(self.invariant(member, DeclSite::TypeMember));
                }
            }
        }
        Ok(())
    }

    /// Emit a function's lowered entry points and the types declared in
    /// its body.
    pub fn emit_local_decls(&mut self, func: DeclId) -> Result<(), EmitError> {
        self.emit_lowered_functions_of(func);
        let decls = self.decls;
        let Some(body) = decls.get(func).as_func() else {
            return Ok(());
        };
        for &local in &body.locals {
            match &decls.get(local).kind {
                DeclKind::Struct(_) | DeclKind::Enum(_) | DeclKind::Class(_) => {
                    self.emit_type_decl(local)?;
                }
                DeclKind::Func(_) | DeclKind::Constructor(_) => self.emit_local_decls(local)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Emit an extension's members, and a category when the foreign
    /// runtime needs to see them.
    pub fn emit_extension(&mut self, ext: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        for &member in decls.get(ext).members() {
            let decl = decls.get(member);
            match &decl.kind {
                DeclKind::Struct(_) | DeclKind::Enum(_) | DeclKind::Class(_) => {
                    self.emit_type_decl(member)?;
                }
                DeclKind::Func(_) | DeclKind::Constructor(_) => self.emit_local_decls(member)?,
                // Accessors are emitted with the rest of the lowered module.
                DeclKind::Var(_) if decl.is_computed() => {}
                DeclKind::Subscript(_)
                | DeclKind::PatternBinding { .. }
                | DeclKind::TypeAlias { .. }
                | DeclKind::GenericTypeParam { .. }
                | DeclKind::AssociatedType { .. } => {}
                DeclKind::Var(_)
                | DeclKind::Import { .. }
                | DeclKind::EnumCase { .. }
                | DeclKind::EnumElement { .. }
                | DeclKind::TopLevelCode
                | DeclKind::Protocol(_)
                | DeclKind::Extension(_)
                | DeclKind::Destructor
                | DeclKind::InfixOperator
                | DeclKind::PrefixOperator
                | DeclKind::PostfixOperator => {
                    return Err(self.invariant(member, DeclSite::Extension));
                }
            }
        }

        if !self.options.foreign_interop {
            return Ok(());
        }
        let Some(class) = self.evaluator.get(ExtendedNominalRequest { ext }) else {
            return Ok(());
        };
        if !decls.get(class).is_class() || !self.extension_needs_category(ext, class) {
            return Ok(());
        }
        let category = self.emit_category_data(ext, class);
        debug!(class = %decls.qualified_name(class), "emitted category");
        self.lists.add_category(category, ext);
        Ok(())
    }

    /// Emit what this module must provide for a declaration of another
    /// module.
    pub fn emit_external_definition(&mut self, id: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        match &decls.get(id).kind {
            DeclKind::Func(_) | DeclKind::Constructor(_) => self.emit_local_decls(id),
            DeclKind::Struct(_) | DeclKind::Enum(_) => {
                self.emit_value_type_metadata(id);
                Ok(())
            }
            // Foreign classes bring their own class objects.
            DeclKind::Class(_) => Ok(()),
            DeclKind::Protocol(_) => {
                self.emit_protocol_descriptor(id);
                Ok(())
            }
            DeclKind::Extension(_)
            | DeclKind::PatternBinding { .. }
            | DeclKind::EnumCase { .. }
            | DeclKind::EnumElement { .. }
            | DeclKind::TopLevelCode
            | DeclKind::TypeAlias { .. }
            | DeclKind::GenericTypeParam { .. }
            | DeclKind::AssociatedType { .. }
            | DeclKind::Var(_)
            | DeclKind::Import { .. }
            | DeclKind::Subscript(_)
            | DeclKind::Destructor
            | DeclKind::InfixOperator
            | DeclKind::PrefixOperator
            | DeclKind::PostfixOperator => Err(self.invariant(id, DeclSite::ExternalDefinition)),
        }
    }

    /// Emit everything the lowered module holds: global storage, lowered
    /// globals and functions, witness tables, and the module's external
    /// definitions.
    pub fn emit_global_top_level(&mut self) -> Result<(), EmitError> {
        let lowered = self.lowered;
        for &var in &lowered.global_vars {
            self.emit_global_variable(var)?;
        }
        for id in lowered.global_ids() {
            self.emit_lowered_global(id);
        }
        for id in lowered.function_ids() {
            self.emit_lowered_function(id);
        }
        if self.options.emit_witness_tables {
            for table in &lowered.witness_tables {
                self.emit_witness_table(table);
            }
        }
        if let Some(debug) = &mut self.debug {
            debug.emit_import(vec![self.options.stdlib_module.clone()]);
        }
        for &def in &lowered.external_definitions {
            self.emit_external_definition(def)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for concise assertions")]
mod tests;
