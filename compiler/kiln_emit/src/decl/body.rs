//! Lowered functions, globals and witness tables.
//!
//! The optimizer's output is copied into the native module as is: each
//! lowered instruction becomes one native instruction, with lowered
//! function and global references resolved through the cache.

use tracing::debug;

use kiln_ir::lowered::{
    Body, Callee, FunctionId, GlobalVarId, Inst, LoweredWitnessTable, NativeType, Operand,
    WitnessEntry,
};
use kiln_ir::DeclId;

use super::addr::alignment_of;
use super::EmitCx;
use crate::entity::EntityKey;
use crate::error::EmitError;
use crate::native::{Constant, FnBlock, FnBody, FnInst, GlobalId, Value};

impl EmitCx<'_> {
    /// Define the native function for a lowered function. Functions that
    /// are already defined, or that the optimizer only declared, are left
    /// alone.
    pub fn emit_lowered_function(&mut self, id: FunctionId) -> GlobalId {
        let lowered = self.lowered;
        let function = lowered.function(id);
        let global = self.addr_of_lowered_function(id);
        let Some(body) = &function.body else {
            return global;
        };
        if self
            .cache
            .module()
            .get(global)
            .is_some_and(|v| !v.is_declaration())
        {
            return global;
        }

        let body = self.translate_body(body);
        self.cache.module_mut().set_body(global, body);
        if let Some(debug) = &mut self.debug {
            debug.emit_function(global, &function.name, function.origin.map(|o| o.decl));
        }
        debug!(name = %function.name, "defined lowered function");
        global
    }

    /// Every lowered function produced from `decl`.
    pub fn emit_lowered_functions_of(&mut self, decl: DeclId) {
        let lowered = self.lowered;
        for id in lowered.functions_for_decl(decl) {
            self.emit_lowered_function(id);
        }
    }

    fn translate_body(&mut self, body: &Body) -> FnBody {
        let mut blocks = Vec::with_capacity(body.blocks.len());
        for block in &body.blocks {
            let mut insts = Vec::with_capacity(block.insts.len());
            for inst in &block.insts {
                insts.push(self.translate_inst(inst));
            }
            blocks.push(FnBlock { insts });
        }
        FnBody { blocks }
    }

    fn translate_inst(&mut self, inst: &Inst) -> FnInst {
        match inst {
            Inst::Call { callee, args } => {
                let callee = match callee {
                    Callee::Function(f) => Constant::Global(self.addr_of_lowered_function(*f)),
                    Callee::Runtime { name, ty } => {
                        Constant::Global(self.cache.runtime_function(name, ty.clone()))
                    }
                };
                let args = args.iter().map(|a| self.translate_operand(a)).collect();
                FnInst::Call {
                    callee: callee.into(),
                    args,
                }
            }
            Inst::Store { value, dest } => FnInst::Store {
                value: self.translate_operand(value),
                dest: self.translate_operand(dest),
            },
            Inst::Return(value) => FnInst::Return(value.as_ref().map(|v| self.translate_operand(v))),
            Inst::Unreachable => FnInst::Unreachable,
        }
    }

    fn translate_operand(&mut self, operand: &Operand) -> Value {
        match operand {
            Operand::Param(n) => Value::Param(*n),
            Operand::Inst(n) => Value::Inst(*n),
            Operand::Int { bits, value } => Constant::Int {
                bits: *bits,
                value: *value,
            }
            .into(),
            Operand::Null => Constant::Null.into(),
            Operand::Function(f) => Constant::Global(self.addr_of_lowered_function(*f)).into(),
            Operand::Global(g) => self.addr_of_lowered_global(*g).into(),
        }
    }

    /// Define a lowered global, zero-initialized.
    pub fn emit_lowered_global(&mut self, id: GlobalVarId) -> Option<GlobalId> {
        let lowered = self.lowered;
        let storage = &lowered.global(id).storage;
        let global = self
            .cache
            .get_or_create_variable(&EntityKey::LoweredGlobal(id), storage, Some(storage))
            .base_global()?;
        self.define_zeroed(global, storage);
        Some(global)
    }

    /// Define a source-level global variable, zero-initialized. Its initial
    /// value is stored by top-level code.
    pub fn emit_global_variable(&mut self, var: DeclId) -> Result<GlobalId, EmitError> {
        let global = self.addr_of_global_variable(var)?;
        if let Some(storage) = self.decls.get(var).as_storage() {
            self.define_zeroed(global, &storage.storage);
        }
        if let Some(debug) = &mut self.debug {
            let name = self.decls.name(self.decls.get(var).name);
            debug.emit_global_variable(name, var);
        }
        Ok(global)
    }

    fn define_zeroed(&mut self, global: GlobalId, storage: &NativeType) {
        let align = alignment_of(storage, self.options.pointer_align);
        let module = self.cache.module_mut();
        if module.get(global).is_some_and(|v| v.is_declaration()) {
            module.set_initializer(global, Constant::Zero);
        }
        module.set_alignment(global, align);
    }

    /// Define the witness table for one conformance.
    pub fn emit_witness_table(&mut self, table: &LoweredWitnessTable) -> Option<GlobalId> {
        let mut entries = Vec::with_capacity(table.entries.len());
        for entry in &table.entries {
            entries.push(match entry {
                WitnessEntry::Method(f) => Constant::Global(self.addr_of_lowered_function(*f)),
                WitnessEntry::BaseProtocol(base) => self.addr_of_witness_table(*base, None),
                WitnessEntry::Missing => Constant::Null,
            });
        }
        let len = u64::try_from(entries.len()).unwrap_or(u64::MAX);
        let storage = NativeType::array(NativeType::Ptr, len);
        let addr = self.addr_of_witness_table(table.conformance, Some(&storage));
        let global = addr.base_global()?;
        self.define_constant(global, Constant::ptr_array(entries));
        debug!(name = self.cache.module().name_of(global), "defined witness table");
        Some(global)
    }

    /// Give a declared variable its initializer, as a pointer-aligned
    /// constant.
    pub(crate) fn define_constant(&mut self, global: GlobalId, init: Constant) {
        let align = self.options.pointer_align;
        let module = self.cache.module_mut();
        module.set_constant(global, true);
        module.set_initializer(global, init);
        module.set_alignment(global, align);
    }
}
