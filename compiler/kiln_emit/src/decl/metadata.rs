//! Type metadata records.
//!
//! Record layouts, all pointer-aligned constants unless noted:
//!
//! ```text
//! nominal type descriptor  { i64 kind, ptr mangled name, i32 fields, i32 generic params }
//! protocol descriptor      { ptr mangled name, i32 flags, i32 requirements }
//! value metadata           { ptr value witnesses, i64 kind, ptr descriptor }
//!                            ^ address point after the first word
//! class metadata           { ptr destructor, ptr value witnesses, i64 kind,
//!                            ptr superclass, ptr descriptor }
//!                            ^ address point after the first two words
//! metadata pattern         { ptr descriptor, ptr superclass, i64 generic params }
//! metaclass stub           { ptr isa, ptr superclass, ptr cache, ptr vtable, ptr data }  (mutable)
//! ```

use tracing::debug;

use kiln_ir::lowered::NativeType;
use kiln_ir::{BuiltinTy, DeclId, DeclKind, Ty};
use kiln_request::SuperclassDeclRequest;

use super::addr::{align_to, alignment_of, size_of};
use super::EmitCx;
use crate::entity::{DestructorKind, ValueWitness};
use crate::error::EmitError;
use crate::native::{BodyBuilder, Constant, GlobalId, Value};

/// Protocol descriptor flag: the protocol is known to the foreign runtime.
const PROTOCOL_FLAG_FOREIGN: i32 = 1;

/// Object header words in front of the first stored property.
const HEAP_OBJECT_HEADER_WORDS: u64 = 2;

/// Metadata kind word.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(i64)]
pub enum MetadataKind {
    Class = 0,
    Struct = 1,
    Enum = 2,
}

impl MetadataKind {
    fn of(kind: &DeclKind) -> Option<Self> {
        match kind {
            DeclKind::Class(_) => Some(MetadataKind::Class),
            DeclKind::Struct(_) => Some(MetadataKind::Struct),
            DeclKind::Enum(_) => Some(MetadataKind::Enum),
            _ => None,
        }
    }

    fn word(self) -> Constant {
        Constant::i64(self as i64)
    }
}

fn descriptor_type() -> NativeType {
    NativeType::Struct(vec![
        NativeType::Int(64),
        NativeType::Ptr,
        NativeType::Int(32),
        NativeType::Int(32),
    ])
}

fn pattern_type() -> NativeType {
    NativeType::Struct(vec![NativeType::Ptr, NativeType::Ptr, NativeType::Int(64)])
}

/// Runtime implementation of a witness for plain-old-data types.
fn pod_witness_symbol(witness: ValueWitness) -> &'static str {
    match witness {
        ValueWitness::AllocateBuffer => "kiln_pod_allocateBuffer",
        ValueWitness::AssignWithCopy => "kiln_pod_assignWithCopy",
        ValueWitness::AssignWithTake => "kiln_pod_assignWithTake",
        ValueWitness::DeallocateBuffer => "kiln_pod_deallocateBuffer",
        ValueWitness::Destroy => "kiln_pod_destroy",
        ValueWitness::DestroyBuffer => "kiln_pod_destroyBuffer",
        ValueWitness::InitializeBufferWithCopyOfBuffer => "kiln_pod_initializeBufferWithCopyOfBuffer",
        ValueWitness::InitializeBufferWithCopy => "kiln_pod_initializeBufferWithCopy",
        ValueWitness::InitializeWithCopy => "kiln_pod_initializeWithCopy",
        ValueWitness::InitializeBufferWithTake => "kiln_pod_initializeBufferWithTake",
        ValueWitness::InitializeWithTake => "kiln_pod_initializeWithTake",
        ValueWitness::ProjectBuffer => "kiln_pod_projectBuffer",
        ValueWitness::TypeOf => "kiln_pod_typeOf",
    }
}

impl EmitCx<'_> {
    /// Emit a struct, enum, class or protocol and its members.
    pub fn emit_type_decl(&mut self, decl: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        debug!(decl = %decls.qualified_name(decl), "emitting type");
        match &decls.get(decl).kind {
            DeclKind::Struct(_) | DeclKind::Enum(_) => self.emit_value_type(decl),
            DeclKind::Class(_) => self.emit_class(decl),
            DeclKind::Protocol(_) => {
                self.emit_protocol_descriptor(decl);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn emit_value_type(&mut self, decl: DeclId) -> Result<(), EmitError> {
        self.emit_value_type_metadata(decl);
        self.emit_members(decl)
    }

    /// Descriptor and metadata of a struct or enum, without its members.
    /// Used for external definitions too.
    pub fn emit_value_type_metadata(&mut self, decl: DeclId) {
        let decls = self.decls;
        let Some(nominal) = decls.get(decl).as_nominal() else {
            return;
        };
        let kind = MetadataKind::of(&decls.get(decl).kind).unwrap_or(MetadataKind::Struct);
        let descriptor = self.emit_nominal_type_descriptor(decl);
        if nominal.is_generic() {
            self.emit_metadata_pattern(decl, descriptor, Constant::Null);
            return;
        }

        let ty = decls.declared_type(decl);
        let witnesses = self.emit_value_witness_table(&ty);
        let storage = NativeType::Struct(vec![NativeType::Ptr, NativeType::Int(64), NativeType::Ptr]);
        let addr = self.addr_of_type_metadata(&ty, false, false, Some(&storage));
        if let Some(global) = addr.base_global() {
            self.define_constant(global, Constant::Struct(vec![witnesses, kind.word(), descriptor]));
        }
    }

    pub fn emit_nominal_type_descriptor(&mut self, decl: DeclId) -> Constant {
        let decls = self.decls;
        let kind = MetadataKind::of(&decls.get(decl).kind).unwrap_or(MetadataKind::Struct);
        let (fields, params) = decls.get(decl).as_nominal().map_or((0, 0), |n| {
            let fields = n
                .members
                .iter()
                .filter(|&&m| is_stored_property(self, m))
                .count();
            (fields, n.generic_params.len())
        });
        let name = self.addr_of_type_mangling(&decls.declared_type(decl));

        let storage = descriptor_type();
        let addr = self.addr_of_nominal_type_descriptor(decl, Some(&storage));
        if let Some(global) = addr.base_global() {
            self.define_constant(
                global,
                Constant::Struct(vec![
                    kind.word(),
                    Constant::Global(name),
                    Constant::i32(i32::try_from(fields).unwrap_or(i32::MAX)),
                    Constant::i32(i32::try_from(params).unwrap_or(i32::MAX)),
                ]),
            );
        }
        addr
    }

    fn emit_metadata_pattern(&mut self, decl: DeclId, descriptor: Constant, superclass: Constant) {
        let params = self
            .decls
            .get(decl)
            .as_nominal()
            .map_or(0, |n| n.generic_params.len());
        let ty = self.decls.declared_type(decl);
        let addr = self.addr_of_type_metadata(&ty, false, true, Some(&pattern_type()));
        if let Some(global) = addr.base_global() {
            self.define_constant(
                global,
                Constant::Struct(vec![
                    descriptor,
                    superclass,
                    Constant::i64(i64::try_from(params).unwrap_or(i64::MAX)),
                ]),
            );
        }
    }

    fn emit_value_witness_table(&mut self, ty: &Ty) -> Constant {
        let mut entries = Vec::with_capacity(ValueWitness::ALL.len());
        for witness in ValueWitness::ALL {
            entries.push(Constant::Global(self.emit_value_witness(ty, witness)));
        }
        let len = u64::try_from(entries.len()).unwrap_or(u64::MAX);
        let storage = NativeType::array(NativeType::Ptr, len);
        let addr = self.addr_of_value_witness_table(ty, Some(&storage));
        if let Some(global) = addr.base_global() {
            self.define_constant(global, Constant::ptr_array(entries));
        }
        addr
    }

    /// A value witness that forwards to the runtime's plain-old-data
    /// implementation.
    fn emit_value_witness(&mut self, ty: &Ty, witness: ValueWitness) -> GlobalId {
        let function = self.addr_of_value_witness(ty, witness);
        if self
            .cache
            .module()
            .get(function)
            .is_some_and(|v| !v.is_declaration())
        {
            return function;
        }
        let fn_ty = witness.fn_type();
        let returns = fn_ty.ret != NativeType::Void;
        let params = (0..u32::try_from(fn_ty.params.len()).unwrap_or(0))
            .map(Value::Param)
            .collect();
        let runtime = self.cache.runtime_function(pod_witness_symbol(witness), fn_ty);

        let mut body = BodyBuilder::new();
        let result = body.call(Constant::Global(runtime), params);
        let body = body.ret(returns.then_some(result));
        self.cache.module_mut().set_body(function, body);
        function
    }

    fn emit_class(&mut self, decl: DeclId) -> Result<(), EmitError> {
        let decls = self.decls;
        let generic = decls.get(decl).as_nominal().is_some_and(|n| n.is_generic());
        let descriptor = self.emit_nominal_type_descriptor(decl);
        let superclass = self.evaluator.get(SuperclassDeclRequest { decl });
        let super_metadata = match superclass {
            Some(sup) => self.addr_of_type_metadata(&Ty::nominal(sup), false, false, None),
            None => Constant::Null,
        };

        let ty = decls.declared_type(decl);
        if generic {
            self.emit_metadata_pattern(decl, descriptor, super_metadata);
        } else {
            let destructor = self.addr_of_destructor(decl, DestructorKind::Deallocating);
            let witnesses = self
                .addr_of_value_witness_table(&Ty::Builtin(BuiltinTy::NativeObject), None);
            let storage = NativeType::Struct(vec![
                NativeType::Ptr,
                NativeType::Ptr,
                NativeType::Int(64),
                NativeType::Ptr,
                NativeType::Ptr,
            ]);
            let addr = self.addr_of_type_metadata(&ty, false, false, Some(&storage));
            if let Some(global) = addr.base_global() {
                self.define_constant(
                    global,
                    Constant::Struct(vec![
                        Constant::Global(destructor),
                        witnesses,
                        MetadataKind::Class.word(),
                        super_metadata,
                        descriptor,
                    ]),
                );
            }
        }
        self.emit_field_offsets(decl, generic);

        if self.options.foreign_interop && !generic {
            self.emit_metaclass_stub(decl, superclass);
            let class_object = self.addr_of_type_metadata(&ty, false, false, None);
            self.lists.add_foreign_class(class_object);
        }
        self.emit_members(decl)
    }

    /// Offsets of a class's stored properties from the start of the
    /// object. A generic class's offsets depend on its arguments and are
    /// written by the runtime when the metadata is instantiated.
    fn emit_field_offsets(&mut self, class: DeclId, indirect: bool) {
        let decls = self.decls;
        let pointer_align = self.options.pointer_align;
        let mut offset = HEAP_OBJECT_HEADER_WORDS * u64::from(pointer_align);
        for &member in decls.get(class).members() {
            if !is_stored_property(self, member) {
                continue;
            }
            let Some(storage) = decls.get(member).as_storage().map(|s| &s.storage) else {
                continue;
            };
            offset = align_to(offset, alignment_of(storage, pointer_align));
            let global = self.addr_of_field_offset(member, indirect);
            let module = self.cache.module_mut();
            if indirect {
                module.set_constant(global, false);
                module.set_initializer(global, Constant::Zero);
            } else {
                module.set_initializer(global, Constant::i64(i64::try_from(offset).unwrap_or(i64::MAX)));
            }
            offset += size_of(storage, pointer_align);
        }
    }

    /// The metaclass generated for a native class exposed to the foreign
    /// runtime. The runtime fills in everything but the superclass link.
    fn emit_metaclass_stub(&mut self, class: DeclId, superclass: Option<DeclId>) {
        let super_metaclass = match superclass {
            Some(sup) => self.addr_of_metaclass_object(sup),
            None => Constant::Null,
        };
        let storage = NativeType::Struct(vec![NativeType::Ptr; 5]);
        let addr = self.addr_of_metaclass_stub(class, Some(&storage));
        let Some(global) = addr.base_global() else {
            return;
        };
        let align = self.options.pointer_align;
        let module = self.cache.module_mut();
        module.set_initializer(
            global,
            Constant::Struct(vec![
                Constant::Null,
                super_metaclass,
                Constant::Null,
                Constant::Null,
                Constant::Null,
            ]),
        );
        module.set_alignment(global, align);
    }

    pub fn emit_protocol_descriptor(&mut self, decl: DeclId) -> Constant {
        let decls = self.decls;
        let protocol = decls.get(decl);
        let flags = if protocol.is_foreign() {
            PROTOCOL_FLAG_FOREIGN
        } else {
            0
        };
        let requirements = i32::try_from(protocol.members().len()).unwrap_or(i32::MAX);
        let name = self.addr_of_type_mangling(&decls.declared_type(decl));

        let storage = NativeType::Struct(vec![NativeType::Ptr, NativeType::Int(32), NativeType::Int(32)]);
        let addr = self.addr_of_protocol_descriptor(decl, Some(&storage));
        if let Some(global) = addr.base_global() {
            self.define_constant(
                global,
                Constant::Struct(vec![
                    Constant::Global(name),
                    Constant::i32(flags),
                    Constant::i32(requirements),
                ]),
            );
        }
        addr
    }
}

/// An instance property with its own storage.
fn is_stored_property(cx: &EmitCx<'_>, member: DeclId) -> bool {
    let decl = cx.decls.get(member);
    matches!(decl.kind, DeclKind::Var(_)) && !decl.is_computed() && !decl.is_static()
}
