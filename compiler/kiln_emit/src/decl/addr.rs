//! Addresses of emitted entities.
//!
//! Every `addr_of_*` helper resolves an [`EntityKey`] through the
//! [`ObjectCache`](crate::cache::ObjectCache), declaring the object on
//! first use. Variable helpers that take a definition storage type hand
//! back the defining object; without one they hand back a reference of the
//! entity's default type, adjusted to its address point where the record
//! has a header in front of it.

use kiln_ir::lowered::{
    CodeKind, FnType, FunctionId, GlobalVarId, Layout, LoweredOrigin, NativeType, Signature,
};
use kiln_ir::{ConformanceId, DeclId, DeclKind, Ty};

use super::EmitCx;
use crate::entity::{CodeRef, ConstructorKind, DestructorKind, EntityKey, ValueWitness};
use crate::error::{DeclSite, EmitError};
use crate::native::{Constant, GlobalId};

impl EmitCx<'_> {
    /// The signature the optimizer gave `origin`'s entry point.
    ///
    /// Entry points the optimizer never lowered are only referenced, never
    /// defined here, so they get `fallback`.
    fn signature_of(&self, origin: LoweredOrigin, fallback: FnType) -> Signature {
        self.lowered
            .find_function(&origin)
            .map_or_else(|| Signature::native(fallback), |f| self.lowered.function(f).signature.clone())
    }

    fn code_signature(&self, code: CodeRef, kind: CodeKind) -> Signature {
        let origin = LoweredOrigin {
            decl: code.decl,
            kind,
            uncurry_level: code.uncurry_level,
            foreign: code.foreign,
        };
        self.signature_of(origin, FnType::void())
    }

    pub fn addr_of_function(&mut self, code: CodeRef) -> GlobalId {
        let sig = self.code_signature(code, CodeKind::Func);
        self.cache.get_or_create_function(&EntityKey::Function(code), &sig)
    }

    pub fn addr_of_getter(&mut self, code: CodeRef) -> GlobalId {
        let sig = self.code_signature(code, CodeKind::Getter);
        self.cache.get_or_create_function(&EntityKey::Getter(code), &sig)
    }

    pub fn addr_of_setter(&mut self, code: CodeRef) -> GlobalId {
        let sig = self.code_signature(code, CodeKind::Setter);
        self.cache.get_or_create_function(&EntityKey::Setter(code), &sig)
    }

    pub fn addr_of_constructor(&mut self, code: CodeRef, kind: ConstructorKind) -> GlobalId {
        let code_kind = match kind {
            ConstructorKind::Allocating => CodeKind::Allocator,
            ConstructorKind::Initializing => CodeKind::Initializer,
        };
        let sig = self.code_signature(code, code_kind);
        self.cache
            .get_or_create_function(&EntityKey::Constructor(code, kind), &sig)
    }

    pub fn addr_of_destructor(&mut self, class: DeclId, kind: DestructorKind) -> GlobalId {
        let (code_kind, fallback) = match kind {
            DestructorKind::Deallocating => (
                CodeKind::Deallocator,
                FnType::new(vec![NativeType::Ptr], NativeType::Void),
            ),
            DestructorKind::Destroying => (
                CodeKind::Destroyer,
                FnType::new(vec![NativeType::Ptr], NativeType::Ptr),
            ),
        };
        let origin = LoweredOrigin {
            decl: class,
            kind: code_kind,
            uncurry_level: 0,
            foreign: false,
        };
        let sig = self.signature_of(origin, fallback);
        self.cache
            .get_or_create_function(&EntityKey::Destructor(class, kind), &sig)
    }

    pub fn addr_of_value_witness(&mut self, ty: &Ty, witness: ValueWitness) -> GlobalId {
        let key = EntityKey::ValueWitness {
            ty: ty.clone(),
            witness,
        };
        self.cache
            .get_or_create_function(&key, &Signature::native(witness.fn_type()))
    }

    pub fn addr_of_value_witness_table(&mut self, ty: &Ty, definition: Option<&NativeType>) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::ValueWitnessTable(ty.clone()),
            &NativeType::Layout(Layout::ValueWitnessTable),
            definition,
        )
    }

    /// Metadata for `ty`.
    ///
    /// Patterns and foreign-imported classes have no header. Direct class
    /// metadata is preceded by the destructor and value witness table
    /// words, other direct metadata by the value witness table word; a
    /// reference without a definition type points past them. Indirect
    /// metadata is a pointer variable and is never adjusted.
    pub fn addr_of_type_metadata(
        &mut self,
        ty: &Ty,
        indirect: bool,
        pattern: bool,
        definition: Option<&NativeType>,
    ) -> Constant {
        let foreign_class = self.foreign_imported_class(ty).filter(|_| !pattern);
        let mut layout = if pattern {
            Layout::MetadataPattern
        } else if foreign_class.is_some() {
            Layout::ForeignClass
        } else if self.is_class_type(ty) {
            Layout::FullHeapMetadata
        } else {
            Layout::FullTypeMetadata
        };
        let mut default = NativeType::Layout(layout);
        if indirect {
            default = NativeType::Ptr;
            layout = Layout::TypeMetadata;
        }

        let key = match foreign_class {
            Some(class) => EntityKey::ForeignClass(class),
            None => EntityKey::TypeMetadata {
                ty: ty.clone(),
                indirect,
                pattern,
            },
        };
        let addr = self.cache.get_or_create_variable(&key, &default, definition);

        let adjustment = layout.address_point();
        if adjustment > 0 && definition.is_none() {
            Constant::element_ptr(addr, &[0, adjustment])
        } else {
            addr
        }
    }

    fn is_class_type(&self, ty: &Ty) -> bool {
        ty.nominal_decl()
            .is_some_and(|decl| self.decls.get(decl).is_class())
    }

    /// The class declaration of `ty` when it is a non-generic class
    /// imported from the foreign runtime, which has no native metadata.
    fn foreign_imported_class(&self, ty: &Ty) -> Option<DeclId> {
        match ty {
            Ty::Nominal { decl, args } if args.is_empty() => {
                let d = self.decls.get(*decl);
                (d.is_class() && d.is_foreign_imported()).then_some(*decl)
            }
            _ => None,
        }
    }

    pub fn addr_of_nominal_type_descriptor(
        &mut self,
        decl: DeclId,
        definition: Option<&NativeType>,
    ) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::NominalTypeDescriptor(decl),
            &NativeType::Layout(Layout::NominalTypeDescriptor),
            definition,
        )
    }

    pub fn addr_of_protocol_descriptor(
        &mut self,
        decl: DeclId,
        definition: Option<&NativeType>,
    ) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::ProtocolDescriptor(decl),
            &NativeType::Layout(Layout::ProtocolDescriptor),
            definition,
        )
    }

    pub fn addr_of_foreign_class(&mut self, class: DeclId) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::ForeignClass(class),
            &NativeType::Layout(Layout::ForeignClass),
            None,
        )
    }

    pub fn addr_of_foreign_metaclass(&mut self, class: DeclId) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::ForeignMetaclass(class),
            &NativeType::Layout(Layout::ForeignClass),
            None,
        )
    }

    pub fn addr_of_metaclass_stub(&mut self, class: DeclId, definition: Option<&NativeType>) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::MetaclassStub(class),
            &NativeType::Layout(Layout::ForeignClass),
            definition,
        )
    }

    /// The metaclass of `class`: the runtime's own for classes it knows,
    /// the generated stub otherwise.
    pub fn addr_of_metaclass_object(&mut self, class: DeclId) -> Constant {
        if self.decls.get(class).is_foreign() {
            self.addr_of_foreign_metaclass(class)
        } else {
            self.addr_of_metaclass_stub(class, None)
        }
    }

    /// The class object the foreign runtime sees for `class`.
    pub fn addr_of_class_object(&mut self, class: DeclId) -> Constant {
        if self.decls.get(class).is_foreign_imported() {
            self.addr_of_foreign_class(class)
        } else {
            self.addr_of_type_metadata(&Ty::nominal(class), false, false, None)
        }
    }

    pub fn addr_of_witness_table(
        &mut self,
        conformance: ConformanceId,
        definition: Option<&NativeType>,
    ) -> Constant {
        self.cache.get_or_create_variable(
            &EntityKey::WitnessTable(conformance),
            &NativeType::Layout(Layout::WitnessTable),
            definition,
        )
    }

    /// Offset of a method's slot within its class's witness table.
    pub fn addr_of_witness_table_offset(&mut self, code: CodeRef) -> GlobalId {
        let align = self.options.pointer_align;
        self.cache.get_or_create_simple_variable(
            &EntityKey::WitnessTableOffset(code),
            &NativeType::Int(64),
            align,
        )
    }

    pub fn addr_of_field_offset(&mut self, var: DeclId, indirect: bool) -> GlobalId {
        let align = self.options.pointer_align;
        self.cache.get_or_create_simple_variable(
            &EntityKey::FieldOffset { decl: var, indirect },
            &NativeType::Int(64),
            align,
        )
    }

    /// Storage of a global variable, aligned for its type.
    pub fn addr_of_global_variable(&mut self, var: DeclId) -> Result<GlobalId, EmitError> {
        let key = EntityKey::GlobalVariable(var);
        if let Some(id) = self.cache.lookup_variable(&key) {
            return Ok(id);
        }
        let decl = self.decls.get(var);
        let DeclKind::Var(storage) = &decl.kind else {
            return Err(EmitError::invariant(
                decl.kind.describe(),
                self.decls.qualified_name(var),
                DeclSite::GlobalStorage,
            ));
        };
        let storage = &storage.storage;
        let addr = self.cache.get_or_create_variable(&key, storage, Some(storage));
        let Some(id) = addr.base_global() else {
            return Err(EmitError::invariant("var", self.decls.qualified_name(var), DeclSite::GlobalStorage));
        };
        let align = alignment_of(storage, self.options.pointer_align);
        self.cache.module_mut().set_alignment(id, align);
        Ok(id)
    }

    /// A type's mangled name as a nul-terminated constant.
    pub fn addr_of_type_mangling(&mut self, ty: &Ty) -> GlobalId {
        let key = EntityKey::TypeMangling(ty.clone());
        if let Some(id) = self.cache.lookup_variable(&key) {
            return id;
        }
        let mangled = self.cache.linker().mangler().mangle_type(ty);
        let len = u64::try_from(mangled.len()).unwrap_or(u64::MAX).saturating_add(1);
        let id = self
            .cache
            .get_or_create_simple_variable(&key, &NativeType::array(NativeType::Int(8), len), 1);
        self.cache
            .module_mut()
            .set_initializer(id, Constant::CString(mangled));
        id
    }

    pub fn addr_of_lowered_function(&mut self, id: FunctionId) -> GlobalId {
        let sig = self.lowered.function(id).signature.clone();
        self.cache
            .get_or_create_function(&EntityKey::LoweredFunction(id), &sig)
    }

    pub fn addr_of_lowered_global(&mut self, id: GlobalVarId) -> Constant {
        let storage = &self.lowered.global(id).storage;
        self.cache
            .get_or_create_variable(&EntityKey::LoweredGlobal(id), storage, None)
    }

    /// Address of a private nul-terminated copy of `s`.
    pub fn global_string(&mut self, s: &str) -> Constant {
        self.cache.global_string(s)
    }
}

/// ABI alignment in bytes.
pub(crate) fn alignment_of(ty: &NativeType, pointer_align: u32) -> u32 {
    match ty {
        NativeType::Void | NativeType::Function(_) => 1,
        NativeType::Int(bits) | NativeType::Float(bits) => u32::from(*bits).div_ceil(8).next_power_of_two(),
        NativeType::Ptr | NativeType::Layout(_) => pointer_align,
        NativeType::Struct(fields) => fields
            .iter()
            .map(|f| alignment_of(f, pointer_align))
            .max()
            .unwrap_or(1),
        NativeType::Array(elem, _) => alignment_of(elem, pointer_align),
    }
}

/// Allocation size in bytes, including trailing padding.
///
/// Runtime record layouts are opaque here and count as one pointer.
pub(crate) fn size_of(ty: &NativeType, pointer_align: u32) -> u64 {
    match ty {
        NativeType::Void | NativeType::Function(_) => 0,
        NativeType::Int(bits) | NativeType::Float(bits) => {
            u64::from(u32::from(*bits).div_ceil(8).next_power_of_two())
        }
        NativeType::Ptr | NativeType::Layout(_) => u64::from(pointer_align),
        NativeType::Struct(fields) => {
            let mut offset = 0u64;
            for field in fields {
                offset = align_to(offset, alignment_of(field, pointer_align));
                offset += size_of(field, pointer_align);
            }
            align_to(offset, alignment_of(ty, pointer_align))
        }
        NativeType::Array(elem, len) => size_of(elem, pointer_align).saturating_mul(*len),
    }
}

pub(crate) fn align_to(offset: u64, align: u32) -> u64 {
    offset.next_multiple_of(u64::from(align.max(1)))
}
