//! Identity of emitted objects.
//!
//! An [`EntityKey`] names "the thing to emit": a function entry point, a
//! metadata record, a witness table. Two keys are equal exactly when they
//! denote the same native object, so the key doubles as the cache key for
//! [`ObjectCache`](crate::cache::ObjectCache) and as the input to symbol
//! naming and linkage classification.

use kiln_ir::lowered::{FnType, FunctionId, GlobalVarId, NativeType};
use kiln_ir::{ConformanceId, DeclId, Ty};

/// How many values a function's arguments and results are split into.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Explosion {
    /// Aggregates are passed indirectly.
    #[default]
    Minimal,
    /// Aggregates are flattened into their scalar fields.
    Maximal,
}

/// A reference to one entry point of a declaration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CodeRef {
    pub decl: DeclId,
    pub explosion: Explosion,
    pub uncurry_level: u32,
    /// The foreign-runtime entry point rather than the native one.
    pub foreign: bool,
}

impl CodeRef {
    pub fn new(decl: DeclId, explosion: Explosion, uncurry_level: u32) -> Self {
        CodeRef {
            decl,
            explosion,
            uncurry_level,
            foreign: false,
        }
    }

    /// Minimal explosion at the given uncurry level.
    pub fn minimal(decl: DeclId, uncurry_level: u32) -> Self {
        Self::new(decl, Explosion::Minimal, uncurry_level)
    }

    #[must_use]
    pub fn as_foreign(mut self) -> Self {
        self.foreign = true;
        self
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ConstructorKind {
    /// Allocates the object, then initializes it.
    Allocating,
    /// Initializes already-allocated storage.
    Initializing,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DestructorKind {
    /// Destroys the object and frees its memory.
    Deallocating,
    /// Destroys the object's fields and returns the memory to the caller.
    Destroying,
}

/// A per-type operation used where the concrete type is erased.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ValueWitness {
    AllocateBuffer,
    AssignWithCopy,
    AssignWithTake,
    DeallocateBuffer,
    Destroy,
    DestroyBuffer,
    InitializeBufferWithCopyOfBuffer,
    InitializeBufferWithCopy,
    InitializeWithCopy,
    InitializeBufferWithTake,
    InitializeWithTake,
    ProjectBuffer,
    TypeOf,
}

impl ValueWitness {
    /// Every witness, in value witness table order.
    pub const ALL: [ValueWitness; 13] = [
        ValueWitness::InitializeBufferWithCopyOfBuffer,
        ValueWitness::DestroyBuffer,
        ValueWitness::ProjectBuffer,
        ValueWitness::DeallocateBuffer,
        ValueWitness::Destroy,
        ValueWitness::InitializeBufferWithCopy,
        ValueWitness::InitializeWithCopy,
        ValueWitness::AssignWithCopy,
        ValueWitness::InitializeBufferWithTake,
        ValueWitness::InitializeWithTake,
        ValueWitness::AssignWithTake,
        ValueWitness::AllocateBuffer,
        ValueWitness::TypeOf,
    ];

    /// Two-letter operator used in symbol names.
    pub fn code(self) -> &'static str {
        match self {
            ValueWitness::AllocateBuffer => "al",
            ValueWitness::AssignWithCopy => "ca",
            ValueWitness::AssignWithTake => "ta",
            ValueWitness::DeallocateBuffer => "de",
            ValueWitness::Destroy => "xx",
            ValueWitness::DestroyBuffer => "XX",
            ValueWitness::InitializeBufferWithCopyOfBuffer => "CP",
            ValueWitness::InitializeBufferWithCopy => "Cp",
            ValueWitness::InitializeWithCopy => "cp",
            ValueWitness::InitializeBufferWithTake => "Tk",
            ValueWitness::InitializeWithTake => "tk",
            ValueWitness::ProjectBuffer => "pr",
            ValueWitness::TypeOf => "ty",
        }
    }

    pub fn from_code(code: &str) -> Option<ValueWitness> {
        Self::ALL.into_iter().find(|w| w.code() == code)
    }

    /// Native type of the witness function. The last parameter is always
    /// the type's metadata.
    pub fn fn_type(self) -> FnType {
        use NativeType::{Ptr, Void};
        let (params, ret) = match self {
            ValueWitness::Destroy
            | ValueWitness::DestroyBuffer
            | ValueWitness::DeallocateBuffer => (2, Void),
            ValueWitness::AllocateBuffer
            | ValueWitness::ProjectBuffer
            | ValueWitness::TypeOf => (2, Ptr),
            ValueWitness::AssignWithCopy
            | ValueWitness::AssignWithTake
            | ValueWitness::InitializeBufferWithCopyOfBuffer
            | ValueWitness::InitializeBufferWithCopy
            | ValueWitness::InitializeWithCopy
            | ValueWitness::InitializeBufferWithTake
            | ValueWitness::InitializeWithTake => (3, Ptr),
        };
        FnType::new(vec![Ptr; params], ret)
    }
}

/// Identity of one emitted native object.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum EntityKey {
    Function(CodeRef),
    Getter(CodeRef),
    Setter(CodeRef),
    Constructor(CodeRef, ConstructorKind),
    /// Destructor of a class declaration.
    Destructor(DeclId, DestructorKind),
    /// Offset of a stored property, stored directly or in the metadata of
    /// a generic class.
    FieldOffset { decl: DeclId, indirect: bool },
    /// Offset of a method within its class's witness table.
    WitnessTableOffset(CodeRef),
    ValueWitness { ty: Ty, witness: ValueWitness },
    ValueWitnessTable(Ty),
    TypeMetadata { ty: Ty, indirect: bool, pattern: bool },
    NominalTypeDescriptor(DeclId),
    ProtocolDescriptor(DeclId),
    /// A class object of the foreign runtime.
    ForeignClass(DeclId),
    ForeignMetaclass(DeclId),
    /// Metaclass generated for a native class exposed to the foreign runtime.
    MetaclassStub(DeclId),
    WitnessTable(ConformanceId),
    GlobalVariable(DeclId),
    /// A type's mangled name as data.
    TypeMangling(Ty),
    Other(DeclId),
    /// A function produced by the optimizer, named by it.
    LoweredFunction(FunctionId),
    /// A global produced by the optimizer, named by it.
    LoweredGlobal(GlobalVarId),
}

impl EntityKey {
    /// The declaration this entity is derived from, for declaration-based
    /// entities.
    pub fn decl(&self) -> Option<DeclId> {
        match self {
            EntityKey::Function(code)
            | EntityKey::Getter(code)
            | EntityKey::Setter(code)
            | EntityKey::Constructor(code, _)
            | EntityKey::WitnessTableOffset(code) => Some(code.decl),
            EntityKey::Destructor(decl, _)
            | EntityKey::FieldOffset { decl, .. }
            | EntityKey::NominalTypeDescriptor(decl)
            | EntityKey::ProtocolDescriptor(decl)
            | EntityKey::ForeignClass(decl)
            | EntityKey::ForeignMetaclass(decl)
            | EntityKey::MetaclassStub(decl)
            | EntityKey::GlobalVariable(decl)
            | EntityKey::Other(decl) => Some(*decl),
            _ => None,
        }
    }

    /// The type this entity is derived from, for type-based entities.
    pub fn ty(&self) -> Option<&Ty> {
        match self {
            EntityKey::ValueWitness { ty, .. }
            | EntityKey::ValueWitnessTable(ty)
            | EntityKey::TypeMetadata { ty, .. }
            | EntityKey::TypeMangling(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_value_witness(&self) -> bool {
        matches!(self, EntityKey::ValueWitness { .. })
    }

    /// Short name of the variant, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EntityKey::Function(_) => "function",
            EntityKey::Getter(_) => "getter",
            EntityKey::Setter(_) => "setter",
            EntityKey::Constructor(..) => "constructor",
            EntityKey::Destructor(..) => "destructor",
            EntityKey::FieldOffset { .. } => "field offset",
            EntityKey::WitnessTableOffset(_) => "witness table offset",
            EntityKey::ValueWitness { .. } => "value witness",
            EntityKey::ValueWitnessTable(_) => "value witness table",
            EntityKey::TypeMetadata { .. } => "type metadata",
            EntityKey::NominalTypeDescriptor(_) => "nominal type descriptor",
            EntityKey::ProtocolDescriptor(_) => "protocol descriptor",
            EntityKey::ForeignClass(_) => "foreign class",
            EntityKey::ForeignMetaclass(_) => "foreign metaclass",
            EntityKey::MetaclassStub(_) => "metaclass stub",
            EntityKey::WitnessTable(_) => "witness table",
            EntityKey::GlobalVariable(_) => "global variable",
            EntityKey::TypeMangling(_) => "type mangling",
            EntityKey::Other(_) => "other",
            EntityKey::LoweredFunction(_) => "lowered function",
            EntityKey::LoweredGlobal(_) => "lowered global",
        }
    }
}

#[cfg(test)]
mod tests;
