//! The optimizer's output: lowered functions, globals and witness tables.
//!
//! Emission consumes these without changing them. Lowered entities carry
//! the symbol names the optimizer assigned them and an explicit
//! [`LoweredLinkage`] that feeds the linkage policy.

use std::fmt;

use crate::{ConformanceId, DeclId};

/// Index of a lowered function in its [`LoweredModule`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionId(u32);

impl FunctionId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        FunctionId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a lowered global in its [`LoweredModule`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalVarId(u32);

impl GlobalVarId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        GlobalVarId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Well-known runtime record layouts.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// Type metadata at its address point.
    TypeMetadata,
    /// Type metadata including the value witness header word.
    FullTypeMetadata,
    /// Class metadata including the destructor and value witness words.
    FullHeapMetadata,
    /// Template instantiated at runtime for generic types.
    MetadataPattern,
    NominalTypeDescriptor,
    ProtocolDescriptor,
    /// A class object of the foreign runtime.
    ForeignClass,
    /// A category record of the foreign runtime.
    ForeignCategory,
    /// Protocol witness table.
    WitnessTable,
    /// Value witness table.
    ValueWitnessTable,
}

impl Layout {
    /// Words in front of the address point that a direct reference skips.
    pub fn address_point(self) -> u32 {
        match self {
            Layout::FullTypeMetadata => 1,
            Layout::FullHeapMetadata => 2,
            _ => 0,
        }
    }
}

/// Storage type of a native object.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NativeType {
    Void,
    Int(u16),
    Float(u16),
    Ptr,
    Struct(Vec<NativeType>),
    Array(Box<NativeType>, u64),
    Function(Box<FnType>),
    Layout(Layout),
}

impl NativeType {
    pub fn array(elem: NativeType, len: u64) -> Self {
        NativeType::Array(Box::new(elem), len)
    }

    pub fn function(ty: FnType) -> Self {
        NativeType::Function(Box::new(ty))
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => write!(f, "void"),
            NativeType::Int(bits) => write!(f, "i{bits}"),
            NativeType::Float(bits) => write!(f, "f{bits}"),
            NativeType::Ptr => write!(f, "ptr"),
            NativeType::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
            NativeType::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            NativeType::Function(ty) => write!(f, "{ty}"),
            NativeType::Layout(layout) => write!(f, "%{layout:?}"),
        }
    }
}

/// A native function type.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct FnType {
    pub params: Vec<NativeType>,
    pub ret: NativeType,
}

impl FnType {
    pub fn new(params: Vec<NativeType>, ret: NativeType) -> Self {
        FnType { params, ret }
    }

    /// `void ()`
    pub fn void() -> Self {
        FnType {
            params: Vec::new(),
            ret: NativeType::Void,
        }
    }
}

impl fmt::Display for FnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// Calling convention of a native function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CallConv {
    /// Kiln's own convention.
    #[default]
    Native,
    /// Platform C convention; used for runtime entry points and `main`.
    C,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Signature {
    pub ty: FnType,
    pub cc: CallConv,
}

impl Signature {
    pub fn new(ty: FnType, cc: CallConv) -> Self {
        Signature { ty, cc }
    }

    pub fn native(ty: FnType) -> Self {
        Signature {
            ty,
            cc: CallConv::Native,
        }
    }
}

/// Linkage the optimizer assigned to a lowered entity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum LoweredLinkage {
    #[default]
    Public,
    /// Only referenced from this module.
    Internal,
    /// Synthesized adapter for a foreign-imported declaration.
    Thunk,
    /// Body copied from a prebuilt module.
    Deserialized,
}

/// Which accessor or entry point of a declaration a function implements.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeKind {
    Func,
    Getter,
    Setter,
    Allocator,
    Initializer,
    Destroyer,
    Deallocator,
}

/// The declaration a lowered function was produced from.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct LoweredOrigin {
    pub decl: DeclId,
    pub kind: CodeKind,
    pub uncurry_level: u32,
    /// The foreign-runtime entry point rather than the native one.
    pub foreign: bool,
}

impl LoweredOrigin {
    pub fn func(decl: DeclId, uncurry_level: u32) -> Self {
        LoweredOrigin {
            decl,
            kind: CodeKind::Func,
            uncurry_level,
            foreign: false,
        }
    }
}

/// An operand of a lowered instruction.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Operand {
    /// Function parameter by position.
    Param(u32),
    Int { bits: u16, value: i64 },
    Null,
    Function(FunctionId),
    Global(GlobalVarId),
    /// Result of an earlier instruction in the same function, by position
    /// in the flattened instruction stream.
    Inst(u32),
}

/// Target of a lowered call.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Callee {
    Function(FunctionId),
    /// Runtime entry point by symbol name.
    Runtime { name: String, ty: FnType },
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Inst {
    Call { callee: Callee, args: Vec<Operand> },
    Store { value: Operand, dest: Operand },
    Return(Option<Operand>),
    Unreachable,
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Return(_) | Inst::Unreachable)
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Block {
    pub insts: Vec<Inst>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Body {
    pub blocks: Vec<Block>,
}

impl Body {
    /// A body that does nothing but return.
    pub fn empty_return() -> Self {
        Body {
            blocks: vec![Block {
                insts: vec![Inst::Return(None)],
            }],
        }
    }

    pub fn single_block(insts: Vec<Inst>) -> Self {
        Body {
            blocks: vec![Block { insts }],
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LoweredFunction {
    pub name: String,
    pub origin: Option<LoweredOrigin>,
    pub linkage: LoweredLinkage,
    pub signature: Signature,
    /// `None` for functions only declared here.
    pub body: Option<Body>,
}

impl LoweredFunction {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        LoweredFunction {
            name: name.into(),
            origin: None,
            linkage: LoweredLinkage::Public,
            signature,
            body: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: LoweredOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    #[must_use]
    pub fn with_linkage(mut self, linkage: LoweredLinkage) -> Self {
        self.linkage = linkage;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LoweredGlobal {
    pub name: String,
    pub storage: NativeType,
    pub linkage: LoweredLinkage,
}

impl LoweredGlobal {
    pub fn new(name: impl Into<String>, storage: NativeType) -> Self {
        LoweredGlobal {
            name: name.into(),
            storage,
            linkage: LoweredLinkage::Public,
        }
    }

    #[must_use]
    pub fn with_linkage(mut self, linkage: LoweredLinkage) -> Self {
        self.linkage = linkage;
        self
    }
}

/// One slot of a protocol witness table.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum WitnessEntry {
    Method(FunctionId),
    /// Witness table for an inherited protocol.
    BaseProtocol(ConformanceId),
    /// Requirement with no witness in this module; emitted as null.
    Missing,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LoweredWitnessTable {
    pub conformance: ConformanceId,
    pub entries: Vec<WitnessEntry>,
}

/// Everything the optimizer produced for one module.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct LoweredModule {
    pub functions: Vec<LoweredFunction>,
    pub globals: Vec<LoweredGlobal>,
    /// Source-level global variables that need storage.
    pub global_vars: Vec<DeclId>,
    pub witness_tables: Vec<LoweredWitnessTable>,
    /// The function holding the module's top-level statements.
    pub top_level_code: Option<FunctionId>,
    /// Declarations from other modules whose metadata or bodies this module
    /// must provide.
    pub external_definitions: Vec<DeclId>,
}

impl LoweredModule {
    pub fn add_function(&mut self, function: LoweredFunction) -> FunctionId {
        let id = FunctionId::new(to_u32(self.functions.len()));
        self.functions.push(function);
        id
    }

    pub fn add_global(&mut self, global: LoweredGlobal) -> GlobalVarId {
        let id = GlobalVarId::new(to_u32(self.globals.len()));
        self.globals.push(global);
        id
    }

    #[inline]
    pub fn function(&self, id: FunctionId) -> &LoweredFunction {
        &self.functions[id.index()]
    }

    #[inline]
    pub fn global(&self, id: GlobalVarId) -> &LoweredGlobal {
        &self.globals[id.index()]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len()).map(|i| FunctionId::new(to_u32(i)))
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalVarId> {
        (0..self.globals.len()).map(|i| GlobalVarId::new(to_u32(i)))
    }

    /// The lowered function implementing `origin`, if the optimizer
    /// produced one.
    pub fn find_function(&self, origin: &LoweredOrigin) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.origin.as_ref() == Some(origin))
            .map(|i| FunctionId::new(to_u32(i)))
    }

    /// Lowered functions produced from `decl`, in module order.
    pub fn functions_for_decl(&self, decl: DeclId) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.origin.is_some_and(|o| o.decl == decl))
            .map(|(i, _)| FunctionId::new(to_u32(i)))
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "lowered module sizes are bounded far below u32::MAX"
)]
fn to_u32(index: usize) -> u32 {
    index as u32
}

#[cfg(test)]
mod tests;
