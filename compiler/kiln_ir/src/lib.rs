//! Kiln IR - the resolved program model consumed by declaration emission.
//!
//! This crate holds everything the emission stage reads but never mutates:
//! - Spans for source locations
//! - Names for interned identifiers
//! - The resolved declaration arena (`DeclTable`) with contexts,
//!   provenance and conformances
//! - Canonical structural types (`Ty`) and unresolved type references
//!   (`TypeRepr`) used by name lookup
//! - The optimizer's lowered module: lowered functions, globals,
//!   witness tables and their native storage types
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: Strings → `Name(u32)`
//! - **Flatten Everything**: declarations are addressed by `DeclId(u32)`,
//!   lowered functions by `FunctionId(u32)`
//! - **Closed Tag Sets**: every kind enum is matched exhaustively, so adding
//!   a kind forces each dispatch site to be revisited

pub mod decl;
mod interner;
pub mod lowered;
mod module;
mod name;
mod span;
pub mod ty;

pub use decl::{
    Conformance, ConformanceId, Decl, DeclContext, DeclFlags, DeclId, DeclKind, DeclTable,
    ExtensionDecl, FuncDecl, NominalDecl, Provenance, Requirement, StorageDecl, TypeRepr,
};
pub use interner::StringInterner;
pub use module::{ModuleId, ModuleInfo, ModuleKind, SourceFile, SourceFileKind};
pub use name::Name;
pub use span::Span;
pub use ty::{BuiltinTy, GenericParam, Ty};
