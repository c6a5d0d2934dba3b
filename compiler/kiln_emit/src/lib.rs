//! Declaration emission for Kiln
//!
//! This crate turns resolved declarations and the optimizer's lowered
//! module into a native module of named functions and variables, ready
//! for code generation.
//!
//! # Architecture
//!
//! - **Entities** (`entity`): [`EntityKey`] names everything that gets a
//!   symbol: functions and accessors, metadata, descriptors, value
//!   witnesses, witness tables, foreign class objects
//! - **Naming** (`mangle`): [`Mangler`] gives every key a deterministic,
//!   reversible symbol; [`demangle`] reads it back
//! - **Linkage** (`linkage`): [`LinkagePolicy`] decides linkage and
//!   visibility; [`Linker`] pairs it with naming
//! - **Cache** (`cache`): [`ObjectCache`] hands out at most one object per
//!   key and upgrades forward declarations in place
//! - **Emission** (`decl`, `foreign`): [`EmitCx`] walks declarations,
//!   defines metadata and lowered bodies, and bridges classes and
//!   extensions to the foreign object runtime
//! - **Driver** (`module`): [`emit_module`] runs one module end to end and
//!   writes the global lists
//!
//! # Example
//!
//! ```ignore
//! use kiln_emit::{emit_module, EmitInput, EmitOptions};
//!
//! let input = EmitInput::new(&decls, &lowered, &files);
//! let output = emit_module(&input, &EmitOptions::new())?;
//! for symbol in &output.symbols {
//!     println!("{} {}", symbol.linkage, symbol.name);
//! }
//! ```
//!
//! # Debugging
//!
//! Enable tracing with environment variables:
//! - `RUST_LOG=kiln_emit=debug` - Objects created, lists written
//! - `RUST_LOG=kiln_emit=trace` - Every declaration visited
//! - `RUST_LOG=kiln_emit::cache=debug` - Only the object cache

mod cache;
mod debug;
mod decl;
mod entity;
mod error;
mod foreign;
mod linkage;
mod lists;
mod mangle;
mod module;
mod native;
mod options;

#[cfg(test)]
mod test_helpers;

pub use cache::{ObjectCache, ObjectKind, SymbolEntry};
pub use debug::{DebugFunction, DebugGlobal, DebugInfo};
pub use decl::{EmitCx, MetadataKind};
pub use entity::{CodeRef, ConstructorKind, DestructorKind, EntityKey, Explosion, ValueWitness};
pub use error::{DeclSite, EmitError};
pub use foreign::{
    getter_selector, initializer_selector, method_selector, setter_selector, subscript_selectors,
    type_encoding, CATEGORY_INITIALIZER, CLASS_INITIALIZER,
};
pub use linkage::{EntityFacts, LinkInfo, Linkage, LinkagePolicy, Linker, Visibility};
pub use lists::GlobalLists;
pub use mangle::{
    addressor_symbol, demangle, is_kiln_symbol, DeclPath, Demangled, ExtensionBindings, Mangler,
    Mode, ParamNode, SymbolKind, TypeNode,
};
pub use module::{emit_module, EmitInput, EmitOutput, MODULE_INIT_PRIORITY};
pub use native::{
    BodyBuilder, Constant, FnBlock, FnBody, FnInst, GlobalId, GlobalKind, GlobalValue,
    NativeModule, Value,
};
pub use options::EmitOptions;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set, and only the first call has any
/// effect. Intended for tests and for drivers that have no subscriber of
/// their own.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
