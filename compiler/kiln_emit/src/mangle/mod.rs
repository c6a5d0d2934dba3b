//! Symbol mangling.
//!
//! Every [`EntityKey`] maps to exactly one linker symbol. The grammar is
//! prefix-free, so distinct keys always produce distinct names and every
//! name can be parsed back by [`demangle`].
//!
//! # Grammar
//!
//! ```text
//! symbol   ::= "_K1" entity
//! entity   ::= "F" mode decl type            function
//!            | "g" mode decl type            getter
//!            | "s" mode decl type            setter
//!            | "c" ("C" | "c") mode decl type  allocating / initializing constructor
//!            | "D" ("D" | "d") nominal       deallocating / destroying destructor
//!            | "Wv" ("d" | "i") decl         field offset
//!            | "Wo" mode decl type           witness table offset
//!            | "w" witness type              value witness (two letters)
//!            | "WV" type                     value witness table
//!            | "M" ("d" | "i" | "P" | "I") type  metadata, pattern metadata
//!            | "Mn" nominal | "Mp" nominal | "Mm" nominal
//!            | "WP" type nominal             protocol witness table
//!            | "v" decl | "t" type | "o" decl | "a" ident ident
//! mode     ::= ("m" | "x") digits ["o"] "_"
//! decl     ::= context ident
//! context  ::= ident | "So" | nominal | "L" decl digits "_" | "E" ident digits "_"
//! nominal  ::= ("V" | "O" | "C" | "P") decl
//! ident    ::= digits text | "X" digits "_" escaped
//! type     ::= nominal | "G" nominal type* "_" | "T" type* "_" | "f" type type
//!            | "U" ("q" nominal* ["S" type] "_")* "_" type type
//!            | "Q" digits "_" digits "_" | "m" type
//!            | "B" ("i" digits "_" | "f" digits "_" | "p" | "o")
//! ```
//!
//! Foreign class objects use the foreign runtime's own symbols
//! (`OBJC_CLASS_$_Name`), and lowered entities keep the names the
//! optimizer gave them.

mod demangle;

use std::fmt::Write;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use kiln_ir::lowered::LoweredModule;
use kiln_ir::{BuiltinTy, DeclContext, DeclId, DeclKind, DeclTable, Ty};
use kiln_request::{Evaluator, ExtendedNominalRequest};

use crate::entity::{CodeRef, ConstructorKind, DestructorKind, EntityKey, Explosion};

pub use demangle::{demangle, DeclPath, Demangled, Mode, ParamNode, SymbolKind, TypeNode};

/// Prefix of every Kiln symbol.
pub const MANGLE_PREFIX: &str = "_K1";

/// Prefix of foreign runtime class objects.
pub const FOREIGN_CLASS_PREFIX: &str = "OBJC_CLASS_$_";

/// Prefix of foreign runtime metaclass objects.
pub const FOREIGN_METACLASS_PREFIX: &str = "OBJC_METACLASS_$_";

/// Nominal type each extension extends, resolved once before naming starts.
///
/// Extension members are named as members of the extended type, so naming
/// needs this answer; resolving it up front keeps [`Mangler`] free of the
/// single-threaded request evaluator.
#[derive(Clone, Debug, Default)]
pub struct ExtensionBindings {
    map: FxHashMap<DeclId, DeclId>,
}

impl ExtensionBindings {
    /// Resolve every extension in `decls`.
    pub fn resolve(evaluator: &Evaluator<'_>) -> Self {
        let map = evaluator
            .decls()
            .iter()
            .filter(|(_, decl)| matches!(decl.kind, DeclKind::Extension(_)))
            .filter_map(|(ext, _)| {
                evaluator
                    .get(ExtendedNominalRequest { ext })
                    .map(|nominal| (ext, nominal))
            })
            .collect();
        ExtensionBindings { map }
    }

    pub fn get(&self, ext: DeclId) -> Option<DeclId> {
        self.map.get(&ext).copied()
    }

    pub fn insert(&mut self, ext: DeclId, nominal: DeclId) {
        self.map.insert(ext, nominal);
    }
}

/// Computes symbol names for entity keys.
///
/// Naming is a pure function of the key and the declarations it refers
/// to: calling [`Mangler::mangle`] twice gives the same string.
#[derive(Copy, Clone)]
pub struct Mangler<'a> {
    decls: &'a DeclTable,
    lowered: &'a LoweredModule,
    extensions: &'a ExtensionBindings,
}

impl<'a> Mangler<'a> {
    pub fn new(
        decls: &'a DeclTable,
        lowered: &'a LoweredModule,
        extensions: &'a ExtensionBindings,
    ) -> Self {
        Mangler {
            decls,
            lowered,
            extensions,
        }
    }

    /// The symbol name of `key`.
    #[must_use]
    pub fn mangle(&self, key: &EntityKey) -> String {
        let mut out = String::with_capacity(64);
        match key {
            EntityKey::LoweredFunction(id) => return self.lowered.function(*id).name.clone(),
            EntityKey::LoweredGlobal(id) => return self.lowered.global(*id).name.clone(),
            EntityKey::ForeignClass(decl) => {
                out.push_str(FOREIGN_CLASS_PREFIX);
                self.push_foreign_class_name(&mut out, *decl);
                return out;
            }
            EntityKey::ForeignMetaclass(decl) => {
                out.push_str(FOREIGN_METACLASS_PREFIX);
                self.push_foreign_class_name(&mut out, *decl);
                return out;
            }
            _ => {}
        }

        out.push_str(MANGLE_PREFIX);
        match key {
            EntityKey::Function(code) => self.push_code(&mut out, "F", code),
            EntityKey::Getter(code) => self.push_code(&mut out, "g", code),
            EntityKey::Setter(code) => self.push_code(&mut out, "s", code),
            EntityKey::Constructor(code, kind) => {
                let op = match kind {
                    ConstructorKind::Allocating => "cC",
                    ConstructorKind::Initializing => "cc",
                };
                self.push_code(&mut out, op, code);
            }
            EntityKey::Destructor(class, kind) => {
                out.push_str(match kind {
                    DestructorKind::Deallocating => "DD",
                    DestructorKind::Destroying => "Dd",
                });
                self.push_nominal(&mut out, *class);
            }
            EntityKey::FieldOffset { decl, indirect } => {
                out.push_str(if *indirect { "Wvi" } else { "Wvd" });
                self.push_decl(&mut out, *decl);
            }
            EntityKey::WitnessTableOffset(code) => self.push_code(&mut out, "Wo", code),
            EntityKey::ValueWitness { ty, witness } => {
                out.push('w');
                out.push_str(witness.code());
                self.push_type(&mut out, ty);
            }
            EntityKey::ValueWitnessTable(ty) => {
                out.push_str("WV");
                self.push_type(&mut out, ty);
            }
            EntityKey::TypeMetadata {
                ty,
                indirect,
                pattern,
            } => {
                out.push_str(match (pattern, indirect) {
                    (false, false) => "Md",
                    (false, true) => "Mi",
                    (true, false) => "MP",
                    (true, true) => "MI",
                });
                self.push_type(&mut out, ty);
            }
            EntityKey::NominalTypeDescriptor(decl) => {
                out.push_str("Mn");
                self.push_nominal(&mut out, *decl);
            }
            EntityKey::ProtocolDescriptor(decl) => {
                out.push_str("Mp");
                self.push_nominal(&mut out, *decl);
            }
            EntityKey::MetaclassStub(decl) => {
                out.push_str("Mm");
                self.push_nominal(&mut out, *decl);
            }
            EntityKey::WitnessTable(id) => {
                let conformance = self.decls.conformance(*id);
                out.push_str("WP");
                self.push_type(&mut out, &conformance.ty);
                self.push_nominal(&mut out, conformance.protocol);
            }
            EntityKey::GlobalVariable(decl) => {
                out.push('v');
                self.push_decl(&mut out, *decl);
            }
            EntityKey::TypeMangling(ty) => {
                out.push('t');
                self.push_type(&mut out, ty);
            }
            EntityKey::Other(decl) => {
                out.push('o');
                self.push_decl(&mut out, *decl);
            }
            EntityKey::LoweredFunction(_)
            | EntityKey::LoweredGlobal(_)
            | EntityKey::ForeignClass(_)
            | EntityKey::ForeignMetaclass(_) => {}
        }
        out
    }

    /// Names for a batch of keys, computed in parallel.
    pub fn mangle_all(&self, keys: &[EntityKey]) -> Vec<String> {
        keys.par_iter().map(|key| self.mangle(key)).collect()
    }

    /// The mangled form of a type on its own, without a prefix.
    pub fn mangle_type(&self, ty: &Ty) -> String {
        let mut out = String::new();
        self.push_type(&mut out, ty);
        out
    }

    fn push_code(&self, out: &mut String, op: &str, code: &CodeRef) {
        out.push_str(op);
        push_mode(out, code);
        self.push_decl(out, code.decl);
        self.push_formal_type(out, code.decl);
    }

    /// The type a declaration's entry points are named with, so overloads
    /// get distinct names.
    fn push_formal_type(&self, out: &mut String, decl: DeclId) {
        match &self.decls.get(decl).kind {
            DeclKind::Func(func) | DeclKind::Constructor(func) => self.push_type(out, &func.ty),
            DeclKind::Var(storage) => self.push_type(out, &storage.ty),
            DeclKind::Subscript(storage) => {
                out.push('f');
                match &storage.indices {
                    Some(indices) => self.push_type(out, indices),
                    None => out.push_str("T_"),
                }
                self.push_type(out, &storage.ty);
            }
            _ => out.push_str("T_"),
        }
    }

    fn push_decl(&self, out: &mut String, decl: DeclId) {
        let d = self.decls.get(decl);
        self.push_context(out, d.context);
        push_identifier(out, self.decls.name(d.name));
    }

    fn push_context(&self, out: &mut String, context: DeclContext) {
        match context {
            DeclContext::Module(module) => {
                let info = self.decls.module(module);
                if info.is_foreign() {
                    out.push_str("So");
                } else {
                    push_identifier(out, self.decls.name(info.name));
                }
            }
            DeclContext::Nominal(owner) => self.push_nominal(out, owner),
            DeclContext::Extension(ext) => match self.extensions.get(ext) {
                Some(nominal) => self.push_nominal(out, nominal),
                None => {
                    let module = self.decls.module(self.decls.module_of(ext));
                    out.push('E');
                    push_identifier(out, self.decls.name(module.name));
                    let _ = write!(out, "{}_", ext.index());
                }
            },
            DeclContext::Local {
                parent,
                discriminator,
            } => {
                out.push('L');
                self.push_decl(out, parent);
                let _ = write!(out, "{discriminator}_");
            }
        }
    }

    fn push_nominal(&self, out: &mut String, decl: DeclId) {
        out.push(match self.decls.get(decl).kind {
            DeclKind::Enum(_) => 'O',
            DeclKind::Class(_) => 'C',
            DeclKind::Protocol(_) => 'P',
            _ => 'V',
        });
        self.push_decl(out, decl);
    }

    fn push_type(&self, out: &mut String, ty: &Ty) {
        match ty {
            Ty::Builtin(builtin) => {
                out.push('B');
                let _ = match builtin {
                    BuiltinTy::Int(bits) => write!(out, "i{bits}_"),
                    BuiltinTy::Float(bits) => write!(out, "f{bits}_"),
                    BuiltinTy::RawPointer => write!(out, "p"),
                    BuiltinTy::NativeObject => write!(out, "o"),
                };
            }
            Ty::Nominal { decl, args } if args.is_empty() => self.push_nominal(out, *decl),
            Ty::Nominal { decl, args } => {
                out.push('G');
                self.push_nominal(out, *decl);
                for arg in args {
                    self.push_type(out, arg);
                }
                out.push('_');
            }
            Ty::Tuple(elems) => {
                out.push('T');
                for elem in elems {
                    self.push_type(out, elem);
                }
                out.push('_');
            }
            Ty::Function { input, output } => {
                out.push('f');
                self.push_type(out, input);
                self.push_type(out, output);
            }
            Ty::Polymorphic {
                params,
                input,
                output,
            } => {
                out.push('U');
                for param in params {
                    out.push('q');
                    for &protocol in &param.protocols {
                        self.push_nominal(out, protocol);
                    }
                    if let Some(superclass) = &param.superclass {
                        out.push('S');
                        self.push_type(out, superclass);
                    }
                    out.push('_');
                }
                out.push('_');
                self.push_type(out, input);
                self.push_type(out, output);
            }
            Ty::Param { depth, index } => {
                let _ = write!(out, "Q{depth}_{index}_");
            }
            Ty::Metatype(instance) => {
                out.push('m');
                self.push_type(out, instance);
            }
        }
    }

    /// Imported classes keep their foreign name; native classes exposed to
    /// the foreign runtime are registered under their type mangling.
    fn push_foreign_class_name(&self, out: &mut String, decl: DeclId) {
        let d = self.decls.get(decl);
        if d.is_foreign_imported() || self.decls.is_foreign_module(decl) {
            out.push_str(self.decls.name(d.name));
        } else {
            out.push_str(MANGLE_PREFIX);
            out.push('t');
            self.push_nominal(out, decl);
        }
    }
}

/// Symbol of the runtime addressor for global `name` in `module`.
pub fn addressor_symbol(module: &str, name: &str) -> String {
    let mut out = String::from(MANGLE_PREFIX);
    out.push('a');
    push_identifier(&mut out, module);
    push_identifier(&mut out, name);
    out
}

/// Check if a symbol name is a mangled Kiln symbol.
pub fn is_kiln_symbol(name: &str) -> bool {
    name.starts_with(MANGLE_PREFIX)
}

fn push_mode(out: &mut String, code: &CodeRef) {
    out.push(match code.explosion {
        Explosion::Minimal => 'm',
        Explosion::Maximal => 'x',
    });
    let _ = write!(out, "{}", code.uncurry_level);
    if code.foreign {
        out.push('o');
    }
    out.push('_');
}

fn is_plain_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Length-prefixed identifier. Names that are empty, start with a digit or
/// contain other bytes are escaped byte-wise as `$hh`.
fn push_identifier(out: &mut String, name: &str) {
    if is_plain_identifier(name) {
        let _ = write!(out, "{}{name}", name.len());
        return;
    }
    let mut escaped = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "${byte:02x}");
        }
    }
    let _ = write!(out, "X{}_{escaped}", escaped.len());
}
