//! Canonical structural types.
//!
//! A `Ty` is a finite tree. Nominal types refer to their declaration by
//! `DeclId` and never embed it, so a structural walk over a `Ty` always
//! terminates even when the declaration graph is cyclic.

use crate::{DeclId, Name};

/// Compiler builtin types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BuiltinTy {
    Int(u16),
    Float(u16),
    RawPointer,
    NativeObject,
}

/// A generic parameter together with its constraints.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct GenericParam {
    pub name: Name,
    /// Protocol declarations the parameter must conform to.
    pub protocols: Vec<DeclId>,
    /// Class bound, if any.
    pub superclass: Option<Ty>,
}

impl GenericParam {
    pub fn new(name: Name) -> Self {
        GenericParam {
            name,
            protocols: Vec::new(),
            superclass: None,
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: DeclId) -> Self {
        self.protocols.push(protocol);
        self
    }

    #[must_use]
    pub fn with_superclass(mut self, superclass: Ty) -> Self {
        self.superclass = Some(superclass);
        self
    }
}

/// Canonical type expression.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Ty {
    Builtin(BuiltinTy),
    /// A nominal type, bound to generic arguments when `args` is non-empty.
    Nominal { decl: DeclId, args: Vec<Ty> },
    Tuple(Vec<Ty>),
    Function { input: Box<Ty>, output: Box<Ty> },
    /// A function type with its own generic clause.
    Polymorphic {
        params: Vec<GenericParam>,
        input: Box<Ty>,
        output: Box<Ty>,
    },
    /// A generic parameter by de Bruijn position.
    Param { depth: u32, index: u32 },
    Metatype(Box<Ty>),
}

impl Ty {
    /// The empty tuple.
    pub fn unit() -> Ty {
        Ty::Tuple(Vec::new())
    }

    pub fn nominal(decl: DeclId) -> Ty {
        Ty::Nominal {
            decl,
            args: Vec::new(),
        }
    }

    pub fn bound(decl: DeclId, args: Vec<Ty>) -> Ty {
        Ty::Nominal { decl, args }
    }

    pub fn function(input: Ty, output: Ty) -> Ty {
        Ty::Function {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    pub fn polymorphic(params: Vec<GenericParam>, input: Ty, output: Ty) -> Ty {
        Ty::Polymorphic {
            params,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    pub fn metatype(instance: Ty) -> Ty {
        Ty::Metatype(Box::new(instance))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Ty::Tuple(elems) if elems.is_empty())
    }

    /// The nominal declaration of a nominal or bound generic type.
    pub fn nominal_decl(&self) -> Option<DeclId> {
        match self {
            Ty::Nominal { decl, .. } => Some(*decl),
            _ => None,
        }
    }

    pub fn is_bound_generic(&self) -> bool {
        matches!(self, Ty::Nominal { args, .. } if !args.is_empty())
    }

    /// Returns `true` if `pred` holds for this type or any structural
    /// component, visiting in pre-order and stopping at the first match.
    ///
    /// Generic clauses of polymorphic function types are not descended into;
    /// callers that care about bounds inspect `Ty::Polymorphic::params`.
    pub fn any(&self, pred: &mut impl FnMut(&Ty) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Ty::Builtin(_) | Ty::Param { .. } => false,
            Ty::Nominal { args, .. } => args.iter().any(|arg| arg.any(pred)),
            Ty::Tuple(elems) => elems.iter().any(|elem| elem.any(pred)),
            Ty::Function { input, output } | Ty::Polymorphic { input, output, .. } => {
                input.any(pred) || output.any(pred)
            }
            Ty::Metatype(instance) => instance.any(pred),
        }
    }
}
