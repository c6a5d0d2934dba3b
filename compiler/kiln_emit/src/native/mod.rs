//! Native object arena.
//!
//! A [`NativeModule`] owns every function and variable emission creates.
//! Objects refer to each other through [`GlobalId`]s inside constants and
//! function bodies, so retargeting references is a walk over the arena.
//! Erased objects leave a hole; ids are never reused.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use kiln_ir::lowered::{CallConv, FnType, NativeType, Signature};

use crate::linkage::{Linkage, Visibility};

/// Index of an object in its [`NativeModule`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct GlobalId(u32);

impl GlobalId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        GlobalId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A constant expression.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Constant {
    /// Address of an object.
    Global(GlobalId),
    /// A pointer reinterpreted as another type.
    Cast { value: Box<Constant>, ty: NativeType },
    /// Address of an element inside an aggregate, by index path.
    ElementPtr {
        base: Box<Constant>,
        indices: SmallVec<[u32; 2]>,
    },
    Int { bits: u16, value: i64 },
    Null,
    /// All-zero value of the object's storage type.
    Zero,
    Array { elem: NativeType, elems: Vec<Constant> },
    Struct(Vec<Constant>),
    /// A nul-terminated byte string.
    CString(String),
}

impl Constant {
    pub fn cast(value: Constant, ty: NativeType) -> Self {
        Constant::Cast {
            value: Box::new(value),
            ty,
        }
    }

    pub fn element_ptr(base: Constant, indices: &[u32]) -> Self {
        Constant::ElementPtr {
            base: Box::new(base),
            indices: SmallVec::from_slice(indices),
        }
    }

    pub fn i32(value: i32) -> Self {
        Constant::Int {
            bits: 32,
            value: i64::from(value),
        }
    }

    pub fn i64(value: i64) -> Self {
        Constant::Int { bits: 64, value }
    }

    pub fn ptr_array(elems: Vec<Constant>) -> Self {
        Constant::Array {
            elem: NativeType::Ptr,
            elems,
        }
    }

    /// The object this constant addresses, looking through casts and
    /// element offsets.
    pub fn base_global(&self) -> Option<GlobalId> {
        match self {
            Constant::Global(id) => Some(*id),
            Constant::Cast { value, .. } => value.base_global(),
            Constant::ElementPtr { base, .. } => base.base_global(),
            _ => None,
        }
    }

    /// Whether `id` is referenced anywhere inside this constant.
    pub fn mentions(&self, id: GlobalId) -> bool {
        match self {
            Constant::Global(g) => *g == id,
            Constant::Cast { value, .. } => value.mentions(id),
            Constant::ElementPtr { base, .. } => base.mentions(id),
            Constant::Array { elems, .. } | Constant::Struct(elems) => {
                elems.iter().any(|e| e.mentions(id))
            }
            Constant::Int { .. } | Constant::Null | Constant::Zero | Constant::CString(_) => false,
        }
    }

    /// Point every reference to `from` at `to` instead.
    pub fn replace_uses(&mut self, from: GlobalId, to: &Constant) {
        match self {
            Constant::Global(g) if *g == from => *self = to.clone(),
            Constant::Cast { value, .. } => value.replace_uses(from, to),
            Constant::ElementPtr { base, .. } => base.replace_uses(from, to),
            Constant::Array { elems, .. } | Constant::Struct(elems) => {
                for elem in elems {
                    elem.replace_uses(from, to);
                }
            }
            _ => {}
        }
    }
}

/// An operand inside a function body.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Value {
    Const(Constant),
    /// Function parameter by position.
    Param(u32),
    /// Result of an earlier instruction, by position in the flattened
    /// instruction stream.
    Inst(u32),
}

impl Value {
    fn replace_uses(&mut self, from: GlobalId, to: &Constant) {
        if let Value::Const(c) = self {
            c.replace_uses(from, to);
        }
    }
}

impl From<Constant> for Value {
    fn from(c: Constant) -> Self {
        Value::Const(c)
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum FnInst {
    Call { callee: Value, args: Vec<Value> },
    Store { value: Value, dest: Value },
    Return(Option<Value>),
    Unreachable,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct FnBlock {
    pub insts: Vec<FnInst>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct FnBody {
    pub blocks: Vec<FnBlock>,
}

impl FnBody {
    /// One block holding nothing but a terminator.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.blocks.as_slice(),
            [block] if matches!(block.insts.as_slice(), [FnInst::Return(_) | FnInst::Unreachable])
        )
    }

    pub fn insts(&self) -> impl Iterator<Item = &FnInst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }

    fn replace_uses(&mut self, from: GlobalId, to: &Constant) {
        for inst in self.blocks.iter_mut().flat_map(|b| b.insts.iter_mut()) {
            match inst {
                FnInst::Call { callee, args } => {
                    callee.replace_uses(from, to);
                    for arg in args {
                        arg.replace_uses(from, to);
                    }
                }
                FnInst::Store { value, dest } => {
                    value.replace_uses(from, to);
                    dest.replace_uses(from, to);
                }
                FnInst::Return(Some(value)) => value.replace_uses(from, to),
                FnInst::Return(None) | FnInst::Unreachable => {}
            }
        }
    }

    fn mentions(&self, id: GlobalId) -> bool {
        let uses = |v: &Value| matches!(v, Value::Const(c) if c.mentions(id));
        self.insts().any(|inst| match inst {
            FnInst::Call { callee, args } => uses(callee) || args.iter().any(uses),
            FnInst::Store { value, dest } => uses(value) || uses(dest),
            FnInst::Return(Some(value)) => uses(value),
            FnInst::Return(None) | FnInst::Unreachable => false,
        })
    }
}

/// Straight-line body construction into a single block.
#[derive(Default)]
pub struct BodyBuilder {
    insts: Vec<FnInst>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a call and return its result.
    pub fn call(&mut self, callee: impl Into<Value>, args: Vec<Value>) -> Value {
        let index = self.next_index();
        self.insts.push(FnInst::Call {
            callee: callee.into(),
            args,
        });
        Value::Inst(index)
    }

    pub fn store(&mut self, value: Value, dest: Value) {
        self.insts.push(FnInst::Store { value, dest });
    }

    /// Terminate with a return and finish the body.
    pub fn ret(mut self, value: Option<Value>) -> FnBody {
        self.insts.push(FnInst::Return(value));
        FnBody {
            blocks: vec![FnBlock { insts: self.insts }],
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "bodies built here hold a handful of instructions"
    )]
    fn next_index(&self) -> u32 {
        self.insts.len() as u32
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum GlobalKind {
    Function {
        sig: Signature,
        /// `None` for declarations.
        body: Option<FnBody>,
    },
    Variable {
        storage: NativeType,
        constant: bool,
        /// `None` for declarations.
        initializer: Option<Constant>,
        alignment: Option<u32>,
        section: Option<String>,
    },
}

/// A named function or variable.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GlobalValue {
    /// Empty when the object has been detached from the symbol table.
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub kind: GlobalKind,
}

impl GlobalValue {
    pub fn function(name: impl Into<String>, linkage: Linkage, visibility: Visibility, sig: Signature) -> Self {
        GlobalValue {
            name: name.into(),
            linkage,
            visibility,
            kind: GlobalKind::Function { sig, body: None },
        }
    }

    pub fn variable(
        name: impl Into<String>,
        linkage: Linkage,
        visibility: Visibility,
        storage: NativeType,
    ) -> Self {
        GlobalValue {
            name: name.into(),
            linkage,
            visibility,
            kind: GlobalKind::Variable {
                storage,
                constant: false,
                initializer: None,
                alignment: None,
                section: None,
            },
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, GlobalKind::Function { .. })
    }

    /// Declared here, defined elsewhere.
    pub fn is_declaration(&self) -> bool {
        match &self.kind {
            GlobalKind::Function { body, .. } => body.is_none(),
            GlobalKind::Variable { initializer, .. } => initializer.is_none(),
        }
    }

    /// Function type or storage type.
    pub fn value_type(&self) -> NativeType {
        match &self.kind {
            GlobalKind::Function { sig, .. } => NativeType::function(sig.ty.clone()),
            GlobalKind::Variable { storage, .. } => storage.clone(),
        }
    }

    pub fn fn_type(&self) -> Option<&FnType> {
        match &self.kind {
            GlobalKind::Function { sig, .. } => Some(&sig.ty),
            GlobalKind::Variable { .. } => None,
        }
    }

    pub fn storage(&self) -> Option<&NativeType> {
        match &self.kind {
            GlobalKind::Variable { storage, .. } => Some(storage),
            GlobalKind::Function { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&FnBody> {
        match &self.kind {
            GlobalKind::Function { body, .. } => body.as_ref(),
            GlobalKind::Variable { .. } => None,
        }
    }

    pub fn initializer(&self) -> Option<&Constant> {
        match &self.kind {
            GlobalKind::Variable { initializer, .. } => initializer.as_ref(),
            GlobalKind::Function { .. } => None,
        }
    }

    pub fn section(&self) -> Option<&str> {
        match &self.kind {
            GlobalKind::Variable { section, .. } => section.as_deref(),
            GlobalKind::Function { .. } => None,
        }
    }

    fn references(&self, id: GlobalId) -> bool {
        match &self.kind {
            GlobalKind::Function { body, .. } => body.as_ref().is_some_and(|b| b.mentions(id)),
            GlobalKind::Variable { initializer, .. } => {
                initializer.as_ref().is_some_and(|c| c.mentions(id))
            }
        }
    }
}

/// The set of native objects produced for one module.
#[derive(Clone, Debug, Default)]
pub struct NativeModule {
    name: String,
    values: Vec<Option<GlobalValue>>,
    symbols: FxHashMap<String, GlobalId>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>) -> Self {
        NativeModule {
            name: name.into(),
            values: Vec::new(),
            symbols: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an object. A name that is already taken gets a numeric suffix;
    /// an empty name stays out of the symbol table.
    pub fn add(&mut self, mut value: GlobalValue) -> GlobalId {
        let id = GlobalId::new(self.next_index());
        if !value.name.is_empty() {
            value.name = self.unique_name(&value.name);
            self.symbols.insert(value.name.clone(), id);
        }
        self.values.push(Some(value));
        id
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        linkage: Linkage,
        visibility: Visibility,
        sig: Signature,
    ) -> GlobalId {
        self.add(GlobalValue::function(name, linkage, visibility, sig))
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        linkage: Linkage,
        visibility: Visibility,
        storage: NativeType,
    ) -> GlobalId {
        self.add(GlobalValue::variable(name, linkage, visibility, storage))
    }

    /// First free name among `base`, `base.1`, `base.2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.symbols.contains_key(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !self.symbols.contains_key(candidate))
            .unwrap_or_default()
    }

    pub fn lookup(&self, name: &str) -> Option<GlobalId> {
        self.symbols.get(name).copied()
    }

    pub fn get(&self, id: GlobalId) -> Option<&GlobalValue> {
        self.values.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: GlobalId) -> Option<&mut GlobalValue> {
        self.values.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn name_of(&self, id: GlobalId) -> &str {
        self.get(id).map_or("", |v| v.name.as_str())
    }

    /// Rename an object. The empty name detaches it from the symbol table
    /// so the old name can be reused.
    pub fn set_name(&mut self, id: GlobalId, name: &str) {
        let Some(old) = self.get(id).map(|v| v.name.clone()) else {
            return;
        };
        if self.symbols.get(&old) == Some(&id) {
            self.symbols.remove(&old);
        }
        let name = if name.is_empty() {
            String::new()
        } else {
            let unique = self.unique_name(name);
            self.symbols.insert(unique.clone(), id);
            unique
        };
        if let Some(value) = self.get_mut(id) {
            value.name = name;
        }
    }

    /// Point every reference to `from` at `to` instead.
    pub fn replace_all_uses(&mut self, from: GlobalId, to: &Constant) {
        for value in self.values.iter_mut().flatten() {
            match &mut value.kind {
                GlobalKind::Function { body: Some(body), .. } => body.replace_uses(from, to),
                GlobalKind::Variable {
                    initializer: Some(init),
                    ..
                } => init.replace_uses(from, to),
                _ => {}
            }
        }
    }

    /// Whether any object refers to `id`.
    pub fn has_uses(&self, id: GlobalId) -> bool {
        self.iter().any(|(_, value)| value.references(id))
    }

    /// Remove an object. References to it must have been replaced first.
    pub fn erase(&mut self, id: GlobalId) {
        let Some(value) = self.values.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        if self.symbols.get(&value.name) == Some(&id) {
            self.symbols.remove(&value.name);
        }
    }

    pub fn set_body(&mut self, id: GlobalId, new_body: FnBody) {
        if let Some(GlobalKind::Function { body, .. }) = self.get_mut(id).map(|v| &mut v.kind) {
            *body = Some(new_body);
        }
    }

    pub fn set_initializer(&mut self, id: GlobalId, init: Constant) {
        if let Some(GlobalKind::Variable { initializer, .. }) = self.get_mut(id).map(|v| &mut v.kind) {
            *initializer = Some(init);
        }
    }

    pub fn set_constant(&mut self, id: GlobalId, is_constant: bool) {
        if let Some(GlobalKind::Variable { constant, .. }) = self.get_mut(id).map(|v| &mut v.kind) {
            *constant = is_constant;
        }
    }

    pub fn set_alignment(&mut self, id: GlobalId, align: u32) {
        if let Some(GlobalKind::Variable { alignment, .. }) = self.get_mut(id).map(|v| &mut v.kind) {
            *alignment = Some(align);
        }
    }

    pub fn set_section(&mut self, id: GlobalId, name: &str) {
        if let Some(GlobalKind::Variable { section, .. }) = self.get_mut(id).map(|v| &mut v.kind) {
            *section = Some(name.to_string());
        }
    }

    pub fn set_linkage(&mut self, id: GlobalId, linkage: Linkage) {
        if let Some(value) = self.get_mut(id) {
            value.linkage = linkage;
        }
    }

    /// Live objects in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, &GlobalValue)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (GlobalId::new(to_u32(i)), v)))
    }

    pub fn functions(&self) -> impl Iterator<Item = (GlobalId, &GlobalValue)> {
        self.iter().filter(|(_, v)| v.is_function())
    }

    pub fn variables(&self) -> impl Iterator<Item = (GlobalId, &GlobalValue)> {
        self.iter().filter(|(_, v)| !v.is_function())
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.values.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_index(&self) -> u32 {
        to_u32(self.values.len())
    }

    fn write_constant(&self, f: &mut fmt::Formatter<'_>, c: &Constant) -> fmt::Result {
        match c {
            Constant::Global(id) => write!(f, "@{}", self.name_of(*id)),
            Constant::Cast { value, ty } => {
                write!(f, "bitcast (")?;
                self.write_constant(f, value)?;
                write!(f, " to {ty})")
            }
            Constant::ElementPtr { base, indices } => {
                write!(f, "getelementptr (")?;
                self.write_constant(f, base)?;
                for index in indices {
                    write!(f, ", {index}")?;
                }
                write!(f, ")")
            }
            Constant::Int { bits, value } => write!(f, "i{bits} {value}"),
            Constant::Null => write!(f, "null"),
            Constant::Zero => write!(f, "zeroinitializer"),
            Constant::Array { elem, elems } => {
                write!(f, "[{} x {elem}] [", elems.len())?;
                self.write_list(f, elems)?;
                write!(f, "]")
            }
            Constant::Struct(fields) => {
                write!(f, "{{ ")?;
                self.write_list(f, fields)?;
                write!(f, " }}")
            }
            Constant::CString(s) => write!(f, "c\"{}\\00\"", s.escape_default()),
        }
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, items: &[Constant]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            self.write_constant(f, item)?;
        }
        Ok(())
    }

    fn write_value(&self, f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
        match v {
            Value::Const(c) => self.write_constant(f, c),
            Value::Param(n) => write!(f, "%arg{n}"),
            Value::Inst(n) => write!(f, "%{n}"),
        }
    }
}

impl fmt::Display for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (id, value) in self.iter() {
            let name = if value.name.is_empty() {
                format!("{}", id.index())
            } else {
                value.name.clone()
            };
            match &value.kind {
                GlobalKind::Variable {
                    storage,
                    constant,
                    initializer,
                    alignment,
                    section,
                } => {
                    let kind = if *constant { "constant" } else { "global" };
                    write!(f, "@{name} = {} {} {kind} {storage}", value.linkage, value.visibility)?;
                    if let Some(init) = initializer {
                        write!(f, " ")?;
                        self.write_constant(f, init)?;
                    }
                    if let Some(section) = section {
                        write!(f, ", section {section:?}")?;
                    }
                    if let Some(align) = alignment {
                        write!(f, ", align {align}")?;
                    }
                    writeln!(f)?;
                }
                GlobalKind::Function { sig, body } => {
                    let cc = match sig.cc {
                        CallConv::Native => "",
                        CallConv::C => "ccc ",
                    };
                    let Some(body) = body else {
                        writeln!(f, "declare {cc}{} @{name}", sig.ty)?;
                        continue;
                    };
                    writeln!(
                        f,
                        "define {} {} {cc}{} @{name} {{",
                        value.linkage, value.visibility, sig.ty
                    )?;
                    let mut index = 0;
                    for block in &body.blocks {
                        for inst in &block.insts {
                            write!(f, "  ")?;
                            match inst {
                                FnInst::Call { callee, args } => {
                                    write!(f, "%{index} = call ")?;
                                    self.write_value(f, callee)?;
                                    write!(f, "(")?;
                                    for (i, arg) in args.iter().enumerate() {
                                        if i > 0 {
                                            write!(f, ", ")?;
                                        }
                                        self.write_value(f, arg)?;
                                    }
                                    write!(f, ")")?;
                                }
                                FnInst::Store { value, dest } => {
                                    write!(f, "store ")?;
                                    self.write_value(f, value)?;
                                    write!(f, ", ")?;
                                    self.write_value(f, dest)?;
                                }
                                FnInst::Return(None) => write!(f, "ret void")?,
                                FnInst::Return(Some(v)) => {
                                    write!(f, "ret ")?;
                                    self.write_value(f, v)?;
                                }
                                FnInst::Unreachable => write!(f, "unreachable")?,
                            }
                            writeln!(f)?;
                            index += 1;
                        }
                    }
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "object counts are bounded far below u32::MAX"
)]
fn to_u32(index: usize) -> u32 {
    index as u32
}

#[cfg(test)]
mod tests;
