//! Parsing mangled names back into a readable tree.

use std::fmt;

use crate::entity::{Explosion, ValueWitness};

use super::{FOREIGN_CLASS_PREFIX, FOREIGN_METACLASS_PREFIX, MANGLE_PREFIX};

/// What a symbol denotes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SymbolKind {
    Function,
    Getter,
    Setter,
    AllocatingConstructor,
    InitializingConstructor,
    DeallocatingDestructor,
    DestroyingDestructor,
    FieldOffset { indirect: bool },
    WitnessTableOffset,
    ValueWitness(ValueWitness),
    ValueWitnessTable,
    TypeMetadata { indirect: bool, pattern: bool },
    NominalTypeDescriptor,
    ProtocolDescriptor,
    MetaclassStub,
    WitnessTable,
    GlobalVariable,
    TypeMangling,
    Other,
    Addressor,
    ForeignClass,
    ForeignMetaclass,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Getter => write!(f, "getter"),
            SymbolKind::Setter => write!(f, "setter"),
            SymbolKind::AllocatingConstructor => write!(f, "allocating constructor"),
            SymbolKind::InitializingConstructor => write!(f, "initializing constructor"),
            SymbolKind::DeallocatingDestructor => write!(f, "deallocating destructor"),
            SymbolKind::DestroyingDestructor => write!(f, "destroying destructor"),
            SymbolKind::FieldOffset { indirect: false } => write!(f, "direct field offset"),
            SymbolKind::FieldOffset { indirect: true } => write!(f, "indirect field offset"),
            SymbolKind::WitnessTableOffset => write!(f, "witness table offset"),
            SymbolKind::ValueWitness(witness) => write!(f, "value witness {witness:?}"),
            SymbolKind::ValueWitnessTable => write!(f, "value witness table"),
            SymbolKind::TypeMetadata { pattern: true, .. } => write!(f, "metadata pattern"),
            SymbolKind::TypeMetadata { indirect: true, .. } => write!(f, "indirect type metadata"),
            SymbolKind::TypeMetadata { .. } => write!(f, "type metadata"),
            SymbolKind::NominalTypeDescriptor => write!(f, "nominal type descriptor"),
            SymbolKind::ProtocolDescriptor => write!(f, "protocol descriptor"),
            SymbolKind::MetaclassStub => write!(f, "metaclass stub"),
            SymbolKind::WitnessTable => write!(f, "protocol witness table"),
            SymbolKind::GlobalVariable => write!(f, "variable"),
            SymbolKind::TypeMangling => write!(f, "type"),
            SymbolKind::Other => write!(f, "entity"),
            SymbolKind::Addressor => write!(f, "addressor"),
            SymbolKind::ForeignClass => write!(f, "foreign class"),
            SymbolKind::ForeignMetaclass => write!(f, "foreign metaclass"),
        }
    }
}

/// Calling mode of a code entity.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Mode {
    pub explosion: Explosion,
    pub uncurry_level: u32,
    pub foreign: bool,
}

/// A declaration by its module and enclosing scopes.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DeclPath {
    /// `None` for foreign modules.
    pub module: Option<String>,
    pub scopes: Vec<String>,
    pub name: String,
}

impl DeclPath {
    fn child_context(self) -> (Option<String>, Vec<String>) {
        let mut scopes = self.scopes;
        scopes.push(self.name);
        (self.module, scopes)
    }
}

impl fmt::Display for DeclPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module.as_deref().unwrap_or("__foreign"))?;
        for scope in &self.scopes {
            write!(f, ".{scope}")?;
        }
        write!(f, ".{}", self.name)
    }
}

/// A generic parameter with its bounds.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParamNode {
    pub protocols: Vec<DeclPath>,
    pub superclass: Option<TypeNode>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TypeNode {
    Builtin(String),
    Nominal(DeclPath),
    BoundGeneric(DeclPath, Vec<TypeNode>),
    Tuple(Vec<TypeNode>),
    Function(Box<TypeNode>, Box<TypeNode>),
    Polymorphic {
        params: Vec<ParamNode>,
        input: Box<TypeNode>,
        output: Box<TypeNode>,
    },
    Param { depth: u32, index: u32 },
    Metatype(Box<TypeNode>),
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Builtin(name) => write!(f, "Builtin.{name}"),
            TypeNode::Nominal(path) => write!(f, "{path}"),
            TypeNode::BoundGeneric(path, args) => {
                write!(f, "{path}<")?;
                write_list(f, args)?;
                write!(f, ">")
            }
            TypeNode::Tuple(elems) => {
                write!(f, "(")?;
                write_list(f, elems)?;
                write!(f, ")")
            }
            TypeNode::Function(input, output) => write!(f, "{input} -> {output}"),
            TypeNode::Polymorphic {
                params,
                input,
                output,
            } => {
                write!(f, "<")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "T{i}")?;
                    let mut sep = ": ";
                    for protocol in &param.protocols {
                        write!(f, "{sep}{protocol}")?;
                        sep = " & ";
                    }
                    if let Some(superclass) = &param.superclass {
                        write!(f, "{sep}{superclass}")?;
                    }
                }
                write!(f, "> {input} -> {output}")
            }
            TypeNode::Param { depth, index } => write!(f, "T_{depth}_{index}"),
            TypeNode::Metatype(instance) => write!(f, "{instance}.Type"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeNode]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// A parsed symbol.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Demangled {
    pub kind: SymbolKind,
    pub mode: Option<Mode>,
    pub entity: Option<DeclPath>,
    pub ty: Option<TypeNode>,
    /// Protocol of a witness table.
    pub protocol: Option<DeclPath>,
}

impl Demangled {
    fn new(kind: SymbolKind) -> Self {
        Demangled {
            kind,
            mode: None,
            entity: None,
            ty: None,
            protocol: None,
        }
    }
}

impl fmt::Display for Demangled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(entity) = &self.entity {
            write!(f, " {entity}")?;
        }
        if let Some(ty) = &self.ty {
            if self.entity.is_some() {
                write!(f, " :")?;
            }
            write!(f, " {ty}")?;
        }
        if let Some(protocol) = &self.protocol {
            write!(f, " : {protocol}")?;
        }
        Ok(())
    }
}

/// Parse a symbol produced by the mangler.
///
/// Returns `None` for names that are not Kiln symbols, and for truncated
/// or trailing input. Foreign class symbols naming a native class parse the
/// embedded type; imported class names come back as a single-name path.
pub fn demangle(symbol: &str) -> Option<Demangled> {
    for (prefix, kind) in [
        (FOREIGN_CLASS_PREFIX, SymbolKind::ForeignClass),
        (FOREIGN_METACLASS_PREFIX, SymbolKind::ForeignMetaclass),
    ] {
        if let Some(rest) = symbol.strip_prefix(prefix) {
            let mut result = Demangled::new(kind);
            match rest.strip_prefix(MANGLE_PREFIX).and_then(|m| m.strip_prefix('t')) {
                Some(mangled) => {
                    let mut parser = Parser::new(mangled);
                    result.ty = Some(parser.ty()?);
                    parser.finish()?;
                }
                None if !rest.is_empty() => {
                    result.entity = Some(DeclPath {
                        module: None,
                        scopes: Vec::new(),
                        name: rest.to_string(),
                    });
                }
                None => return None,
            }
            return Some(result);
        }
    }

    let mut parser = Parser::new(symbol.strip_prefix(MANGLE_PREFIX)?);
    let result = parser.entity()?;
    parser.finish()?;
    Some(result)
}

struct Parser<'s> {
    input: &'s [u8],
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(input: &'s str) -> Self {
        Parser {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn finish(&self) -> Option<()> {
        (self.pos == self.input.len()).then_some(())
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        self.eat(byte).then_some(())
    }

    fn number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn take(&mut self, len: usize) -> Option<&'s [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.input.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn identifier(&mut self) -> Option<String> {
        if self.eat(b'X') {
            let len = self.number()? as usize;
            self.expect(b'_')?;
            return unescape(self.take(len)?);
        }
        let len = self.number()? as usize;
        let text = std::str::from_utf8(self.take(len)?).ok()?;
        Some(text.to_string())
    }

    fn mode(&mut self) -> Option<Mode> {
        let explosion = match self.next()? {
            b'm' => Explosion::Minimal,
            b'x' => Explosion::Maximal,
            _ => return None,
        };
        let uncurry_level = self.number()?;
        let foreign = self.eat(b'o');
        self.expect(b'_')?;
        Some(Mode {
            explosion,
            uncurry_level,
            foreign,
        })
    }

    fn decl(&mut self) -> Option<DeclPath> {
        let (module, scopes) = self.context()?;
        let name = self.identifier()?;
        Some(DeclPath {
            module,
            scopes,
            name,
        })
    }

    fn context(&mut self) -> Option<(Option<String>, Vec<String>)> {
        match self.peek()? {
            b'S' => {
                self.pos += 1;
                self.expect(b'o')?;
                Some((None, Vec::new()))
            }
            b'V' | b'O' | b'C' | b'P' => Some(self.nominal()?.child_context()),
            b'L' => {
                self.pos += 1;
                let (module, mut scopes) = self.decl()?.child_context();
                let discriminator = self.number()?;
                self.expect(b'_')?;
                scopes.push(format!("(local {discriminator})"));
                Some((module, scopes))
            }
            b'E' => {
                self.pos += 1;
                let module = self.identifier()?;
                let index = self.number()?;
                self.expect(b'_')?;
                Some((Some(module), vec![format!("(extension {index})")]))
            }
            _ => Some((Some(self.identifier()?), Vec::new())),
        }
    }

    fn nominal(&mut self) -> Option<DeclPath> {
        match self.next()? {
            b'V' | b'O' | b'C' | b'P' => self.decl(),
            _ => None,
        }
    }

    fn ty(&mut self) -> Option<TypeNode> {
        match self.peek()? {
            b'V' | b'O' | b'C' | b'P' => Some(TypeNode::Nominal(self.nominal()?)),
            b'G' => {
                self.pos += 1;
                let path = self.nominal()?;
                let args = self.type_list()?;
                Some(TypeNode::BoundGeneric(path, args))
            }
            b'T' => {
                self.pos += 1;
                Some(TypeNode::Tuple(self.type_list()?))
            }
            b'f' => {
                self.pos += 1;
                let input = self.ty()?;
                let output = self.ty()?;
                Some(TypeNode::Function(Box::new(input), Box::new(output)))
            }
            b'U' => {
                self.pos += 1;
                let mut params = Vec::new();
                while self.eat(b'q') {
                    let mut param = ParamNode {
                        protocols: Vec::new(),
                        superclass: None,
                    };
                    loop {
                        match self.peek()? {
                            b'_' => break,
                            b'S' => {
                                self.pos += 1;
                                param.superclass = Some(self.ty()?);
                            }
                            _ => param.protocols.push(self.nominal()?),
                        }
                    }
                    self.expect(b'_')?;
                    params.push(param);
                }
                self.expect(b'_')?;
                let input = self.ty()?;
                let output = self.ty()?;
                Some(TypeNode::Polymorphic {
                    params,
                    input: Box::new(input),
                    output: Box::new(output),
                })
            }
            b'Q' => {
                self.pos += 1;
                let depth = self.number()?;
                self.expect(b'_')?;
                let index = self.number()?;
                self.expect(b'_')?;
                Some(TypeNode::Param { depth, index })
            }
            b'm' => {
                self.pos += 1;
                Some(TypeNode::Metatype(Box::new(self.ty()?)))
            }
            b'B' => {
                self.pos += 1;
                let name = match self.next()? {
                    b'i' => format!("Int{}", self.sized()?),
                    b'f' => format!("FPIEEE{}", self.sized()?),
                    b'p' => "RawPointer".to_string(),
                    b'o' => "NativeObject".to_string(),
                    _ => return None,
                };
                Some(TypeNode::Builtin(name))
            }
            _ => None,
        }
    }

    fn sized(&mut self) -> Option<u32> {
        let bits = self.number()?;
        self.expect(b'_')?;
        Some(bits)
    }

    fn type_list(&mut self) -> Option<Vec<TypeNode>> {
        let mut items = Vec::new();
        while !self.eat(b'_') {
            items.push(self.ty()?);
        }
        Some(items)
    }

    fn code(&mut self, kind: SymbolKind) -> Option<Demangled> {
        let mut result = Demangled::new(kind);
        result.mode = Some(self.mode()?);
        result.entity = Some(self.decl()?);
        result.ty = Some(self.ty()?);
        Some(result)
    }

    fn entity(&mut self) -> Option<Demangled> {
        match self.next()? {
            b'F' => self.code(SymbolKind::Function),
            b'g' => self.code(SymbolKind::Getter),
            b's' => self.code(SymbolKind::Setter),
            b'c' => match self.next()? {
                b'C' => self.code(SymbolKind::AllocatingConstructor),
                b'c' => self.code(SymbolKind::InitializingConstructor),
                _ => None,
            },
            b'D' => {
                let kind = match self.next()? {
                    b'D' => SymbolKind::DeallocatingDestructor,
                    b'd' => SymbolKind::DestroyingDestructor,
                    _ => return None,
                };
                self.with_entity(kind, Self::nominal)
            }
            b'W' => match self.next()? {
                b'v' => {
                    let indirect = match self.next()? {
                        b'd' => false,
                        b'i' => true,
                        _ => return None,
                    };
                    self.with_entity(SymbolKind::FieldOffset { indirect }, Self::decl)
                }
                b'o' => self.code(SymbolKind::WitnessTableOffset),
                b'V' => self.with_type(SymbolKind::ValueWitnessTable),
                b'P' => {
                    let mut result = self.with_type(SymbolKind::WitnessTable)?;
                    result.protocol = Some(self.nominal()?);
                    Some(result)
                }
                _ => None,
            },
            b'w' => {
                let code = std::str::from_utf8(self.take(2)?).ok()?;
                let witness = ValueWitness::from_code(code)?;
                self.with_type(SymbolKind::ValueWitness(witness))
            }
            b'M' => match self.next()? {
                b'd' => self.with_type(SymbolKind::TypeMetadata {
                    indirect: false,
                    pattern: false,
                }),
                b'i' => self.with_type(SymbolKind::TypeMetadata {
                    indirect: true,
                    pattern: false,
                }),
                b'P' => self.with_type(SymbolKind::TypeMetadata {
                    indirect: false,
                    pattern: true,
                }),
                b'I' => self.with_type(SymbolKind::TypeMetadata {
                    indirect: true,
                    pattern: true,
                }),
                b'n' => self.with_entity(SymbolKind::NominalTypeDescriptor, Self::nominal),
                b'p' => self.with_entity(SymbolKind::ProtocolDescriptor, Self::nominal),
                b'm' => self.with_entity(SymbolKind::MetaclassStub, Self::nominal),
                _ => None,
            },
            b'v' => self.with_entity(SymbolKind::GlobalVariable, Self::decl),
            b't' => self.with_type(SymbolKind::TypeMangling),
            b'o' => self.with_entity(SymbolKind::Other, Self::decl),
            b'a' => {
                let module = self.identifier()?;
                let name = self.identifier()?;
                let mut result = Demangled::new(SymbolKind::Addressor);
                result.entity = Some(DeclPath {
                    module: Some(module),
                    scopes: Vec::new(),
                    name,
                });
                Some(result)
            }
            _ => None,
        }
    }

    fn with_entity(
        &mut self,
        kind: SymbolKind,
        parse: fn(&mut Self) -> Option<DeclPath>,
    ) -> Option<Demangled> {
        let mut result = Demangled::new(kind);
        result.entity = Some(parse(self)?);
        Some(result)
    }

    fn with_type(&mut self, kind: SymbolKind) -> Option<Demangled> {
        let mut result = Demangled::new(kind);
        result.ty = Some(self.ty()?);
        Some(result)
    }
}

fn unescape(bytes: &[u8]) -> Option<String> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&byte) = iter.next() {
        if byte == b'$' {
            let hi = char::from(*iter.next()?).to_digit(16)?;
            let lo = char::from(*iter.next()?).to_digit(16)?;
            out.push(u8::try_from(hi * 16 + lo).ok()?);
        } else {
            out.push(byte);
        }
    }
    String::from_utf8(out).ok()
}
