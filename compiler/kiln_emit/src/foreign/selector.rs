//! Selectors and method type encodings for foreign registration.

use kiln_ir::lowered::{FnType, NativeType};
use kiln_ir::{BuiltinTy, DeclId, DeclTable, Ty};

/// Selector of a foreign method.
///
/// An explicit selector wins. Otherwise the base name takes a colon when
/// there are parameters, and every further parameter contributes its
/// label: `move(to:by:)` is `move:by:`.
pub fn method_selector(decls: &DeclTable, method: DeclId) -> String {
    let decl = decls.get(method);
    let Some(func) = decl.as_func() else {
        return decls.name(decl.name).to_string();
    };
    if let Some(selector) = func.foreign_selector {
        return decls.name(selector).to_string();
    }
    let mut selector = decls.name(decl.name).to_string();
    if let Some((_, rest)) = func.params.split_first() {
        selector.push(':');
        for &label in rest {
            selector.push_str(decls.name(label));
            selector.push(':');
        }
    }
    selector
}

/// Selector of a foreign initializer: `init`, or `initWithX:y:` for
/// parameters labeled `x` and `y`.
pub fn initializer_selector(decls: &DeclTable, ctor: DeclId) -> String {
    let Some(func) = decls.get(ctor).as_func() else {
        return "init".to_string();
    };
    if let Some(selector) = func.foreign_selector {
        return decls.name(selector).to_string();
    }
    let Some((&first, rest)) = func.params.split_first() else {
        return "init".to_string();
    };
    let mut selector = format!("initWith{}:", capitalize(decls.name(first)));
    for &label in rest {
        selector.push_str(decls.name(label));
        selector.push(':');
    }
    selector
}

/// Getter selector of a property: its explicit selector or its name.
pub fn getter_selector(decls: &DeclTable, property: DeclId) -> String {
    let decl = decls.get(property);
    match decl.as_storage().and_then(|s| s.foreign_selector) {
        Some(selector) => decls.name(selector).to_string(),
        None => decls.name(decl.name).to_string(),
    }
}

/// Setter selector of a property, derived from its getter: `setCount:`.
pub fn setter_selector(decls: &DeclTable, property: DeclId) -> String {
    format!("set{}:", capitalize(&getter_selector(decls, property)))
}

/// Getter and setter selectors of a subscript. Integer-indexed subscripts
/// use the indexed forms, everything else the keyed forms.
pub fn subscript_selectors(decls: &DeclTable, subscript: DeclId) -> (&'static str, &'static str) {
    let indexed = decls
        .get(subscript)
        .as_storage()
        .and_then(|s| s.indices.as_ref())
        .is_some_and(|ty| matches!(ty, Ty::Builtin(BuiltinTy::Int(_))));
    if indexed {
        ("objectAtIndexedSubscript:", "setObject:atIndexedSubscript:")
    } else {
        ("objectForKeyedSubscript:", "setObject:forKeyedSubscript:")
    }
}

/// Type encoding of a method implementation: the return type, then the
/// receiver (`@`) and selector (`:`), then the remaining parameters.
pub fn type_encoding(ty: &FnType) -> String {
    let mut out = String::new();
    encode(&mut out, &ty.ret);
    out.push_str("@:");
    for param in ty.params.iter().skip(2) {
        encode(&mut out, param);
    }
    out
}

fn encode(out: &mut String, ty: &NativeType) {
    match ty {
        NativeType::Void => out.push('v'),
        NativeType::Int(1) => out.push('B'),
        NativeType::Int(8) => out.push('c'),
        NativeType::Int(16) => out.push('s'),
        NativeType::Int(32) => out.push('i'),
        NativeType::Int(_) => out.push('q'),
        NativeType::Float(32) => out.push('f'),
        NativeType::Float(_) => out.push('d'),
        NativeType::Ptr => out.push('@'),
        NativeType::Struct(fields) => {
            out.push_str("{?=");
            for field in fields {
                encode(out, field);
            }
            out.push('}');
        }
        NativeType::Array(elem, len) => {
            out.push('[');
            out.push_str(&len.to_string());
            encode(out, elem);
            out.push(']');
        }
        NativeType::Function(_) => out.push_str("^?"),
        NativeType::Layout(_) => out.push_str("^v"),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
