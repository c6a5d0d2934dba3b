use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_empty_is_preinterned() {
    let interner = StringInterner::new();
    assert_eq!(interner.intern(""), Name::EMPTY);
    assert_eq!(interner.lookup(Name::EMPTY), "");
    assert!(interner.is_empty());
}

#[test]
fn test_intern_is_stable() {
    let interner = StringInterner::new();
    let a = interner.intern("Widget");
    let b = interner.intern("Widget");
    let c = interner.intern("Gadget");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(interner.lookup(a), "Widget");
    assert_eq!(interner.lookup(c), "Gadget");
    assert_eq!(interner.len(), 3);
}

#[test]
fn test_get_does_not_intern() {
    let interner = StringInterner::new();
    assert_eq!(interner.get("missing"), None);
    assert_eq!(interner.len(), 1);
    let name = interner.intern("present");
    assert_eq!(interner.get("present"), Some(name));
}

#[test]
fn test_lookup_unknown_name() {
    let interner = StringInterner::new();
    assert_eq!(interner.lookup(Name::from_raw(99)), "");
}
