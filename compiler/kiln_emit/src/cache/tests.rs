use pretty_assertions::assert_eq;

use kiln_diagnostic::ErrorCode;
use kiln_ir::lowered::{CallConv, FnType, LoweredGlobal, NativeType, Signature};
use kiln_ir::Ty;

use super::*;
use crate::entity::CodeRef;
use crate::mangle::ExtensionBindings;
use crate::native::BodyBuilder;
use crate::test_helpers::Fixture;

fn void_sig() -> Signature {
    Signature::native(FnType::void())
}

#[test]
fn test_function_lookup_is_idempotent() {
    let mut fx = Fixture::new();
    let f = fx.func("f", Fixture::unit_fn());
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let key = EntityKey::Function(CodeRef::minimal(f, 0));

    let first = cache.get_or_create_function(&key, &void_sig());
    let second = cache.get_or_create_function(&key, &void_sig());

    assert_eq!(first, second);
    assert_eq!(cache.lookup_function(&key), Some(first));
    assert_eq!(cache.module().len(), 1);
    assert_eq!(cache.module().name_of(first), "_K1Fm0_3app1ffT_T_");
}

#[test]
fn test_variable_reference_is_cast_to_requested_type() {
    let mut fx = Fixture::new();
    let v = fx.stored_var(fx.top(), "count");
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let key = EntityKey::GlobalVariable(v);

    let declared = cache.get_or_create_variable(&key, &NativeType::Int(64), None);
    let same = cache.get_or_create_variable(&key, &NativeType::Int(64), None);
    let cast = cache.get_or_create_variable(&key, &NativeType::Ptr, None);

    assert_eq!(declared, same);
    assert_eq!(cast, Constant::cast(declared, NativeType::Ptr));
    assert_eq!(cache.module().len(), 1);
}

#[test]
fn test_definition_upgrades_forward_declaration() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let key = EntityKey::TypeMetadata {
        ty: Ty::nominal(point),
        indirect: false,
        pattern: false,
    };
    let full = NativeType::Struct(vec![NativeType::Ptr, NativeType::Int(64), NativeType::Ptr]);

    let Constant::Global(forward) = cache.get_or_create_variable(&key, &NativeType::Ptr, None)
    else {
        panic!("expected a plain reference");
    };
    let user = cache.add_private_variable(
        "user",
        Linkage::Internal,
        NativeType::Ptr,
        Constant::Global(forward),
    );
    let defined = cache.get_or_create_variable(&key, &NativeType::Ptr, Some(&full));
    let again = cache.get_or_create_variable(&key, &NativeType::Ptr, Some(&full));

    let Constant::Global(def) = defined.clone() else {
        panic!("expected a plain reference");
    };
    assert_ne!(def, forward);
    assert_eq!(again, defined);
    assert_eq!(cache.module().get(forward), None);
    assert_eq!(cache.module().name_of(def), "_K1MdV3app5Point");
    assert_eq!(
        cache.module().get(def).and_then(GlobalValue::storage),
        Some(&full)
    );
    assert_eq!(
        cache.module().get(user).and_then(GlobalValue::initializer),
        Some(&defined)
    );
    assert!(cache.diagnostics().is_empty());

    let (_, symbols, _) = cache.finish();
    let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["user", "_K1MdV3app5Point"]);
}

#[test]
fn test_function_collision_renames_the_existing_symbol() {
    let mut fx = Fixture::new();
    let f = fx.func("f", Fixture::unit_fn());
    let lowered = fx.lower(f, "clash");
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);

    let squatter = cache.create_variable(&LinkInfo::external("clash"), &NativeType::Ptr);
    let func = cache.get_or_create_function(&EntityKey::LoweredFunction(lowered), &void_sig());

    assert_eq!(cache.module().name_of(squatter), "clash.unique");
    assert_eq!(cache.module().name_of(func), "clash");
    let diags = cache.diagnostics().diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, ErrorCode::E4001);
    assert_eq!(
        diags[0].message,
        "program too clever: function collides with existing symbol clash"
    );
}

#[test]
fn test_same_function_signature_is_reused() {
    let fx = Fixture::new();
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let info = LinkInfo::external("helper");

    let a = cache.create_function(&info, &void_sig());
    let b = cache.create_function(&info, &void_sig());

    assert_eq!(a, b);
    assert!(cache.diagnostics().is_empty());
}

#[test]
fn test_function_with_other_signature_collides() {
    let fx = Fixture::new();
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let info = LinkInfo::external("helper");

    let a = cache.create_function(&info, &void_sig());
    let b = cache.create_function(
        &info,
        &Signature::native(FnType::new(vec![NativeType::Ptr], NativeType::Void)),
    );

    assert_ne!(a, b);
    assert_eq!(cache.module().name_of(a), "helper.unique");
    assert_eq!(cache.module().lookup("helper"), Some(b));
    assert_eq!(cache.diagnostics().error_count(), 1);
}

#[test]
fn test_variable_collision() {
    let mut fx = Fixture::new();
    let g = fx.lowered.add_global(LoweredGlobal::new("state", NativeType::Int(64)));
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);

    let squatter = cache.create_function(&LinkInfo::external("state"), &void_sig());
    let var = cache.get_or_create_variable(&EntityKey::LoweredGlobal(g), &NativeType::Int(64), None);

    assert_eq!(cache.module().name_of(squatter), "state.unique");
    assert_eq!(var, Constant::Global(cache.module().lookup("state").unwrap()));
    let diags = cache.diagnostics().diagnostics();
    assert_eq!(diags[0].code, ErrorCode::E4002);
    assert_eq!(
        diags[0].message,
        "program too clever: variable collides with existing symbol state"
    );
}

#[test]
fn test_simple_variable_is_constant_and_aligned() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let key = EntityKey::NominalTypeDescriptor(point);

    let id = cache.get_or_create_simple_variable(&key, &NativeType::Ptr, 8);

    assert_eq!(cache.get_or_create_simple_variable(&key, &NativeType::Ptr, 8), id);
    let Some(GlobalValue {
        kind: crate::native::GlobalKind::Variable {
            constant, alignment, ..
        },
        ..
    }) = cache.module().get(id)
    else {
        panic!("expected a variable");
    };
    assert!(*constant);
    assert_eq!(*alignment, Some(8));
}

#[test]
fn test_global_strings_are_interned() {
    let fx = Fixture::new();
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);

    let a = cache.global_string("load");
    let b = cache.global_string("init");
    let c = cache.global_string("load");

    assert_eq!(a, c);
    assert_ne!(a, b);
    let ids: Vec<_> = [&a, &b].iter().filter_map(|c| c.base_global()).collect();
    assert_eq!(cache.module().name_of(ids[0]), ".str");
    assert_eq!(cache.module().name_of(ids[1]), ".str.1");
    assert_eq!(
        cache.module().get(ids[0]).and_then(GlobalValue::storage),
        Some(&NativeType::array(NativeType::Int(8), 5))
    );
    assert_eq!(a, Constant::element_ptr(Constant::Global(ids[0]), &[0, 0]));
}

#[test]
fn test_runtime_functions_use_c_convention() {
    let fx = Fixture::new();
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let ty = FnType::new(vec![NativeType::Ptr], NativeType::Ptr);

    let a = cache.runtime_function("sel_registerName", ty.clone());
    let b = cache.runtime_function("sel_registerName", ty);

    assert_eq!(a, b);
    let Some(GlobalValue {
        kind: crate::native::GlobalKind::Function { sig, body },
        linkage,
        ..
    }) = cache.module().get(a)
    else {
        panic!("expected a function");
    };
    assert_eq!(sig.cc, CallConv::C);
    assert_eq!(*linkage, Linkage::External);
    assert!(body.is_none());
}

#[test]
fn test_symbol_table_records_definitions() {
    let mut fx = Fixture::new();
    let f = fx.func("f", Fixture::unit_fn());
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);

    let defined = cache.get_or_create_function(&EntityKey::Function(CodeRef::minimal(f, 0)), &void_sig());
    cache.module_mut().set_body(defined, BodyBuilder::new().ret(None));
    cache.runtime_function("abort", FnType::void());
    let (_, symbols, diagnostics) = cache.finish();

    assert!(diagnostics.is_empty());
    assert_eq!(
        symbols,
        vec![
            SymbolEntry {
                name: "_K1Fm0_3app1ffT_T_".to_string(),
                linkage: Linkage::External,
                visibility: Visibility::Default,
                kind: ObjectKind::Function,
                defined: true,
            },
            SymbolEntry {
                name: "abort".to_string(),
                linkage: Linkage::External,
                visibility: Visibility::Default,
                kind: ObjectKind::Function,
                defined: false,
            },
        ]
    );
}

#[test]
fn test_resolve_follows_upgraded_declarations() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    let ext = ExtensionBindings::default();
    let mut cache = fx.cache(&ext);
    let key = EntityKey::NominalTypeDescriptor(point);
    let full = NativeType::Struct(vec![NativeType::Int(64), NativeType::Ptr]);

    let forward = cache.get_or_create_variable(&key, &NativeType::Ptr, None);
    let held = Constant::element_ptr(forward, &[0, 1]);
    let defined = cache.get_or_create_variable(&key, &NativeType::Ptr, Some(&full));

    assert_eq!(cache.resolve(&held), Constant::element_ptr(defined, &[0, 1]));
}
