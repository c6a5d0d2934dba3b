use pretty_assertions::assert_eq;

use kiln_ir::lowered::{
    Body, FnType, Layout, LoweredFunction, LoweredGlobal, LoweredWitnessTable, NativeType,
    Signature, WitnessEntry,
};
use kiln_ir::{
    Conformance, DeclContext, DeclFlags, DeclId, DeclKind, FuncDecl, GenericParam, NominalDecl,
    Provenance, Span, StorageDecl, Ty, TypeRepr,
};

use super::*;
use crate::entity::EntityKey;
use crate::linkage::Linkage;
use crate::native::{Constant, GlobalId, GlobalValue};
use crate::test_helpers::Fixture;

fn metadata_key(decl: DeclId) -> EntityKey {
    EntityKey::TypeMetadata {
        ty: Ty::nominal(decl),
        indirect: false,
        pattern: false,
    }
}

fn var<'m>(cx: &'m EmitCx<'_>, key: &EntityKey) -> (GlobalId, &'m GlobalValue) {
    let id = cx.cache().lookup_variable(key).unwrap();
    (id, cx.cache().module().get(id).unwrap())
}

fn fields(value: &GlobalValue) -> &[Constant] {
    match value.initializer() {
        Some(Constant::Struct(fields)) => fields,
        other => panic!("expected a record initializer, got {other:?}"),
    }
}

fn storage_var(fx: &mut Fixture, context: DeclContext, name: &str, storage: NativeType) -> DeclId {
    fx.add_in(context, name, DeclKind::Var(StorageDecl::new(Fixture::int(), storage)))
}

#[test]
fn test_subscript_at_module_scope_is_invariant_violation() {
    let mut fx = Fixture::new();
    let sub = fx.add(
        "subscript",
        DeclKind::Subscript(StorageDecl::new(Fixture::int(), NativeType::Int(64))),
    );

    let result = fx.with_cx(&EmitOptions::new(), |cx| cx.emit_global_decl(sub));
    assert_eq!(
        result,
        Err(EmitError::invariant("subscript", "app.subscript", DeclSite::ModuleScope))
    );
}

#[test]
fn test_inert_module_scope_decls_emit_nothing() {
    let mut fx = Fixture::new();
    let alias = fx.add(
        "Alias",
        DeclKind::TypeAlias {
            underlying: TypeRepr::simple(fx.decls.intern("Int"), Span::DUMMY),
        },
    );
    let code = fx.add("", DeclKind::TopLevelCode);
    let op = fx.add("+++", DeclKind::InfixOperator);

    fx.with_cx(&EmitOptions::new(), |cx| {
        for decl in [alias, code, op] {
            cx.emit_global_decl(decl).unwrap();
        }
        assert!(cx.cache().module().is_empty());
    });
}

#[test]
fn test_struct_metadata_is_referenced_past_its_header() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    fx.stored_var(DeclContext::Nominal(point), "x");
    fx.stored_var(DeclContext::Nominal(point), "y");

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_decl(point).unwrap();

        let (id, metadata) = var(cx, &metadata_key(point));
        assert!(!metadata.is_declaration());
        assert_eq!(
            metadata.storage(),
            Some(&NativeType::Struct(vec![NativeType::Ptr, NativeType::Int(64), NativeType::Ptr]))
        );
        assert_eq!(fields(metadata)[1], Constant::i64(MetadataKind::Struct as i64));

        let (_, descriptor) = var(cx, &EntityKey::NominalTypeDescriptor(point));
        assert_eq!(fields(descriptor)[2], Constant::i32(2));
        assert_eq!(fields(descriptor)[3], Constant::i32(0));

        // Later references see the header-less layout and skip the header.
        let reference = cx.addr_of_type_metadata(&Ty::nominal(point), false, false, None);
        let full = NativeType::Layout(Layout::FullTypeMetadata);
        assert_eq!(
            reference,
            Constant::element_ptr(Constant::cast(Constant::Global(id), full), &[0, 1])
        );
    });
}

#[test]
fn test_value_witnesses_forward_to_runtime() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_decl(point).unwrap();

        let (_, table) = var(cx, &EntityKey::ValueWitnessTable(Ty::nominal(point)));
        let Some(Constant::Array { elems, .. }) = table.initializer() else {
            panic!("expected a witness array");
        };
        assert_eq!(elems.len(), 13);

        let module = cx.cache().module();
        let destroy = module.lookup("kiln_pod_destroy").unwrap();
        assert!(module.get(destroy).unwrap().is_declaration());
        let witness = cx
            .cache()
            .lookup_function(&EntityKey::ValueWitness {
                ty: Ty::nominal(point),
                witness: crate::entity::ValueWitness::Destroy,
            })
            .unwrap();
        let witness = module.get(witness).unwrap();
        assert_eq!(witness.linkage, Linkage::LinkOnceOdr);
        assert_eq!(witness.body().unwrap().insts().count(), 2);
    });
}

#[test]
fn test_class_metadata_field_offsets_and_superclass() {
    let mut fx = Fixture::new();
    let base = fx.class("Base");
    let inherited = vec![TypeRepr::simple(fx.decls.intern("Base"), Span::DUMMY)];
    let derived = fx.add(
        "Derived",
        DeclKind::Class(NominalDecl::default().with_inherited(inherited)),
    );
    let inside = DeclContext::Nominal(derived);
    let flag = storage_var(&mut fx, inside, "flag", NativeType::Int(8));
    let count = storage_var(&mut fx, inside, "count", NativeType::Int(64));
    let shared = {
        let decl = fx
            .build(
                inside,
                "shared",
                DeclKind::Var(StorageDecl::new(Fixture::int(), NativeType::Int(64))),
            )
            .with_flags(DeclFlags::STATIC);
        fx.alloc(decl)
    };

    fx.with_cx(&EmitOptions::new(), |cx| {
        // The superclass is referenced before it is defined.
        cx.emit_global_decl(derived).unwrap();
        cx.emit_global_decl(base).unwrap();

        let (_, metadata) = var(cx, &metadata_key(derived));
        assert_eq!(fields(metadata).len(), 5);
        assert_eq!(fields(metadata)[2], Constant::i64(MetadataKind::Class as i64));
        let (base_id, _) = var(cx, &metadata_key(base));
        assert_eq!(
            fields(metadata)[3],
            Constant::element_ptr(Constant::Global(base_id), &[0, 2])
        );

        let offset = |decl| {
            let (_, value) = var(cx, &EntityKey::FieldOffset { decl, indirect: false });
            value.initializer().cloned()
        };
        assert_eq!(offset(flag), Some(Constant::i64(16)));
        assert_eq!(offset(count), Some(Constant::i64(24)));
        assert_eq!(
            cx.cache()
                .lookup_variable(&EntityKey::FieldOffset { decl: shared, indirect: false }),
            None
        );
    });
}

#[test]
fn test_generic_class_emits_pattern_and_indirect_offsets() {
    let mut fx = Fixture::new();
    let param = GenericParam::new(fx.decls.intern("T"));
    let boxed = fx.add(
        "Box",
        DeclKind::Class(NominalDecl::default().with_generic_params(vec![param])),
    );
    let value = fx.stored_var(DeclContext::Nominal(boxed), "value");
    let options = EmitOptions::new().with_foreign_interop(true);

    fx.with_cx(&options, |cx| {
        cx.emit_global_decl(boxed).unwrap();

        let pattern = EntityKey::TypeMetadata {
            ty: Ty::nominal(boxed),
            indirect: false,
            pattern: true,
        };
        let (_, pattern) = var(cx, &pattern);
        assert_eq!(fields(pattern)[2], Constant::i64(1));
        assert_eq!(cx.cache().lookup_variable(&metadata_key(boxed)), None);

        let offset = EntityKey::FieldOffset {
            decl: value,
            indirect: true,
        };
        let (_, offset) = var(cx, &offset);
        assert_eq!(offset.initializer(), Some(&Constant::Zero));
        assert!(matches!(
            offset.kind,
            crate::native::GlobalKind::Variable { constant: false, .. }
        ));

        // Generic classes get no metaclass stub and are not listed.
        assert_eq!(cx.cache().lookup_variable(&EntityKey::MetaclassStub(boxed)), None);
        assert!(cx.lists().foreign_classes().is_empty());
    });
}

#[test]
fn test_native_class_is_exposed_to_foreign_runtime() {
    let mut fx = Fixture::new();
    let widget = fx.class("Widget");
    let options = EmitOptions::new().with_foreign_interop(true);

    fx.with_cx(&options, |cx| {
        cx.emit_global_decl(widget).unwrap();

        let (_, stub) = var(cx, &EntityKey::MetaclassStub(widget));
        assert_eq!(fields(stub), vec![Constant::Null; 5].as_slice());
        let (metadata, _) = var(cx, &metadata_key(widget));
        let full = NativeType::Layout(Layout::FullHeapMetadata);
        assert_eq!(
            cx.lists().foreign_classes(),
            &[Constant::element_ptr(Constant::cast(Constant::Global(metadata), full), &[0, 2])]
        );
    });
}

#[test]
fn test_stored_property_in_extension_is_invariant_violation() {
    let mut fx = Fixture::new();
    fx.strukt("Point");
    let ext = fx.extension("Point");
    fx.stored_var(DeclContext::Extension(ext), "z");

    let result = fx.with_cx(&EmitOptions::new(), |cx| cx.emit_global_decl(ext));
    assert_eq!(
        result,
        Err(EmitError::invariant("var", "app.z", DeclSite::Extension))
    );
}

#[test]
fn test_extension_accessors_are_left_to_lowered_module() {
    let mut fx = Fixture::new();
    fx.strukt("Point");
    let ext = fx.extension("Point");
    let inside = DeclContext::Extension(ext);
    fx.computed_var(inside, "length", DeclFlags::empty());
    fx.add_in(
        inside,
        "subscript",
        DeclKind::Subscript(StorageDecl::new(Fixture::int(), NativeType::Int(64))),
    );
    let scale = fx.func_in(inside, "scale", Fixture::unit_fn());
    fx.lower(scale, "point_scale");

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_decl(ext).unwrap();
        let module = cx.cache().module();
        assert_eq!(module.len(), 1);
        let scale = module.lookup("point_scale").unwrap();
        assert!(!module.get(scale).unwrap().is_declaration());
        // Extensions of native structs never need a category.
        assert!(cx.lists().category_decls().is_empty());
    });
}

#[test]
fn test_local_types_are_emitted_with_internal_linkage() {
    let mut fx = Fixture::new();
    let outer = fx.func("outer", Fixture::unit_fn());
    let local = fx.add_in(
        DeclContext::Local {
            parent: outer,
            discriminator: 0,
        },
        "Helper",
        DeclKind::Struct(NominalDecl::default()),
    );

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_decl(outer).unwrap();
        let (_, metadata) = var(cx, &metadata_key(local));
        assert_eq!(metadata.linkage, Linkage::Internal);
    });
}

#[test]
fn test_external_definitions() {
    let mut fx = Fixture::new();
    let foreign = fx.foreign;
    let rect = {
        let decl = fx
            .build(
                DeclContext::Module(foreign),
                "NSRect",
                DeclKind::Struct(NominalDecl::default()),
            )
            .with_provenance(Provenance::ForeignImported);
        fx.alloc(decl)
    };
    let coding = fx.add_in(
        DeclContext::Module(foreign),
        "NSCoding",
        DeclKind::Protocol(NominalDecl::default()),
    );
    let view = fx.foreign_class("NSView");
    fx.lowered.external_definitions = vec![rect, coding, view];

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_top_level().unwrap();

        let (_, metadata) = var(cx, &metadata_key(rect));
        assert!(!metadata.is_declaration());
        let (_, descriptor) = var(cx, &EntityKey::NominalTypeDescriptor(rect));
        assert_eq!(descriptor.linkage, Linkage::LinkOnceOdr);
        let (_, protocol) = var(cx, &EntityKey::ProtocolDescriptor(coding));
        assert_eq!(fields(protocol)[1], Constant::i32(0));
        assert_eq!(cx.cache().lookup_variable(&EntityKey::ForeignClass(view)), None);
    });
}

#[test]
fn test_variable_as_external_definition_is_invariant_violation() {
    let mut fx = Fixture::new();
    let v = fx.stored_var(fx.top(), "counter");
    fx.lowered.external_definitions = vec![v];

    let result = fx.with_cx(&EmitOptions::new(), |cx| cx.emit_global_top_level());
    assert_eq!(
        result,
        Err(EmitError::invariant("var", "app.counter", DeclSite::ExternalDefinition))
    );
}

#[test]
fn test_global_top_level_defines_lowered_entities() {
    let mut fx = Fixture::new();
    let counter = fx.stored_var(fx.top(), "counter");
    fx.lowered.global_vars.push(counter);
    fx.lowered
        .add_global(LoweredGlobal::new("cache_token", NativeType::Ptr));
    fx.lowered.add_function(
        LoweredFunction::new("helper", Signature::native(FnType::void())).with_body(Body::empty_return()),
    );
    fx.lowered
        .add_function(LoweredFunction::new("extern_only", Signature::native(FnType::void())));

    fx.with_cx(&EmitOptions::new().with_debug_info(true), |cx| {
        cx.emit_global_top_level().unwrap();
        let module = cx.cache().module();

        let (_, storage) = var(cx, &EntityKey::GlobalVariable(counter));
        assert_eq!(storage.initializer(), Some(&Constant::Zero));
        let token = module.get(module.lookup("cache_token").unwrap()).unwrap();
        assert_eq!(token.initializer(), Some(&Constant::Zero));
        let helper = module.get(module.lookup("helper").unwrap()).unwrap();
        assert!(!helper.is_declaration());
        let extern_only = module.get(module.lookup("extern_only").unwrap()).unwrap();
        assert!(extern_only.is_declaration());

        let debug = cx.debug_info().unwrap();
        assert_eq!(debug.imports(), &[vec!["core".to_string()]]);
        assert_eq!(debug.globals().len(), 1);
    });
}

#[test]
fn test_witness_tables_resolve_base_protocol_tables() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    let base_proto = fx.protocol("Equatable");
    let proto = fx.protocol("Hashable");
    let base = fx
        .decls
        .add_conformance(point, Conformance::new(base_proto, Ty::nominal(point)));
    let conf = fx.decls.add_conformance(
        point,
        Conformance::new(proto, Ty::nominal(point)).with_inherited(vec![base]),
    );
    let hash = fx.func_in(DeclContext::Nominal(point), "hash", Fixture::unit_fn());
    let hash = fx.lower(hash, "point_hash");
    let eq = fx.func_in(DeclContext::Nominal(point), "eq", Fixture::unit_fn());
    let eq = fx.lower(eq, "point_eq");
    // The derived table comes first, so the base table starts out as a
    // forward reference.
    fx.lowered.witness_tables = vec![
        LoweredWitnessTable {
            conformance: conf,
            entries: vec![
                WitnessEntry::BaseProtocol(base),
                WitnessEntry::Method(hash),
                WitnessEntry::Missing,
            ],
        },
        LoweredWitnessTable {
            conformance: base,
            entries: vec![WitnessEntry::Method(eq)],
        },
    ];

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_top_level().unwrap();

        let (base_id, base_table) = var(cx, &EntityKey::WitnessTable(base));
        assert!(!base_table.is_declaration());
        let (_, table) = var(cx, &EntityKey::WitnessTable(conf));
        let Some(Constant::Array { elems, .. }) = table.initializer() else {
            panic!("expected a witness array");
        };
        assert_eq!(elems[0], Constant::Global(base_id));
        assert_eq!(elems[2], Constant::Null);
        assert_eq!(table.storage(), Some(&NativeType::array(NativeType::Ptr, 3)));
    });
}

#[test]
fn test_witness_tables_can_be_disabled() {
    let mut fx = Fixture::new();
    let point = fx.strukt("Point");
    let proto = fx.protocol("Hashable");
    let conf = fx
        .decls
        .add_conformance(point, Conformance::new(proto, Ty::nominal(point)));
    fx.lowered.witness_tables = vec![LoweredWitnessTable {
        conformance: conf,
        entries: vec![WitnessEntry::Missing],
    }];

    fx.with_cx(&EmitOptions::new().with_witness_tables(false), |cx| {
        cx.emit_global_top_level().unwrap();
        assert_eq!(cx.cache().lookup_variable(&EntityKey::WitnessTable(conf)), None);
    });
}

#[test]
fn test_imports_are_recorded_in_debug_info() {
    let mut fx = Fixture::new();
    let path = vec![fx.decls.intern("Foundation")];
    let import = fx.add("", DeclKind::Import { path });

    fx.with_cx(&EmitOptions::new().with_debug_info(true), |cx| {
        cx.emit_global_decl(import).unwrap();
        assert_eq!(cx.debug_info().unwrap().imports(), &[vec!["Foundation".to_string()]]);
    });
}

#[test]
fn test_nested_function_locals_are_emitted() {
    let mut fx = Fixture::new();
    let outer = fx.func("outer", Fixture::unit_fn());
    let inner = fx.add_in(
        DeclContext::Local {
            parent: outer,
            discriminator: 0,
        },
        "inner",
        DeclKind::Func(FuncDecl::new(Fixture::unit_fn())),
    );
    fx.lower(inner, "outer_inner");

    fx.with_cx(&EmitOptions::new(), |cx| {
        cx.emit_global_decl(outer).unwrap();
        let module = cx.cache().module();
        let inner = module.get(module.lookup("outer_inner").unwrap()).unwrap();
        assert!(!inner.is_declaration());
    });
}
