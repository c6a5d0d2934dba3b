use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_find_function_by_origin() {
    let mut module = LoweredModule::default();
    let decl = DeclId::new(4);
    let native = module.add_function(
        LoweredFunction::new("_K1F4main1fFT_T_", Signature::native(FnType::void()))
            .with_origin(LoweredOrigin::func(decl, 0)),
    );
    let foreign_origin = LoweredOrigin {
        foreign: true,
        ..LoweredOrigin::func(decl, 0)
    };
    let foreign = module.add_function(
        LoweredFunction::new("_K1To4main1fFT_T_", Signature::native(FnType::void()))
            .with_origin(foreign_origin),
    );

    assert_eq!(module.find_function(&LoweredOrigin::func(decl, 0)), Some(native));
    assert_eq!(module.find_function(&foreign_origin), Some(foreign));
    assert_eq!(module.find_function(&LoweredOrigin::func(decl, 1)), None);
    assert_eq!(
        module.functions_for_decl(decl).collect::<Vec<_>>(),
        vec![native, foreign]
    );
}

#[test]
fn test_native_type_display() {
    let ty = NativeType::Struct(vec![
        NativeType::Int(32),
        NativeType::function(FnType::new(vec![NativeType::Ptr], NativeType::Void)),
    ]);
    assert_eq!(ty.to_string(), "{ i32, void (ptr) }");
    assert_eq!(NativeType::array(NativeType::Ptr, 3).to_string(), "[3 x ptr]");
    assert_eq!(
        NativeType::Layout(Layout::WitnessTable).to_string(),
        "%WitnessTable"
    );
}

#[test]
fn test_layout_address_points() {
    assert_eq!(Layout::FullTypeMetadata.address_point(), 1);
    assert_eq!(Layout::FullHeapMetadata.address_point(), 2);
    assert_eq!(Layout::TypeMetadata.address_point(), 0);
}

#[test]
fn test_empty_return_body() {
    let body = Body::empty_return();
    assert_eq!(body.blocks.len(), 1);
    assert!(body.blocks[0].insts[0].is_terminator());
}
