use pretty_assertions::assert_eq;

use kiln_ir::lowered::{FnType, NativeType, Signature};

use super::*;

fn void_sig() -> Signature {
    Signature::native(FnType::void())
}

#[test]
fn test_taken_names_are_uniqued() {
    let mut module = NativeModule::new("app");
    let a = module.add_variable(".str", Linkage::Private, Visibility::Default, NativeType::Ptr);
    let b = module.add_variable(".str", Linkage::Private, Visibility::Default, NativeType::Ptr);
    let c = module.add_variable(".str", Linkage::Private, Visibility::Default, NativeType::Ptr);

    assert_eq!(module.name_of(a), ".str");
    assert_eq!(module.name_of(b), ".str.1");
    assert_eq!(module.name_of(c), ".str.2");
    assert_eq!(module.lookup(".str.1"), Some(b));
}

#[test]
fn test_empty_name_detaches() {
    let mut module = NativeModule::new("app");
    let old = module.add_function("f", Linkage::External, Visibility::Default, void_sig());

    module.set_name(old, "");
    let new = module.add_function("f", Linkage::External, Visibility::Default, void_sig());

    assert_eq!(module.lookup("f"), Some(new));
    assert_eq!(module.name_of(old), "");
    assert_eq!(module.name_of(new), "f");
}

#[test]
fn test_rename_frees_the_old_name() {
    let mut module = NativeModule::new("app");
    let f = module.add_function("f", Linkage::External, Visibility::Default, void_sig());

    module.set_name(f, "g");

    assert_eq!(module.lookup("f"), None);
    assert_eq!(module.lookup("g"), Some(f));
}

#[test]
fn test_replace_all_uses_rewrites_initializers_and_bodies() {
    let mut module = NativeModule::new("app");
    let old = module.add_variable("x", Linkage::External, Visibility::Default, NativeType::Int(64));
    let new = module.add_variable("y", Linkage::External, Visibility::Default, NativeType::Int(64));
    let table = module.add_variable("table", Linkage::Internal, Visibility::Default, NativeType::Ptr);
    module.set_initializer(
        table,
        Constant::Struct(vec![
            Constant::Global(old),
            Constant::element_ptr(Constant::cast(Constant::Global(old), NativeType::Ptr), &[0, 1]),
        ]),
    );
    let f = module.add_function("f", Linkage::External, Visibility::Default, void_sig());
    let mut body = BodyBuilder::new();
    body.store(Value::Param(0), Constant::Global(old).into());
    module.set_body(f, body.ret(None));

    module.replace_all_uses(old, &Constant::Global(new));

    assert!(!module.has_uses(old));
    assert!(module.has_uses(new));
    assert_eq!(
        module.get(table).and_then(GlobalValue::initializer),
        Some(&Constant::Struct(vec![
            Constant::Global(new),
            Constant::element_ptr(Constant::cast(Constant::Global(new), NativeType::Ptr), &[0, 1]),
        ]))
    );
}

#[test]
fn test_erase_leaves_a_hole() {
    let mut module = NativeModule::new("app");
    let a = module.add_function("a", Linkage::External, Visibility::Default, void_sig());
    let b = module.add_function("b", Linkage::External, Visibility::Default, void_sig());

    module.erase(a);

    assert_eq!(module.get(a), None);
    assert_eq!(module.lookup("a"), None);
    assert_eq!(module.len(), 1);
    assert_eq!(module.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec![b]);
}

#[test]
fn test_trivial_body() {
    assert!(BodyBuilder::new().ret(None).is_trivial());

    let mut builder = BodyBuilder::new();
    let result = builder.call(Constant::Null, Vec::new());
    assert_eq!(result, Value::Inst(0));
    assert!(!builder.ret(None).is_trivial());

    let block = |insts: Vec<FnInst>| FnBody {
        blocks: vec![FnBlock { insts }],
    };
    assert!(block(vec![FnInst::Unreachable]).is_trivial());
    // A lone instruction only counts when it ends the block.
    assert!(!block(vec![FnInst::Call {
        callee: Value::Const(Constant::Null),
        args: Vec::new(),
    }])
    .is_trivial());
    assert!(!block(Vec::new()).is_trivial());
}

#[test]
fn test_declaration_until_defined() {
    let mut module = NativeModule::new("app");
    let f = module.add_function("f", Linkage::External, Visibility::Default, void_sig());
    let v = module.add_variable("v", Linkage::External, Visibility::Default, NativeType::Ptr);
    assert!(module.get(f).is_some_and(GlobalValue::is_declaration));
    assert!(module.get(v).is_some_and(GlobalValue::is_declaration));

    module.set_body(f, BodyBuilder::new().ret(None));
    module.set_initializer(v, Constant::Null);

    assert!(!module.get(f).is_some_and(GlobalValue::is_declaration));
    assert!(!module.get(v).is_some_and(GlobalValue::is_declaration));
}

#[test]
fn test_display() {
    let mut module = NativeModule::new("app");
    let s = module.add_variable(".str", Linkage::Private, Visibility::Default, NativeType::array(NativeType::Int(8), 3));
    module.set_constant(s, true);
    module.set_initializer(s, Constant::CString("hi".to_string()));
    let used = module.add_variable(
        "llvm.used",
        Linkage::Appending,
        Visibility::Default,
        NativeType::array(NativeType::Ptr, 1),
    );
    module.set_initializer(used, Constant::ptr_array(vec![Constant::Global(s)]));
    module.set_section(used, "llvm.metadata");
    module.set_alignment(used, 8);
    let f = module.add_function("f", Linkage::External, Visibility::Default, void_sig());
    module.set_body(f, BodyBuilder::new().ret(None));

    assert_eq!(
        module.to_string(),
        "; module app\n\
         @.str = private default constant [3 x i8] c\"hi\\00\"\n\
         @llvm.used = appending default global [1 x ptr] [1 x ptr] [@.str], section \"llvm.metadata\", align 8\n\
         define external default void () @f {\n  ret void\n}\n"
    );
}
