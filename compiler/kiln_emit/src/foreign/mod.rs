//! Bridging to the foreign object runtime.
//!
//! Native classes and extensions are made visible to the foreign runtime
//! in two ways. A static linker finds them through the class and category
//! lists written at finalization. Under a JIT nothing reads those
//! sections, so script entry points call the two initializers built here
//! instead: one sends `load` to every registered class, the other adds
//! each category's protocols and methods with runtime calls.

mod selector;

use tracing::debug;

use kiln_ir::lowered::{CodeKind, FnType, LoweredOrigin, NativeType, Signature};
use kiln_ir::{ConformanceId, DeclId, DeclKind, DeclTable};
use kiln_request::ExtendedNominalRequest;

use crate::decl::EmitCx;
use crate::entity::{CodeRef, ConstructorKind};
use crate::linkage::{LinkInfo, Linkage};
use crate::native::{BodyBuilder, Constant, GlobalId, GlobalValue, Value};

pub use selector::{
    getter_selector, initializer_selector, method_selector, setter_selector, subscript_selectors,
    type_encoding,
};

pub const CLASS_INITIALIZER: &str = "_kiln_initForeignClasses";
pub const CATEGORY_INITIALIZER: &str = "_kiln_initForeignCategories";

/// Runtime entry points used by the initializers.
mod runtime {
    pub const SEL_REGISTER_NAME: &str = "sel_registerName";
    pub const MSG_SEND: &str = "objc_msgSend";
    pub const CLASS_ADD_PROTOCOL: &str = "class_addProtocol";
    pub const CLASS_REPLACE_METHOD: &str = "class_replaceMethod";
}

/// Whether the conformance's protocol, or any protocol it inherits, is
/// known to the foreign runtime.
fn conformance_is_foreign(decls: &DeclTable, conformance: ConformanceId) -> bool {
    let conformance = decls.conformance(conformance);
    decls.get(conformance.protocol).is_foreign()
        || conformance
            .inherited
            .iter()
            .any(|&inherited| conformance_is_foreign(decls, inherited))
}

/// Members registered with the foreign runtime.
fn is_foreign_member(decls: &DeclTable, member: DeclId) -> bool {
    let decl = decls.get(member);
    match decl.kind {
        DeclKind::Func(_) | DeclKind::Constructor(_) | DeclKind::Subscript(_) => decl.is_foreign(),
        DeclKind::Var(_) => decl.is_computed() && decl.is_foreign(),
        _ => false,
    }
}

impl EmitCx<'_> {
    /// An extension of `class` needs a category when the class belongs to
    /// the foreign runtime, when it adds a conformance to a foreign
    /// protocol, or when it adds a member with a foreign entry point.
    pub fn extension_needs_category(&self, ext: DeclId, class: DeclId) -> bool {
        let decls = self.decls;
        if decls.get(class).is_foreign() {
            return true;
        }
        let ext = decls.get(ext);
        ext.conformances()
            .iter()
            .any(|&c| conformance_is_foreign(decls, c))
            || ext.members().iter().any(|&m| is_foreign_member(decls, m))
    }

    /// The category record of an extension, named after the class and the
    /// extending module. The runtime fills in the method and protocol
    /// lists when the category is attached.
    pub fn emit_category_data(&mut self, ext: DeclId, class: DeclId) -> Constant {
        let decls = self.decls;
        let class_name = decls.name(decls.get(class).name);
        let module_name = decls.name(decls.module(decls.module_of(ext)).name);
        let name = format!("_CATEGORY_{class_name}_$_{module_name}");

        let record_name = self.global_string(class_name);
        let class_object = self.addr_of_class_object(class);
        let init = Constant::Struct(vec![
            record_name,
            class_object,
            Constant::Null,
            Constant::Null,
            Constant::Null,
            Constant::Null,
        ]);
        let id = self.cache.add_private_variable(
            &name,
            Linkage::Internal,
            NativeType::Struct(vec![NativeType::Ptr; 6]),
            init,
        );
        let align = self.options.pointer_align;
        self.cache.module_mut().set_alignment(id, align);
        Constant::Global(id)
    }

    fn sel_register_name(&mut self) -> GlobalId {
        self.cache.runtime_function(
            runtime::SEL_REGISTER_NAME,
            FnType::new(vec![NativeType::Ptr], NativeType::Ptr),
        )
    }

    /// An internal `void ()` function, recorded as artificial in the debug
    /// info.
    fn create_initializer(&mut self, name: &str) -> GlobalId {
        let id = self
            .cache
            .add_private_function(&LinkInfo::internal(name), Signature::native(FnType::void()));
        if let Some(debug) = &mut self.debug {
            debug.emit_artificial_function(id, name);
        }
        id
    }

    /// A function sending `load` to every class registered so far, or
    /// `None` when there are none.
    pub fn emit_class_initializer(&mut self) -> Option<GlobalId> {
        let classes: Vec<Constant> = self
            .lists
            .foreign_classes()
            .iter()
            .map(|c| self.cache.resolve(c))
            .collect();
        if classes.is_empty() {
            return None;
        }
        let function = self.create_initializer(CLASS_INITIALIZER);
        let sel_register_name = self.sel_register_name();
        let msg_send = self.cache.runtime_function(
            runtime::MSG_SEND,
            FnType::new(vec![NativeType::Ptr, NativeType::Ptr], NativeType::Void),
        );

        let mut body = BodyBuilder::new();
        let load = self.global_string("load");
        let sel = body.call(Constant::Global(sel_register_name), vec![load.into()]);
        for class in classes {
            body.call(Constant::Global(msg_send), vec![class.into(), sel.clone()]);
        }
        self.cache.module_mut().set_body(function, body.ret(None));
        debug!(name = CLASS_INITIALIZER, "emitted class initializer");
        Some(function)
    }

    /// A function attaching every emitted category's protocols and methods
    /// to its class at run time, or `None` when there are no categories.
    pub fn emit_category_initializer(&mut self) -> Option<GlobalId> {
        let extensions = self.lists.category_decls().to_vec();
        if extensions.is_empty() {
            return None;
        }
        let function = self.create_initializer(CATEGORY_INITIALIZER);
        let mut body = BodyBuilder::new();
        for ext in extensions {
            let Some(class) = self.evaluator.get(ExtendedNominalRequest { ext }) else {
                continue;
            };
            self.register_category(&mut body, ext, class);
        }
        self.cache.module_mut().set_body(function, body.ret(None));
        debug!(name = CATEGORY_INITIALIZER, "emitted category initializer");
        Some(function)
    }

    fn register_category(&mut self, body: &mut BodyBuilder, ext: DeclId, class: DeclId) {
        let decls = self.decls;
        let class_object = self.addr_of_class_object(class);
        let metaclass = self.addr_of_metaclass_object(class);

        let add_protocol = self.cache.runtime_function(
            runtime::CLASS_ADD_PROTOCOL,
            FnType::new(vec![NativeType::Ptr, NativeType::Ptr], NativeType::Int(8)),
        );
        for &conformance in decls.get(ext).conformances() {
            let protocol = decls.conformance(conformance).protocol;
            if !decls.get(protocol).is_foreign() {
                continue;
            }
            let descriptor = self.addr_of_protocol_descriptor(protocol, None);
            body.call(
                Constant::Global(add_protocol),
                vec![class_object.clone().into(), descriptor.into()],
            );
        }

        for &member in decls.get(ext).members() {
            if !is_foreign_member(decls, member) {
                continue;
            }
            let decl = decls.get(member);
            let target = if decl.is_static() { &metaclass } else { &class_object };
            match decl.kind {
                DeclKind::Func(_) => {
                    let imp = self.foreign_entry_point(member, CodeKind::Func);
                    let selector = method_selector(decls, member);
                    self.replace_method(body, target, &selector, imp);
                }
                DeclKind::Constructor(_) => {
                    let imp = self.foreign_entry_point(member, CodeKind::Initializer);
                    let selector = initializer_selector(decls, member);
                    self.replace_method(body, &class_object, &selector, imp);
                }
                DeclKind::Var(_) => {
                    let getter = self.foreign_entry_point(member, CodeKind::Getter);
                    self.replace_method(body, target, &getter_selector(decls, member), getter);
                    if decl.is_settable() {
                        let setter = self.foreign_entry_point(member, CodeKind::Setter);
                        self.replace_method(body, target, &setter_selector(decls, member), setter);
                    }
                }
                DeclKind::Subscript(_) => {
                    let (get, set) = subscript_selectors(decls, member);
                    let getter = self.foreign_entry_point(member, CodeKind::Getter);
                    self.replace_method(body, &class_object, get, getter);
                    if decl.is_settable() {
                        let setter = self.foreign_entry_point(member, CodeKind::Setter);
                        self.replace_method(body, &class_object, set, setter);
                    }
                }
                _ => {}
            }
        }
    }

    /// The foreign entry point of `decl`: the optimizer's if it produced
    /// one, a declaration of the conventional symbol otherwise.
    fn foreign_entry_point(&mut self, decl: DeclId, kind: CodeKind) -> GlobalId {
        let origin = LoweredOrigin {
            decl,
            kind,
            uncurry_level: 1,
            foreign: true,
        };
        if let Some(id) = self.lowered.find_function(&origin) {
            return self.addr_of_lowered_function(id);
        }
        let code = CodeRef::minimal(decl, 1).as_foreign();
        match kind {
            CodeKind::Getter => self.addr_of_getter(code),
            CodeKind::Setter => self.addr_of_setter(code),
            CodeKind::Initializer => self.addr_of_constructor(code, ConstructorKind::Initializing),
            _ => self.addr_of_function(code),
        }
    }

    /// `class_replaceMethod(target, sel_registerName(selector), imp, types)`
    fn replace_method(&mut self, body: &mut BodyBuilder, target: &Constant, selector: &str, imp: GlobalId) {
        let sel_register_name = self.sel_register_name();
        let replace = self.cache.runtime_function(
            runtime::CLASS_REPLACE_METHOD,
            FnType::new(vec![NativeType::Ptr; 4], NativeType::Ptr),
        );
        let encoding = self
            .cache
            .module()
            .get(imp)
            .and_then(GlobalValue::fn_type)
            .map_or_else(|| type_encoding(&FnType::void()), type_encoding);

        let name = self.global_string(selector);
        let types = self.global_string(&encoding);
        let sel = body.call(Constant::Global(sel_register_name), vec![name.into()]);
        body.call(
            Constant::Global(replace),
            vec![target.clone().into(), sel, Value::from(Constant::Global(imp)), types.into()],
        );
    }
}
