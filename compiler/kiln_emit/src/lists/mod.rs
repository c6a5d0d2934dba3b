//! Side-table lists gathered during emission and written out once at the
//! end of the module.
//!
//! The foreign runtime's loader finds classes and categories through
//! pointer arrays in fixed sections, so the section names and the bare
//! pointer-array layout must not change.

use kiln_ir::lowered::NativeType;
use kiln_ir::DeclId;
use tracing::debug;

use crate::cache::ObjectCache;
use crate::linkage::Linkage;
use crate::native::{Constant, GlobalId};

pub const CLASS_LIST_SECTION: &str = "__DATA, __objc_classlist, regular, no_dead_strip";
pub const CATEGORY_LIST_SECTION: &str = "__DATA, __objc_catlist, regular, no_dead_strip";
pub const NON_LAZY_CLASS_LIST_SECTION: &str = "__DATA, __objc_nlclslist, regular, no_dead_strip";
pub const USED_SECTION: &str = "llvm.metadata";

/// Append-only lists; [`GlobalLists::flush`] consumes them.
#[derive(Clone, Debug, Default)]
pub struct GlobalLists {
    used: Vec<Constant>,
    foreign_classes: Vec<Constant>,
    foreign_categories: Vec<Constant>,
    /// Extensions each category was emitted for, parallel to
    /// `foreign_categories`.
    category_decls: Vec<DeclId>,
    /// Initializers with their priority.
    ctors: Vec<(u32, GlobalId)>,
}

impl GlobalLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a defined object alive even though nothing references it.
    pub fn add_used(&mut self, value: Constant) {
        self.used.push(value);
    }

    pub fn add_foreign_class(&mut self, class: Constant) {
        self.foreign_classes.push(class);
    }

    pub fn add_category(&mut self, category: Constant, ext: DeclId) {
        self.foreign_categories.push(category);
        self.category_decls.push(ext);
    }

    pub fn add_ctor(&mut self, priority: u32, function: GlobalId) {
        self.ctors.push((priority, function));
    }

    pub fn foreign_classes(&self) -> &[Constant] {
        &self.foreign_classes
    }

    pub fn category_decls(&self) -> &[DeclId] {
        &self.category_decls
    }

    pub fn ctors(&self) -> &[(u32, GlobalId)] {
        &self.ctors
    }

    /// Write every non-empty list into the module.
    ///
    /// The class list is written twice: once for the loader, once in the
    /// non-lazy section so classes are realized before first use. Both
    /// class arrays and the category array are internal and kept alive
    /// through `llvm.used`.
    pub fn flush(mut self, cache: &mut ObjectCache<'_>, pointer_align: u32) {
        let foreign_classes = resolve_all(cache, &self.foreign_classes);
        let foreign_categories = resolve_all(cache, &self.foreign_categories);

        for (elems, name, section) in [
            (&foreign_classes, "objc_classes", CLASS_LIST_SECTION),
            (&foreign_categories, "objc_categories", CATEGORY_LIST_SECTION),
            (&foreign_classes, "objc_non_lazy_classes", NON_LAZY_CLASS_LIST_SECTION),
        ] {
            if let Some(id) = emit_list(cache, elems, name, section, Linkage::Internal, pointer_align) {
                self.add_used(Constant::Global(id));
            }
        }

        if !self.ctors.is_empty() {
            let entry = NativeType::Struct(vec![NativeType::Int(32), NativeType::Ptr]);
            let elems = self
                .ctors
                .iter()
                .map(|&(priority, f)| {
                    Constant::Struct(vec![
                        Constant::i32(i32::try_from(priority).unwrap_or(i32::MAX)),
                        Constant::Global(f),
                    ])
                })
                .collect();
            let len = self.ctors.len() as u64;
            cache.add_private_variable(
                "llvm.global_ctors",
                Linkage::Appending,
                NativeType::array(entry.clone(), len),
                Constant::Array { elem: entry, elems },
            );
        }

        let used = resolve_all(cache, &self.used);
        emit_list(cache, &used, "llvm.used", USED_SECTION, Linkage::Appending, pointer_align);
    }
}

/// List entries with replaced declarations pointed at their definitions.
fn resolve_all(cache: &ObjectCache<'_>, list: &[Constant]) -> Vec<Constant> {
    list.iter().map(|c| cache.resolve(c)).collect()
}

fn emit_list(
    cache: &mut ObjectCache<'_>,
    elems: &[Constant],
    name: &str,
    section: &str,
    linkage: Linkage,
    pointer_align: u32,
) -> Option<GlobalId> {
    if elems.is_empty() {
        return None;
    }
    debug!(name, len = elems.len(), "emitting global list");
    let storage = NativeType::array(NativeType::Ptr, elems.len() as u64);
    let init = Constant::ptr_array(elems.to_vec());
    let id = cache.add_private_variable(name, linkage, storage, init);
    let module = cache.module_mut();
    module.set_section(id, section);
    module.set_alignment(id, pointer_align);
    Some(id)
}
