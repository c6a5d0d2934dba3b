use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;

use super::*;

#[test]
fn test_mode_bits_distinguish_keys() {
    let decl = DeclId::new(3);
    let base = CodeRef::minimal(decl, 0);
    let keys = [
        EntityKey::Function(base),
        EntityKey::Function(CodeRef::new(decl, Explosion::Maximal, 0)),
        EntityKey::Function(CodeRef::minimal(decl, 1)),
        EntityKey::Function(base.as_foreign()),
        EntityKey::Getter(base),
        EntityKey::Setter(base),
        EntityKey::Constructor(base, ConstructorKind::Allocating),
        EntityKey::Constructor(base, ConstructorKind::Initializing),
        EntityKey::WitnessTableOffset(base),
    ];

    let set: FxHashSet<_> = keys.iter().cloned().collect();
    assert_eq!(set.len(), keys.len());
}

#[test]
fn test_equal_keys_hash_together() {
    let ty = Ty::nominal(DeclId::new(1));
    let mut set = FxHashSet::default();
    set.insert(EntityKey::TypeMetadata {
        ty: ty.clone(),
        indirect: false,
        pattern: false,
    });

    assert!(set.contains(&EntityKey::TypeMetadata {
        ty: ty.clone(),
        indirect: false,
        pattern: false,
    }));
    assert!(!set.contains(&EntityKey::TypeMetadata {
        ty,
        indirect: true,
        pattern: false,
    }));
}

#[test]
fn test_decl_and_type_accessors() {
    let decl = DeclId::new(7);
    let ty = Ty::nominal(decl);

    assert_eq!(EntityKey::GlobalVariable(decl).decl(), Some(decl));
    assert_eq!(
        EntityKey::FieldOffset {
            decl,
            indirect: true
        }
        .decl(),
        Some(decl)
    );
    assert_eq!(EntityKey::ValueWitnessTable(ty.clone()).decl(), None);
    assert_eq!(EntityKey::ValueWitnessTable(ty.clone()).ty(), Some(&ty));
    assert_eq!(EntityKey::WitnessTable(ConformanceId::new(0)).ty(), None);
}

#[test]
fn test_only_value_witnesses_are_value_witnesses() {
    let ty = Ty::nominal(DeclId::new(0));
    assert!(EntityKey::ValueWitness {
        ty: ty.clone(),
        witness: ValueWitness::Destroy,
    }
    .is_value_witness());
    assert!(!EntityKey::ValueWitnessTable(ty).is_value_witness());
}

#[test]
fn test_value_witness_codes_are_distinct() {
    let codes: FxHashSet<_> = ValueWitness::ALL.iter().map(|w| w.code()).collect();
    assert_eq!(codes.len(), ValueWitness::ALL.len());
    for witness in ValueWitness::ALL {
        assert_eq!(ValueWitness::from_code(witness.code()), Some(witness));
        assert_eq!(witness.code().len(), 2);
    }
}

#[test]
fn test_value_witness_takes_metadata_last() {
    let ty = ValueWitness::InitializeWithCopy.fn_type();
    assert_eq!(ty.params.len(), 3);
    assert_eq!(ValueWitness::Destroy.fn_type().ret, NativeType::Void);
}
