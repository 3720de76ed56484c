use gateway_core::{Cap, Caps};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_map() -> impl Strategy<Value = BTreeMap<Cap, bool>> {
    (any::<bool>(), any::<bool>()).prop_map(|(g, e)| BTreeMap::from([(Cap::Generate, g), (Cap::Extract, e)]))
}

fn arb_caps() -> impl Strategy<Value = Caps> {
    prop_oneof![
        Just(Caps::Unspecified),
        arb_map().prop_map(Caps::Map),
    ]
}

proptest! {
    #[test]
    fn intersect_denies_whenever_either_side_denies(a in arb_caps(), b in arb_caps()) {
        let combined = a.intersect(&b);
        for cap in Cap::ALL {
            prop_assert_eq!(combined.has(cap), a.has(cap) && b.has(cap));
        }
    }

    #[test]
    fn intersect_is_commutative(a in arb_caps(), b in arb_caps()) {
        let ab = a.intersect(&b);
        let ba = b.intersect(&a);
        for cap in Cap::ALL {
            prop_assert_eq!(ab.has(cap), ba.has(cap));
        }
    }

    #[test]
    fn override_with_named_keys_always_wins(base in arb_caps(), overrides in arb_map()) {
        let result = base.override_with(&overrides);
        for (cap, expected) in &overrides {
            prop_assert_eq!(result.has(*cap), *expected);
        }
    }

    #[test]
    fn override_with_empty_map_is_a_no_op(base in arb_caps()) {
        let result = base.override_with(&BTreeMap::new());
        for cap in Cap::ALL {
            prop_assert_eq!(result.has(cap), base.has(cap));
        }
    }
}
