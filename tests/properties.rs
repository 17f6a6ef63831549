mod common;

use std::collections::BTreeSet;

use cardo::domain::{CardKey, Rank};
use cardo::error::CardoError;
use cardo::resources::{UpdateOp, apply_update};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    /// Minted keys never collide with the existing set, whatever it holds.
    #[test]
    fn minted_keys_are_fresh(ids in prop::collection::btree_set(1u64..100_000, 0..40)) {
        let existing: BTreeSet<CardKey> = ids
            .iter()
            .map(|id| CardKey::new(&format!("demo_{}", to_base36(*id))).unwrap())
            .collect();
        let minted = CardKey::mint("demo", &existing).unwrap();
        prop_assert!(!existing.contains(&minted));
        prop_assert!(minted.as_str().starts_with("demo_"));
    }

    /// A rank between two bounds stays strictly between them, repeatedly.
    #[test]
    fn rank_between_stays_ordered(splits in prop::collection::vec(prop::bool::ANY, 1..60)) {
        let mut lo = Rank::new("1").unwrap();
        let mut hi = Rank::new("z").unwrap();
        for go_low in splits {
            let mid = Rank::between(Some(&lo), Some(&hi)).unwrap();
            prop_assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
            if go_low {
                hi = mid;
            } else {
                lo = mid;
            }
        }
    }

    /// Distributed ranks are sorted and unique for any count.
    #[test]
    fn distributed_ranks_are_strictly_increasing(count in 0usize..200) {
        let ranks = Rank::distribute(count);
        prop_assert_eq!(ranks.len(), count);
        for pair in ranks.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// `Add` then `Remove` is the identity on any document.
    #[test]
    fn add_then_remove_is_identity(values in prop::collection::vec(any::<i64>(), 0..8), new_value in any::<i64>()) {
        prop_assume!(!values.contains(&new_value));
        let mut doc = json!({"items": values});
        let original = doc.clone();
        apply_update(&mut doc, "items", UpdateOp::Add(json!(new_value))).unwrap();
        apply_update(&mut doc, "items", UpdateOp::Remove(json!(new_value))).unwrap();
        prop_assert_eq!(doc, original);
    }

    /// `Rank` preserves the element set for any valid index.
    #[test]
    fn rank_preserves_the_set(values in prop::collection::btree_set(any::<i64>(), 1..8), index in 0usize..8) {
        let values: Vec<i64> = values.into_iter().collect();
        prop_assume!(index < values.len());
        let target = values[0];
        let mut doc = json!({"items": values.clone()});
        apply_update(&mut doc, "items", UpdateOp::Rank { target: json!(target), index }).unwrap();

        let mut after: Vec<i64> = doc["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        prop_assert_eq!(doc["items"].as_array().unwrap().len(), values.len());
        after.sort_unstable();
        let mut expected = values.clone();
        expected.sort_unstable();
        prop_assert_eq!(after, expected);
    }

    /// A double `Add` always conflicts.
    #[test]
    fn double_add_conflicts(value in any::<i64>()) {
        let mut doc = json!({"items": []});
        apply_update(&mut doc, "items", UpdateOp::Add(json!(value))).unwrap();
        let err = apply_update(&mut doc, "items", UpdateOp::Add(json!(value))).unwrap_err();
        prop_assert!(matches!(err, CardoError::ItemAlreadyExists(_)));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    /// Any sequence of moves keeps the tree acyclic: walking parents from
    /// every card terminates at the root.
    #[test]
    fn moves_keep_the_tree_acyclic(moves in prop::collection::vec((0usize..6, 0usize..7), 0..12)) {
        let ctx = common::TestContext::new();
        let mut keys = Vec::new();
        for _ in 0..3 {
            keys.extend(ctx.create_page_cards());
        }

        for (from, to) in moves {
            let source = &keys[from % keys.len()];
            let target = if to == keys.len() { None } else { Some(keys[to % keys.len()].to_string()) };
            // Illegal moves (cycles) are allowed to fail; state must stay a tree.
            let _ = ctx.project().move_card(&source.to_string(), target.as_deref());
        }

        for key in &keys {
            let mut seen = BTreeSet::new();
            let mut current = Some(key.clone());
            while let Some(k) = current {
                prop_assert!(seen.insert(k.clone()), "cycle through {k}");
                current = ctx.project().card(&k).unwrap().parent;
            }
        }
    }

    /// After any accepted transition the state is a target reachable from
    /// the pre-state (or via the wildcard).
    #[test]
    fn transitions_always_land_in_valid_states(names in prop::collection::vec(0usize..4, 0..10)) {
        let transitions = ["Approve", "Archive", "Create", "Nonexistent"];
        let ctx = common::TestContext::new();
        let keys = ctx.create_page_cards();
        let key = keys[0].to_string();
        let valid_states = ["Draft", "Approved", "Deprecated"];

        for index in names {
            let _ = ctx.project().transition_card(&key, transitions[index]);
            let state = ctx.project().card(&keys[0]).unwrap().metadata.workflow_state;
            prop_assert!(valid_states.contains(&state.as_str()), "unexpected state {state}");
        }
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}
