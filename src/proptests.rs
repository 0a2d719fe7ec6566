use super::*;

use crate::node::Node;
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

/// Walks every node and panics on the first broken structural invariant.
fn validate_tree<T>(t: &CellTree<T>) {
    let stored = match &t.root {
        Some(root) => validate_node(root, TOP_SHIFT, 1, 0, true),
        None => 0,
    };
    assert_eq!(stored, t.len(), "stored item count must match CellTree::len");
}

/// Whether `cell` agrees with the radix path `prefix` on every chunk consumed
/// above the level at `shift`.
fn on_path(cell: u64, prefix: u64, shift: u32) -> bool {
    let above = shift + RADIX_BITS;
    above >= u64::BITS || cell >> above == prefix >> above
}

fn validate_node<T>(node: &Node<T>, shift: u32, depth: usize, prefix: u64, is_root: bool) -> usize {
    assert!(depth <= MAX_DEPTH, "tree deeper than {MAX_DEPTH} levels");

    match node {
        Node::Leaf(items) => {
            if shift != 0 {
                assert!(
                    items.len() <= LEAF_CAPACITY,
                    "leaf above the deepest level holds {} items",
                    items.len()
                );
            }
            if !is_root {
                assert!(!items.is_empty(), "empty leaf left in a branch slot");
            }
            for w in items.windows(2) {
                assert!(w[0].cell <= w[1].cell, "leaf items out of order");
            }
            for item in items {
                assert!(
                    on_path(item.cell, prefix, shift),
                    "cell {:#x} stored off its radix path",
                    item.cell
                );
            }
            items.len()
        }
        Node::Branch(branch) => {
            assert!(shift >= RADIX_BITS, "branch at the deepest level");
            let occupied = branch.slots().iter().filter(|s| s.is_some()).count();
            assert_eq!(branch.live(), occupied, "live counter out of sync");
            assert_ne!(occupied, 0, "childless branch must collapse to a leaf");

            let mut stored = 0;
            for (index, slot) in branch.slots().iter().enumerate() {
                if let Some(child) = slot {
                    let prefix = prefix | ((index as u64) << shift);
                    stored += validate_node(child, shift - RADIX_BITS, depth + 1, prefix, false);
                }
            }
            stored
        }
    }
}

fn model_items(m: &BTreeMap<u64, Vec<u32>>) -> Vec<(u64, u32)> {
    m.iter()
        .flat_map(|(&cell, ids)| ids.iter().map(move |&id| (cell, id)))
        .collect()
}

fn cell_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        // Few top bytes and small low bits: forces splits several levels down.
        4 => (0u64..3, 0u64..700).prop_map(|(top, low)| top << TOP_SHIFT | low),
        // Identical full-width cells pile up in the deepest leaf.
        2 => (0u64..4).prop_map(|d| u64::MAX - d),
        1 => any::<u64>(),
    ]
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 6)]
    Insert(#[proptest(strategy = "cell_strategy()")] u64),
    #[proptest(weight = 2)]
    Remove(
        #[proptest(strategy = "cell_strategy()")] u64,
        prop::sample::Index,
    ),
    #[proptest(weight = 2)]
    RemoveNewest(#[proptest(strategy = "cell_strategy()")] u64),
    #[proptest(weight = 1)]
    Range(
        #[proptest(strategy = "cell_strategy()")] u64,
        #[proptest(strategy = "1usize..64")] usize,
    ),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_with_model(ops in prop::collection::vec(any::<Op>(), 0..=2000)) {
        let mut t: CellTree<u32> = CellTree::new();
        let mut m: BTreeMap<u64, Vec<u32>> = BTreeMap::new();
        let mut len = 0usize;
        let mut next_id = 0u32;

        for op in ops {
            match op {
                Op::Insert(cell) => {
                    t.insert(cell, next_id);
                    m.entry(cell).or_default().push(next_id);
                    next_id += 1;
                    len += 1;
                }
                Op::Remove(cell, pick) => match m.get_mut(&cell) {
                    Some(ids) => {
                        let id = ids.remove(pick.index(ids.len()));
                        if ids.is_empty() {
                            m.remove(&cell);
                        }
                        prop_assert!(t.remove(cell, &id));
                        len -= 1;
                    }
                    None => prop_assert!(!t.remove(cell, &next_id)),
                },
                Op::RemoveNewest(cell) => {
                    let expected = m.get_mut(&cell).and_then(Vec::pop);
                    if m.get(&cell).is_some_and(Vec::is_empty) {
                        m.remove(&cell);
                    }
                    prop_assert_eq!(t.take_when(cell, |_| true), expected);
                    if expected.is_some() {
                        len -= 1;
                    }
                }
                Op::Range(start, limit) => {
                    let expected: Vec<(u64, u32)> = model_items(&m)
                        .into_iter()
                        .filter(|&(cell, _)| cell >= start)
                        .take(limit)
                        .collect();

                    let mut got = Vec::new();
                    t.range(start, |cell, id| {
                        got.push((cell, *id));
                        got.len() < limit
                    });
                    prop_assert_eq!(&got, &expected);

                    let iterated: Vec<(u64, u32)> =
                        t.range_iter(start).take(limit).map(|(c, id)| (c, *id)).collect();
                    prop_assert_eq!(&iterated, &expected);
                }
            }

            prop_assert_eq!(t.len(), len);
        }

        validate_tree(&t);
        let got: Vec<(u64, u32)> = t.iter().map(|(c, id)| (c, *id)).collect();
        prop_assert_eq!(got, model_items(&m));
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

const SMALL_SET: [(u64, char); 6] = [
    (5, 'a'),
    (5, 'b'),
    (5, 'c'),
    (1, 'd'),
    (1 << TOP_SHIFT, 'e'),
    (u64::MAX, 'f'),
];

#[test]
fn exhaustive_insert_order_small_set() {
    for_each_permutation(&SMALL_SET, |perm| {
        let mut t: CellTree<char> = CellTree::new();
        for &(cell, payload) in &perm {
            t.insert(cell, payload);
        }
        validate_tree(&t);

        // Stable sort by cell is exactly the documented order.
        let mut expected = perm.clone();
        expected.sort_by_key(|&(cell, _)| cell);
        let got: Vec<(u64, char)> = t.iter().map(|(c, p)| (c, *p)).collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    // Filler under its own top byte pushes the root past capacity, so removals
    // run against a branched tree.
    let filler_top = 0x7Fu64 << TOP_SHIFT;
    let mut base: CellTree<char> = CellTree::new();
    for i in 0..LEAF_CAPACITY as u64 {
        base.insert(filler_top | i, 'z');
    }
    for &(cell, payload) in &SMALL_SET {
        base.insert(cell, payload);
    }
    assert!(matches!(base.root, Some(Node::Branch(_))));
    validate_tree(&base);

    for_each_permutation(&SMALL_SET, |perm| {
        let mut t = base.clone();
        for (cell, payload) in perm {
            assert!(t.remove(cell, &payload));
            validate_tree(&t);
        }
        assert_eq!(t.len(), LEAF_CAPACITY);
        assert!(t.iter().all(|(c, p)| c >> TOP_SHIFT == 0x7F && *p == 'z'));

        for i in 0..LEAF_CAPACITY as u64 {
            assert!(t.remove(filler_top | i, &'z'));
        }
        validate_tree(&t);
        assert!(t.is_empty());
        assert!(t.root.as_ref().is_some_and(Node::is_empty_leaf));
    });
}
