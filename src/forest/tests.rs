use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::{Forest, NodeIndex, ParentChange, ValidationError};
use crate::test_util::{self, assert_mirrors, data, forest_of, k, shape_of, Scene, SCOPE};
use crate::Authority;

/// ```text
/// 1
/// |- 2
/// |  |- 4
/// |  `- 5
/// `- 3
///    `- 6
/// 7
/// `- 8
/// ```
fn sample_scene() -> Scene {
    Scene::from_rows(&[
        (1, None),
        (2, Some(1)),
        (3, Some(1)),
        (4, Some(2)),
        (5, Some(2)),
        (6, Some(3)),
        (7, None),
        (8, Some(7)),
    ])
}

fn children_keys<T>(forest: &Forest<T>, key: i32) -> Vec<i32> {
    let index = forest.index_of(k(key)).expect("key should be in forest");
    forest.children_of(index).iter().map(|&child| forest.key_at(child).0).collect()
}

fn parent_key<T>(forest: &Forest<T>, key: i32) -> Option<i32> {
    let index = forest.index_of(k(key)).expect("key should be in forest");
    forest.parent_of(index).map(|parent| forest.key_at(parent).0)
}

#[test]
fn test_insert_single() {
    test_util::init();

    let mut forest = Forest::new();
    assert!(forest.insert(k(1), None, data(true, false)));
    assert!(forest.insert(k(2), Some(k(1)), data(true, false)));
    assert!(forest.insert(k(3), Some(k(99)), data(true, false)));

    assert!(!forest.insert(k(2), None, data(false, true)), "duplicate keys are rejected");
    assert_eq!(forest.len(), 3);

    assert_eq!(parent_key(&forest, 2), Some(1));
    assert_eq!(parent_key(&forest, 3), None, "unknown parent makes a root");
    assert_eq!(children_keys(&forest, 1), vec![2]);
    assert!(forest.is_active(forest.index_of(k(2)).unwrap()), "rejected insert must not mutate");

    let roots: Vec<_> = forest.roots().map(|index| forest.key_at(index).0).collect();
    assert_eq!(roots, vec![1, 3]);
}

#[test]
fn test_insert_subtree_preorder() {
    test_util::init();

    let scene = sample_scene();
    let mut forest = Forest::new();

    let mut out = Vec::new();
    let inserted = forest.insert_subtree(&scene, k(1), Some(&mut out));
    assert_eq!(inserted, 6);
    assert_eq!(out, vec![k(1), k(2), k(4), k(5), k(3), k(6)]);

    let inserted = forest.insert_subtree(&scene, k(1), None);
    assert_eq!(inserted, 0, "already inserted subtrees are skipped");

    forest.insert_subtree(&scene, k(7), None);
    assert_mirrors(&forest, &scene);
}

#[test]
fn test_insert_then_remove_restores_shape() {
    test_util::init();

    let mut scene = sample_scene();
    let mut forest = forest_of(&scene);
    let before = shape_of(&forest);

    scene.add(100, None).add(101, Some(100)).add(102, Some(101)).add(103, Some(100));
    forest.insert_subtree(&scene, k(100), None);
    assert_eq!(forest.len(), 12);

    let mut removed = forest.remove([k(100)]);
    removed.sort();
    assert_eq!(removed, vec![k(100), k(101), k(102), k(103)]);
    assert_eq!(shape_of(&forest), before);

    scene.delete(100);
    assert_mirrors(&forest, &scene);
}

#[test]
fn test_remove_patches_moved_node() {
    test_util::init();

    let mut scene = sample_scene();
    let mut forest = forest_of(&scene);
    assert_eq!(forest.index_of(k(2)), Some(NodeIndex(1)));
    assert_eq!(forest.index_of(k(8)), Some(NodeIndex(7)));

    let removed = forest.remove([k(2)]);
    assert_eq!(removed, vec![k(2), k(4), k(5)]);
    assert_eq!(forest.len(), 5);

    // 8 fills the slot of 2, then 7 fills the slot of 4 and patches its child 8.
    assert_eq!(forest.index_of(k(8)), Some(NodeIndex(1)));
    assert_eq!(forest.index_of(k(7)), Some(NodeIndex(2)));
    assert_eq!(parent_key(&forest, 8), Some(7));
    assert_eq!(children_keys(&forest, 7), vec![8]);
    assert_eq!(children_keys(&forest, 3), vec![6]);
    assert_eq!(children_keys(&forest, 1), vec![3]);

    scene.delete(2);
    assert_mirrors(&forest, &scene);
}

#[test]
fn test_remove_every_leaf() {
    test_util::init();

    for leaf in [4, 5, 6, 8] {
        let mut scene = sample_scene();
        let mut forest = forest_of(&scene);

        assert_eq!(forest.remove([k(leaf)]), vec![k(leaf)]);

        for (index, &key) in forest.keys().iter().enumerate() {
            assert_eq!(forest.index_of(key), Some(NodeIndex(index)));
            if let Some(parent) = forest.parent_of(NodeIndex(index)) {
                assert!(forest.children_of(parent).contains(&NodeIndex(index)));
            }
        }

        scene.delete(leaf);
        assert_mirrors(&forest, &scene);
    }
}

#[test]
fn test_remove_ignores_missing_and_duplicate_keys() {
    test_util::init();

    let scene = sample_scene();
    let mut forest = forest_of(&scene);

    let removed = forest.remove([k(99), k(3), k(3), k(6)]);
    assert_eq!(removed, vec![k(3), k(6)]);
    assert_eq!(forest.len(), 6);
    assert!(forest.remove([k(3)]).is_empty());
}

#[test]
fn test_random_removals() {
    test_util::init();

    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..8 {
        let mut scene = Scene::new();
        for i in 1..=200 {
            let parent = (i > 1 && rng.gen_bool(0.8)).then(|| rng.gen_range(1..i));
            scene.add(i, parent);
        }
        let mut forest = forest_of(&scene);
        assert_eq!(forest.len(), 200);

        while let Some(&key) = forest.keys().choose(&mut rng) {
            let expected = 1 + forest.descendants_of(key).expect("key from forest").count();
            let removed = forest.remove([key]);
            assert_eq!(removed.len(), expected);
            assert!(removed.iter().all(|&key| !forest.contains(key)));

            scene.delete(key.0);
            assert_mirrors(&forest, &scene);
        }

        assert!(forest.is_empty());
    }
}

#[test]
fn test_change_parents() {
    test_util::init();

    let mut scene = sample_scene();
    let mut forest = forest_of(&scene);

    let changes = forest.change_parents([(k(6), Some(k(2))), (k(8), None)]);
    assert_eq!(
        changes.succeeded,
        vec![
            ParentChange { key: k(6), old_parent: Some(k(3)), new_parent: Some(k(2)) },
            ParentChange { key: k(8), old_parent: Some(k(7)), new_parent: None },
        ]
    );
    assert!(changes.failed.is_empty());

    assert_eq!(children_keys(&forest, 2), vec![4, 5, 6]);
    assert!(children_keys(&forest, 3).is_empty());
    assert_eq!(parent_key(&forest, 8), None);

    scene.reparent(6, Some(2)).reparent(8, None);
    assert_mirrors(&forest, &scene);
}

#[test]
fn test_change_parents_onto_unknown_parent() {
    test_util::init();

    let scene = sample_scene();
    let mut forest = forest_of(&scene);

    let changes = forest.change_parents([(k(6), Some(k(99))), (k(98), Some(k(1)))]);
    assert!(changes.succeeded.is_empty());
    assert_eq!(changes.failed, vec![k(6), k(98)]);

    assert_eq!(parent_key(&forest, 6), None, "node is left without a parent");
    assert!(children_keys(&forest, 3).is_empty());

    assert_eq!(forest.remove([k(6)]), vec![k(6)]);
}

#[test]
fn test_change_parents_rejects_cycles() {
    test_util::init();

    let scene = sample_scene();
    let mut forest = forest_of(&scene);
    let before = shape_of(&forest);

    let changes = forest.change_parents([(k(1), Some(k(4))), (k(2), Some(k(2)))]);
    assert!(changes.succeeded.is_empty());
    assert_eq!(changes.failed, vec![k(1), k(2)]);
    assert_eq!(shape_of(&forest), before);
}

#[test]
fn test_resync_child_order() {
    test_util::init();

    let mut scene = Scene::from_rows(&[(1, None), (10, Some(1)), (11, Some(1)), (12, Some(1)), (13, Some(1))]);
    let mut forest = forest_of(&scene);
    assert_eq!(children_keys(&forest, 1), vec![10, 11, 12, 13]);

    scene.set_sibling(10, 2).set_sibling(11, 0).set_sibling(12, 1).set_sibling(13, 2);
    assert!(forest.resync_child_order(k(1), |key| scene.sibling_index(key)));
    assert_eq!(children_keys(&forest, 1), vec![11, 12, 13, 10]);

    scene.set_sibling(10, 0).set_sibling(11, 3).set_sibling(12, 2).set_sibling(13, 1);
    assert!(forest.resync_child_order(k(1), |key| scene.sibling_index(key)));
    assert_eq!(children_keys(&forest, 1), vec![10, 13, 12, 11]);
    assert_mirrors(&forest, &scene);

    assert!(!forest.resync_child_order(k(99), |_| 0));
}

#[test]
fn test_active_and_static_inheritance() {
    test_util::init();

    let mut forest = Forest::new();
    forest.insert(k(1), None, data(true, false));
    forest.insert(k(2), Some(k(1)), data(false, true));
    forest.insert(k(3), Some(k(2)), data(true, false));
    forest.insert(k(4), Some(k(1)), data(true, false));

    let index = |key| forest.index_of(k(key)).unwrap();
    assert!(forest.is_active(index(1)));
    assert!(!forest.is_active(index(2)));
    assert!(!forest.is_active(index(3)), "inactive ancestor deactivates descendants");
    assert!(forest.is_active(index(4)));

    assert!(!forest.is_static(index(1)));
    assert!(forest.is_static(index(2)));
    assert!(forest.is_static(index(3)), "static ancestor makes descendants static");
    assert!(!forest.is_static(index(4)));

    assert_eq!(forest.set_node_data(k(2), data(true, false)), Some(()));
    assert!(forest.is_active(forest.index_of(k(3)).unwrap()));
    assert!(!forest.is_static(forest.index_of(k(3)).unwrap()));
    assert_eq!(forest.set_node_data(k(99), data(true, false)), None);
}

#[test]
fn test_descendants() {
    test_util::init();

    let scene = sample_scene();
    let forest = forest_of(&scene);

    let root = forest.index_of(k(1)).unwrap();
    let walk: Vec<_> = forest.descendants(root).map(|index| forest.key_at(index).0).collect();
    assert_eq!(walk, vec![2, 4, 5, 3, 6]);

    let again: Vec<_> = forest.descendants(root).map(|index| forest.key_at(index).0).collect();
    assert_eq!(walk, again, "traversal restarts from scratch");

    assert_eq!(forest.descendants_of(k(7)).unwrap().collect::<Vec<_>>(), vec![k(8)]);
    assert_eq!(forest.descendants_of(k(8)).unwrap().count(), 0);
    assert!(forest.descendants_of(k(99)).is_none());
}

#[test]
fn test_concurrent_traversal() {
    test_util::init();

    let mut rng = StdRng::seed_from_u64(7);
    let mut scene = Scene::new();
    for i in 1..=500 {
        let parent = (i > 1 && rng.gen_bool(0.9)).then(|| rng.gen_range(1..i));
        scene.add(i, parent);
    }
    let forest = forest_of(&scene);

    let roots: Vec<NodeIndex> = forest.roots().collect();
    let sequential: usize = roots.iter().map(|&root| 1 + forest.descendants(root).count()).sum();
    let parallel: usize = roots.par_iter().map(|&root| 1 + forest.descendants(root).count()).sum();

    assert_eq!(sequential, 500);
    assert_eq!(parallel, sequential);

    let active: usize = (0..forest.len())
        .into_par_iter()
        .filter(|&index| forest.is_active(NodeIndex(index)))
        .count();
    assert_eq!(active, 500);
}

#[test]
fn test_validate_reports_drift() {
    test_util::init();

    let mut scene = sample_scene();
    let forest = forest_of(&scene);
    assert!(forest.validate(&scene, SCOPE).is_empty());

    scene.delete(8).add(9, Some(1)).reparent(6, Some(2));
    let errors = forest.validate(&scene, SCOPE);

    assert!(errors.contains(&ValidationError::Unresolved { key: k(8) }));
    assert!(errors.contains(&ValidationError::Missing { key: k(9) }));
    assert!(errors.contains(&ValidationError::WrongParent {
        key:      k(6),
        expected: Some(k(2)),
        actual:   Some(k(3)),
    }));
    assert!(errors.contains(&ValidationError::WrongChildren {
        key:      k(7),
        expected: vec![],
        actual:   vec![k(8)],
    }));
}
