//! Property tests for the spatial index and area-of-interest deltas.
//!
//! The quadtree is driven with random upserts and removals and every range
//! query is checked against a brute-force scan of a plain map.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use meridian_ecs::prelude::*;
use meridian_server::link::EntityLink;
use meridian_server::spatial::{Aoi, QuadTree, Rect};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum TreeOp {
    Upsert(u32, f64, f64),
    Remove(u32),
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => (0..48u32, -10.0f64..10.0, -10.0f64..10.0)
            .prop_map(|(i, x, y)| TreeOp::Upsert(i, x, y)),
        1 => (0..48u32).prop_map(TreeOp::Remove),
    ]
}

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (-12.0f64..12.0, -12.0f64..12.0, 0.0f64..12.0)
        .prop_map(|(x, y, size)| Rect::centered(DVec2::new(x, y), size))
}

fn small_tree() -> QuadTree {
    QuadTree::new(Rect::new(DVec2::splat(-8.0), DVec2::splat(8.0)))
}

proptest! {
    #[test]
    fn range_queries_match_brute_force(
        ops in prop::collection::vec(tree_op_strategy(), 1..200),
        rects in prop::collection::vec(rect_strategy(), 1..8),
    ) {
        // Bounds smaller than the op range so some points overflow.
        let mut tree = small_tree();
        let mut model: BTreeMap<EntityId, DVec2> = BTreeMap::new();

        for op in ops {
            match op {
                TreeOp::Upsert(i, x, y) => {
                    let entity = EntityId::new(i, 0);
                    let pos = DVec2::new(x, y);
                    tree.upsert(EntityLink::new(entity, u64::from(i) + 1), pos);
                    model.insert(entity, pos);
                }
                TreeOp::Remove(i) => {
                    let entity = EntityId::new(i, 0);
                    prop_assert_eq!(tree.remove(entity), model.remove(&entity).is_some());
                }
            }
        }

        prop_assert_eq!(tree.len(), model.len());
        for (entity, pos) in &model {
            prop_assert_eq!(tree.position(*entity), Some(*pos));
        }
        for rect in rects {
            let found: BTreeSet<EntityId> = tree.entities_in(&rect).into_iter().collect();
            let expected: BTreeSet<EntityId> = model
                .iter()
                .filter(|(_, pos)| rect.contains(**pos))
                .map(|(e, _)| *e)
                .collect();
            prop_assert_eq!(found, expected);
        }
    }

    #[test]
    fn removing_everything_empties_the_tree(
        points in prop::collection::vec((-8.0f64..8.0, -8.0f64..8.0), 0..120),
    ) {
        let mut tree = small_tree();
        for (i, (x, y)) in points.iter().enumerate() {
            tree.upsert(EntityLink::new(EntityId::new(i as u32, 0), 0), DVec2::new(*x, *y));
        }
        for i in 0..points.len() {
            prop_assert!(tree.remove(EntityId::new(i as u32, 0)));
        }
        prop_assert!(tree.is_empty());
        prop_assert!(tree.entities_in(&Rect::centered(DVec2::ZERO, 100.0)).is_empty());
    }

    #[test]
    fn aoi_deltas_partition_the_visible_sets(
        frames in prop::collection::vec(prop::collection::btree_set(0..32u32, 0..16), 1..10),
    ) {
        let mut aoi = Aoi::default();
        for frame in frames {
            let last = aoi.visible.clone();
            let now: BTreeSet<EntityId> = frame.into_iter().map(|i| EntityId::new(i, 0)).collect();
            aoi.update(now.clone());

            let entered: BTreeSet<EntityId> = aoi.entered.iter().copied().collect();
            let left: BTreeSet<EntityId> = aoi.left.iter().copied().collect();
            let stayed: BTreeSet<EntityId> = aoi.stayed.iter().copied().collect();

            prop_assert!(entered.is_disjoint(&stayed));
            prop_assert!(left.is_disjoint(&stayed));
            prop_assert!(entered.is_disjoint(&left));
            prop_assert_eq!(&entered | &stayed, now.clone());
            prop_assert_eq!(&left | &stayed, last);
            prop_assert_eq!(&aoi.visible, &now);
        }
    }
}
