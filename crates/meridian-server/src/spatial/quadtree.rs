//! Point quadtree over entity positions.
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index.
//! Every stored point is also recorded in a side index so that
//! [`QuadTree::upsert`] and [`QuadTree::remove`] can find the leaf holding an
//! entity without scanning. Points outside the root bounds are kept in a flat
//! overflow list rather than rejected.

use std::collections::HashMap;

use glam::DVec2;
use meridian_ecs::prelude::*;

use crate::link::EntityLink;

/// Max points per leaf before it splits.
const LEAF_CAPACITY: usize = 16;
/// Leaves at this depth never split, which bounds the cost of many points
/// sharing one position.
const MAX_DEPTH: u8 = 24;

// ---------------------------------------------------------------------------
// Rect
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle, inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: DVec2,
    pub max: DVec2,
}

impl Rect {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Square of edge `size` centred on `centre`.
    pub fn centered(centre: DVec2, size: f64) -> Self {
        let half = DVec2::splat(size / 2.0);
        Self::new(centre - half, centre + half)
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    fn centre(&self) -> DVec2 {
        (self.min + self.max) / 2.0
    }

    /// Quadrant `0..4` of `p`: bit 0 = east half, bit 1 = north half.
    fn quadrant_of(&self, p: DVec2) -> usize {
        let c = self.centre();
        (p.y >= c.y) as usize | (((p.x >= c.x) as usize) << 1)
    }

    fn quadrant(&self, q: usize) -> Rect {
        let c = self.centre();
        let (min_x, max_x) = if q & 2 == 0 { (self.min.x, c.x) } else { (c.x, self.max.x) };
        let (min_y, max_y) = if q & 1 == 0 { (self.min.y, c.y) } else { (c.y, self.max.y) };
        Rect::new(DVec2::new(min_x, min_y), DVec2::new(max_x, max_y))
    }
}

// ---------------------------------------------------------------------------
// QuadEntity
// ---------------------------------------------------------------------------

/// An entity's projection into the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadEntity {
    pub link: EntityLink,
    pub pos: DVec2,
}

// ---------------------------------------------------------------------------
// QuadTree
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum NodeKind {
    Leaf(Vec<QuadEntity>),
    Branch([usize; 4]),
}

#[derive(Debug)]
struct Node {
    bounds: Rect,
    depth: u8,
    parent: Option<usize>,
    kind: NodeKind,
}

/// Where an entity is stored.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Node(usize),
    Overflow,
}

#[derive(Debug)]
pub struct QuadTree {
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    overflow: Vec<QuadEntity>,
    index: HashMap<EntityId, Slot>,
}

impl Default for QuadTree {
    /// Bounds covering every valid `(lat, lon)`.
    fn default() -> Self {
        Self::new(Rect::new(DVec2::new(-90.0, -180.0), DVec2::new(90.0, 180.0)))
    }
}

impl QuadTree {
    pub fn new(bounds: Rect) -> Self {
        Self {
            nodes: vec![Node {
                bounds,
                depth: 0,
                parent: None,
                kind: NodeKind::Leaf(Vec::new()),
            }],
            free_nodes: Vec::new(),
            overflow: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    /// Stored position of `entity`.
    pub fn position(&self, entity: EntityId) -> Option<DVec2> {
        let points = match self.index.get(&entity)? {
            Slot::Node(node) => match &self.nodes[*node].kind {
                NodeKind::Leaf(points) => points,
                NodeKind::Branch(_) => return None,
            },
            Slot::Overflow => &self.overflow,
        };
        points
            .iter()
            .find(|p| p.link.entity == entity)
            .map(|p| p.pos)
    }

    /// Insert `link` at `pos`, or move it there if already present.
    pub fn upsert(&mut self, link: EntityLink, pos: DVec2) {
        if let Some(Slot::Node(node)) = self.index.get(&link.entity).copied() {
            if self.nodes[node].bounds.contains(pos) {
                if let NodeKind::Leaf(points) = &mut self.nodes[node].kind {
                    if let Some(p) = points.iter_mut().find(|p| p.link.entity == link.entity) {
                        p.pos = pos;
                        p.link = link;
                        return;
                    }
                }
            }
        }
        self.remove(link.entity);
        self.insert(QuadEntity { link, pos });
    }

    /// Returns `false` when the entity was not in the tree.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        match self.index.remove(&entity) {
            Some(Slot::Overflow) => {
                self.overflow.retain(|p| p.link.entity != entity);
                true
            }
            Some(Slot::Node(node)) => {
                if let NodeKind::Leaf(points) = &mut self.nodes[node].kind {
                    points.retain(|p| p.link.entity != entity);
                }
                if let Some(parent) = self.nodes[node].parent {
                    self.try_merge(parent);
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        let bounds = self.nodes[0].bounds;
        *self = Self::new(bounds);
    }

    /// Visit every point inside `rect`. No ordering guarantee.
    pub fn query_range(&self, rect: &Rect, mut visit: impl FnMut(&QuadEntity)) {
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.bounds.intersects(rect) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(points) => points
                    .iter()
                    .filter(|p| rect.contains(p.pos))
                    .for_each(&mut visit),
                NodeKind::Branch(children) => stack.extend_from_slice(children),
            }
        }
        self.overflow
            .iter()
            .filter(|p| rect.contains(p.pos))
            .for_each(&mut visit);
    }

    /// Entities inside `rect`.
    pub fn entities_in(&self, rect: &Rect) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.query_range(rect, |p| out.push(p.link.entity));
        out
    }

    // -- internals ----------------------------------------------------------

    fn insert(&mut self, point: QuadEntity) {
        if !self.nodes[0].bounds.contains(point.pos) {
            self.index.insert(point.link.entity, Slot::Overflow);
            self.overflow.push(point);
            return;
        }
        let mut i = 0;
        loop {
            let bounds = self.nodes[i].bounds;
            let depth = self.nodes[i].depth;
            let len = match &mut self.nodes[i].kind {
                NodeKind::Branch(children) => {
                    i = children[bounds.quadrant_of(point.pos)];
                    continue;
                }
                NodeKind::Leaf(points) => {
                    points.push(point);
                    points.len()
                }
            };
            self.index.insert(point.link.entity, Slot::Node(i));
            if len > LEAF_CAPACITY && depth < MAX_DEPTH {
                self.split(i);
            }
            return;
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free_nodes.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn split(&mut self, i: usize) {
        let bounds = self.nodes[i].bounds;
        let depth = self.nodes[i].depth + 1;
        let points = match std::mem::replace(&mut self.nodes[i].kind, NodeKind::Branch([0; 4])) {
            NodeKind::Leaf(points) => points,
            NodeKind::Branch(children) => {
                self.nodes[i].kind = NodeKind::Branch(children);
                return;
            }
        };
        let mut children = [0usize; 4];
        for (q, child) in children.iter_mut().enumerate() {
            *child = self.alloc(Node {
                bounds: bounds.quadrant(q),
                depth,
                parent: Some(i),
                kind: NodeKind::Leaf(Vec::new()),
            });
        }
        self.nodes[i].kind = NodeKind::Branch(children);
        for point in points {
            let child = children[bounds.quadrant_of(point.pos)];
            if let NodeKind::Leaf(list) = &mut self.nodes[child].kind {
                list.push(point);
            }
            self.index.insert(point.link.entity, Slot::Node(child));
        }
    }

    /// Collapse `i` back into a leaf when its children are all small leaves,
    /// then continue upwards.
    fn try_merge(&mut self, i: usize) {
        let NodeKind::Branch(children) = self.nodes[i].kind else {
            return;
        };
        let mut total = 0;
        for c in children {
            match &self.nodes[c].kind {
                NodeKind::Leaf(points) => total += points.len(),
                NodeKind::Branch(_) => return,
            }
        }
        if total > LEAF_CAPACITY / 2 {
            return;
        }
        let mut merged = Vec::with_capacity(total);
        for c in children {
            if let NodeKind::Leaf(points) = &mut self.nodes[c].kind {
                merged.append(points);
            }
            self.free_nodes.push(c);
        }
        for point in &merged {
            self.index.insert(point.link.entity, Slot::Node(i));
        }
        self.nodes[i].kind = NodeKind::Leaf(merged);
        if let Some(parent) = self.nodes[i].parent {
            self.try_merge(parent);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
