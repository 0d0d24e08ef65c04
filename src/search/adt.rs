//! Alternating digital tree over axis-aligned boxes.
//!
//! Each box is treated as a point in 6-D key space
//! `(xmin, ymin, zmin, xmax, ymax, zmax)`; tree levels split on the median of
//! the keys, cycling through the six coordinates. Every tree node also stores
//! the union of all boxes in its subtree, which is the only thing queries
//! prune on. Boxes can therefore be moved with [`Adt::refresh`] without
//! rebuilding the tree.

use crate::geometry::Aabb;

#[derive(Clone, Debug)]
struct AdtNode {
    element: usize,
    left: Option<usize>,
    right: Option<usize>,
    bounds: Aabb,
}

/// Spatial search tree over a fixed set of boxes.
#[derive(Clone, Debug, Default)]
pub struct Adt {
    boxes: Vec<Aabb>,
    nodes: Vec<AdtNode>,
    root: Option<usize>,
}

#[inline]
fn key(b: &Aabb, axis: usize) -> f64 {
    if axis < 3 { b.min[axis] } else { b.max[axis - 3] }
}

impl Adt {
    /// Build a tree over `boxes`; element ids are positions in the vector.
    pub fn build(boxes: Vec<Aabb>) -> Self {
        let mut order: Vec<usize> = (0..boxes.len()).collect();
        let mut adt = Adt {
            nodes: Vec::with_capacity(boxes.len()),
            boxes,
            root: None,
        };
        adt.root = adt.build_rec(&mut order, 0);
        adt
    }

    // Children are pushed before their parent, so every child index is lower
    // than its parent's.
    fn build_rec(&mut self, ids: &mut [usize], depth: usize) -> Option<usize> {
        if ids.is_empty() {
            return None;
        }
        let axis = depth % 6;
        let mid = ids.len() / 2;
        let boxes = &self.boxes;
        ids.select_nth_unstable_by(mid, |&a, &b| {
            key(&boxes[a], axis)
                .total_cmp(&key(&boxes[b], axis))
                .then(a.cmp(&b))
        });
        let element = ids[mid];
        let (lo, rest) = ids.split_at_mut(mid);
        let left = self.build_rec(lo, depth + 1);
        let right = self.build_rec(&mut rest[1..], depth + 1);
        let bounds = self.subtree_bounds(element, left, right);
        self.nodes.push(AdtNode {
            element,
            left,
            right,
            bounds,
        });
        Some(self.nodes.len() - 1)
    }

    fn subtree_bounds(&self, element: usize, left: Option<usize>, right: Option<usize>) -> Aabb {
        let mut b = self.boxes[element];
        for child in [left, right].into_iter().flatten() {
            b = b.union(&self.nodes[child].bounds);
        }
        b
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn element_box(&self, element: usize) -> &Aabb {
        &self.boxes[element]
    }

    /// Union of all boxes.
    pub fn bounds(&self) -> Aabb {
        self.root
            .map_or(Aabb::empty(), |r| self.nodes[r].bounds)
    }

    /// Replace the boxes (same count, same element order) and recompute the
    /// subtree bounds. Returns `false` and leaves the tree untouched when the
    /// count differs; the caller must rebuild.
    pub fn refresh(&mut self, boxes: Vec<Aabb>) -> bool {
        if boxes.len() != self.boxes.len() {
            return false;
        }
        self.boxes = boxes;
        for i in 0..self.nodes.len() {
            let (element, left, right) = {
                let n = &self.nodes[i];
                (n.element, n.left, n.right)
            };
            self.nodes[i].bounds = self.subtree_bounds(element, left, right);
        }
        true
    }

    /// Push every element whose box contains `point` into `out`, in no
    /// particular order.
    pub fn query_point(&self, point: &[f64; 3], out: &mut Vec<usize>) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.bounds.contains(point) {
                continue;
            }
            if self.boxes[node.element].contains(point) {
                out.push(node.element);
            }
            stack.extend(node.left);
            stack.extend(node.right);
        }
    }

    /// Push every element whose box overlaps `query` into `out`.
    pub fn query_box(&self, query: &Aabb, out: &mut Vec<usize>) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.bounds.overlaps(query) {
                continue;
            }
            if self.boxes[node.element].overlaps(query) {
                out.push(node.element);
            }
            stack.extend(node.left);
            stack.extend(node.right);
        }
    }
}
