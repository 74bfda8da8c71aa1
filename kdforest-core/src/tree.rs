//! A static, median-split k-d tree.
//!
//! Built once from a fixed set of handles, never mutated afterwards; a forest
//! owns a small cascade of these. Nodes are stored in a flattened `Vec`
//! with child links as offsets rather than a pointer tree, since handles
//! live in a [`GenerationalSlab`] rather than behind raw pointers.

use hashbrown::HashSet;
use kdforest_container::GenerationalSlab;

use crate::handle::{Entry, HandleRef};
use crate::point::{DIMENSIONS, Point, coord, distance_squared};

pub(crate) type Arena<T> = GenerationalSlab<HandleRef, Entry<T>>;

/// One node of a flattened k-d tree. `left`/`right` are indices into the
/// owning [`Tree`]'s node array; `None` means that side is empty.
struct Node {
    handle: HandleRef,
    left: Option<u32>,
    right: Option<u32>,
}

impl Node {
    fn slide(&mut self, offset: u32) {
        if let Some(left) = &mut self.left {
            *left += offset;
        }
        if let Some(right) = &mut self.right {
            *right += offset;
        }
    }
}

/// A read-only, median-split k-d tree over a fixed multiset of handles.
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Builds a tree over `handles`, splitting on `start_axis` at the root
    /// and cycling through the remaining axes with depth.
    ///
    /// `handles` may contain both live and dead handles (the forest's
    /// incremental rebuild path collects both); dead handles are simply
    /// skipped by [`Tree::nearest`] while their subtrees are still traversed.
    pub(crate) fn build<T>(handles: Vec<HandleRef>, start_axis: usize, arena: &Arena<T>) -> Tree {
        if handles.is_empty() {
            return Tree { nodes: Vec::new() };
        }

        let mut buffers: [Vec<HandleRef>; DIMENSIONS] = core::array::from_fn(|_| handles.clone());
        for (axis, buffer) in buffers.iter_mut().enumerate() {
            buffer.sort_by(|&a, &b| coord(entry_coords(arena, a), axis).total_cmp(&coord(entry_coords(arena, b), axis)));
        }

        let nodes = Self::build_recursive(buffers, start_axis, arena);
        Tree { nodes }
    }

    fn build_recursive<T>(buffers: [Vec<HandleRef>; DIMENSIONS], axis: usize, arena: &Arena<T>) -> Vec<Node> {
        let size = buffers[0].len();
        if size == 0 {
            return Vec::new();
        }

        let split = size / 2;
        let left_size = split;
        let right_size = size - left_size - 1;
        let median = buffers[axis][split];

        let mut left_set = HashSet::with_capacity(left_size);
        left_set.extend(buffers[axis][..left_size].iter().copied());

        let mut left_buffers: [Vec<HandleRef>; DIMENSIONS] = core::array::from_fn(|_| Vec::with_capacity(left_size));
        let mut right_buffers: [Vec<HandleRef>; DIMENSIONS] = core::array::from_fn(|_| Vec::with_capacity(right_size));

        for (current_axis, buffer) in buffers.into_iter().enumerate() {
            if current_axis == axis {
                left_buffers[current_axis] = buffer[..left_size].to_vec();
                right_buffers[current_axis] = buffer[left_size + 1..].to_vec();
                continue;
            }

            for handle in buffer {
                if handle == median {
                    continue;
                } else if left_set.contains(&handle) {
                    left_buffers[current_axis].push(handle);
                } else {
                    right_buffers[current_axis].push(handle);
                }
            }
        }

        let next_axis = (axis + 1) % DIMENSIONS;
        let mut left_nodes = Self::build_recursive(left_buffers, next_axis, arena);
        let mut right_nodes = Self::build_recursive(right_buffers, next_axis, arena);

        let left_child = (!left_nodes.is_empty()).then_some(1);
        let right_offset = 1 + left_nodes.len() as u32;
        let right_child = (!right_nodes.is_empty()).then_some(right_offset);

        let mut nodes = Vec::with_capacity(1 + left_nodes.len() + right_nodes.len());
        nodes.push(Node {
            handle: median,
            left: left_child,
            right: right_child,
        });

        left_nodes.iter_mut().for_each(|node| node.slide(1));
        nodes.append(&mut left_nodes);

        right_nodes.iter_mut().for_each(|node| node.slide(right_offset));
        nodes.append(&mut right_nodes);

        nodes
    }

    /// Number of handles (live and dead) held by this tree.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Updates `best`/`limit_sq` with the live handle in this tree nearest
    /// `target`, if it improves on the incoming limit. Dead handles are
    /// skipped but their subtrees are still traversed, and the child on the
    /// side of the query is probed before the other side is considered at
    /// all.
    pub(crate) fn nearest<T>(&self, target: Point, arena: &Arena<T>, best: &mut Option<HandleRef>, limit_sq: &mut f32) {
        if self.nodes.is_empty() {
            return;
        }
        self.query_recursive(0, 0, target, arena, best, limit_sq);
    }

    fn query_recursive<T>(&self, index: u32, axis: usize, target: Point, arena: &Arena<T>, best: &mut Option<HandleRef>, limit_sq: &mut f32) {
        let node = &self.nodes[index as usize];
        let entry = arena.get(node.handle).expect("handle referenced by a live tree node must still be present in the arena");

        if entry.live {
            let dist_sq = distance_squared(target, entry.coords);
            if dist_sq < *limit_sq {
                *best = Some(node.handle);
                *limit_sq = dist_sq;
            }
        }

        let delta = coord(target, axis) - coord(entry.coords, axis);
        let next_axis = (axis + 1) % DIMENSIONS;
        let (near, far) = if delta <= 0.0 { (node.left, node.right) } else { (node.right, node.left) };

        if let Some(child) = near {
            self.query_recursive(child, next_axis, target, arena, best, limit_sq);
        }
        if delta * delta < *limit_sq
            && let Some(child) = far
        {
            self.query_recursive(child, next_axis, target, arena, best, limit_sq);
        }
    }

    /// In-order enumeration of every handle in the tree, live or dead.
    pub(crate) fn enumerate_all(&self) -> Vec<HandleRef> {
        let mut out = Vec::with_capacity(self.nodes.len());
        if !self.nodes.is_empty() {
            self.enumerate_recursive(0, &mut out);
        }
        out
    }

    fn enumerate_recursive(&self, index: u32, out: &mut Vec<HandleRef>) {
        let node = &self.nodes[index as usize];
        if let Some(left) = node.left {
            self.enumerate_recursive(left, out);
        }
        out.push(node.handle);
        if let Some(right) = node.right {
            self.enumerate_recursive(right, out);
        }
    }

    /// In-order enumeration filtered down to handles still live in `arena`.
    pub(crate) fn enumerate_live<T>(&self, arena: &Arena<T>) -> Vec<HandleRef> {
        self.enumerate_all().into_iter().filter(|handle| arena.get(*handle).is_some_and(|entry| entry.live)).collect()
    }
}

fn entry_coords<T>(arena: &Arena<T>, handle: HandleRef) -> Point {
    arena.get(handle).expect("handle must be present in the arena while a tree build references it").coords
}

#[cfg(test)]
mod tests {
    use kdforest_container::GenerationalKey;

    use super::*;
    use crate::handle::Entry;

    fn build_arena(points: &[Point]) -> (Arena<()>, Vec<HandleRef>) {
        let mut arena: Arena<()> = GenerationalSlab::default();
        let mut handles = Vec::with_capacity(points.len());
        for &coords in points {
            let handle = arena.insert(Entry { coords, payload: (), live: true }).expect("slab has room");
            handles.push(handle);
        }
        (arena, handles)
    }

    #[test]
    fn build_preserves_multiset() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(2.0, 2.0, 2.0),
        ];
        let (arena, handles) = build_arena(&points);
        let tree = Tree::build(handles.clone(), 0, &arena);

        assert_eq!(tree.len(), handles.len());

        let mut enumerated = tree.enumerate_all();
        let mut expected = handles;
        enumerated.sort_by_key(|h| h.key());
        expected.sort_by_key(|h| h.key());
        assert_eq!(enumerated, expected);
    }

    #[test]
    fn nearest_finds_closest_live_point() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 0.0, 0.0),
            Point::new(0.0, 10.0, 0.0),
            Point::new(5.0, 5.0, 5.0),
        ];
        let (arena, handles) = build_arena(&points);
        let tree = Tree::build(handles.clone(), 0, &arena);

        let mut best = None;
        let mut limit_sq = f32::INFINITY;
        tree.nearest(Point::new(0.5, 0.5, 0.5), &arena, &mut best, &mut limit_sq);

        assert_eq!(best, Some(handles[0]));
    }

    #[test]
    fn nearest_skips_dead_handles_but_still_descends() {
        let points = vec![Point::new(0.0, 0.0, 0.0), Point::new(0.1, 0.0, 0.0), Point::new(9.0, 9.0, 9.0)];
        let (mut arena, handles) = build_arena(&points);
        let tree = Tree::build(handles.clone(), 0, &arena);

        arena.get_mut(handles[0]).expect("present").live = false;

        let mut best = None;
        let mut limit_sq = f32::INFINITY;
        tree.nearest(Point::new(0.0, 0.0, 0.0), &arena, &mut best, &mut limit_sq);

        assert_eq!(best, Some(handles[1]));
    }

    #[test]
    fn nearest_on_empty_tree_finds_nothing() {
        let arena: Arena<()> = GenerationalSlab::default();
        let tree = Tree::build(Vec::new(), 0, &arena);

        let mut best = None;
        let mut limit_sq = f32::INFINITY;
        tree.nearest(Point::new(0.0, 0.0, 0.0), &arena, &mut best, &mut limit_sq);

        assert!(best.is_none());
    }
}
