//! The k-d forest: a Bentley–Saxe cascade of static [`Tree`]s that amortizes
//! deletions by tombstoning handles instead of rebalancing, and periodically
//! collapses the whole cascade once dead handles reach parity with live
//! ones.

use kdforest_container::GenerationalSlab;

use crate::handle::{Entry, Handle, HandleRef};
use crate::point::Point;
use crate::tree::{Arena, Tree};

/// Failure mode of [`Forest::insert`]: the only recoverable error this
/// crate exposes.
#[derive(Debug)]
pub enum ForestError {
    /// The forest's handle arena could not grow to accommodate the new
    /// handle (it already holds `u32::MAX` handles).
    Allocation,
}

impl std::fmt::Display for ForestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForestError::Allocation => write!(f, "forest handle arena is full"),
        }
    }
}

impl std::error::Error for ForestError {}

/// A dynamic set of 3-D points supporting insertion, lazy deletion and
/// nearest-neighbor queries, backed by up to `ceil(log2(n))` static k-d
/// trees.
pub struct Forest<T> {
    arena: Arena<T>,
    slots: Vec<Option<Tree>>,
    live_count: u64,
    total_count: u64,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Forest<T> {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self {
            arena: GenerationalSlab::new(),
            slots: Vec::new(),
            live_count: 0,
            total_count: 0,
        }
    }

    /// Number of handles with the live bit set.
    pub fn live_count(&self) -> u64 {
        self.live_count
    }

    /// Number of handles across all slots regardless of liveness.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Returns the payload stored alongside a handle, if it is still
    /// present in this forest (live or tombstoned).
    pub fn payload(&self, handle_ref: HandleRef) -> Option<&T> {
        self.arena.get(handle_ref).map(|entry| &entry.payload)
    }

    /// Inserts a new handle, restoring the forest's invariants. Returns a
    /// [`HandleRef`] identifying the handle for future
    /// `mark_removed`/`payload` calls.
    pub fn insert(&mut self, handle: Handle<T>) -> Result<HandleRef, ForestError> {
        // Computed against the *pre*-insert counts: the projected ratio
        // after this insert would land, not the ratio as it stands now.
        let forced = self.total_count + 1 >= 2 * (self.live_count + 1);

        let (coords, payload) = handle.into_parts();
        let handle_ref = self.arena.insert(Entry { coords, payload, live: true }).ok_or(ForestError::Allocation)?;

        self.live_count += 1;

        if forced {
            self.rebuild_forced(handle_ref);
        } else {
            self.rebuild_incremental(handle_ref);
        }

        Ok(handle_ref)
    }

    /// Collects the new handle plus every handle (live and dead) in slots
    /// `0..s`, where `s` is the lowest empty slot, and builds one fresh tree
    /// of size `2^s` there. This is the non-forced branch of `kdf_balance`.
    fn rebuild_incremental(&mut self, new_handle: HandleRef) {
        let slot = self.slots.iter().position(|slot| slot.is_none()).unwrap_or(self.slots.len());

        let mut collected = Vec::with_capacity(1usize << slot);
        collected.push(new_handle);
        for existing in self.slots.iter_mut().take(slot) {
            if let Some(tree) = existing.take() {
                collected.extend(tree.enumerate_all());
            }
        }

        debug_assert_eq!(collected.len(), 1usize << slot);

        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(Tree::build(collected, 0, &self.arena));
        self.total_count += 1;
    }

    /// Collapses every slot into a fresh minimal cascade holding only live
    /// handles, physically dropping tombstones from the arena. This is the
    /// forced branch of `kdf_balance`, triggered once dead handles would
    /// otherwise outnumber live ones.
    fn rebuild_forced(&mut self, new_handle: HandleRef) {
        let mut live = Vec::with_capacity(self.live_count as usize);
        live.push(new_handle);

        for slot in self.slots.drain(..) {
            let Some(tree) = slot else { continue };
            for handle in tree.enumerate_all() {
                let is_live = self.arena.get(handle).is_some_and(|entry| entry.live);
                if is_live {
                    live.push(handle);
                } else {
                    let _ = self.arena.remove(handle);
                }
            }
        }

        let n = live.len() as u64;
        debug_assert_eq!(n, self.live_count);
        self.total_count = n;

        let mut offset = 0usize;
        let mut bit = 0u32;
        while offset < live.len() {
            let chunk_size = 1usize << bit;
            if n & (1u64 << bit) != 0 {
                let chunk: Vec<HandleRef> = live[offset..offset + chunk_size].to_vec();
                self.slots.resize_with((bit as usize + 1).max(self.slots.len()), || None);
                self.slots[bit as usize] = Some(Tree::build(chunk, 0, &self.arena));
                offset += chunk_size;
            }
            bit += 1;
        }
    }

    /// Clears the live bit of a previously inserted handle. Does not touch
    /// any tree structure; the handle's slot is only dropped by a later
    /// global rebuild. Calling this on a handle not present in this forest
    /// (already removed, or from a different forest) is a caller bug,
    /// per `spec.md` §7.2.
    pub fn mark_removed(&mut self, handle_ref: HandleRef) {
        match self.arena.get_mut(handle_ref) {
            Some(entry) if entry.live => {
                entry.live = false;
                self.live_count -= 1;
            }
            _ => debug_assert!(false, "mark_removed called on a handle that is not live in this forest"),
        }
    }

    /// Returns the live handle nearest `target`, or `None` if the forest
    /// holds no live handle.
    pub fn nearest(&self, target: Point) -> Option<HandleRef> {
        let mut best = None;
        let mut limit_sq = f32::INFINITY;

        for tree in self.slots.iter().flatten() {
            tree.nearest(target, &self.arena, &mut best, &mut limit_sq);
        }

        best
    }
}
