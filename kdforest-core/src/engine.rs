//! Component **P**: the placement engine (`spec.md` §4.3).
//!
//! Drives a [`Forest`] through a stream of target points, choosing for each
//! one a pixel adjacent to the forest's current nearest match, and prunes
//! newly interior pixels out of the forest so its live population stays
//! bounded by the perimeter of the filled region. Grounded on
//! `main.c`'s `try_neighbor`/`next_neighbor`/`remove_non_boundary` loop.

use rand::Rng;

use crate::forest::{Forest, ForestError};
use crate::handle::{Handle, HandleRef};
use crate::point::Point;

/// Failure mode of [`Engine::place`] (`spec.md` §7.3).
#[derive(Debug)]
pub enum PlaceError {
    /// `place` was called more times than the grid has pixels.
    Exhausted,
    /// The forest could not allocate storage for the new handle.
    Allocation,
}

impl std::fmt::Display for PlaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceError::Exhausted => write!(f, "every pixel has already been placed"),
            PlaceError::Allocation => write!(f, "forest handle arena is full"),
        }
    }
}

impl std::error::Error for PlaceError {}

impl From<ForestError> for PlaceError {
    fn from(error: ForestError) -> Self {
        match error {
            ForestError::Allocation => PlaceError::Allocation,
        }
    }
}

/// How often [`Engine::place`] should invoke its progress callback.
#[derive(Debug, Clone, Copy)]
pub enum ProgressStride {
    /// Never invoke the callback.
    Never,
    /// Invoke the callback every `n` successful placements.
    Every(std::num::NonZeroU64),
}

/// A snapshot handed to the progress callback. Advisory only: it may not
/// mutate engine state and carries no return value.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReport {
    /// Number of pixels placed so far.
    pub filled: u64,
    /// The forest's current live handle count (its boundary size).
    pub live_count: u64,
    /// The running maximum of `live_count` observed across all placements.
    pub max_live_count: u64,
}

#[derive(Clone, Copy)]
struct Pixel {
    filled: bool,
    handle_ref: Option<HandleRef>,
}

/// Owns the pixel grid and the forest that backs placement decisions.
pub struct Engine<R> {
    width: u32,
    height: u32,
    start_x: u32,
    start_y: u32,
    grid: Vec<Pixel>,
    forest: Forest<(u32, u32)>,
    filled_count: u64,
    max_live_count: u64,
    progress_stride: ProgressStride,
    rng: R,
}

impl<R: Rng> Engine<R> {
    /// Creates a new engine over a `width`×`height` grid. `(start_x,
    /// start_y)` is the pixel the very first `place` call will use; it is a
    /// programming error (`spec.md` §7.2) for it to lie outside the grid.
    pub fn new(width: u32, height: u32, start_x: u32, start_y: u32, rng: R) -> Self {
        debug_assert!(width > 0 && height > 0, "grid must have at least one pixel");
        debug_assert!(start_x < width && start_y < height, "start pixel must lie inside the grid");

        Self {
            width,
            height,
            start_x,
            start_y,
            grid: vec![Pixel { filled: false, handle_ref: None }; (width as usize) * (height as usize)],
            forest: Forest::new(),
            filled_count: 0,
            max_live_count: 0,
            progress_stride: ProgressStride::Never,
            rng,
        }
    }

    /// Sets the stride at which [`Engine::place`] invokes a progress
    /// callback (`spec.md` §4.3). Defaults to [`ProgressStride::Never`].
    pub fn set_progress_stride(&mut self, stride: ProgressStride) {
        self.progress_stride = stride;
    }

    /// Fraction of the grid that has been filled so far, in `[0, 1]`.
    pub fn fill_fraction(&self) -> f32 {
        self.filled_count as f32 / (self.width as u64 * self.height as u64) as f32
    }

    /// The forest's current live handle count — the size of the filled
    /// region's boundary (`spec.md` §4.3).
    pub fn boundary_size(&self) -> u64 {
        self.forest.live_count()
    }

    /// Iterates over the `(x, y)` coordinates of every filled pixel, in scan
    /// order, for the caller's image encoder.
    pub fn filled_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.grid.iter().enumerate().filter(|(_, pixel)| pixel.filled).map(|(index, _)| self.pixel_coords(index))
    }

    /// Places `target` at a pixel, invoking `on_progress` if the
    /// configured stride is reached. This is the engine's `place` primitive
    /// (`spec.md` §6); callers that want the multi-pass bit-plane ordering
    /// should feed points through [`Engine::place_all`] instead.
    pub fn place(&mut self, target: Point, mut on_progress: impl FnMut(ProgressReport)) -> Result<(u32, u32, HandleRef), PlaceError> {
        if self.filled_count >= self.width as u64 * self.height as u64 {
            return Err(PlaceError::Exhausted);
        }

        let (placed_x, placed_y) = if self.filled_count == 0 {
            (self.start_x, self.start_y)
        } else {
            let nearest_ref = self.forest.nearest(target).expect("a non-full grid with at least one prior placement must have a live handle");
            let &(px, py) = self.forest.payload(nearest_ref).expect("handle returned by nearest must still be present");
            self.choose_empty_neighbor(px, py)
                .expect("a filled pixel with no empty neighbor should already have been pruned from the forest")
        };

        let handle_ref = self.forest.insert(Handle::new(target, (placed_x, placed_y)))?;

        let index = self.index_of(placed_x, placed_y);
        self.grid[index] = Pixel { filled: true, handle_ref: Some(handle_ref) };
        self.filled_count += 1;

        self.prune_non_boundary(placed_x, placed_y);

        self.max_live_count = self.max_live_count.max(self.forest.live_count());

        if let ProgressStride::Every(stride) = self.progress_stride
            && self.filled_count % stride.get() == 0
        {
            on_progress(ProgressReport {
                filled: self.filled_count,
                live_count: self.forest.live_count(),
                max_live_count: self.max_live_count,
            });
        }

        Ok((placed_x, placed_y, handle_ref))
    }

    /// Feeds `points` through [`Engine::place`] in the multi-pass bit-plane
    /// order described by `spec.md` §4.3, so that a caller-presorted stream
    /// (e.g. by hue) renders as a succession of smooth transitions instead
    /// of in raw input order. `points.len()` must equal the number of
    /// pixels still unfilled.
    pub fn place_all(&mut self, points: &[Point], mut on_progress: impl FnMut(ProgressReport)) -> Result<(), PlaceError> {
        for index in bit_plane_order(points.len()) {
            self.place(points[index], &mut on_progress)?;
        }
        Ok(())
    }

    fn pixel_coords(&self, index: usize) -> (u32, u32) {
        ((index % self.width as usize) as u32, (index / self.width as usize) as u32)
    }

    fn index_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn is_filled(&self, x: u32, y: u32) -> bool {
        self.grid[self.index_of(x, y)].filled
    }

    /// The 8-connected neighbors of `(x, y)` in scan order (dy −1..=1, dx
    /// −1..=1, skipping `(0, 0)`), bounds-checked.
    fn neighbors(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
        (-1i32..=1).flat_map(move |dy| (-1i32..=1).map(move |dx| (dx, dy))).filter(|&(dx, dy)| (dx, dy) != (0, 0)).filter_map(move |(dx, dy)| {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx >= 0 && ny >= 0 && (nx as u32) < width && (ny as u32) < height {
                Some((nx as u32, ny as u32))
            } else {
                None
            }
        })
    }

    /// Samples uniformly among the empty 8-neighbors of `(x, y)`, per
    /// `spec.md` §5's canonicalized-enumeration rule.
    fn choose_empty_neighbor(&mut self, x: u32, y: u32) -> Option<(u32, u32)> {
        let empty: Vec<(u32, u32)> = Self::neighbors(x, y, self.width, self.height).filter(|&(nx, ny)| !self.is_filled(nx, ny)).collect();

        if empty.is_empty() {
            None
        } else {
            let index = self.rng.gen_range(0..empty.len());
            Some(empty[index])
        }
    }

    /// For every pixel in the closed 3×3 neighborhood of `(x, y)`: if it is
    /// filled, still present and live in the forest, and has no empty
    /// 8-neighbor of its own, marks it removed. This is the
    /// "only-boundary-stays-in-forest" rule of `spec.md` §4.3.
    fn prune_non_boundary(&mut self, x: u32, y: u32) {
        let mut candidates: Vec<(u32, u32)> = Self::neighbors(x, y, self.width, self.height).collect();
        candidates.push((x, y));

        for (cx, cy) in candidates {
            let index = self.index_of(cx, cy);
            let Pixel { filled, handle_ref: Some(handle_ref) } = self.grid[index] else { continue };

            if filled && !self.has_empty_neighbor(cx, cy) {
                self.forest.mark_removed(handle_ref);
                self.grid[index].handle_ref = None;
            }
        }
    }

    fn has_empty_neighbor(&self, x: u32, y: u32) -> bool {
        Self::neighbors(x, y, self.width, self.height).any(|(nx, ny)| !self.is_filled(nx, ny))
    }
}

/// Computes the visiting order over `0..count` described by `spec.md` §4.3's
/// "Multi-pass order": for pass `i = 1, 2, ...`, visit indices `2^(i-1) - 1,
/// 2^(i-1) - 1 + 2^i, ...` less than `count`, stopping once a pass's first
/// index already exceeds `count` (beyond that point every later pass would
/// contribute no new index, matching the spec's own `⌈log2 N⌉ + 1` bound for
/// the last pass that can contribute anything).
pub fn bit_plane_order(count: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(count);
    let mut pass = 1u32;
    loop {
        let stripe = 1usize << pass;
        let start = stripe / 2 - 1;
        if start >= count {
            break;
        }

        let mut index = start;
        while index < count {
            order.push(index);
            index += stripe;
        }
        pass += 1;
    }
    order
}
