//! The 3-D Euclidean point type shared by the tree, forest and engine.

use cgmath::MetricSpace;

/// Spatial dimension of every point handled by this crate.
pub const DIMENSIONS: usize = 3;

/// A point in the space the forest indexes.
///
/// `cgmath::Point3<f32>` is the teacher's own point type, already a workspace
/// dependency, rather than a bespoke `[f32; 3]`.
pub type Point = cgmath::Point3<f32>;

/// Returns the coordinate of `point` along `axis`, cycling through 0, 1, 2.
#[inline]
pub(crate) fn coord(point: Point, axis: usize) -> f32 {
    match axis % DIMENSIONS {
        0 => point.x,
        1 => point.y,
        _ => point.z,
    }
}

/// Squared Euclidean distance between two points. Distances are kept squared
/// throughout the crate to avoid square roots on the hot query path.
#[inline]
pub(crate) fn distance_squared(a: Point, b: Point) -> f32 {
    a.distance2(b)
}
