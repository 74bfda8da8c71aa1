//! Node handles (`spec.md` §3): the values offered to a [`Forest`](crate::Forest)
//! and the stable references it hands back.

use kdforest_container::create_generational_key;

use crate::point::Point;

create_generational_key!(
    HandleRef,
    "A stable reference to a handle stored in a [`Forest`](crate::Forest).\n\nRemains valid for as long as the handle it points at has not been dropped by a\nglobal rebuild; a `HandleRef` read after that point is detected rather than\naliasing whatever later reoccupies its slot, because the generation it carries\nno longer matches."
);

/// A point offered to a forest, built by the caller and consumed by
/// [`Forest::insert`](crate::Forest::insert).
///
/// Coordinates are immutable after construction, matching §3's "Node handle":
/// only the liveness bit the forest tracks internally ever changes once a
/// handle has been inserted.
pub struct Handle<T> {
    coords: Point,
    payload: T,
}

impl<T> Handle<T> {
    /// Builds a handle from its coordinates and an opaque payload.
    ///
    /// The payload is never interpreted by the tree or the forest; the
    /// placement engine uses it to store the pixel the handle was placed at.
    pub fn new(coords: Point, payload: T) -> Self {
        Self { coords, payload }
    }

    pub(crate) fn into_parts(self) -> (Point, T) {
        (self.coords, self.payload)
    }
}

/// The data a forest actually stores per handle, keyed by [`HandleRef`] in a
/// generational slab. Coordinates never move once written; only `live`
/// transitions, and only ever from `true` to `false`.
pub(crate) struct Entry<T> {
    pub(crate) coords: Point,
    pub(crate) payload: T,
    pub(crate) live: bool,
}
