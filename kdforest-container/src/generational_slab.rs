//! Implements a generational slab.

use std::mem::swap;
use std::num::NonZeroU32;

/// Trait for keys of generational slabs.
pub trait GenerationalKey: Copy {
    #[doc(hidden)]
    /// Creates a new fixed key. Must not be called by the user.
    fn new(key: u32, generation: NonZeroU32) -> Self;
    #[doc(hidden)]
    /// Returns the key value.
    fn key(&self) -> u32;
    #[doc(hidden)]
    /// Returns the generation.
    fn generation(&self) -> NonZeroU32;
}

enum Slot<T> {
    Occupied { value: T, generation: NonZeroU32 },
    Empty { next_free: Option<u32>, last_generation: NonZeroU32 },
}

/// A slab with generational slots. Can have at most [`u32::MAX`] entries.
///
/// A key returned by [`insert`](Self::insert) stays valid until the slot it
/// points at is [`remove`](Self::remove)d. Once that slot is reused by a
/// later insert, its generation is bumped, so the old key reads back as
/// absent instead of aliasing the new occupant.
pub struct GenerationalSlab<I, V> {
    entries: Vec<Slot<V>>,
    next_free: Option<u32>,
}

impl<I: GenerationalKey, V> Default for GenerationalSlab<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: GenerationalKey, V> GenerationalSlab<I, V> {
    /// Creates a new generational slab.
    pub fn new() -> Self {
        Self {
            entries: Vec::default(),
            next_free: None,
        }
    }

    /// Creates a new generational slab with the given pre-allocated capacity.
    pub fn with_capacity(size: u32) -> Self {
        Self {
            entries: Vec::with_capacity(size as usize),
            next_free: None,
        }
    }

    /// Inserts a new value into the slab. Returns the key of the value if
    /// there was still space left for the value inside the slab.
    #[must_use]
    pub fn insert(&mut self, value: V) -> Option<I> {
        if let Some(key) = self.next_free
            && let Some(Slot::Empty {
                next_free,
                last_generation,
            }) = self.entries.get(key as usize)
        {
            self.next_free = *next_free;

            let generation = match last_generation.get().checked_add(1) {
                None => NonZeroU32::new(1).expect("one is zero"),
                Some(value) => NonZeroU32::new(value).expect("value is zero"),
            };

            self.entries[key as usize] = Slot::Occupied { value, generation };

            Some(I::new(key, generation))
        } else if self.entries.len() < u32::MAX as usize {
            let generation = NonZeroU32::new(1).expect("one is zero");
            let key = self.entries.len();

            self.entries.push(Slot::Occupied { value, generation });

            let key = u32::try_from(key).expect("key is not a u32");
            Some(I::new(key, generation))
        } else {
            None
        }
    }

    /// Returns a reference to the value of the given key.
    #[must_use]
    pub fn get(&self, key: I) -> Option<&V> {
        if let Some(Slot::Occupied { value, generation }) = self.entries.get(key.key() as usize)
            && key.generation() == *generation
        {
            return Some(value);
        }

        None
    }

    /// Returns a mutable reference to the value of the given key.
    #[must_use]
    pub fn get_mut(&mut self, key: I) -> Option<&mut V> {
        if let Some(Slot::Occupied { value, generation }) = self.entries.get_mut(key.key() as usize)
            && key.generation() == *generation
        {
            return Some(value);
        }

        None
    }

    /// Removes the value with the given key if present.
    #[must_use]
    pub fn remove(&mut self, key: I) -> Option<V> {
        if let Some(entry) = self.entries.get_mut(key.key() as usize)
            && let Slot::Occupied { generation, .. } = entry
            && key.generation() == *generation
        {
            let mut empty_slot = Slot::Empty {
                next_free: self.next_free,
                last_generation: *generation,
            };

            swap(&mut empty_slot, entry);
            self.next_free = Some(key.key());

            if let Slot::Occupied { value, .. } = empty_slot {
                return Some(value);
            }
        }

        None
    }
}
