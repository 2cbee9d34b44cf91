//! Generational arena
//!
//! Slots are addressed by a `{generation, index}` pair. Removing a slot bumps
//! its generation immediately, so every key issued before the removal stops
//! resolving, and the next insert that reuses the index hands out a key with
//! a strictly greater generation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{RenderError, Result};

/// Typed handle into a [`GenKeyVector`].
pub struct GenKey<T> {
    generation: u32,
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GenKey<T> {
    /// Build a key from raw parts. Mostly useful for tests and diagnostics;
    /// keys obtained from [`GenKeyVector::insert`] are the normal source.
    #[must_use]
    pub const fn from_parts(generation: u32, index: u32) -> Self {
        Self {
            generation,
            index,
            _marker: PhantomData,
        }
    }

    /// Slot generation this key was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Raw slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

// Manual impls: derives would add `T: Clone` / `T: PartialEq` bounds.
impl<T> Clone for GenKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GenKey<T> {}

impl<T> PartialEq for GenKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation && self.index == other.index
    }
}

impl<T> Eq for GenKey<T> {}

impl<T> Hash for GenKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.generation.hash(state);
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for GenKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenKey({}v{})", self.index, self.generation)
    }
}

/// Generational slot storage.
///
/// `values[i]` is `None` exactly when `i` is on the free list, so
/// `len() + free_count() == slot_count()` always holds.
pub struct GenKeyVector<T> {
    values: Vec<Option<T>>,
    generation: Vec<u32>,
    free_indices: Vec<u32>,
    occupied: usize,
}

impl<T> fmt::Debug for GenKeyVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenKeyVector")
            .field("len", &self.occupied)
            .field("free", &self.free_indices.len())
            .finish()
    }
}

impl<T> Default for GenKeyVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenKeyVector<T> {
    /// Empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
            generation: Vec::new(),
            free_indices: Vec::new(),
            occupied: 0,
        }
    }

    /// Empty arena with room for `capacity` slots before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            generation: Vec::with_capacity(capacity),
            free_indices: Vec::new(),
            occupied: 0,
        }
    }

    /// Store `value`, reusing the most recently freed slot if there is one.
    pub fn insert(&mut self, value: T) -> GenKey<T> {
        let index = if let Some(index) = self.free_indices.pop() {
            self.values[index as usize] = Some(value);
            index
        } else {
            let index = self.values.len() as u32;
            self.values.push(Some(value));
            self.generation.push(0);
            index
        };
        self.occupied += 1;
        self.debug_check();
        GenKey::from_parts(self.generation[index as usize], index)
    }

    /// Resolve `key`, failing with [`RenderError::InvalidHandle`] if the slot
    /// was removed (or reused) since the key was issued.
    pub fn at(&self, key: GenKey<T>) -> Result<&T> {
        if !self.is_valid(key) {
            return Err(Self::invalid(key));
        }
        self.values[key.index as usize]
            .as_ref()
            .ok_or_else(|| Self::invalid(key))
    }

    /// Mutable variant of [`GenKeyVector::at`].
    pub fn at_mut(&mut self, key: GenKey<T>) -> Result<&mut T> {
        if !self.is_valid(key) {
            return Err(Self::invalid(key));
        }
        self.values[key.index as usize]
            .as_mut()
            .ok_or_else(|| Self::invalid(key))
    }

    /// `true` if `key` still refers to a live value.
    #[must_use]
    pub fn is_valid(&self, key: GenKey<T>) -> bool {
        let i = key.index as usize;
        i < self.values.len()
            && self.generation[i] == key.generation
            && self.values[i].is_some()
    }

    /// `true` if raw slot `index` is in range and currently occupied.
    #[must_use]
    pub fn index_valid(&self, index: u32) -> bool {
        self.values
            .get(index as usize)
            .is_some_and(Option::is_some)
    }

    /// Value at raw slot `index`, if occupied.
    #[must_use]
    pub fn get_raw(&self, index: u32) -> Option<&T> {
        self.values.get(index as usize).and_then(Option::as_ref)
    }

    /// Current key for an occupied raw slot.
    #[must_use]
    pub fn key_for_index(&self, index: u32) -> Option<GenKey<T>> {
        self.index_valid(index).then(|| {
            GenKey::from_parts(self.generation[index as usize], index)
        })
    }

    /// Free raw slot `index`: bump its generation, drop the value and push
    /// the index onto the free list. Returns `None` if the slot was already
    /// free or out of range.
    pub fn remove(&mut self, index: u32) -> Option<T> {
        let i = index as usize;
        let value = self.values.get_mut(i)?.take()?;
        self.generation[i] = self.generation[i].wrapping_add(1);
        self.free_indices.push(index);
        self.occupied -= 1;
        self.debug_check();
        Some(value)
    }

    /// Validate `key` then remove its slot.
    pub fn remove_key(&mut self, key: GenKey<T>) -> Result<T> {
        if !self.is_valid(key) {
            return Err(Self::invalid(key));
        }
        self.remove(key.index).ok_or_else(|| Self::invalid(key))
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// `true` when no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Total slots ever allocated (occupied + free).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.values.len()
    }

    /// Number of slots waiting on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_indices.len()
    }

    /// Occupied slots in raw index order.
    pub fn iter(&self) -> impl Iterator<Item = (GenKey<T>, &T)> + '_ {
        self.values.iter().enumerate().filter_map(|(i, v)| {
            v.as_ref().map(|value| {
                (GenKey::from_parts(self.generation[i], i as u32), value)
            })
        })
    }

    fn invalid(key: GenKey<T>) -> RenderError {
        let name = std::any::type_name::<T>();
        RenderError::InvalidHandle {
            kind: name.rsplit("::").next().unwrap_or(name),
            index: key.index,
            generation: key.generation,
        }
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.occupied + self.free_indices.len(),
            self.values.len(),
            "occupied + free must cover every slot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_after_remove_bumps_generation() {
        let mut lights = GenKeyVector::new();
        let a = lights.insert("A");
        let b = lights.insert("B");
        assert_eq!((a.generation(), a.index()), (0, 0));
        assert_eq!((b.generation(), b.index()), (0, 1));

        assert_eq!(lights.remove(0), Some("A"));
        let c = lights.insert("C");
        assert_eq!((c.generation(), c.index()), (1, 0));

        assert!(lights.at(a).unwrap_err().is_invalid_handle());
        assert_eq!(*lights.at(c).unwrap(), "C");
        assert_eq!(*lights.at(b).unwrap(), "B");
    }

    #[test]
    fn stale_key_never_returns_new_value() {
        let mut arena = GenKeyVector::new();
        let old = arena.insert(10_u32);
        let _ = arena.remove(old.index());
        let new = arena.insert(20_u32);
        assert_eq!(new.index(), old.index());
        assert!(arena.at(old).is_err());
        assert!(arena.at_mut(old).is_err());
        assert_eq!(*arena.at(new).unwrap(), 20);
    }

    #[test]
    fn out_of_range_key_is_invalid() {
        let arena: GenKeyVector<u8> = GenKeyVector::new();
        let err = arena.at(GenKey::from_parts(0, 7)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidHandle {
                index: 7,
                generation: 0,
                ..
            }
        ));
    }

    #[test]
    fn double_remove_is_noop() {
        let mut arena = GenKeyVector::new();
        let k = arena.insert(1);
        assert_eq!(arena.remove(k.index()), Some(1));
        assert_eq!(arena.remove(k.index()), None);
        assert_eq!(arena.free_count(), 1);
        // Generation was bumped once, not twice.
        assert_eq!(arena.insert(2).generation(), 1);
    }

    #[test]
    fn index_valid_skips_free_slots() {
        let mut arena = GenKeyVector::new();
        for i in 0..4 {
            let _ = arena.insert(i);
        }
        let _ = arena.remove(2);
        let live: Vec<u32> =
            (0..4).filter(|&i| arena.index_valid(i)).collect();
        assert_eq!(live, vec![0, 1, 3]);
        assert!(!arena.index_valid(9));
        assert_eq!(arena.iter().count(), 3);

        assert_eq!(arena.key_for_index(2), None);
        let key = arena.key_for_index(3).unwrap();
        assert_eq!(*arena.at(key).unwrap(), 3);
        let reused = arena.insert(7);
        assert_eq!(arena.key_for_index(2), Some(reused));
    }

    #[test]
    fn debug_reports_counts_without_values() {
        struct Opaque;
        let mut arena = GenKeyVector::new();
        let _ = arena.insert(Opaque);
        let _ = arena.insert(Opaque);
        let _ = arena.remove(0);
        assert_eq!(format!("{arena:?}"), "GenKeyVector { len: 1, free: 1 }");
    }

    /// Random insert/remove sequences checked against a simple model.
    #[test]
    fn random_sequences_keep_invariants() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(0x2545_f491);
        let mut arena = GenKeyVector::new();
        let mut live: Vec<GenKey<u64>> = Vec::new();
        let mut dead: Vec<GenKey<u64>> = Vec::new();

        for step in 0..2_000_u64 {
            if live.is_empty() || rng.random_bool(0.65) {
                let key = arena.insert(step);
                if let Some(prev) = dead.iter().rev().find(|k| k.index() == key.index())
                {
                    assert!(key.generation() > prev.generation());
                }
                live.push(key);
            } else {
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                assert!(arena.remove(victim.index()).is_some());
                dead.push(victim);
            }

            assert_eq!(arena.len() + arena.free_count(), arena.slot_count());
            assert_eq!(arena.len(), live.len());
        }

        for key in &live {
            assert!(arena.at(*key).is_ok());
        }
        for key in &dead {
            assert!(arena.at(*key).is_err());
        }
    }
}
