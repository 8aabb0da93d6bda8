//! Integer-handle tables for buffers and sources
//!
//! Objects are referred to by opaque nonzero u32 names, matching the classic
//! AL convention of integer object names with zero reserved.

use std::collections::HashMap;

/// Handle table mapping nonzero u32 names to live objects.
///
/// Names are allocated from a wrapping counter and stay unique while the
/// object is live. Name 0 is never issued.
#[derive(Debug)]
pub struct NameTable<T> {
    entries: HashMap<u32, T>,
    next: u32,
}

impl<T> NameTable<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next: 1,
        }
    }

    /// Insert an object and return its freshly allocated name.
    ///
    /// Skips 0 and any name still in use after counter wraparound.
    pub fn insert(&mut self, value: T) -> u32 {
        loop {
            let name = self.next;
            self.next = self.next.wrapping_add(1);
            if name == 0 || self.entries.contains_key(&name) {
                continue;
            }
            self.entries.insert(name, value);
            return name;
        }
    }

    /// Allocate a name, build the object from it, and insert it.
    ///
    /// The builder sees the name it will live under, which objects that log
    /// their own handle need. On builder failure nothing is inserted.
    pub fn try_insert_with<E>(
        &mut self,
        make: impl FnOnce(u32) -> std::result::Result<T, E>,
    ) -> std::result::Result<u32, E> {
        loop {
            let name = self.next;
            self.next = self.next.wrapping_add(1);
            if name == 0 || self.entries.contains_key(&name) {
                continue;
            }
            let value = make(name)?;
            self.entries.insert(name, value);
            return Ok(name);
        }
    }

    pub fn get(&self, name: u32) -> Option<&T> {
        self.entries.get(&name)
    }

    pub fn get_mut(&mut self, name: u32) -> Option<&mut T> {
        self.entries.get_mut(&name)
    }

    pub fn remove(&mut self, name: u32) -> Option<T> {
        self.entries.remove(&name)
    }

    pub fn contains(&self, name: u32) -> bool {
        self.entries.contains_key(&name)
    }

    /// Iterate over (name, object) pairs in unspecified order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.entries.iter_mut().map(|(name, value)| (*name, value))
    }
}

impl<T> Default for NameTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
