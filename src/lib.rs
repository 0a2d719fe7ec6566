//! # celltree
//!
//! An ordered multi-map keyed by 64-bit cells, stored in a radix prefix tree.
//!
//! The tree dispatches one byte of the cell per level, most significant byte
//! first, giving at most eight levels with 256-way fan-out. Leaves hold flat
//! sorted batches of up to 256 items and split into branches when they
//! overflow; branches collapse back into leaves once all their children are
//! gone. Any number of items may share a cell. Duplicates are kept in
//! insertion order.
//!
//! Cells are opaque to the tree. A typical use is indexing payloads by a
//! space-filling-curve code and then querying them in curve order from a
//! cursor position.
//!
//! ## Example
//!
//! ```rust
//! use celltree::CellTree;
//!
//! let mut tree: CellTree<&str> = CellTree::new();
//! tree.insert(7, "seven");
//! tree.insert(3, "three");
//! tree.insert(3, "also three");
//!
//! let mut seen = Vec::new();
//! tree.range(3, |cell, name| {
//!     seen.push((cell, *name));
//!     true
//! });
//! assert_eq!(seen, [(3, "three"), (3, "also three"), (7, "seven")]);
//!
//! assert!(tree.remove(3, &"three"));
//! assert_eq!(tree.len(), 2);
//! ```

#![deny(unsafe_code)]

mod iter;
mod node;

use std::convert::Infallible;

pub use iter::Iter;

use node::Node;

// =============================================================================
// Configuration
// =============================================================================

/// Bits of the cell consumed per tree level.
pub const RADIX_BITS: u32 = 8;
/// Child slots per branch.
pub const NODE_FANOUT: usize = 256;
/// Items a leaf may hold before it splits, unless it sits at the deepest level.
pub const LEAF_CAPACITY: usize = 256;
/// Number of radix levels needed to consume a whole cell.
pub const MAX_DEPTH: usize = (u64::BITS / RADIX_BITS) as usize;

/// Shift that brings the top chunk of a cell into the low bits.
pub(crate) const TOP_SHIFT: u32 = u64::BITS - RADIX_BITS;

/// Live-child counter stored in every branch.
pub(crate) type Occupancy = u16;

const _: () = assert!(NODE_FANOUT == 1 << RADIX_BITS, "fan-out must be 2^RADIX_BITS");
const _: () = assert!(u64::BITS % RADIX_BITS == 0, "RADIX_BITS must divide 64");
const _: () = assert!(NODE_FANOUT <= Occupancy::MAX as usize, "live counter too narrow");

// =============================================================================
// CellTree
// =============================================================================

/// An ordered multi-map from `u64` cells to payloads.
///
/// Iteration order is ascending by cell. Items sharing a cell come out in
/// the order they were inserted.
///
/// The tree is not internally synchronized. Mutation goes through `&mut self`,
/// so sharing across threads needs an external lock.
#[derive(Clone)]
pub struct CellTree<T> {
    root: Option<Node<T>>,
    count: usize,
}

impl<T> CellTree<T> {
    pub fn new() -> Self {
        Self {
            root: None,
            count: 0,
        }
    }

    /// Number of items stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts an item. Duplicates, including identical `(cell, payload)`
    /// pairs, are always accepted and placed after existing items with the
    /// same cell.
    pub fn insert(&mut self, cell: u64, payload: T) {
        self.root
            .get_or_insert_with(Node::empty)
            .insert(cell, payload, TOP_SHIFT);
        self.count += 1;
    }

    /// Removes one item at `cell` whose payload equals `payload`.
    ///
    /// When several items match, the most recently inserted one is removed.
    /// Returns whether an item was removed.
    pub fn remove(&mut self, cell: u64, payload: &T) -> bool
    where
        T: PartialEq,
    {
        self.take_when(cell, |candidate| candidate == payload).is_some()
    }

    /// Removes one item at `cell` for which `predicate` returns true, trying
    /// the most recently inserted item first. Returns whether an item was
    /// removed.
    pub fn remove_when<F>(&mut self, cell: u64, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.take_when(cell, predicate).is_some()
    }

    /// Like [`remove_when`](Self::remove_when), but hands back the removed payload.
    pub fn take_when<F>(&mut self, cell: u64, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let taken = self
            .root
            .as_mut()?
            .take_when(cell, TOP_SHIFT, &mut predicate)?;
        self.count -= 1;
        Some(taken)
    }

    /// Calls `visit` for every item in order until it returns `false`.
    pub fn scan<F>(&self, mut visit: F)
    where
        F: FnMut(u64, &T) -> bool,
    {
        let visited = self.try_scan(|cell, payload| Ok::<_, Infallible>(visit(cell, payload)));
        match visited {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Calls `visit` for every item with `cell >= start` in order until it
    /// returns `false`.
    pub fn range<F>(&self, start: u64, mut visit: F)
    where
        F: FnMut(u64, &T) -> bool,
    {
        let visited = self.try_range(start, |cell, payload| {
            Ok::<_, Infallible>(visit(cell, payload))
        });
        match visited {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Fallible [`scan`](Self::scan). The first error returned by `visit`
    /// stops the traversal and is passed through unchanged.
    pub fn try_scan<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(u64, &T) -> Result<bool, E>,
    {
        if let Some(root) = &self.root {
            root.try_scan(&mut visit)?;
        }
        Ok(())
    }

    /// Fallible [`range`](Self::range).
    pub fn try_range<E, F>(&self, start: u64, mut visit: F) -> Result<(), E>
    where
        F: FnMut(u64, &T) -> Result<bool, E>,
    {
        if let Some(root) = &self.root {
            root.try_range(start, TOP_SHIFT, &mut visit)?;
        }
        Ok(())
    }

    /// Iterates over all items in order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.root.as_ref())
    }

    /// Iterates over items with `cell >= start` in order.
    pub fn range_iter(&self, start: u64) -> Iter<'_, T> {
        Iter::starting_at(self.root.as_ref(), start)
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.count = 0;
    }

    /// Approximate heap bytes held by nodes and item storage.
    pub fn memory_usage(&self) -> usize {
        self.root.as_ref().map_or(0, Node::heap_bytes)
    }

    pub fn shrink_to_fit(&mut self) {
        if let Some(root) = &mut self.root {
            root.shrink_to_fit();
        }
    }
}

impl<T> Default for CellTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CellTree<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<(u64, T)> for CellTree<T> {
    fn extend<I: IntoIterator<Item = (u64, T)>>(&mut self, iter: I) {
        for (cell, payload) in iter {
            self.insert(cell, payload);
        }
    }
}

impl<T> FromIterator<(u64, T)> for CellTree<T> {
    fn from_iter<I: IntoIterator<Item = (u64, T)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<'a, T> IntoIterator for &'a CellTree<T> {
    type Item = (u64, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}


#[cfg(test)]
mod proptests;
