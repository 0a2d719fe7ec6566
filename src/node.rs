//! Tree nodes and the recursive algorithms that walk them.
//!
//! There is a single node type with two shapes:
//!
//! - `Leaf`: a flat run of items sorted by cell, duplicates in insertion order.
//! - `Branch`: 256 optional child slots, one per value of the 8-bit chunk of
//!   the cell consumed at this level.
//!
//! Every function here takes the current level as a `shift`: the number of
//! bits the cell is shifted right by to bring this level's chunk into the low
//! byte. The root sits at `TOP_SHIFT` (56) and the deepest level at 0.

use crate::{Occupancy, LEAF_CAPACITY, NODE_FANOUT, RADIX_BITS};

/// Low-byte mask selecting one radix chunk.
const CHUNK_MASK: u64 = (NODE_FANOUT as u64) - 1;

/// One stored entry.
#[derive(Clone, Debug)]
pub(crate) struct Item<T> {
    pub(crate) cell: u64,
    pub(crate) payload: T,
}

#[derive(Clone)]
pub(crate) enum Node<T> {
    Leaf(Vec<Item<T>>),
    Branch(Branch<T>),
}

/// Fixed fan-out child table. `live` always equals the number of `Some` slots.
#[derive(Clone)]
pub(crate) struct Branch<T> {
    slots: Box<[Option<Node<T>>; NODE_FANOUT]>,
    live: Occupancy,
}

/// Child slot selected by `cell` at the level addressed by `shift`.
#[inline]
pub(crate) fn index_at(cell: u64, shift: u32) -> usize {
    ((cell >> shift) & CHUNK_MASK) as usize
}

/// Index of the first item whose cell is strictly greater than `cell`.
///
/// New items go here, which places them after every existing equal cell.
#[inline]
pub(crate) fn upper_bound<T>(items: &[Item<T>], cell: u64) -> usize {
    items.partition_point(|item| item.cell <= cell)
}

/// Walks left from the `upper_bound` anchor over the run of items equal to
/// `cell`, returning the index of the first item with `item.cell >= cell`.
#[inline]
pub(crate) fn equal_run_start<T>(items: &[Item<T>], cell: u64, anchor: usize) -> usize {
    let mut start = anchor;
    while start > 0 && items[start - 1].cell >= cell {
        start -= 1;
    }
    start
}

impl<T> Branch<T> {
    fn new() -> Self {
        Self {
            slots: Box::new(std::array::from_fn(|_| None)),
            live: 0,
        }
    }

    #[inline]
    pub(crate) fn live(&self) -> usize {
        usize::from(self.live)
    }

    #[inline]
    pub(crate) fn slots(&self) -> &[Option<Node<T>>] {
        &self.slots[..]
    }

    /// Occupied children in ascending slot order.
    pub(crate) fn children(&self) -> impl Iterator<Item = &Node<T>> {
        self.slots.iter().flatten()
    }

    fn children_mut(&mut self) -> impl Iterator<Item = &mut Node<T>> {
        self.slots.iter_mut().flatten()
    }

    fn child_or_insert(&mut self, index: usize) -> &mut Node<T> {
        let slot = &mut self.slots[index];
        if slot.is_none() {
            self.live += 1;
        }
        slot.get_or_insert_with(Node::empty)
    }

    fn detach(&mut self, index: usize) {
        if self.slots[index].take().is_some() {
            self.live -= 1;
        }
    }
}

impl<T> Node<T> {
    #[inline]
    pub(crate) fn empty() -> Self {
        Node::Leaf(Vec::new())
    }

    #[inline]
    pub(crate) fn is_empty_leaf(&self) -> bool {
        matches!(self, Node::Leaf(items) if items.is_empty())
    }

    pub(crate) fn insert(&mut self, cell: u64, payload: T, shift: u32) {
        // A leaf at shift 0 has no bits left to split on and grows unbounded.
        if shift != 0 && matches!(self, Node::Leaf(items) if items.len() >= LEAF_CAPACITY) {
            self.split(shift);
        }

        match self {
            Node::Leaf(items) => {
                let item = Item { cell, payload };
                match items.last() {
                    Some(last) if last.cell > cell => {
                        let at = upper_bound(items, cell);
                        items.insert(at, item);
                    }
                    _ => items.push(item),
                }
            }
            Node::Branch(branch) => {
                debug_assert!(shift >= RADIX_BITS, "branch at the deepest level");
                branch
                    .child_or_insert(index_at(cell, shift))
                    .insert(cell, payload, shift - RADIX_BITS);
            }
        }
    }

    /// Turns a full leaf into a branch and redistributes its items one level
    /// down. Items arrive in stored order, so every child takes the append
    /// path and ties keep their insertion order.
    fn split(&mut self, shift: u32) {
        let Node::Leaf(items) = self else {
            return;
        };
        let items = std::mem::take(items);

        #[cfg(feature = "tracing")]
        tracing::trace!(shift, items = items.len(), "celltree: split leaf");

        *self = Node::Branch(Branch::new());
        for item in items {
            self.insert(item.cell, item.payload, shift);
        }
    }

    /// Removes the most recently inserted item at `cell` whose payload
    /// satisfies `predicate`. Emptied child leaves are detached and a branch
    /// left without children reverts to an empty leaf, so the collapse
    /// repeats at every level the recursion unwinds through.
    pub(crate) fn take_when<F>(&mut self, cell: u64, shift: u32, predicate: &mut F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let (taken, collapse) = match self {
            Node::Leaf(items) => {
                let end = upper_bound(items, cell);
                let start = equal_run_start(items, cell, end);
                let at = (start..end).rev().find(|&i| predicate(&items[i].payload))?;
                return Some(items.remove(at).payload);
            }
            Node::Branch(branch) => {
                let index = index_at(cell, shift);
                let child = branch.slots[index].as_mut()?;
                let taken = child.take_when(cell, shift - RADIX_BITS, predicate)?;
                if child.is_empty_leaf() {
                    branch.detach(index);
                }
                (taken, branch.live() == 0)
            }
        };

        if collapse {
            #[cfg(feature = "tracing")]
            tracing::trace!(shift, "celltree: collapse empty branch");

            *self = Node::empty();
        }
        Some(taken)
    }

    /// Visits every item in order. `Ok(false)` means the visitor asked to stop.
    pub(crate) fn try_scan<E, F>(&self, visit: &mut F) -> Result<bool, E>
    where
        F: FnMut(u64, &T) -> Result<bool, E>,
    {
        match self {
            Node::Leaf(items) => visit_items(items, visit),
            Node::Branch(branch) => {
                for child in branch.children() {
                    if !child.try_scan(visit)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Visits every item with `cell >= start` in order.
    ///
    /// Only the slot on the path of `start` needs a positioned descent. Any
    /// slot to its right holds cells with a larger prefix and is scanned whole.
    pub(crate) fn try_range<E, F>(&self, start: u64, shift: u32, visit: &mut F) -> Result<bool, E>
    where
        F: FnMut(u64, &T) -> Result<bool, E>,
    {
        match self {
            Node::Leaf(items) => {
                let from = equal_run_start(items, start, upper_bound(items, start));
                visit_items(&items[from..], visit)
            }
            Node::Branch(branch) => {
                let index = index_at(start, shift);
                if let Some(child) = &branch.slots[index] {
                    if !child.try_range(start, shift - RADIX_BITS, visit)? {
                        return Ok(false);
                    }
                }
                for child in branch.slots[index + 1..].iter().flatten() {
                    if !child.try_scan(visit)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        match self {
            Node::Leaf(items) => items.capacity() * std::mem::size_of::<Item<T>>(),
            Node::Branch(branch) => {
                std::mem::size_of::<[Option<Node<T>>; NODE_FANOUT]>()
                    + branch.children().map(Node::heap_bytes).sum::<usize>()
            }
        }
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        match self {
            Node::Leaf(items) => items.shrink_to_fit(),
            Node::Branch(branch) => branch.children_mut().for_each(Node::shrink_to_fit),
        }
    }
}

#[inline]
fn visit_items<T, E, F>(items: &[Item<T>], visit: &mut F) -> Result<bool, E>
where
    F: FnMut(u64, &T) -> Result<bool, E>,
{
    for item in items {
        if !visit(item.cell, &item.payload)? {
            return Ok(false);
        }
    }
    Ok(true)
}
