//! Borrowing iterators over a [`CellTree`](crate::CellTree).

use std::iter::FusedIterator;
use std::slice;

use crate::node::{equal_run_start, index_at, upper_bound, Item, Node};
use crate::{RADIX_BITS, TOP_SHIFT};

enum Frame<'a, T> {
    /// Remaining items of a leaf.
    Items(slice::Iter<'a, Item<T>>),
    /// Remaining child slots of a branch.
    Slots(slice::Iter<'a, Option<Node<T>>>),
}

impl<'a, T> Frame<'a, T> {
    fn of(node: &'a Node<T>) -> Self {
        match node {
            Node::Leaf(items) => Frame::Items(items.iter()),
            Node::Branch(branch) => Frame::Slots(branch.slots().iter()),
        }
    }
}

/// Iterator over `(cell, &payload)` pairs in ascending cell order.
///
/// Created by [`CellTree::iter`](crate::CellTree::iter) and
/// [`CellTree::range_iter`](crate::CellTree::range_iter).
pub struct Iter<'a, T> {
    stack: Vec<Frame<'a, T>>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(root: Option<&'a Node<T>>) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = root {
            stack.push(Frame::of(root));
        }
        Self { stack }
    }

    /// Positions the iterator at the first item with `cell >= start`.
    ///
    /// Descends along the path of `start`, leaving a frame for the slots to
    /// the right of the path at every branch. Those are visited after the
    /// deeper frames are exhausted.
    pub(crate) fn starting_at(root: Option<&'a Node<T>>, start: u64) -> Self {
        let mut stack = Vec::new();
        let mut current = root;
        let mut shift = TOP_SHIFT;
        while let Some(node) = current {
            match node {
                Node::Leaf(items) => {
                    let from = equal_run_start(items, start, upper_bound(items, start));
                    stack.push(Frame::Items(items[from..].iter()));
                    current = None;
                }
                Node::Branch(branch) => {
                    let index = index_at(start, shift);
                    let slots = branch.slots();
                    stack.push(Frame::Slots(slots[index + 1..].iter()));
                    current = slots[index].as_ref();
                    shift = shift.saturating_sub(RADIX_BITS);
                }
            }
        }
        Self { stack }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (u64, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.last_mut()? {
                Frame::Items(items) => match items.next() {
                    Some(item) => return Some((item.cell, &item.payload)),
                    None => {
                        self.stack.pop();
                    }
                },
                Frame::Slots(slots) => match slots.next() {
                    Some(Some(child)) => self.stack.push(Frame::of(child)),
                    Some(None) => {}
                    None => {
                        self.stack.pop();
                    }
                },
            }
        }
    }
}

impl<T> FusedIterator for Iter<'_, T> {}
