//! Evaluation stack
//!
//!     Every injection gets its own stack. Enzymes push their results in order; `array`,
//!     `assoc` and code executions pop the values they take as arguments.
//!
//!     Popping or peeking an empty stack yields `None`, which is different from getting back
//!     an empty list: the former means "nothing was there", the latter cannot happen because
//!     counts are clamped to at least one.

/// A last-in/first-out sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append the values in order and return the new size.
    pub fn push<I>(&mut self, values: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        self.items.extend(values);
        self.items.len()
    }

    /// Remove the last `count` values and return them in their original order.
    ///
    /// Asking for more values than there are returns all of them.
    pub fn pop(&mut self, count: usize) -> Option<Vec<T>> {
        if self.items.is_empty() {
            return None;
        }
        let start = self.items.len().saturating_sub(count.max(1));
        Some(self.items.split_off(start))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Stack<T> {
    /// Same as [`Stack::pop`], without removing anything.
    pub fn peek(&self, count: usize) -> Option<Vec<T>> {
        if self.items.is_empty() {
            return None;
        }
        let start = self.items.len().saturating_sub(count.max(1));
        Some(self.items[start..].to_vec())
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}
