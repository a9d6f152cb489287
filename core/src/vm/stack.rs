use crate::Vec;
use alloc::fmt;

use super::VmError;

/// Per-frame operand stack with a hard size limit.
///
/// Every frame (and every branch of a `paral` block) owns one of these. The
/// limit is enforced in all builds: overflowing turns into
/// [`VmError::StackOverflow`] instead of growing without bound.
///
/// ```ignore
/// let mut stack = Stack::new(100);
/// stack.push(42)?;
/// stack.push(17)?;
/// assert_eq!(stack.pop(), Some(17));
/// assert_eq!(stack.peek(), Some(&42));
/// ```
pub struct Stack<T> {
    items: Vec<T>,
    max_size: usize,
}

impl<T> Stack<T> {
    pub fn new(max_size: usize) -> Self {
        // Most frames stay shallow; avoid reserving the full limit up front.
        let initial_capacity = max_size.min(16);

        Self {
            items: Vec::with_capacity(initial_capacity),
            max_size,
        }
    }

    /// Pushes a value, failing once the stack already holds `max_size` items.
    pub fn push(&mut self, value: T) -> Result<(), VmError> {
        if self.items.len() >= self.max_size {
            return Err(VmError::StackOverflow {
                limit: self.max_size,
            });
        }
        self.items.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.items.last_mut()
    }

    /// Element `offset` positions below the top; `peek_at(0)` is the top.
    pub fn peek_at(&self, offset: usize) -> Option<&T> {
        let len = self.items.len();
        if offset >= len {
            return None;
        }
        self.items.get(len - 1 - offset)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Removes the top `n` items and returns them bottom-first, or `None`
    /// (leaving the stack untouched) when fewer than `n` are present.
    pub fn split_top(&mut self, n: usize) -> Option<Vec<T>> {
        let len = self.items.len();
        if n > len {
            return None;
        }
        Some(self.items.split_off(len - n))
    }

    /// Iterates from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("items", &self.items)
            .field("max_size", &self.max_size)
            .finish()
    }
}
