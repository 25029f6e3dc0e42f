//! A simulated evaluation stack.
//!
//! The stack is the single source of truth for stack depths while lowering
//! between the stack and three-address forms. Element tags are opaque: slot
//! indices, types, or value identities.
use xil_utils::{Error, XilResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackModel<T> {
    items: Vec<T>,
}

impl<T> Default for StackModel<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

fn underflow(needed: usize, depth: usize) -> Error {
    Error::malformed_structure(format!(
        "stack underflow: {needed} elements needed but the stack holds {depth}"
    ))
}

impl<T> StackModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bottom_up<I: IntoIterator<Item = T>>(items: I) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements from the bottom of the stack to the top.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> XilResult<T> {
        self.items.pop().ok_or_else(|| underflow(1, 0))
    }

    /// Pops the top `n` elements and returns them deepest first.
    pub fn pop_n(&mut self, n: usize) -> XilResult<Vec<T>> {
        if n > self.items.len() {
            return Err(underflow(n, self.items.len()));
        }
        Ok(self.items.split_off(self.items.len() - n))
    }

    /// The element `depth` positions below the top.
    pub fn peek(&self, depth: usize) -> XilResult<&T> {
        self.items
            .len()
            .checked_sub(depth + 1)
            .map(|i| &self.items[i])
            .ok_or_else(|| underflow(depth + 1, self.items.len()))
    }

    /// The top `n` elements, deepest first.
    pub fn top(&self, n: usize) -> XilResult<&[T]> {
        if n > self.items.len() {
            return Err(underflow(n, self.items.len()));
        }
        Ok(&self.items[self.items.len() - n..])
    }

    pub fn swap(&mut self) -> XilResult<()> {
        self.dig(1)
    }

    /// Moves the element at `depth` to the top. `dig(0)` has no effect.
    pub fn dig(&mut self, depth: usize) -> XilResult<()> {
        let len = self.items.len();
        if depth >= len {
            return Err(underflow(depth + 1, len));
        }
        let item = self.items.remove(len - depth - 1);
        self.items.push(item);
        Ok(())
    }

    /// Moves the top element down to `depth`. The inverse of [Self::dig].
    pub fn bury(&mut self, depth: usize) -> XilResult<()> {
        let len = self.items.len();
        if depth >= len {
            return Err(underflow(depth + 1, len));
        }
        let item = self.pop()?;
        self.items.insert(len - depth - 1, item);
        Ok(())
    }

    /// Distance from the top of the first element satisfying `pred`,
    /// searching from the top.
    pub fn position_from_top<P>(&self, pred: P) -> Option<usize>
    where
        P: Fn(&T) -> bool,
    {
        self.items.iter().rev().position(pred)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> StackModel<T> {
    pub fn dup(&mut self) -> XilResult<()> {
        let top = self.peek(0)?.clone();
        self.items.push(top);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::StackModel;

    #[test]
    fn dig_and_bury_are_inverse() {
        let mut stack = StackModel::from_bottom_up([1, 2, 3, 4]);
        stack.dig(2).unwrap();
        assert_eq!(stack.as_slice(), &[1, 3, 4, 2]);
        stack.bury(2).unwrap();
        assert_eq!(stack.as_slice(), &[1, 2, 3, 4]);
        stack.dig(0).unwrap();
        assert_eq!(stack.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn shuffles() {
        let mut stack = StackModel::from_bottom_up(['a', 'b']);
        stack.swap().unwrap();
        assert_eq!(stack.as_slice(), &['b', 'a']);
        stack.dup().unwrap();
        assert_eq!(stack.pop_n(2).unwrap(), vec!['a', 'a']);
        assert_eq!(stack.position_from_top(|c| *c == 'b'), Some(0));
    }

    #[test]
    fn underflow_is_reported() {
        let mut stack = StackModel::<u8>::new();
        assert!(stack.pop().is_err());
        stack.push(1);
        assert!(stack.pop_n(2).is_err());
        assert!(stack.dig(1).is_err());
        assert_eq!(stack.depth(), 1);
    }
}
