//! Journaled data buffer backing array node states.
//!
//! An [`ArrayBuffer`] holds the current values of one array in one state together
//! with the ordered list of [`Update`]s applied since the last commit. Commit discards
//! the journal, revert walks it backwards.

/// One change record in a node's diff.
///
/// - `old == None`: `new` was placed at the end of the array (growth).
/// - `new == None`: `old` was removed from the end of the array (shrink).
/// - both `Some`: the element at `index` changed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update<T = f64> {
    pub index: usize,
    pub old: Option<T>,
    pub new: Option<T>,
}

impl<T: Copy> Update<T> {
    #[inline]
    pub fn change(index: usize, old: T, new: T) -> Self {
        Self {
            index,
            old: Some(old),
            new: Some(new),
        }
    }

    #[inline]
    pub fn placement(index: usize, value: T) -> Self {
        Self {
            index,
            old: None,
            new: Some(value),
        }
    }

    #[inline]
    pub fn removal(index: usize, value: T) -> Self {
        Self {
            index,
            old: Some(value),
            new: None,
        }
    }

    /// Same record at another index.
    #[inline]
    pub fn with_index(self, index: usize) -> Self {
        Self { index, ..self }
    }
}

/// Values of one array in one state plus the journal of changes since the last commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBuffer<T = f64> {
    buffer: Vec<T>,
    updates: Vec<Update<T>>,
    committed_size: usize,
}

impl<T: Copy + PartialEq> ArrayBuffer<T> {
    /// Create a committed buffer from existing values.
    pub fn new(values: Vec<T>) -> Self {
        let committed_size = values.len();
        Self {
            buffer: values,
            updates: Vec::new(),
            committed_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.buffer
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.buffer.get(index).copied()
    }

    /// Pending changes since the last commit.
    #[inline]
    pub fn diff(&self) -> &[Update<T>] {
        &self.updates
    }

    #[inline]
    pub fn committed_size(&self) -> usize {
        self.committed_size
    }

    #[inline]
    pub fn size_diff(&self) -> isize {
        self.buffer.len() as isize - self.committed_size as isize
    }

    /// Set one element. Returns `true` if the value changed.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        let old = self.buffer[index];
        if old == value {
            return false;
        }
        self.buffer[index] = value;
        self.updates.push(Update::change(index, old, value));
        true
    }

    /// Append one element.
    pub fn emplace_back(&mut self, value: T) {
        self.updates.push(Update::placement(self.buffer.len(), value));
        self.buffer.push(value);
    }

    /// Remove the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        let value = self.buffer.pop()?;
        self.updates.push(Update::removal(self.buffer.len(), value));
        Some(value)
    }

    /// Swap two elements. Returns `true` if anything changed.
    pub fn exchange(&mut self, i: usize, j: usize) -> bool {
        if i == j {
            return false;
        }
        let (a, b) = (self.buffer[i], self.buffer[j]);
        let changed_i = self.set(i, b);
        let changed_j = self.set(j, a);
        changed_i || changed_j
    }

    /// Make the current values permanent.
    pub fn commit(&mut self) {
        self.updates.clear();
        self.committed_size = self.buffer.len();
    }

    /// Restore the values as of the last commit.
    pub fn revert(&mut self) {
        for update in self.updates.drain(..).rev() {
            let Some(old) = update.old else {
                continue;
            };
            if update.index >= self.buffer.len() {
                self.buffer.resize(update.index + 1, old);
            }
            self.buffer[update.index] = old;
        }
        self.buffer.truncate(self.committed_size);
    }
}

impl<T: Copy + PartialEq> Default for ArrayBuffer<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Replay a diff onto a copy of the pre-diff values.
///
/// Records are applied in order (placements may extend the buffer) and the result is
/// resized to `final_size`. Positions that were removed and never re-placed are NaN
/// until truncated.
///
/// # Example
///
/// ```
/// use ndgraph::{Update, apply_updates};
///
/// let mut values = vec![1.0, 2.0];
/// let diff = [
///     Update::change(0, 1.0, 5.0),
///     Update::placement(2, 7.0),
///     Update::removal(2, 7.0),
///     Update::removal(1, 2.0),
/// ];
/// apply_updates(&mut values, &diff, 1);
/// assert_eq!(values, vec![5.0]);
/// ```
pub fn apply_updates(buffer: &mut Vec<f64>, updates: &[Update], final_size: usize) {
    for update in updates {
        if update.index >= buffer.len() {
            buffer.resize(update.index + 1, f64::NAN);
        }
        buffer[update.index] = update.new.unwrap_or(f64::NAN);
    }
    buffer.resize(final_size, f64::NAN);
}
