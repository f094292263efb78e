//! Slot arena with stable indices and an explicit free list.
//!
//! An index handed out by [`SlotArena::insert`] stays valid until it is passed
//! to [`SlotArena::remove`]; only then may a later insert reuse it.

/// Arena of `T` addressed by stable `usize` slots.
///
/// # Example
///
/// ```
/// use memory_manager::SlotArena;
///
/// let mut arena = SlotArena::new();
/// let a = arena.insert("a");
/// let b = arena.insert("b");
/// assert_eq!(arena.remove(a), Some("a"));
/// assert_eq!(arena.get(b), Some(&"b"));
/// assert_eq!(arena.insert("c"), a);
/// ```
#[derive(Debug, Clone)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> SlotArena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Stores `value`, reusing the most recently freed slot if any.
    pub fn insert(&mut self, value: T) -> usize {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(value);
                index
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        }
    }

    /// Index the next [`insert`](Self::insert) will use.
    pub fn next_index(&self) -> usize {
        self.free.last().copied().unwrap_or(self.slots.len())
    }

    /// Releases a slot and returns its value.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        self.live -= 1;
        Some(value)
    }

    /// Shared access to a live slot.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Exclusive access to a live slot.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Whether `index` addresses a live slot.
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates live `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
