use smallvec::SmallVec;

/// A container for managing multiple items with ID-based tracking.
///
/// Used for the children of a [`CompositeDisposable`](super::CompositeDisposable)
/// and for the subscriber lists of subjects:
/// - Add new items and get a unique ID
/// - Remove specific items by ID (e.g., when an inner observable completes)
/// - Drain everything at once on termination
///
/// # Examples
///
/// ```rust
/// use rxbackpressure::disposable::DynamicSlots;
///
/// let mut slots: DynamicSlots<&str> = DynamicSlots::default();
///
/// let id1 = slots.add("a");
/// let id2 = slots.reserve_id();
/// slots.insert(id2, "b");
/// assert_eq!(slots.len(), 2);
///
/// assert_eq!(slots.remove(id1), Some("a"));
/// assert_eq!(slots.len(), 1);
/// ```
#[derive(Clone)]
pub struct DynamicSlots<U> {
  next_id: usize,
  items: SmallVec<[(usize, U); 2]>,
}

impl<U> Default for DynamicSlots<U> {
  fn default() -> Self { Self { next_id: 0, items: SmallVec::new() } }
}

impl<U> DynamicSlots<U> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Add an item and return its unique ID.
  #[inline]
  pub fn add(&mut self, item: U) -> usize {
    let id = self.reserve_id();
    self.items.push((id, item));
    id
  }

  /// Reserve the next ID without adding an item.
  #[inline]
  pub fn reserve_id(&mut self) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Insert an item with a pre-reserved ID.
  #[inline]
  pub fn insert(&mut self, id: usize, item: U) { self.items.push((id, item)); }

  pub fn remove(&mut self, id: usize) -> Option<U> {
    self
      .items
      .iter()
      .position(|(i, _)| *i == id)
      .map(|pos| self.items.remove(pos).1)
  }

  #[inline]
  pub fn get(&self, id: usize) -> Option<&U> {
    self.items.iter().find(|(i, _)| *i == id).map(|(_, item)| item)
  }

  #[inline]
  pub fn get_mut(&mut self, id: usize) -> Option<&mut U> {
    self.items.iter_mut().find(|(i, _)| *i == id).map(|(_, item)| item)
  }

  #[inline]
  pub fn contains(&self, id: usize) -> bool { self.items.iter().any(|(i, _)| *i == id) }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Keep only the items matching `keep`.
  #[inline]
  pub fn retain(&mut self, mut keep: impl FnMut(&U) -> bool) { self.items.retain(|(_, item)| keep(item)) }

  #[inline]
  pub fn drain(&mut self) -> impl Iterator<Item = U> + '_ {
    self.items.drain(..).map(|(_, item)| item)
  }

  #[inline]
  pub fn iter(&self) -> impl Iterator<Item = (usize, &U)> {
    self.items.iter().map(|(id, item)| (*id, item))
  }

  #[inline]
  pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut U)> {
    self.items.iter_mut().map(|(id, item)| (*id, item))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_unique_after_removal() {
    let mut slots = DynamicSlots::new();
    let a = slots.add(1);
    slots.remove(a);
    let b = slots.add(2);
    assert_ne!(a, b);
    assert_eq!(slots.get(b), Some(&2));
    assert!(!slots.contains(a));
  }

  #[test]
  fn retain_and_drain() {
    let mut slots = DynamicSlots::new();
    for v in 0..5 {
      slots.add(v);
    }
    slots.retain(|v| v % 2 == 0);
    assert_eq!(slots.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 2, 4]);
    assert_eq!(slots.drain().count(), 3);
    assert!(slots.is_empty());
  }
}
