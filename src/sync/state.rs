//! Remote-confirmed set and optimistic overlay.

use indexmap::IndexMap;

/// An optimistic value and the stamp of the mutation that staged it.
#[derive(Debug, Clone)]
struct Staged<T> {
  item: T,
  stamp: u64,
}

/// In-memory view state of a store.
///
/// Outside of an in-flight mutation a key lives in at most one of the two
/// maps, so the merged view never holds duplicates.
#[derive(Debug)]
pub struct SyncState<T> {
  confirmed: IndexMap<String, T>,
  overlay: IndexMap<String, Staged<T>>,
  next_stamp: u64,
}

impl<T> Default for SyncState<T> {
  fn default() -> Self {
    Self {
      confirmed: IndexMap::new(),
      overlay: IndexMap::new(),
      next_stamp: 1,
    }
  }
}

impl<T: Clone> SyncState<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the confirmed set with a fresh remote baseline.
  ///
  /// Keys currently staged in the overlay are left out of the baseline.
  pub fn replace_confirmed(&mut self, items: impl IntoIterator<Item = (String, T)>) {
    self.confirmed = items
      .into_iter()
      .filter(|(key, _)| !self.overlay.contains_key(key))
      .collect();
  }

  /// Put an optimistic value in the overlay. Returns its stamp.
  pub fn stage(&mut self, key: &str, item: T) -> u64 {
    let stamp = self.next_stamp;
    self.next_stamp += 1;
    self.confirmed.shift_remove(key);
    self.overlay.insert(key.to_string(), Staged { item, stamp });
    stamp
  }

  /// Move the overlay value staged with `stamp` into the confirmed set.
  ///
  /// A newer staging of the same key, or a delete since, wins: nothing moves.
  pub fn confirm(&mut self, key: &str, stamp: u64) -> bool {
    match self.overlay.get(key) {
      Some(staged) if staged.stamp == stamp => self.promote(key),
      _ => false,
    }
  }

  /// Move whatever the overlay holds for `key` into the confirmed set.
  pub fn promote(&mut self, key: &str) -> bool {
    match self.overlay.shift_remove(key) {
      Some(staged) => {
        self.confirmed.insert(key.to_string(), staged.item);
        true
      }
      None => false,
    }
  }

  /// Hide `key` from both maps.
  pub fn discard(&mut self, key: &str) {
    self.confirmed.shift_remove(key);
    self.overlay.shift_remove(key);
  }

  pub fn contains(&self, key: &str) -> bool {
    self.confirmed.contains_key(key) || self.overlay.contains_key(key)
  }

  pub fn get(&self, key: &str) -> Option<&T> {
    self
      .overlay
      .get(key)
      .map(|staged| &staged.item)
      .or_else(|| self.confirmed.get(key))
  }

  pub fn is_staged(&self, key: &str) -> bool {
    self.overlay.contains_key(key)
  }

  pub fn overlay_len(&self) -> usize {
    self.overlay.len()
  }

  /// Merged view: confirmed values first, then overlay values; overlay wins on a shared key.
  pub fn items(&self) -> Vec<T> {
    let confirmed = self
      .confirmed
      .iter()
      .filter(|(key, _)| !self.overlay.contains_key(*key))
      .map(|(_, item)| item.clone());
    let staged = self.overlay.values().map(|staged| staged.item.clone());
    confirmed.chain(staged).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn baseline(state: &mut SyncState<&'static str>, entries: &[(&str, &'static str)]) {
    state.replace_confirmed(entries.iter().map(|(k, v)| (k.to_string(), *v)));
  }

  #[test]
  fn test_stage_moves_key_out_of_confirmed() {
    let mut state = SyncState::new();
    baseline(&mut state, &[("1", "Squats"), ("2", "Dead Lifts")]);

    state.stage("1", "Front Squats");
    assert_eq!(state.items(), vec!["Dead Lifts", "Front Squats"]);
    assert_eq!(state.overlay_len(), 1);
  }

  #[test]
  fn test_confirm_only_matching_stamp() {
    let mut state = SyncState::new();
    let first = state.stage("1", "v1");
    let second = state.stage("1", "v2");

    assert!(!state.confirm("1", first));
    assert!(state.is_staged("1"));

    assert!(state.confirm("1", second));
    assert!(!state.is_staged("1"));
    assert_eq!(state.items(), vec!["v2"]);
  }

  #[test]
  fn test_confirm_after_discard_does_not_resurrect() {
    let mut state = SyncState::new();
    let stamp = state.stage("1", "v1");
    state.discard("1");
    assert!(!state.confirm("1", stamp));
    assert!(state.items().is_empty());
  }

  #[test]
  fn test_baseline_skips_staged_keys() {
    let mut state = SyncState::new();
    state.stage("1", "local");
    baseline(&mut state, &[("1", "remote"), ("2", "other")]);

    assert_eq!(state.items(), vec!["other", "local"]);
    assert_eq!(state.get("1"), Some(&"local"));
  }

  #[test]
  fn test_discard_from_both() {
    let mut state = SyncState::new();
    baseline(&mut state, &[("1", "a")]);
    state.stage("2", "b");
    state.discard("1");
    state.discard("2");
    assert!(!state.contains("1"));
    assert!(!state.contains("2"));
    assert!(state.items().is_empty());
  }
}
