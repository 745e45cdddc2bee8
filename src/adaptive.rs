//! The move-to-front primitive shared by the time-layout list (§4.1), the
//! parser field lists (§4.2), and the scanner's handler chain (§4.5).
//!
//! It replaces what would otherwise be a hash-based registry with
//! unstated ordering: callers hand it a probe closure, it tries entries in
//! the current order and, on the first hit, swaps that entry to the
//! front. Ties are broken by leaving the remaining order untouched
//! (stable). A sequence of calls only ever permutes the initial contents —
//! nothing is added or dropped.

use std::sync::Mutex;

pub struct AdaptiveList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> AdaptiveList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items: Mutex::new(items) }
    }

    /// Try `probe` against each item in order; on the first `Some`, hoist
    /// that item to the front and return the probe's result alongside its
    /// original index.
    pub fn find_and_promote<R>(&self, mut probe: impl FnMut(&T) -> Option<R>) -> Option<R> {
        let mut items = self.items.lock().unwrap();
        let mut hit = None;
        for (idx, item) in items.iter().enumerate() {
            if let Some(result) = probe(item) {
                hit = Some((idx, result));
                break;
            }
        }
        let (idx, result) = hit?;
        if idx != 0 {
            let item = items.remove(idx);
            items.insert(0, item);
        }
        Some(result)
    }

    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_winner_to_front() {
        let list = AdaptiveList::new(vec!["a", "b", "c"]);
        let hit = list.find_and_promote(|item| if *item == "b" { Some(*item) } else { None });
        assert_eq!(hit, Some("b"));
        assert_eq!(list.snapshot(), vec!["b", "a", "c"]);
    }

    #[test]
    fn no_hit_leaves_order_untouched() {
        let list = AdaptiveList::new(vec![1, 2, 3]);
        let hit = list.find_and_promote(|item| if *item == 99 { Some(*item) } else { None });
        assert_eq!(hit, None);
        assert_eq!(list.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn repeated_promotion_is_a_permutation() {
        let list = AdaptiveList::new(vec![1, 2, 3, 4]);
        list.find_and_promote(|item| if *item == 3 { Some(()) } else { None });
        list.find_and_promote(|item| if *item == 4 { Some(()) } else { None });
        let mut snapshot = list.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![1, 2, 3, 4]);
    }
}
