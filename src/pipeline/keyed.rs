//! Keyed list diffing.
//!
//! Given the previous and desired key orders, classify every key as
//! created, removed, kept in place, or moved. Kept keys that form a
//! longest increasing subsequence of old positions stay put; everything
//! else moves. This keeps DOM moves minimal when a list is reordered.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, PartialEq)]
pub struct KeyedDiff {
    /// Keys present only in the new order.
    pub created: HashSet<String>,
    /// Keys present only in the old order.
    pub removed: Vec<String>,
    /// Kept keys that must be reinserted to reach the new order.
    pub moved: HashSet<String>,
}

pub fn diff_keys(old: &[String], new: &[String]) -> KeyedDiff {
    let old_index: HashMap<&str, usize> = old
        .iter()
        .enumerate()
        .map(|(i, k)| (k.as_str(), i))
        .collect();
    let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

    let removed = old
        .iter()
        .filter(|k| !new_set.contains(k.as_str()))
        .cloned()
        .collect();

    let mut created = HashSet::new();
    // Old positions of kept keys, in new order.
    let mut kept: Vec<(usize, &str)> = Vec::new();
    for key in new {
        match old_index.get(key.as_str()) {
            Some(&at) => kept.push((at, key)),
            None => {
                created.insert(key.clone());
            }
        }
    }

    let stable = lis_positions(&kept);
    let moved = kept
        .iter()
        .enumerate()
        .filter(|(i, _)| !stable.contains(i))
        .map(|(_, (_, key))| (*key).to_string())
        .collect();

    KeyedDiff {
        created,
        removed,
        moved,
    }
}

/// Indices into `kept` forming a longest strictly increasing subsequence of
/// old positions. O(n log n).
fn lis_positions(kept: &[(usize, &str)]) -> HashSet<usize> {
    if kept.is_empty() {
        return HashSet::new();
    }

    // tails[len] = index into kept of the smallest tail of an increasing
    // subsequence of that length; prev chains the reconstruction.
    let mut tails: Vec<usize> = Vec::with_capacity(kept.len());
    let mut prev: Vec<Option<usize>> = vec![None; kept.len()];

    for (i, &(pos, _)) in kept.iter().enumerate() {
        let at = tails.partition_point(|&t| kept[t].0 < pos);
        if at > 0 {
            prev[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }

    let mut stable = HashSet::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stable.insert(i);
        cursor = prev[i];
    }
    stable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_orders_need_nothing() {
        let d = diff_keys(&keys(&["a", "b", "c"]), &keys(&["a", "b", "c"]));
        assert!(d.created.is_empty());
        assert!(d.removed.is_empty());
        assert!(d.moved.is_empty());
    }

    #[test]
    fn pure_creates_and_removes() {
        let d = diff_keys(&keys(&["a", "b"]), &keys(&["b", "c"]));
        assert_eq!(d.created, HashSet::from([String::from("c")]));
        assert_eq!(d.removed, vec![String::from("a")]);
        assert!(d.moved.is_empty());
    }

    #[test]
    fn full_reversal_moves_all_but_one() {
        let d = diff_keys(&keys(&["1", "2", "3"]), &keys(&["3", "2", "1"]));
        assert!(d.created.is_empty());
        assert!(d.removed.is_empty());
        // One key anchors the increasing subsequence; the others move.
        assert_eq!(d.moved.len(), 2);
    }

    #[test]
    fn single_relocation_moves_one_key() {
        let d = diff_keys(&keys(&["a", "b", "c", "d"]), &keys(&["b", "c", "d", "a"]));
        assert_eq!(d.moved, HashSet::from([String::from("a")]));
    }

    #[test]
    fn empty_old_order_is_all_creates() {
        let d = diff_keys(&[], &keys(&["x", "y"]));
        assert_eq!(d.created.len(), 2);
        assert!(d.removed.is_empty());
        assert!(d.moved.is_empty());
    }
}
