//! Bidirectional mapping between network ids and logical worker ids.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Maps network ids to logical ids `0..n` and back.
///
/// Registration happens once per worker during the online phase; lookups
/// run on every message receipt.
pub struct WorkerMap {
    inner: RwLock<Inner>,
}

struct Inner {
    nid_of: Vec<Option<u32>>,
    lid_of: HashMap<u32, usize>,
}

impl WorkerMap {
    pub fn new(n: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                nid_of: vec![None; n],
                lid_of: HashMap::new(),
            }),
        }
    }

    /// Registers `nid`, honoring `lid_hint` when it names a free slot and
    /// falling back to the first free logical id otherwise.
    ///
    /// # Returns
    /// The logical id assigned to this worker, or `None` when the roster
    /// is already full.
    pub fn register(&self, nid: u32, lid_hint: i32) -> Option<usize> {
        let mut inner = self.inner.write();

        if let Some(&lid) = inner.lid_of.get(&nid) {
            return Some(lid);
        }

        let hint = usize::try_from(lid_hint).ok();
        let lid = match hint.filter(|&h| h < inner.nid_of.len() && inner.nid_of[h].is_none()) {
            Some(h) => h,
            None => inner.nid_of.iter().position(Option::is_none)?,
        };

        inner.nid_of[lid] = Some(nid);
        inner.lid_of.insert(nid, lid);
        Some(lid)
    }

    pub fn lid(&self, nid: u32) -> Option<usize> {
        self.inner.read().lid_of.get(&nid).copied()
    }

    pub fn nid(&self, lid: usize) -> Option<u32> {
        self.inner.read().nid_of.get(lid).copied().flatten()
    }

    /// The full `(lid, nid)` roster in logical order.
    pub fn list(&self) -> Vec<(u32, u32)> {
        self.inner
            .read()
            .nid_of
            .iter()
            .enumerate()
            .filter_map(|(lid, nid)| nid.map(|nid| (lid as u32, nid)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_is_honored_when_free() {
        let wm = WorkerMap::new(3);
        assert_eq!(wm.register(70, 2), Some(2));
        assert_eq!(wm.register(71, 2), Some(0));
        assert_eq!(wm.register(72, -1), Some(1));

        assert_eq!(wm.lid(70), Some(2));
        assert_eq!(wm.nid(0), Some(71));
        assert_eq!(wm.list(), vec![(0, 71), (1, 72), (2, 70)]);
    }

    #[test]
    fn test_reregistration_is_stable() {
        let wm = WorkerMap::new(2);
        assert_eq!(wm.register(7, 0), Some(0));
        assert_eq!(wm.register(7, 1), Some(0));
    }

    #[test]
    fn test_full_roster_rejects() {
        let wm = WorkerMap::new(1);
        assert_eq!(wm.register(1, 0), Some(0));
        assert_eq!(wm.register(2, 0), None);
    }
}
