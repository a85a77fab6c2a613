use crate::Map;

/// Book-keeping of the forks and snapshots opened on a world state.
///
/// An entry is created when a view is opened and removed when it is closed or dropped. Pruning
/// and unwinding do not remove entries, they only mark them invalid: the owner of the view learns
/// about it on its next call.
#[derive(Debug, Default)]
pub(crate) struct ForkRegistry {
    next_id: u64,
    forks: Map<u64, ForkEntry>,
}

#[derive(Debug, Copy, Clone)]
struct ForkEntry {
    base_block: u64,
    live: bool,
}

impl ForkRegistry {
    /// Registers a view based on `base_block` and returns its id.
    pub fn register(&mut self, base_block: u64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.forks.insert(id, ForkEntry { base_block, live: true });
        id
    }

    pub fn deregister(&mut self, id: u64) {
        self.forks.remove(&id);
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.forks.get(&id).is_some_and(|entry| entry.live)
    }

    /// Invalidates every view based on a block lower than `block`, returning how many were live.
    pub fn invalidate_below(&mut self, block: u64) -> usize {
        self.invalidate(|base| base < block)
    }

    /// Invalidates every view based on a block greater than `block`, returning how many were live.
    pub fn invalidate_above(&mut self, block: u64) -> usize {
        self.invalidate(|base| base > block)
    }

    /// Invalidates every view, returning how many were live.
    pub fn invalidate_all(&mut self) -> usize {
        self.invalidate(|_| true)
    }

    fn invalidate(&mut self, predicate: impl Fn(u64) -> bool) -> usize {
        let mut count = 0;
        for entry in self.forks.values_mut() {
            if entry.live && predicate(entry.base_block) {
                entry.live = false;
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_is_based_on_the_base_block() {
        let mut registry = ForkRegistry::default();
        let ids: Vec<u64> = (0..5).map(|block| registry.register(block)).collect();

        assert_eq!(registry.invalidate_below(2), 2);
        assert!(!registry.is_live(ids[0]));
        assert!(!registry.is_live(ids[1]));
        assert!(registry.is_live(ids[2]));

        assert_eq!(registry.invalidate_above(3), 1);
        assert!(!registry.is_live(ids[4]));

        // already invalid entries are not counted again
        assert_eq!(registry.invalidate_below(3), 1);
        assert_eq!(registry.invalidate_all(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut registry = ForkRegistry::default();
        let first = registry.register(0);
        registry.deregister(first);
        let second = registry.register(0);
        assert_ne!(first, second);
        assert!(!registry.is_live(first));
        assert!(registry.is_live(second));
    }
}
