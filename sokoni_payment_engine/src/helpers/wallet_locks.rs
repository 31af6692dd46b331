use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::db_types::WalletKey;

/// A registry of per-wallet serialization locks.
///
/// Balance-mutating operations on the same (owner, currency) pair must be linearized; operations on different
/// wallets proceed in parallel. The registry hands out one async mutex per wallet key, shared across all clones, so
/// every ledger API instance in the process serializes on the same locks.
///
/// Locks are never evicted. Each entry is a handful of bytes and the set of wallets a process touches is bounded by
/// its traffic, so eviction would buy little and would reintroduce the race it exists to prevent.
#[derive(Clone, Debug, Default)]
pub struct WalletLocks {
    locks: Arc<Mutex<HashMap<WalletKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock guarding the given wallet key, creating it on first use.
    pub fn lock_for(&self, key: &WalletKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    /// Returns the locks for all given keys in sorted order, so that multi-wallet operations (transfers) always
    /// acquire in the same order and cannot deadlock each other.
    pub fn locks_for(&self, keys: &mut Vec<WalletKey>) -> Vec<Arc<tokio::sync::Mutex<()>>> {
        keys.sort();
        keys.dedup();
        keys.iter().map(|k| self.lock_for(k)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_key_shares_one_lock() {
        let locks = WalletLocks::new();
        let a = locks.lock_for(&WalletKey::new("user-1", "UGX"));
        let b = locks.lock_for(&WalletKey::new("user-1", "UGX"));
        assert!(Arc::ptr_eq(&a, &b));
        let c = locks.lock_for(&WalletKey::new("user-1", "KES"));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn clones_share_the_registry() {
        let locks = WalletLocks::new();
        let clone = locks.clone();
        let a = locks.lock_for(&WalletKey::new("user-2", "UGX"));
        let b = clone.lock_for(&WalletKey::new("user-2", "UGX"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn multi_key_acquisition_is_ordered_and_deduped() {
        let locks = WalletLocks::new();
        let mut keys = vec![
            WalletKey::new("zz", "UGX"),
            WalletKey::new("aa", "UGX"),
            WalletKey::new("zz", "UGX"),
        ];
        let handles = locks.locks_for(&mut keys);
        assert_eq!(keys.len(), 2);
        assert_eq!(handles.len(), 2);
        assert_eq!(keys[0], WalletKey::new("aa", "UGX"));
    }
}
