mod wallet_locks;

pub use wallet_locks::WalletLocks;
