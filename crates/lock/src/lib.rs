pub mod advisory;
pub mod error;
pub mod guard;

pub use advisory::lock_key;
pub use error::LockError;
pub use guard::AdvisoryLockGuard;
