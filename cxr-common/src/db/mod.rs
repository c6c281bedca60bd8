//! Database schema bootstrap and shared persistence primitives

pub mod find_or_create;
pub mod init;
pub mod unit_of_work;

pub use find_or_create::{find_or_create, FindOrCreate, MAX_ATTEMPTS};
pub use init::*;
pub use unit_of_work::{begin_unit_of_work, retry_on_lock, UnitOfWork, MAX_LOCK_WAIT_MS};
