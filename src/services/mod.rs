pub mod ranking;
pub mod session;
pub mod sync;
pub mod token_store;
