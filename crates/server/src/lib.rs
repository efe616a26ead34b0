pub mod bridge;
pub mod classify;
pub mod context;
pub mod dedup;
pub mod gateway;
pub mod payload;
pub mod sessions;
pub mod signature;

#[cfg(test)]
mod fakes;

pub use context::{Processed, RelayContext};
pub use gateway::Gateway;
