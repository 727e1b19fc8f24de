//! Resource handle module
//!
//! Guards a dedicated session source: copy-on-acquire, idempotent close and
//! self-quarantine when a session faults.

mod resource;

#[cfg(test)]
mod tests;

pub use resource::*;
