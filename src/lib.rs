//! Feature flag distribution.
//!
//! An authority owns the flag records and emits a change event for every
//! committed mutation. Consumers keep a local cache fed by those events and
//! heal any gap with a full pull of the authority's read API.
//!
//! ```text
//! FlagService -> Publisher -> Channel -> Listener -> FlagCache
//!                                                       ^
//!                      authority read API -> Reconciler +
//! ```

pub mod authority;
mod channel;
mod config;
pub mod constants;
pub mod consumer;
mod errors;
mod event;
pub mod metrics;
mod node;
pub mod utils;

pub use channel::*;
pub use config::*;
pub use errors::*;
pub use event::*;
pub use node::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
