//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Capability model
//! The dispatcher never touches ambient globals. Persistence, delivery and host
//! lifecycle are consumed through the narrow traits defined here:
//! - [`DurableStore`]: synchronous get/set/remove of a serialized batch by key
//! - [`EventTransport`]: asynchronous delivery of one batch
//! - [`LifecycleSource`]: one-shot "host is unloading" notification

mod error;
mod event;
mod lifecycle;
mod settings;
mod store;
mod transport;

pub use error::*;
pub use event::*;
pub use lifecycle::{LifecycleSource, UnloadCallback};
pub use settings::*;
pub use store::{storage_key_for, DurableStore, STORAGE_KEY_SUFFIX};
pub use transport::*;
