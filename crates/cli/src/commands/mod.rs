//! Command implementations.

mod info;
mod run;
mod settings;
mod validate;

pub use info::run_info;
pub use run::run_batcher;
pub use validate::run_validate;
