pub mod admission;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod recurrence;
pub mod runtime_paths;
pub mod scheduler;
pub mod services;
pub mod store;

pub use error::RemembotError;

pub type Result<T> = std::result::Result<T, RemembotError>;
