pub mod action;
pub mod bus;
pub mod config;
pub mod confirmation;
pub mod context;
pub mod error;
pub mod executor;
pub mod io;
pub mod manifest;
pub mod paths;
pub mod receipt;
pub mod redact;
pub mod runway;
pub mod telemetry;
pub mod types;
pub mod workspace;

pub use error::{CanvasError, Result};
