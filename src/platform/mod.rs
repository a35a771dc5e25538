//! Platform-specific module for Windows utilities.
//!
//! Currently only the "Start With Windows" registration.

pub mod startup;

pub use startup::{StartupError, StartupRegistration};
