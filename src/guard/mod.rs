//! Reconciliation core.
//!
//! Platform-neutral: everything here talks to the OS through the traits in
//! [`crate::audio::backend`].

pub mod actuator;
pub mod matcher;
pub mod policy;
pub mod scheduler;
pub mod service;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use actuator::{EnforcementDecision, Enforcer, RoleFailure};
pub use matcher::{is_blocked, select_target};
pub use policy::{Policy, PolicyError, PolicyStore, SharedPolicy};
pub use scheduler::{DebounceScheduler, Phase, Reconcile};
pub use service::{LogNotifier, MicGuard, Notifier};
pub use snapshot::{DeviceEntry, DeviceSnapshot};
