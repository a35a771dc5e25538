//! MicGuard - Library
//!
//! Keeps blocked microphones (typically a Bluetooth headset that grabs the
//! default role when it connects) from staying the Windows default capture
//! device.
//!
//! ## Features
//!
//! - Persistent JSON policy of blocked and preferred microphones
//! - Debounced re-evaluation on device hot-plug and default changes
//! - Per-role enforcement (Console, Multimedia, Communications)
//! - Tray menu for manual selection and blocking
//! - Start with Windows option

pub mod audio;
pub mod config;
pub mod guard;
pub mod logging;

#[cfg(windows)]
pub mod app;
#[cfg(windows)]
pub mod platform;
#[cfg(windows)]
pub mod tray;
#[cfg(windows)]
pub mod ui;

pub use audio::{AudioError, CaptureDevice, DeviceEvent, DeviceRole};
pub use config::AppConfig;
pub use guard::{MicGuard, Notifier, Policy, PolicyStore, SharedPolicy};

#[cfg(windows)]
pub use app::AppState;
