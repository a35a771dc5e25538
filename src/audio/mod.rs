//! Audio module for capture endpoint access.
//!
//! The data types and collaborator traits are platform-neutral; the
//! Core Audio adapters are only built on Windows.

pub mod backend;
pub mod device;

#[cfg(windows)]
pub mod enumerator;
#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod policy;

pub use backend::{ChangeListener, DeviceDirectory, EndpointSwitcher, NotificationSource};
pub use device::{AudioError, CaptureDevice, DeviceEvent, DeviceRole, DeviceState};

#[cfg(windows)]
pub use enumerator::{ComGuard, DeviceEnumerator, WindowsAudio};
#[cfg(windows)]
pub use notifications::EndpointNotifications;
