//! Seams between the guard and the OS audio stack.
//!
//! The reconciliation core only talks to these traits. The Windows
//! implementations live in `enumerator`, `policy` and `notifications`.

use std::sync::Arc;

use super::device::{AudioError, CaptureDevice, DeviceRole};

/// Point-in-time view of active capture endpoints and per-role defaults.
pub trait DeviceDirectory: Send + Sync {
    /// Active capture devices in enumeration order.
    fn list_active_capture_devices(&self) -> Result<Vec<CaptureDevice>, AudioError>;

    /// Current default capture device for `role`, if any.
    fn default_capture_device(&self, role: DeviceRole)
        -> Result<Option<CaptureDevice>, AudioError>;
}

/// The OS call that changes the default capture endpoint for one role.
pub trait EndpointSwitcher: Send + Sync {
    fn set_default_capture_endpoint(&self, device_id: &str, role: DeviceRole)
        -> Result<(), AudioError>;
}

/// Receives "something changed" signals from a notification source.
///
/// Implementations must return quickly: they are called on the OS
/// notification thread.
pub trait ChangeListener: Send + Sync {
    fn on_changed(&self, reason: &str);
}

/// A subscription point for device lifecycle and default-change events.
pub trait NotificationSource {
    fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) -> Result<(), AudioError>;

    /// Stop delivering events. Safe to call when not subscribed.
    fn unsubscribe(&mut self);
}
