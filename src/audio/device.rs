//! Capture device data models.
//!
//! Defines the snapshot types read from the OS on every evaluation, the
//! default-device roles, coarse change events and the audio error type.

use thiserror::Error;

/// An active capture endpoint as reported by the OS.
///
/// Devices are read fresh for each evaluation and never cached; identity
/// comparisons are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    /// Stable, opaque endpoint ID (from IMMDevice::GetId)
    pub id: String,

    /// Human-readable device name (from device properties)
    pub friendly_name: String,
}

impl CaptureDevice {
    pub fn new(id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            friendly_name: friendly_name.into(),
        }
    }

    /// True if both refer to the same endpoint.
    pub fn same_id(&self, other_id: &str) -> bool {
        eq_ignore_case(&self.id, other_id)
    }
}

/// Audio device role (maps to Windows ERole enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    Console = 0,

    /// Used by music players, video players
    Multimedia = 1,

    /// Used by Teams, Zoom, Discord, and other VoIP applications
    Communications = 2,
}

impl DeviceRole {
    /// Every role the OS tracks a capture default for, in processing order.
    pub const ALL: [DeviceRole; 3] = [
        DeviceRole::Console,
        DeviceRole::Multimedia,
        DeviceRole::Communications,
    ];
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::Console => write!(f, "Console"),
            DeviceRole::Multimedia => write!(f, "Multimedia"),
            DeviceRole::Communications => write!(f, "Communications"),
        }
    }
}

/// Windows device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in Windows Sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Active => write!(f, "Active"),
            DeviceState::Disabled => write!(f, "Disabled"),
            DeviceState::NotPresent => write!(f, "NotPresent"),
            DeviceState::Unplugged => write!(f, "Unplugged"),
        }
    }
}

/// Topology and default-assignment changes from the Windows audio system.
///
/// Only occurrence matters to the guard; the payload is used for the
/// evaluation reason and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Device state changed (active, disabled, not present, unplugged)
    StateChanged {
        device_id: String,
        state: DeviceState,
    },

    /// A new audio device was connected
    Added { device_id: String },

    /// An audio device was disconnected
    Removed { device_id: String },

    /// Default capture device changed for a specific role
    DefaultChanged { role: DeviceRole },
}

impl DeviceEvent {
    /// Short reason string handed to the debounce scheduler.
    pub fn reason(&self) -> String {
        match self {
            DeviceEvent::StateChanged { state, .. } => format!("state:{state}"),
            DeviceEvent::Added { .. } => "added".to_string(),
            DeviceEvent::Removed { .. } => "removed".to_string(),
            DeviceEvent::DefaultChanged { role } => format!("default:{role}"),
        }
    }
}

/// Audio service error types.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("COM initialization failed: {0}")]
    ComInitFailed(String),

    #[error("Failed to enumerate devices: {0}")]
    EnumerationFailed(String),

    #[error("Failed to read default device for {role}: {message}")]
    DefaultLookupFailed { role: DeviceRole, message: String },

    #[error("Failed to set default device for {role}: {message}")]
    SetDefaultFailed {
        device_id: String,
        role: DeviceRole,
        message: String,
    },

    #[error("Failed to register for device notifications: {0}")]
    NotificationFailed(String),

    #[error("String conversion error: {0}")]
    StringConversion(String),
}

/// Case-insensitive equality for endpoint IDs and names.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_reasons() {
        let state = DeviceEvent::StateChanged {
            device_id: "{0.0.1}".to_string(),
            state: DeviceState::Unplugged,
        };
        assert_eq!(state.reason(), "state:Unplugged");
        assert_eq!(
            DeviceEvent::Added {
                device_id: "x".to_string()
            }
            .reason(),
            "added"
        );
        assert_eq!(
            DeviceEvent::DefaultChanged {
                role: DeviceRole::Communications
            }
            .reason(),
            "default:Communications"
        );
    }

    #[test]
    fn test_roles_in_processing_order() {
        let names: Vec<String> = DeviceRole::ALL.iter().map(|r| r.to_string()).collect();
        assert_eq!(names, ["Console", "Multimedia", "Communications"]);
        assert_eq!(DeviceRole::Communications as u32, 2);
    }

    #[test]
    fn test_id_comparison_ignores_case() {
        let device = CaptureDevice::new("{0.0.1.00000000}.{ABC}", "Realtek Mic");
        assert!(device.same_id("{0.0.1.00000000}.{abc}"));
        assert!(!device.same_id("{0.0.1.00000000}.{abd}"));
        assert!(contains_ignore_case("OnePlus Buds Pro 3", "buds PRO"));
    }
}
