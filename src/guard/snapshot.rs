//! Device list as shown in the tray menu.

use crate::audio::{AudioError, CaptureDevice, DeviceDirectory, DeviceRole};

use super::policy::Policy;

/// One active capture device and the roles it is currently default for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub device: CaptureDevice,
    pub default_roles: Vec<DeviceRole>,
}

impl DeviceEntry {
    pub fn is_default_in_all_roles(&self) -> bool {
        DeviceRole::ALL
            .iter()
            .all(|role| self.default_roles.contains(role))
    }

    pub fn is_default_any_role(&self) -> bool {
        !self.default_roles.is_empty()
    }

    pub fn label(&self) -> String {
        if self.is_default_in_all_roles() {
            format!("{} (Default)", self.device.friendly_name)
        } else if self.is_default_any_role() {
            format!("{} (Partial Default)", self.device.friendly_name)
        } else {
            self.device.friendly_name.clone()
        }
    }

    /// Checked in the "Set Default Microphone" menu.
    pub fn is_selected(&self, policy: &Policy) -> bool {
        match policy.preferred_device_id.as_deref() {
            Some(_) => policy.is_preferred_id(&self.device.id),
            None => self.is_default_in_all_roles(),
        }
    }

    /// Checked in the "Block From Default" menu.
    pub fn is_blocked_by_id(&self, policy: &Policy) -> bool {
        policy.is_device_id_blocked(&self.device.id)
    }
}

/// Point-in-time read of the device graph for menu building.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    /// Enumeration order
    entries: Vec<DeviceEntry>,
    error: Option<AudioError>,
}

impl DeviceSnapshot {
    /// Read devices and per-role defaults. A failed default lookup counts
    /// as "no default"; a failed enumeration is kept for the status line.
    pub fn capture(directory: &dyn DeviceDirectory) -> Self {
        let devices = match directory.list_active_capture_devices() {
            Ok(devices) => devices,
            Err(error) => {
                tracing::warn!(error = %error, "failed to enumerate capture devices");
                return Self {
                    entries: Vec::new(),
                    error: Some(error),
                };
            }
        };

        let defaults: Vec<(DeviceRole, Option<String>)> = DeviceRole::ALL
            .into_iter()
            .map(|role| {
                let id = directory
                    .default_capture_device(role)
                    .ok()
                    .flatten()
                    .map(|device| device.id);
                (role, id)
            })
            .collect();

        let entries = devices
            .into_iter()
            .map(|device| {
                let default_roles = defaults
                    .iter()
                    .filter(|(_, id)| id.as_deref().is_some_and(|id| device.same_id(id)))
                    .map(|(role, _)| *role)
                    .collect();
                DeviceEntry {
                    device,
                    default_roles,
                }
            })
            .collect();

        Self {
            entries,
            error: None,
        }
    }

    /// Entries sorted by name, ignoring case.
    pub fn entries(&self) -> Vec<&DeviceEntry> {
        let mut sorted: Vec<&DeviceEntry> = self.entries.iter().collect();
        sorted.sort_by_cached_key(|entry| entry.device.friendly_name.to_lowercase());
        sorted
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn error(&self) -> Option<&AudioError> {
        self.error.as_ref()
    }

    pub fn status_line(&self) -> String {
        if let Some(error) = &self.error {
            return format!("Audio error: {error}");
        }
        if self.entries.is_empty() {
            return "No active microphone devices".to_string();
        }

        match self.entries.iter().find(|entry| entry.is_default_any_role()) {
            Some(entry) => format!("Default microphone: {}", entry.device.friendly_name),
            None => "Default microphone: unavailable".to_string(),
        }
    }
}
