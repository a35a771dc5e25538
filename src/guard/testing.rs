//! In-memory collaborators for guard tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::audio::{
    AudioError, CaptureDevice, ChangeListener, DeviceDirectory, DeviceRole, EndpointSwitcher,
    NotificationSource,
};

use super::service::Notifier;

#[derive(Default)]
struct FakeState {
    devices: Vec<CaptureDevice>,
    defaults: HashMap<DeviceRole, String>,
    set_calls: Vec<(String, DeviceRole)>,
    list_calls: usize,
    failing_lookups: HashSet<DeviceRole>,
    failing_switches: HashSet<DeviceRole>,
    enumeration_fails: bool,
}

/// Device directory and endpoint switcher backed by a mutex.
///
/// A successful switch updates the stored default, like the OS would.
#[derive(Default)]
pub(crate) struct FakeAudio {
    state: Mutex<FakeState>,
}

impl FakeAudio {
    pub fn with_devices(devices: &[(&str, &str)]) -> Self {
        let audio = Self::default();
        audio.state.lock().unwrap().devices = devices
            .iter()
            .map(|(id, name)| CaptureDevice::new(*id, *name))
            .collect();
        audio
    }

    pub fn set_default(&self, role: DeviceRole, device_id: &str) {
        self.state
            .lock()
            .unwrap()
            .defaults
            .insert(role, device_id.to_string());
    }

    pub fn default_id(&self, role: DeviceRole) -> Option<String> {
        self.state.lock().unwrap().defaults.get(&role).cloned()
    }

    pub fn fail_default_lookup(&self, role: DeviceRole) {
        self.state.lock().unwrap().failing_lookups.insert(role);
    }

    pub fn fail_switch(&self, role: DeviceRole) {
        self.state.lock().unwrap().failing_switches.insert(role);
    }

    pub fn fail_enumeration(&self) {
        self.state.lock().unwrap().enumeration_fails = true;
    }

    pub fn set_calls(&self) -> Vec<(String, DeviceRole)> {
        self.state.lock().unwrap().set_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

impl DeviceDirectory for FakeAudio {
    fn list_active_capture_devices(&self) -> Result<Vec<CaptureDevice>, AudioError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.enumeration_fails {
            return Err(AudioError::EnumerationFailed("device graph unavailable".to_string()));
        }
        Ok(state.devices.clone())
    }

    fn default_capture_device(&self, role: DeviceRole) -> Result<Option<CaptureDevice>, AudioError> {
        let state = self.state.lock().unwrap();
        if state.failing_lookups.contains(&role) {
            return Err(AudioError::DefaultLookupFailed {
                role,
                message: "element not found".to_string(),
            });
        }
        Ok(state.defaults.get(&role).and_then(|id| {
            state.devices.iter().find(|device| device.same_id(id)).cloned()
        }))
    }
}

impl EndpointSwitcher for FakeAudio {
    fn set_default_capture_endpoint(&self, device_id: &str, role: DeviceRole) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.set_calls.push((device_id.to_string(), role));
        if state.failing_switches.contains(&role) {
            return Err(AudioError::SetDefaultFailed {
                device_id: device_id.to_string(),
                role,
                message: "access denied".to_string(),
            });
        }
        state.defaults.insert(role, device_id.to_string());
        Ok(())
    }
}

/// Notification source whose listener can be fired from the test.
#[derive(Clone, Default)]
pub(crate) struct FakeSource {
    listener: Arc<Mutex<Option<Arc<dyn ChangeListener>>>>,
}

impl FakeSource {
    pub fn is_subscribed(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    pub fn fire(&self, reason: &str) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_changed(reason);
        }
    }
}

impl NotificationSource for FakeSource {
    fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) -> Result<(), AudioError> {
        *self.listener.lock().unwrap() = Some(listener);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        *self.listener.lock().unwrap() = None;
    }
}

/// Notifier that records what the user would have seen.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub notices: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notice(&self, text: &str) {
        self.notices.lock().unwrap().push(text.to_string());
    }

    fn failure(&self, text: &str) {
        self.failures.lock().unwrap().push(text.to_string());
    }
}
