//! Device enumeration using Windows MMDevice API.
//!
//! Provides COM initialization, capture endpoint enumeration and the
//! thread-safe `WindowsAudio` backend used by the guard.

use super::backend::{DeviceDirectory, EndpointSwitcher};
use super::device::{AudioError, CaptureDevice, DeviceRole};
use super::policy::PolicyConfig;
use tracing::debug;
use windows::core::{HRESULT, PWSTR};
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Foundation::{ERROR_NOT_FOUND, RPC_E_CHANGED_MODE};
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eMultimedia, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator, DEVICE_STATE_ACTIVE, ERole,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_APARTMENTTHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for the current thread.
    ///
    /// A thread already running in another apartment model is left alone.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            if hr == RPC_E_CHANGED_MODE {
                return Ok(Self { initialized: false });
            }
            hr.ok()
                .map_err(|e| AudioError::ComInitFailed(e.message()))?;
        }
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

pub(crate) fn to_erole(role: DeviceRole) -> ERole {
    match role {
        DeviceRole::Console => eConsole,
        DeviceRole::Multimedia => eMultimedia,
        DeviceRole::Communications => eCommunications,
    }
}

/// Device enumerator using Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new DeviceEnumerator.
    ///
    /// Note: COM must be initialized before calling this function.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| AudioError::EnumerationFailed(e.message()))?;

            Ok(Self { enumerator })
        }
    }

    /// Get all active capture devices in enumeration order.
    pub fn get_devices(&self) -> Result<Vec<CaptureDevice>, AudioError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| AudioError::EnumerationFailed(e.message()))?;

            let count = collection
                .GetCount()
                .map_err(|e| AudioError::EnumerationFailed(e.message()))?;

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = collection
                    .Item(i)
                    .map_err(|e| AudioError::EnumerationFailed(e.message()))?;

                match self.device_to_capture(&device) {
                    Ok(capture) => devices.push(capture),
                    Err(e) => debug!(index = i, error = %e, "skipping unreadable endpoint"),
                }
            }

            Ok(devices)
        }
    }

    /// Get the default capture device for a specific role.
    pub fn get_default_device(&self, role: DeviceRole) -> Result<Option<CaptureDevice>, AudioError> {
        unsafe {
            let device = match self.enumerator.GetDefaultAudioEndpoint(eCapture, to_erole(role)) {
                Ok(d) => d,
                Err(e) if e.code() == HRESULT::from_win32(ERROR_NOT_FOUND.0) => return Ok(None),
                Err(e) => {
                    return Err(AudioError::DefaultLookupFailed {
                        role,
                        message: e.message(),
                    })
                }
            };

            self.device_to_capture(&device).map(Some)
        }
    }

    /// Get the raw IMMDeviceEnumerator for notification registration.
    pub fn raw_enumerator(&self) -> &IMMDeviceEnumerator {
        &self.enumerator
    }

    /// Convert an IMMDevice to a CaptureDevice.
    fn device_to_capture(&self, device: &IMMDevice) -> Result<CaptureDevice, AudioError> {
        unsafe {
            let id = device
                .GetId()
                .map_err(|e| AudioError::EnumerationFailed(e.message()))?;
            let id_string = take_pwstr(id)?;

            let props: IPropertyStore = device
                .OpenPropertyStore(STGM(0))
                .map_err(|e| AudioError::EnumerationFailed(e.message()))?;

            let friendly_name = self
                .get_device_name(&props)
                .unwrap_or_else(|| "Unknown".to_string());

            Ok(CaptureDevice {
                id: id_string,
                friendly_name,
            })
        }
    }

    /// Get the friendly name of a device from its property store.
    fn get_device_name(&self, props: &IPropertyStore) -> Option<String> {
        unsafe {
            let key = PROPERTYKEY {
                fmtid: DEVPKEY_Device_FriendlyName.fmtid,
                pid: DEVPKEY_Device_FriendlyName.pid,
            };

            let prop = props.GetValue(&key).ok()?;
            let s = prop.to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
    }
}

/// Copy a COM-allocated string and release it.
unsafe fn take_pwstr(value: PWSTR) -> Result<String, AudioError> {
    let result = value
        .to_string()
        .map_err(|e| AudioError::StringConversion(e.to_string()));
    CoTaskMemFree(Some(value.0 as *const _));
    result
}

/// Thread-safe audio backend.
///
/// COM objects are not shared across threads: every call initializes COM
/// for the calling thread and creates its own enumerator.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsAudio;

impl WindowsAudio {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDirectory for WindowsAudio {
    fn list_active_capture_devices(&self) -> Result<Vec<CaptureDevice>, AudioError> {
        let _com = ComGuard::new()?;
        DeviceEnumerator::new()?.get_devices()
    }

    fn default_capture_device(
        &self,
        role: DeviceRole,
    ) -> Result<Option<CaptureDevice>, AudioError> {
        let _com = ComGuard::new()?;
        DeviceEnumerator::new()?.get_default_device(role)
    }
}

impl EndpointSwitcher for WindowsAudio {
    fn set_default_capture_endpoint(
        &self,
        device_id: &str,
        role: DeviceRole,
    ) -> Result<(), AudioError> {
        let _com = ComGuard::new()?;
        PolicyConfig::new()
            .map_err(|e| AudioError::SetDefaultFailed {
                device_id: device_id.to_string(),
                role,
                message: e.message(),
            })?
            .set_default_device(device_id, role)
    }
}
