//! Device change notifications using IMMNotificationClient.
//!
//! Translates endpoint callbacks into `DeviceEvent`s and forwards their
//! reason to a `ChangeListener`. Callbacks never block the delivery thread.

use super::backend::{ChangeListener, NotificationSource};
use super::device::{AudioError, DeviceEvent, DeviceRole, DeviceState};
use super::enumerator::DeviceEnumerator;
use std::sync::Arc;
use tracing::{debug, info, warn};
use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, EDataFlow, ERole, IMMNotificationClient,
    IMMNotificationClient_Impl, DEVICE_STATE,
};
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

/// Notification client that forwards events to a listener.
#[implement(IMMNotificationClient)]
pub struct DeviceNotificationClient {
    listener: Arc<dyn ChangeListener>,
}

impl DeviceNotificationClient {
    pub fn new(listener: Arc<dyn ChangeListener>) -> Self {
        Self { listener }
    }

    fn forward(&self, event: DeviceEvent) {
        debug!(?event, "endpoint notification");
        self.listener.on_changed(&event.reason());
    }

    fn convert_role(role: ERole) -> DeviceRole {
        if role == eConsole {
            DeviceRole::Console
        } else if role == eCommunications {
            DeviceRole::Communications
        } else {
            DeviceRole::Multimedia
        }
    }

    fn convert_state(state: DEVICE_STATE) -> DeviceState {
        match state.0 {
            1 => DeviceState::Active,
            2 => DeviceState::Disabled,
            8 => DeviceState::Unplugged,
            _ => DeviceState::NotPresent,
        }
    }
}

fn id_of(pwstrdeviceid: &PCWSTR) -> String {
    if pwstrdeviceid.is_null() {
        return String::new();
    }
    unsafe { pwstrdeviceid.to_string().unwrap_or_default() }
}

impl IMMNotificationClient_Impl for DeviceNotificationClient_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        self.forward(DeviceEvent::StateChanged {
            device_id: id_of(pwstrdeviceid),
            state: DeviceNotificationClient::convert_state(dwnewstate),
        });
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        self.forward(DeviceEvent::Added {
            device_id: id_of(pwstrdeviceid),
        });
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        self.forward(DeviceEvent::Removed {
            device_id: id_of(pwstrdeviceid),
        });
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        _pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        // Only care about capture devices
        if flow == eCapture {
            self.forward(DeviceEvent::DefaultChanged {
                role: DeviceNotificationClient::convert_role(role),
            });
        }
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _pwstrdeviceid: &PCWSTR,
        _key: &windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

/// Endpoint notification registration bound to one enumerator.
///
/// Lives on the thread that created it (COM must already be initialized
/// there).
pub struct EndpointNotifications {
    enumerator: DeviceEnumerator,
    client: Option<IMMNotificationClient>,
}

impl EndpointNotifications {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            enumerator: DeviceEnumerator::new()?,
            client: None,
        })
    }
}

impl NotificationSource for EndpointNotifications {
    fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) -> Result<(), AudioError> {
        self.unsubscribe();

        let client: IMMNotificationClient = DeviceNotificationClient::new(listener).into();
        unsafe {
            self.enumerator
                .raw_enumerator()
                .RegisterEndpointNotificationCallback(&client)
                .map_err(|e| AudioError::NotificationFailed(e.message()))?;
        }
        self.client = Some(client);
        info!("endpoint notifications registered");
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(client) = self.client.take() {
            unsafe {
                if let Err(e) = self
                    .enumerator
                    .raw_enumerator()
                    .UnregisterEndpointNotificationCallback(&client)
                {
                    warn!(error = %e, "failed to unregister endpoint notifications");
                }
            }
        }
    }
}

impl Drop for EndpointNotifications {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
