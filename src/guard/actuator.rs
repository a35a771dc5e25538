//! Enforcement: displace blocked defaults with the policy's target device.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioError, CaptureDevice, DeviceDirectory, DeviceRole, EndpointSwitcher};

use super::matcher::{is_blocked, select_target};
use super::policy::Policy;

/// A set-default call that failed for one role.
#[derive(Debug, Clone)]
pub struct RoleFailure {
    pub role: DeviceRole,
    pub error: AudioError,
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, Default)]
pub struct EnforcementDecision {
    /// Device the policy designates, if any
    pub target: Option<CaptureDevice>,

    /// Roles whose blocked default was replaced by the target
    pub switched: Vec<DeviceRole>,

    /// Roles whose replacement failed; other roles were still processed
    pub failures: Vec<RoleFailure>,
}

impl EnforcementDecision {
    /// Human-readable notice, only when at least one role was switched.
    pub fn notice(&self, reason: &str) -> Option<String> {
        let target = self.target.as_ref()?;
        if self.switched.is_empty() {
            return None;
        }

        let roles: Vec<String> = self.switched.iter().map(|r| r.to_string()).collect();
        Some(format!(
            "{reason}: switched default microphone to '{}' for {}.",
            target.friendly_name,
            roles.join(", ")
        ))
    }

    /// Error text for the user, one line per failed role.
    pub fn failure_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }

        let lines: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("Cannot set default microphone for {}: {}", failure.role, failure.error))
            .collect();
        Some(lines.join("\n"))
    }
}

/// Applies a policy to the OS default capture endpoints.
#[derive(Clone)]
pub struct Enforcer {
    directory: Arc<dyn DeviceDirectory>,
    switcher: Arc<dyn EndpointSwitcher>,
}

impl Enforcer {
    pub fn new(directory: Arc<dyn DeviceDirectory>, switcher: Arc<dyn EndpointSwitcher>) -> Self {
        Self { directory, switcher }
    }

    /// Evaluate the policy once.
    ///
    /// Only roles whose current default is blocked and differs from the
    /// target are switched; a different but allowed default is the user's
    /// choice and is left alone.
    pub fn enforce(&self, policy: &Policy, reason: &str) -> Result<EnforcementDecision, AudioError> {
        let mut decision = EnforcementDecision::default();
        if !policy.enabled {
            debug!(reason, "guard disabled, skipping evaluation");
            return Ok(decision);
        }

        let devices = self.directory.list_active_capture_devices()?;
        if devices.is_empty() {
            debug!(reason, "no active capture devices");
            return Ok(decision);
        }

        let Some(target) = select_target(&devices, policy).cloned() else {
            debug!(reason, devices = devices.len(), "no eligible target device");
            return Ok(decision);
        };

        for role in DeviceRole::ALL {
            let current = match self.directory.default_capture_device(role) {
                Ok(current) => current,
                Err(e) => {
                    debug!(%role, error = %e, "default lookup failed, treating as unset");
                    None
                }
            };

            let Some(current) = current else { continue };
            if !is_blocked(&current, policy) || current.same_id(&target.id) {
                continue;
            }

            match self.switcher.set_default_capture_endpoint(&target.id, role) {
                Ok(()) => {
                    info!(%role, from = %current.friendly_name, to = %target.friendly_name, "default capture device switched");
                    decision.switched.push(role);
                }
                Err(error) => {
                    warn!(%role, error = %error, "failed to switch default capture device");
                    decision.failures.push(RoleFailure { role, error });
                }
            }
        }

        decision.target = Some(target);
        Ok(decision)
    }
}
