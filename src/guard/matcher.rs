//! Target selection: which active device the policy says should be default.

use crate::audio::device::{contains_ignore_case, CaptureDevice};

use super::policy::Policy;

/// True if the marker appears in the device's friendly name or ID.
fn matches(device: &CaptureDevice, marker: &str) -> bool {
    contains_ignore_case(&device.friendly_name, marker) || contains_ignore_case(&device.id, marker)
}

/// True if the device is excluded by ID or by a name rule.
pub fn is_blocked(device: &CaptureDevice, policy: &Policy) -> bool {
    if policy.is_device_id_blocked(&device.id) {
        return true;
    }

    policy
        .blocked_name_contains
        .iter()
        .map(|marker| marker.trim())
        .filter(|marker| !marker.is_empty())
        .any(|marker| matches(device, marker))
}

/// Pick the device that should be default.
///
/// Blocked devices are removed first; then the preferred ID wins, then the
/// first name match, then the first remaining device in enumeration order.
pub fn select_target<'a>(devices: &'a [CaptureDevice], policy: &Policy) -> Option<&'a CaptureDevice> {
    let eligible: Vec<&CaptureDevice> = devices
        .iter()
        .filter(|device| !is_blocked(device, policy))
        .collect();

    if let Some(preferred_id) = policy.preferred_device_id.as_deref() {
        if let Some(device) = eligible.iter().copied().find(|device| device.same_id(preferred_id)) {
            return Some(device);
        }
    }

    let preferred_name = policy.preferred_name_contains.trim();
    if !preferred_name.is_empty() {
        if let Some(device) = eligible.iter().copied().find(|device| matches(device, preferred_name)) {
            return Some(device);
        }
    }

    eligible.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<CaptureDevice> {
        vec![
            CaptureDevice::new("A", "Realtek Mic"),
            CaptureDevice::new("B", "OnePlus Buds Pro 3"),
        ]
    }

    fn policy() -> Policy {
        Policy {
            preferred_device_id: None,
            preferred_name_contains: "Realtek".to_string(),
            blocked_name_contains: vec!["OnePlus Buds Pro 3".to_string()],
            ..Policy::default()
        }
    }

    #[test]
    fn test_name_preference_skips_blocked_device() {
        let devices = devices();
        let target = select_target(&devices, &policy()).unwrap();
        assert_eq!(target.id, "A");
    }

    #[test]
    fn test_blocked_id_overrides_preferred_id() {
        let devices = devices();
        let policy = Policy {
            preferred_device_id: Some("B".to_string()),
            blocked_device_ids: vec!["B".to_string()],
            blocked_name_contains: vec!["Nothing matches this".to_string()],
            preferred_name_contains: String::new(),
            ..Policy::default()
        };
        assert_eq!(select_target(&devices, &policy).unwrap().id, "A");
    }

    #[test]
    fn test_preferred_id_beats_name_match() {
        let devices = vec![
            CaptureDevice::new("{1}", "Realtek Mic"),
            CaptureDevice::new("{2}", "USB Mic"),
        ];
        let policy = Policy {
            preferred_device_id: Some("{2}".to_string()),
            ..policy()
        };
        assert_eq!(select_target(&devices, &policy).unwrap().id, "{2}");
    }

    #[test]
    fn test_preferred_id_comparison_ignores_case() {
        let devices = vec![
            CaptureDevice::new("{0.0.1}.{aa}", "Mic One"),
            CaptureDevice::new("{0.0.1}.{bb}", "Mic Two"),
        ];
        let policy = Policy {
            preferred_device_id: Some("{0.0.1}.{BB}".to_string()),
            ..policy()
        };
        assert_eq!(select_target(&devices, &policy).unwrap().friendly_name, "Mic Two");
    }

    #[test]
    fn test_name_match_checks_id_and_is_case_insensitive() {
        let devices = vec![
            CaptureDevice::new("{1}", "Webcam"),
            CaptureDevice::new("{2}.usb-realtek", "Line In"),
            CaptureDevice::new("{3}", "realtek array"),
        ];
        assert_eq!(select_target(&devices, &policy()).unwrap().id, "{2}.usb-realtek");
    }

    #[test]
    fn test_falls_back_to_first_eligible_device() {
        let devices = vec![
            CaptureDevice::new("{1}", "OnePlus Buds Pro 3 Hands-Free"),
            CaptureDevice::new("{2}", "Webcam"),
            CaptureDevice::new("{3}", "USB Mic"),
        ];
        assert_eq!(select_target(&devices, &policy()).unwrap().id, "{2}");
    }

    #[test]
    fn test_nothing_eligible() {
        let devices = vec![CaptureDevice::new("B", "OnePlus Buds Pro 3")];
        assert!(select_target(&devices, &policy()).is_none());
        assert!(select_target(&[], &policy()).is_none());
    }

    #[test]
    fn test_blank_block_marker_is_ignored() {
        let device = CaptureDevice::new("A", "Realtek Mic");
        let policy = Policy {
            blocked_name_contains: vec![" ".to_string()],
            ..Policy::default()
        };
        assert!(!is_blocked(&device, &policy));
    }
}
