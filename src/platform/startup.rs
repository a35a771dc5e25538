//! "Start With Windows" registration in the per-user Run key.

use thiserror::Error;
use tracing::info;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_FILE_NOT_FOUND;
use windows::Win32::System::Registry::{
    RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_CURRENT_USER, KEY_READ, KEY_WRITE, REG_SZ,
};

/// Startup registration error types.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open Run key (error {0})")]
    OpenKey(u32),

    #[error("Failed to write startup entry (error {0})")]
    WriteFailed(u32),

    #[error("Failed to remove startup entry (error {0})")]
    DeleteFailed(u32),

    #[error("Cannot resolve MicGuard executable path: {0}")]
    ExecutablePath(#[source] std::io::Error),
}

/// The `MicGuard` value under `HKCU\...\CurrentVersion\Run`.
pub struct StartupRegistration {
    run_key_path: Vec<u16>,
    value_name: Vec<u16>,
}

impl StartupRegistration {
    const RUN_KEY: &'static str = r"Software\Microsoft\Windows\CurrentVersion\Run";
    const APP_NAME: &'static str = "MicGuard";

    pub fn new() -> Self {
        Self {
            run_key_path: to_wide(Self::RUN_KEY),
            value_name: to_wide(Self::APP_NAME),
        }
    }

    /// Quoted path of the running executable, as stored in the Run key.
    pub fn startup_command() -> Result<String, StartupError> {
        let exe = std::env::current_exe().map_err(StartupError::ExecutablePath)?;
        Ok(format!("\"{}\"", exe.display()))
    }

    /// True if a non-empty startup entry exists. Registry errors read as "off".
    pub fn is_enabled(&self) -> bool {
        let Ok(hkey) = self.open_run_key(KEY_READ) else {
            return false;
        };

        let mut data_size = 0u32;
        let result = unsafe {
            RegQueryValueExW(
                hkey,
                PCWSTR::from_raw(self.value_name.as_ptr()),
                None,
                None,
                None,
                Some(&mut data_size),
            )
        };

        unsafe {
            let _ = RegCloseKey(hkey);
        }

        result.is_ok() && data_size > 0
    }

    /// Write `command` as the startup entry, or remove the entry.
    pub fn set_enabled(&self, enabled: bool, command: &str) -> Result<(), StartupError> {
        let hkey = self.open_run_key(KEY_WRITE)?;

        let result = if enabled {
            let command_wide = to_wide(command);
            unsafe {
                RegSetValueExW(
                    hkey,
                    PCWSTR::from_raw(self.value_name.as_ptr()),
                    0,
                    REG_SZ,
                    Some(std::slice::from_raw_parts(
                        command_wide.as_ptr() as *const u8,
                        command_wide.len() * 2,
                    )),
                )
            }
        } else {
            unsafe { RegDeleteValueW(hkey, PCWSTR::from_raw(self.value_name.as_ptr())) }
        };

        unsafe {
            let _ = RegCloseKey(hkey);
        }

        match (enabled, result) {
            (_, r) if r.is_ok() => {
                info!(enabled, "startup registration updated");
                Ok(())
            }
            // Nothing to remove.
            (false, r) if r == ERROR_FILE_NOT_FOUND => Ok(()),
            (true, r) => Err(StartupError::WriteFailed(r.0)),
            (false, r) => Err(StartupError::DeleteFailed(r.0)),
        }
    }

    fn open_run_key(
        &self,
        access: windows::Win32::System::Registry::REG_SAM_FLAGS,
    ) -> Result<HKEY, StartupError> {
        let mut hkey = HKEY::default();
        let result = unsafe {
            RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(self.run_key_path.as_ptr()),
                0,
                access,
                &mut hkey,
            )
        };

        if result.is_err() {
            return Err(StartupError::OpenKey(result.0));
        }
        Ok(hkey)
    }
}

impl Default for StartupRegistration {
    fn default() -> Self {
        Self::new()
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_command_is_quoted_executable() {
        let command = StartupRegistration::startup_command().unwrap();
        assert!(command.starts_with('"'));
        assert!(command.ends_with('"'));
        assert!(command.len() > 2);
    }

    #[test]
    fn test_wide_strings_are_nul_terminated() {
        assert_eq!(to_wide("Run"), vec![b'R' as u16, b'u' as u16, b'n' as u16, 0]);
    }
}
