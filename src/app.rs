//! Application state for the tray process.
//!
//! Owns the guard, the policy store and the tray icon. Everything here runs
//! on the UI thread; the guard reports back through [`TrayNotifier`], which
//! queues messages and wakes the window with a posted message.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{PostMessageW, WM_USER};

use crate::audio::{DeviceRole, EndpointNotifications, EndpointSwitcher, WindowsAudio};
use crate::config::AppConfig;
use crate::guard::{DeviceSnapshot, MicGuard, Notifier, PolicyStore, SharedPolicy};
use crate::platform::StartupRegistration;
use crate::tray::TrayIcon;
use crate::ui::{MenuCommand, MenuModel};

pub const WM_TRAY_ICON: u32 = WM_USER + 1;
pub const WM_GUARD_MESSAGE: u32 = WM_USER + 2;

pub const APP_TITLE: &str = "MicGuard";

/// Something the guard wants the user to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardMessage {
    Notice(String),
    Failure(String),
}

type Inbox = Arc<Mutex<VecDeque<GuardMessage>>>;

/// Notifier that hands messages to the UI thread.
pub struct TrayNotifier {
    // HWND is not Send; the raw handle value is
    hwnd: isize,
    inbox: Inbox,
}

impl TrayNotifier {
    fn push(&self, message: GuardMessage) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);

        let hwnd = HWND(self.hwnd as *mut std::ffi::c_void);
        unsafe {
            if let Err(e) = PostMessageW(hwnd, WM_GUARD_MESSAGE, WPARAM(0), LPARAM(0)) {
                warn!(error = %e, "failed to wake the tray window");
            }
        }
    }
}

impl Notifier for TrayNotifier {
    fn notice(&self, text: &str) {
        info!(notice = text, "guard notice");
        self.push(GuardMessage::Notice(text.to_string()));
    }

    fn failure(&self, text: &str) {
        error!(failure = text, "guard failure");
        self.push(GuardMessage::Failure(text.to_string()));
    }
}

/// What the window procedure must do once application state is released.
///
/// Message boxes run a nested message loop, so they are never shown while
/// the state is borrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    None,
    ShowError(String),
    ShowAbout,
    Exit,
}

pub struct AppState {
    hwnd: HWND,
    store: PolicyStore,
    policy: SharedPolicy,
    audio: Arc<WindowsAudio>,
    guard: MicGuard,
    tray: TrayIcon,
    startup: StartupRegistration,
    inbox: Inbox,

    /// Devices as listed in the last menu shown, for index lookups
    menu: Option<MenuModel>,
}

impl AppState {
    /// Load the policy, start the guard and put the icon in the tray.
    pub fn new(hwnd: HWND, config: &AppConfig, runtime: Handle) -> anyhow::Result<Self> {
        let store = PolicyStore::new(&config.policy_path);
        let policy = SharedPolicy::new(store.load_or_create());
        info!(path = %store.path().display(), "policy loaded");

        let audio = Arc::new(WindowsAudio::new());
        let inbox: Inbox = Arc::default();
        let notifier = Arc::new(TrayNotifier {
            hwnd: hwnd.0 as isize,
            inbox: inbox.clone(),
        });

        let mut guard = MicGuard::new(
            policy.clone(),
            audio.clone(),
            audio.clone(),
            notifier,
            runtime,
        );
        let notifications =
            EndpointNotifications::new().context("cannot create endpoint notifications")?;
        guard
            .start(Box::new(notifications))
            .context("cannot subscribe to device notifications")?;

        let tray = TrayIcon::new(hwnd, APP_TITLE).context("cannot create tray icon")?;

        let app = Self {
            hwnd,
            store,
            policy,
            audio,
            guard,
            tray,
            startup: StartupRegistration::new(),
            inbox,
            menu: None,
        };
        app.refresh();
        app.guard.enforce_now("tray-start");

        Ok(app)
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    /// Re-read devices and refresh the tooltip.
    pub fn refresh(&self) {
        let snapshot = DeviceSnapshot::capture(self.audio.as_ref());
        self.tray.set_tooltip(&format!("{APP_TITLE}\n{}", snapshot.status_line()));
    }

    /// Build the menu from a fresh device snapshot.
    pub fn menu_model(&mut self) -> MenuModel {
        let snapshot = DeviceSnapshot::capture(self.audio.as_ref());
        let model = MenuModel::build(&snapshot, &self.policy.snapshot(), self.startup.is_enabled());
        self.menu = Some(model.clone());
        model
    }

    pub fn handle_command(&mut self, command: MenuCommand) -> UiAction {
        match command {
            MenuCommand::Exit => UiAction::Exit,
            MenuCommand::About => UiAction::ShowAbout,
            MenuCommand::Refresh => {
                self.refresh();
                UiAction::None
            }
            MenuCommand::ToggleGuard => self.toggle_guard(),
            MenuCommand::ToggleStartup => self.toggle_startup(),
            MenuCommand::SelectDevice(index) => self.select_as_default(index),
            MenuCommand::ToggleBlocked(index) => self.toggle_blocked(index),
        }
    }

    fn menu_device(&self, index: usize) -> Option<(String, String, bool)> {
        let device = self.menu.as_ref()?.devices.get(index)?;
        Some((device.id.clone(), device.name.clone(), device.blocked))
    }

    /// Make the device default for every role, then remember it as preferred.
    fn select_as_default(&mut self, index: usize) -> UiAction {
        let Some((id, name, _)) = self.menu_device(index) else {
            return UiAction::None;
        };

        for role in DeviceRole::ALL {
            if let Err(e) = self.audio.set_default_capture_endpoint(&id, role) {
                return UiAction::ShowError(format!("Cannot set default microphone.\n{e}"));
            }
        }

        self.policy.update(|policy| policy.prefer_device(&id, &name));
        if let Err(action) = self.save() {
            return action;
        }
        info!(device = %name, "microphone selected as default");
        self.guard.enforce_now("manual-select");
        self.refresh();
        UiAction::None
    }

    fn toggle_blocked(&mut self, index: usize) -> UiAction {
        let Some((id, name, blocked)) = self.menu_device(index) else {
            return UiAction::None;
        };

        self.policy.update(|policy| policy.set_device_blocked(&id, !blocked));
        if let Err(action) = self.save() {
            return action;
        }
        info!(device = %name, blocked = !blocked, "block list updated");
        self.guard.enforce_now("blocked-updated");
        self.refresh();
        UiAction::None
    }

    fn toggle_guard(&mut self) -> UiAction {
        let enabled = self.policy.update(|policy| {
            policy.set_enabled(!policy.enabled);
            policy.enabled
        });
        if let Err(action) = self.save() {
            return action;
        }
        info!(enabled, "auto guard toggled");
        if enabled {
            self.guard.enforce_now("guard-enabled");
        }
        UiAction::None
    }

    fn toggle_startup(&mut self) -> UiAction {
        let enable = !self.startup.is_enabled();
        let result = StartupRegistration::startup_command()
            .and_then(|command| self.startup.set_enabled(enable, &command));

        match result {
            Ok(()) => UiAction::None,
            Err(e) => {
                warn!(error = %e, "startup registration failed");
                UiAction::ShowError(format!("Cannot update startup setting.\n{e}"))
            }
        }
    }

    fn save(&self) -> Result<(), UiAction> {
        self.store.save(&self.policy.snapshot()).map_err(|e| {
            error!(error = %e, "failed to save policy");
            UiAction::ShowError(format!("Cannot save settings.\n{e}"))
        })
    }

    /// Take everything the guard queued since the last wake-up.
    pub fn drain_inbox(&self) -> Vec<GuardMessage> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn show_notice(&self, text: &str) {
        self.tray.show_balloon(APP_TITLE, text);
    }

    /// Stop the guard and remove the tray icon.
    pub fn shutdown(mut self) {
        self.guard.dispose();
        self.tray.remove();
        info!("application shut down");
    }
}
