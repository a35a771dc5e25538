//! Tray context menu: model, command IDs and the Win32 popup.

use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::guard::{DeviceSnapshot, Policy};

// Menu command IDs
const CMD_EXIT: u32 = 1;
const CMD_TOGGLE_GUARD: u32 = 2;
const CMD_TOGGLE_STARTUP: u32 = 3;
const CMD_REFRESH: u32 = 4;
const CMD_ABOUT: u32 = 5;
const CMD_SELECT_BASE: u32 = 100;
const CMD_BLOCK_BASE: u32 = 1000;

/// Devices beyond this count are not listed.
pub const MAX_MENU_DEVICES: usize = (CMD_BLOCK_BASE - CMD_SELECT_BASE) as usize;

/// A menu selection, decoded from its command ID.
///
/// Device commands carry the index into [`MenuModel::devices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Exit,
    ToggleGuard,
    ToggleStartup,
    Refresh,
    About,
    SelectDevice(usize),
    ToggleBlocked(usize),
}

impl MenuCommand {
    pub fn id(self) -> u32 {
        match self {
            MenuCommand::Exit => CMD_EXIT,
            MenuCommand::ToggleGuard => CMD_TOGGLE_GUARD,
            MenuCommand::ToggleStartup => CMD_TOGGLE_STARTUP,
            MenuCommand::Refresh => CMD_REFRESH,
            MenuCommand::About => CMD_ABOUT,
            MenuCommand::SelectDevice(index) => CMD_SELECT_BASE + index as u32,
            MenuCommand::ToggleBlocked(index) => CMD_BLOCK_BASE + index as u32,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            CMD_EXIT => Some(MenuCommand::Exit),
            CMD_TOGGLE_GUARD => Some(MenuCommand::ToggleGuard),
            CMD_TOGGLE_STARTUP => Some(MenuCommand::ToggleStartup),
            CMD_REFRESH => Some(MenuCommand::Refresh),
            CMD_ABOUT => Some(MenuCommand::About),
            id if (CMD_SELECT_BASE..CMD_BLOCK_BASE).contains(&id) => {
                Some(MenuCommand::SelectDevice((id - CMD_SELECT_BASE) as usize))
            }
            id if (CMD_BLOCK_BASE..CMD_BLOCK_BASE + MAX_MENU_DEVICES as u32).contains(&id) => {
                Some(MenuCommand::ToggleBlocked((id - CMD_BLOCK_BASE) as usize))
            }
            _ => None,
        }
    }
}

/// One device row, shared by both device submenus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuDevice {
    pub id: String,
    pub name: String,

    /// Text in "Set Default Microphone", with the default marker
    pub label: String,
    pub selected: bool,
    pub blocked: bool,
}

/// Everything the context menu shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuModel {
    pub status: String,
    pub devices: Vec<MenuDevice>,
    pub guard_enabled: bool,
    pub startup_enabled: bool,
}

impl MenuModel {
    pub fn build(snapshot: &DeviceSnapshot, policy: &Policy, startup_enabled: bool) -> Self {
        let devices = snapshot
            .entries()
            .into_iter()
            .take(MAX_MENU_DEVICES)
            .map(|entry| MenuDevice {
                id: entry.device.id.clone(),
                name: entry.device.friendly_name.clone(),
                label: entry.label(),
                selected: entry.is_selected(policy),
                blocked: entry.is_blocked_by_id(policy),
            })
            .collect();

        Self {
            status: snapshot.status_line(),
            devices,
            guard_enabled: policy.enabled,
            startup_enabled,
        }
    }

    pub fn guard_label(&self) -> &'static str {
        if self.guard_enabled {
            "Auto Guard: ON"
        } else {
            "Auto Guard: OFF"
        }
    }

    pub fn startup_label(&self) -> &'static str {
        if self.startup_enabled {
            "Start With Windows: ON"
        } else {
            "Start With Windows: OFF"
        }
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn checked(flag: bool) -> MENU_ITEM_FLAGS {
    if flag {
        MF_STRING | MF_CHECKED
    } else {
        MF_STRING
    }
}

unsafe fn append(menu: HMENU, flags: MENU_ITEM_FLAGS, id: usize, label: &str) -> Result<()> {
    let label = to_wide(label);
    AppendMenuW(menu, flags, id, PCWSTR(label.as_ptr()))
}

/// Run `cleanup` only if `result` is an error.
fn cleanup_on_error<T>(result: Result<T>, cleanup: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        cleanup();
    }
    result
}

unsafe fn fill_popup(menu: HMENU, select_menu: HMENU, block_menu: HMENU, model: &MenuModel) -> Result<()> {
    for (index, device) in model.devices.iter().enumerate() {
        append(
            select_menu,
            checked(device.selected),
            MenuCommand::SelectDevice(index).id() as usize,
            &device.label,
        )?;
        append(
            block_menu,
            checked(device.blocked),
            MenuCommand::ToggleBlocked(index).id() as usize,
            &device.name,
        )?;
    }

    let no_devices = if model.devices.is_empty() { MF_GRAYED } else { MENU_ITEM_FLAGS(0) };

    append(menu, MF_STRING | MF_GRAYED, 0, &model.status)?;
    AppendMenuW(menu, MF_SEPARATOR, 0, None)?;
    append(menu, MF_POPUP | no_devices, select_menu.0 as usize, "Set Default Microphone")?;
    append(menu, MF_POPUP | no_devices, block_menu.0 as usize, "Block From Default")?;
    append(menu, checked(model.guard_enabled), MenuCommand::ToggleGuard.id() as usize, model.guard_label())?;
    append(
        menu,
        checked(model.startup_enabled),
        MenuCommand::ToggleStartup.id() as usize,
        model.startup_label(),
    )?;
    append(menu, MF_STRING, MenuCommand::Refresh.id() as usize, "Refresh")?;
    append(menu, MF_STRING, MenuCommand::About.id() as usize, "About MicGuard")?;
    AppendMenuW(menu, MF_SEPARATOR, 0, None)?;
    append(menu, MF_STRING, MenuCommand::Exit.id() as usize, "Exit")
}

/// Build the popup. On failure every menu created here is destroyed.
unsafe fn build_popup(model: &MenuModel) -> Result<HMENU> {
    let menu = CreatePopupMenu()?;
    let select_menu = CreatePopupMenu();
    let block_menu = CreatePopupMenu();

    let result = match (&select_menu, &block_menu) {
        (Ok(select), Ok(block)) => fill_popup(menu, *select, *block, model),
        (Err(e), _) | (_, Err(e)) => Err(e.clone()),
    };

    cleanup_on_error(result, || {
        // Attached submenus go with the parent; a second destroy just fails
        let _ = DestroyMenu(menu);
        for submenu in [&select_menu, &block_menu].into_iter().flatten() {
            let _ = DestroyMenu(*submenu);
        }
    })?;

    Ok(menu)
}

/// Show the context menu at the specified position and return the choice.
///
/// Runs a modal loop; callers must not hold application state borrowed.
pub fn show_context_menu(hwnd: HWND, x: i32, y: i32, model: &MenuModel) -> Result<Option<MenuCommand>> {
    unsafe {
        let menu = build_popup(model)?;

        let _ = SetForegroundWindow(hwnd);
        let chosen = TrackPopupMenu(
            menu,
            TPM_RIGHTBUTTON | TPM_RETURNCMD | TPM_NONOTIFY,
            x,
            y,
            0,
            hwnd,
            None,
        );
        // Lets the menu close when the user clicks elsewhere next time
        let _ = PostMessageW(hwnd, WM_NULL, WPARAM(0), LPARAM(0));

        // Destroys the submenus as well
        let _ = DestroyMenu(menu);

        Ok(MenuCommand::from_id(chosen.0 as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_round_trip_through_ranges() {
        for command in [
            MenuCommand::Exit,
            MenuCommand::About,
            MenuCommand::SelectDevice(0),
            MenuCommand::SelectDevice(MAX_MENU_DEVICES - 1),
            MenuCommand::ToggleBlocked(3),
        ] {
            assert_eq!(MenuCommand::from_id(command.id()), Some(command));
        }
        assert_eq!(MenuCommand::from_id(0), None);
        assert_eq!(MenuCommand::from_id(CMD_BLOCK_BASE + MAX_MENU_DEVICES as u32), None);
    }

    #[test]
    fn test_cleanup_runs_only_on_error() {
        let mut cleaned = false;
        let ok: Result<u32> = cleanup_on_error(Ok(7), || cleaned = true);
        assert_eq!(ok.unwrap(), 7);
        assert!(!cleaned);

        let failed: Result<u32> = cleanup_on_error(Err(Error::from(E_FAIL)), || cleaned = true);
        assert!(failed.is_err());
        assert!(cleaned);
    }

    #[test]
    fn test_popup_lists_every_entry() {
        let model = MenuModel {
            status: "Default microphone: Realtek Mic".to_string(),
            devices: vec![MenuDevice {
                id: "{A}".to_string(),
                name: "Realtek Mic".to_string(),
                label: "Realtek Mic (Default)".to_string(),
                selected: true,
                blocked: false,
            }],
            guard_enabled: true,
            startup_enabled: false,
        };

        unsafe {
            let menu = build_popup(&model).unwrap();
            // status, separator, two submenus, guard, startup, refresh, about, separator, exit
            assert_eq!(GetMenuItemCount(menu), 10);
            let _ = DestroyMenu(menu);
        }
    }

    #[test]
    fn test_toggle_labels() {
        let model = MenuModel {
            status: String::new(),
            devices: Vec::new(),
            guard_enabled: false,
            startup_enabled: true,
        };
        assert_eq!(model.guard_label(), "Auto Guard: OFF");
        assert_eq!(model.startup_label(), "Start With Windows: ON");
    }
}
