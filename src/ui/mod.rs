//! UI module for the tray context menu.

pub mod menu;

pub use menu::{MenuCommand, MenuDevice, MenuModel};
