use tray_icon::menu::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

use crate::app::TrayAction;
use crate::event_loop::{AppEvent, EventProxy};

const ICON_SIZE: u32 = 32;

/// Tray icon with the "Enable App", "Settings" and "Exit" entries.
/// Must stay alive, and on the event loop thread, for the menu to work.
pub struct Tray {
    _icon: TrayIcon,
    enable_item: CheckMenuItem,
}

impl Tray {
    /// Builds the tray and forwards its menu clicks through `proxy`.
    pub fn build(enabled: bool, proxy: EventProxy) -> anyhow::Result<Self> {
        let enable_item = CheckMenuItem::new("Enable App", true, enabled, None);
        let settings_item = MenuItem::new("Settings", true, None);
        let exit_item = MenuItem::new("Exit", true, None);

        let menu = Menu::new();
        menu.append(&enable_item)?;
        menu.append(&settings_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&exit_item)?;

        let routes = [
            (enable_item.id().clone(), TrayAction::ToggleEnabled),
            (settings_item.id().clone(), TrayAction::OpenSettings),
            (exit_item.id().clone(), TrayAction::Exit),
        ];
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            if let Some((_, action)) = routes.iter().find(|(id, _)| *id == event.id) {
                proxy.send(AppEvent::Tray(*action));
            }
        }));

        let icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Rephrase Anywhere")
            .with_icon(icon()?)
            .build()?;

        Ok(Self {
            _icon: icon,
            enable_item,
        })
    }

    /// Keeps the checkmark in line with the config.
    pub fn set_enabled(&self, enabled: bool) {
        self.enable_item.set_checked(enabled);
    }
}

/// Filled circle in the accent color; no image asset to ship.
fn icon() -> anyhow::Result<Icon> {
    let center = (ICON_SIZE as f32 - 1.0) / 2.0;
    let radius = ICON_SIZE as f32 / 2.0 - 1.0;
    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let alpha = if dx * dx + dy * dy <= radius * radius { 255 } else { 0 };
            rgba.extend_from_slice(&[0x2b, 0x7c, 0xd3, alpha]);
        }
    }
    Ok(Icon::from_rgba(rgba, ICON_SIZE, ICON_SIZE)?)
}
