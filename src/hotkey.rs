use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use thiserror::Error;

use crate::pipeline::Trigger;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("invalid shortcut `{combo}`: {message}")]
    Parse { combo: String, message: String },
    #[error("failed to register shortcut `{combo}`: {message}")]
    Register { combo: String, message: String },
    #[error("failed to create hotkey manager: {0}")]
    Manager(String),
}

/// Global shortcut registration as seen by the settings controller.
pub trait HotkeyRegistrar {
    fn register(&mut self, combo: &str) -> Result<(), HotkeyError>;
    fn unregister_all(&mut self) -> Result<(), HotkeyError>;
}

/// Parses combos like `ctrl+shift+r`.
pub fn parse_combo(combo: &str) -> Result<HotKey, HotkeyError> {
    combo
        .trim()
        .parse::<HotKey>()
        .map_err(|e| HotkeyError::Parse {
            combo: combo.to_string(),
            message: e.to_string(),
        })
}

/// Id of the binding the listener should react to, 0 when none.
pub type ActiveBinding = Arc<AtomicU32>;

/// OS-level shortcut through `global-hotkey`. Must live on the thread
/// running the platform event loop.
pub struct GlobalHotkeys {
    manager: GlobalHotKeyManager,
    registered: Option<(HotKey, String)>,
    active: ActiveBinding,
}

impl GlobalHotkeys {
    pub fn new() -> Result<Self, HotkeyError> {
        let manager = GlobalHotKeyManager::new().map_err(|e| HotkeyError::Manager(e.to_string()))?;
        Ok(Self {
            manager,
            registered: None,
            active: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn active_binding(&self) -> ActiveBinding {
        Arc::clone(&self.active)
    }
}

impl HotkeyRegistrar for GlobalHotkeys {
    fn register(&mut self, combo: &str) -> Result<(), HotkeyError> {
        let hotkey = parse_combo(combo)?;
        self.unregister_all()?;

        self.manager
            .register(hotkey)
            .map_err(|e| HotkeyError::Register {
                combo: combo.to_string(),
                message: e.to_string(),
            })?;
        self.active.store(hotkey.id(), Ordering::Release);
        self.registered = Some((hotkey, combo.to_string()));
        log::info!("Registered global shortcut {}", combo);
        Ok(())
    }

    fn unregister_all(&mut self) -> Result<(), HotkeyError> {
        self.active.store(0, Ordering::Release);
        if let Some((hotkey, combo)) = self.registered.take() {
            self.manager
                .unregister(hotkey)
                .map_err(|e| HotkeyError::Register {
                    combo: combo.clone(),
                    message: e.to_string(),
                })?;
            log::debug!("Unregistered global shortcut {}", combo);
        }
        Ok(())
    }
}

/// Forwards presses of the active binding to the trigger on a dedicated
/// thread, so a slow run never stalls the event dispatcher.
pub fn spawn_listener(trigger: Arc<Trigger>, active: ActiveBinding) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("hotkey-listener".to_string())
        .spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if event.state == HotKeyState::Pressed
                    && event.id != 0
                    && event.id == active.load(Ordering::Acquire)
                {
                    trigger.fire();
                }
            }
            log::warn!("Hotkey event channel closed");
        })
        .map(|_| ())
}
