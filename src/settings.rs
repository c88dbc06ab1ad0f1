use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{self, AppConfig, ConfigStore, SharedConfig};
use crate::error::AppError;
use crate::hotkey::{HotkeyError, HotkeyRegistrar};
use crate::notify::Notifier;

/// "Settings open" flag. Only one settings session at a time.
#[derive(Debug, Default)]
pub struct SettingsGate {
    open: AtomicBool,
}

impl SettingsGate {
    pub fn try_open(self: &Arc<Self>) -> Option<SettingsSession> {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SettingsSession {
                gate: Arc::clone(self),
            })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Resets the gate on drop, so a window that fails to build can be
/// opened again later.
#[derive(Debug)]
pub struct SettingsSession {
    gate: Arc<SettingsGate>,
}

impl Drop for SettingsSession {
    fn drop(&mut self) {
        self.gate.open.store(false, Ordering::Release);
    }
}

/// Shows only the last three characters of a key.
pub fn mask_api_key(api_key: &str) -> String {
    let len = api_key.chars().count();
    if len <= 3 {
        return api_key.to_string();
    }
    let visible: String = api_key.chars().skip(len - 3).collect();
    format!("{}{}", "*".repeat(len - 3), visible)
}

/// Applies settings changes: persists them, swaps the live config and
/// keeps the global shortcut in sync.
pub struct Controller<R: HotkeyRegistrar> {
    store: ConfigStore,
    config: SharedConfig,
    hotkeys: R,
    notifier: Arc<dyn Notifier>,
    gate: Arc<SettingsGate>,
}

impl<R: HotkeyRegistrar> Controller<R> {
    pub fn new(
        store: ConfigStore,
        config: SharedConfig,
        hotkeys: R,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            hotkeys,
            notifier,
            gate: Arc::new(SettingsGate::default()),
        }
    }

    pub fn config(&self) -> AppConfig {
        config::snapshot(&self.config)
    }

    pub fn hotkeys(&self) -> &R {
        &self.hotkeys
    }

    pub fn settings_open(&self) -> bool {
        self.gate.is_open()
    }

    /// Registers the shortcut when enabled, removes it otherwise.
    pub fn sync_hotkey(&mut self) -> Result<(), HotkeyError> {
        let config = self.config();
        self.hotkeys.unregister_all()?;
        if config.enabled {
            self.hotkeys.register(&config.shortcut)
        } else {
            log::info!("Rephrasing disabled, shortcut not registered");
            Ok(())
        }
    }

    fn sync_hotkey_logged(&mut self) {
        if let Err(e) = self.sync_hotkey() {
            log::error!("{}", e);
        }
    }

    /// Saves a settings form. The hotkey is re-registered even when
    /// persisting fails, since the in-memory config already changed.
    pub fn apply_settings(&mut self, updated: AppConfig) -> Result<(), AppError> {
        config::replace(&self.config, updated.clone());
        let saved = self.store.save(&updated);
        self.sync_hotkey_logged();

        match saved {
            Ok(()) => {
                self.notifier
                    .notify("Settings Saved", "Your settings have been updated");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to save settings: {}", e);
                Err(AppError::from(e))
            }
        }
    }

    /// Tray "Enable App" toggle. Returns the new state.
    pub fn toggle_enabled(&mut self) -> bool {
        let mut updated = self.config();
        updated.enabled = !updated.enabled;
        config::replace(&self.config, updated.clone());

        if let Err(e) = self.store.save(&updated) {
            log::error!("Failed to save settings: {}", e);
        }
        self.sync_hotkey_logged();

        if updated.enabled {
            self.notifier
                .notify("App Enabled", "Text rephrasing is now enabled");
        } else {
            self.notifier
                .notify("App Disabled", "Text rephrasing is now disabled");
        }
        updated.enabled
    }

    /// Runs an external settings window. `build` gets the current config
    /// and returns the edited one, or `None` when closed without saving.
    ///
    /// Returns `Ok(false)` without calling `build` if a window is already
    /// open. The gate is released however `build` exits.
    pub fn open_settings<F>(&mut self, build: F) -> Result<bool, AppError>
    where
        F: FnOnce(&AppConfig) -> anyhow::Result<Option<AppConfig>>,
    {
        let Some((session, current)) = self.begin_settings() else {
            return Ok(false);
        };
        let edited = build(&current);
        self.finish_settings(session, edited).map(|_| true)
    }

    /// Claims the settings gate for a window that runs elsewhere, e.g. on
    /// its own thread. Hand the session back through `finish_settings`.
    pub fn begin_settings(&self) -> Option<(SettingsSession, AppConfig)> {
        match self.gate.try_open() {
            Some(session) => Some((session, self.config())),
            None => {
                log::debug!("Settings already open");
                None
            }
        }
    }

    /// Applies what a settings window returned and closes the session.
    pub fn finish_settings(
        &mut self,
        session: SettingsSession,
        edited: anyhow::Result<Option<AppConfig>>,
    ) -> Result<(), AppError> {
        let result = match edited {
            Ok(Some(updated)) => self.apply_settings(updated),
            Ok(None) => Ok(()),
            Err(e) => {
                log::error!("Settings window failed: {:#}", e);
                Ok(())
            }
        };
        drop(session);
        result
    }

    /// File the settings are persisted to.
    pub fn config_path(&self) -> &Path {
        self.store.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE_NAME;
    use crate::hotkey::tests::RecordingRegistrar;
    use crate::notify::tests::RecordingNotifier;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> (Controller<RecordingRegistrar>, Arc<RecordingNotifier>) {
        let mut store = ConfigStore::new(vec![dir.path().join(CONFIG_FILE_NAME)]).unwrap();
        let loaded = store.load();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut controller = Controller::new(
            store,
            config::shared(loaded),
            RecordingRegistrar::default(),
            notifier.clone(),
        );
        controller.sync_hotkey().unwrap();
        (controller, notifier)
    }

    #[test]
    fn masks_all_but_last_three() {
        assert_eq!(mask_api_key("AIzaSyABCDEF"), "*********DEF");
        assert_eq!(mask_api_key("abc"), "abc");
        assert_eq!(mask_api_key(""), "");
    }

    #[test]
    fn gate_allows_one_session() {
        let gate = Arc::new(SettingsGate::default());
        let session = gate.try_open().unwrap();
        assert!(gate.try_open().is_none());
        drop(session);
        assert!(!gate.is_open());
    }

    #[test]
    fn startup_registers_default_shortcut() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller(&dir);
        assert_eq!(controller.hotkeys().current.as_deref(), Some("ctrl+shift+r"));
    }

    #[test]
    fn applying_settings_persists_and_rebinds() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, notifier) = controller(&dir);

        let updated = AppConfig {
            shortcut: "alt+shift+e".to_string(),
            creativity_level: 8,
            ..controller.config()
        };
        controller.apply_settings(updated.clone()).unwrap();

        assert_eq!(controller.config(), updated);
        assert_eq!(controller.hotkeys().current.as_deref(), Some("alt+shift+e"));
        assert_eq!(notifier.titles(), vec!["Settings Saved"]);

        let mut reloaded = ConfigStore::new(vec![dir.path().join(CONFIG_FILE_NAME)]).unwrap();
        assert_eq!(reloaded.load(), updated);
    }

    #[test]
    fn disabling_removes_the_shortcut() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, notifier) = controller(&dir);

        assert!(!controller.toggle_enabled());
        assert_eq!(controller.hotkeys().current, None);

        assert!(controller.toggle_enabled());
        assert_eq!(controller.hotkeys().current.as_deref(), Some("ctrl+shift+r"));
        assert_eq!(notifier.titles(), vec!["App Disabled", "App Enabled"]);
    }

    #[test]
    fn failing_window_can_be_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _) = controller(&dir);

        let opened = controller
            .open_settings(|_| Err(anyhow::anyhow!("no display")))
            .unwrap();
        assert!(opened);
        assert!(!controller.settings_open());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = controller.open_settings(|_| panic!("widget toolkit crashed"));
        }));
        assert!(result.is_err());
        assert!(!controller.settings_open());

        let opened = controller
            .open_settings(|current| {
                Ok(Some(AppConfig {
                    model: "gemini-1.5-flash".to_string(),
                    ..current.clone()
                }))
            })
            .unwrap();
        assert!(opened);
        assert_eq!(controller.config().model, "gemini-1.5-flash");
    }

    #[test]
    fn nested_open_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        let gate = Arc::clone(&controller.gate);
        let _session = gate.try_open().unwrap();

        let mut called = false;
        let opened = controller
            .open_settings(|_| {
                called = true;
                Ok(None)
            })
            .unwrap();

        assert!(!opened);
        assert!(!called);
    }

    #[test]
    fn session_held_elsewhere_blocks_until_finished() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, notifier) = controller(&dir);

        let (session, current) = controller.begin_settings().unwrap();
        assert!(controller.settings_open());
        assert!(controller.begin_settings().is_none());

        let edited = AppConfig {
            creativity_level: 2,
            ..current
        };
        controller.finish_settings(session, Ok(Some(edited))).unwrap();

        assert!(!controller.settings_open());
        assert_eq!(controller.config().creativity_level, 2);
        assert_eq!(notifier.titles(), vec!["Settings Saved"]);
    }

    #[test]
    fn invalid_shortcut_keeps_settings_but_reports_nothing_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _) = controller(&dir);

        let updated = AppConfig {
            shortcut: "ctrl+".to_string(),
            ..controller.config()
        };
        assert!(controller.apply_settings(updated).is_ok());
        assert_eq!(controller.hotkeys().current, None);
        assert_eq!(controller.config().shortcut, "ctrl+");
    }
}
