use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::config::{self, AppConfig};
use crate::event_loop::{AppEvent, EventProxy, Flow};
use crate::hotkey::HotkeyRegistrar;
use crate::settings::Controller;

/// Entries of the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    ToggleEnabled,
    OpenSettings,
    Exit,
}

/// Edits the settings somewhere off the event loop thread. Returns the
/// new config, or `None` when nothing changed.
pub trait SettingsEditor: Send + Sync {
    fn edit(&self, path: &Path, current: &AppConfig) -> anyhow::Result<Option<AppConfig>>;
}

/// Opens the config file in the system text editor and reads it back
/// once the editor exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFileEditor;

impl TextFileEditor {
    fn command(path: &Path) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("notepad.exe");
            cmd.arg(path);
            cmd
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.args(["-W", "-t"]).arg(path);
            cmd
        } else {
            let editor = std::env::var("VISUAL")
                .or_else(|_| std::env::var("EDITOR"))
                .unwrap_or_else(|_| "xdg-open".to_string());
            let mut cmd = Command::new(editor);
            cmd.arg(path);
            cmd
        }
    }
}

impl SettingsEditor for TextFileEditor {
    fn edit(&self, path: &Path, current: &AppConfig) -> anyhow::Result<Option<AppConfig>> {
        let status = Self::command(path)
            .status()
            .with_context(|| format!("failed to open editor for {}", path.display()))?;
        if !status.success() {
            bail!("editor exited with {}", status);
        }

        let edited = config::read_config(path)?;
        Ok((edited != *current).then_some(edited))
    }
}

/// Routes tray and settings events to the controller.
pub struct App<R: HotkeyRegistrar> {
    controller: Controller<R>,
    editor: Arc<dyn SettingsEditor>,
    proxy: EventProxy,
}

impl<R: HotkeyRegistrar> App<R> {
    pub fn new(controller: Controller<R>, editor: Arc<dyn SettingsEditor>, proxy: EventProxy) -> Self {
        Self {
            controller,
            editor,
            proxy,
        }
    }

    pub fn controller(&self) -> &Controller<R> {
        &self.controller
    }

    pub fn enabled(&self) -> bool {
        self.controller.config().enabled
    }

    pub fn handle(&mut self, event: AppEvent) -> Flow {
        match event {
            AppEvent::Tray(TrayAction::ToggleEnabled) => {
                self.controller.toggle_enabled();
            }
            AppEvent::Tray(TrayAction::OpenSettings) => self.open_settings(),
            AppEvent::Tray(TrayAction::Exit) => {
                log::info!("Exit requested from tray");
                return Flow::Exit;
            }
            AppEvent::SettingsClosed { session, edited } => {
                if let Err(e) = self.controller.finish_settings(session, edited) {
                    log::error!("{}", e);
                }
            }
        }
        Flow::Continue
    }

    /// Starts the editor on its own thread; the result comes back as
    /// `AppEvent::SettingsClosed`.
    fn open_settings(&mut self) {
        let Some((session, current)) = self.controller.begin_settings() else {
            return;
        };
        let path: PathBuf = self.controller.config_path().to_path_buf();
        let editor = Arc::clone(&self.editor);
        let proxy = self.proxy.clone();

        let spawned = std::thread::Builder::new()
            .name("settings-editor".to_string())
            .spawn(move || {
                let edited = editor.edit(&path, &current);
                proxy.send(AppEvent::SettingsClosed { session, edited });
            });
        if let Err(e) = spawned {
            // The session moved into the closure and was dropped with it.
            log::error!("Failed to start settings editor: {}", e);
        }
    }
}
