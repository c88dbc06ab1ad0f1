pub mod ai_client;
pub mod app;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod hotkey;
pub mod instance;
pub mod keys;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod settings;
#[cfg(windows)]
mod tray;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ai_client::GeminiClient;
use app::{App, TextFileEditor};
use clipboard::ClipboardChain;
use config::ConfigStore;
use hotkey::GlobalHotkeys;
use instance::InstanceGuard;
use keys::EnigoKeys;
use notify::{LogNotifier, Notifier};
use pipeline::{Pipeline, Trigger};
use settings::Controller;

pub fn run() -> anyhow::Result<()> {
    // Checked before anything touches the log or config files.
    let Some(_instance) = InstanceGuard::acquire() else {
        eprintln!("Another instance is already running");
        return Ok(());
    };

    let mut store = ConfigStore::default_locations()?;
    logging::init(store.path().parent().unwrap_or(Path::new(".")));

    let config = store.load();
    if config.api_key.is_empty() {
        log::warn!("No API key configured, rewrites will fail until one is set");
    }
    let shared = config::shared(config);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rephrase-worker")
        .build()?;

    let clipboard = ClipboardChain::platform();
    log::debug!("Clipboard methods: {:?}", clipboard.strategy_names());

    let pipeline = Pipeline::new(
        Arc::new(clipboard),
        Arc::new(EnigoKeys::default()),
        Arc::new(GeminiClient::new()?),
        Arc::clone(&notifier),
        Arc::clone(&shared),
    );
    let trigger = Arc::new(Trigger::new(Arc::new(pipeline), runtime.handle().clone()));

    let hotkeys = GlobalHotkeys::new()?;
    hotkey::spawn_listener(trigger, hotkeys.active_binding())?;

    let mut controller = Controller::new(store, shared, hotkeys, notifier);
    if let Err(e) = controller.sync_hotkey() {
        // Don't fail startup; the shortcut can be fixed from the settings.
        log::error!("{}. The shortcut will not work.", e);
    }

    let (proxy, events) = event_loop::channel();
    #[cfg(windows)]
    let tray = match tray::Tray::build(controller.config().enabled, proxy.clone()) {
        Ok(tray) => Some(tray),
        Err(e) => {
            log::error!("Failed to create tray icon: {:#}", e);
            None
        }
    };
    let mut app = App::new(controller, Arc::new(TextFileEditor), proxy);

    log::info!("Rephrase Anywhere is running");
    event_loop::run(&runtime, events, |event| {
        let flow = app.handle(event);
        #[cfg(windows)]
        if let Some(tray) = &tray {
            tray.set_enabled(app.enabled());
        }
        flow
    })?;

    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
