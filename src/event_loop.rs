use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::app::TrayAction;
use crate::config::AppConfig;
use crate::settings::SettingsSession;

/// Work for the main thread, posted from the tray or worker threads.
#[derive(Debug)]
pub enum AppEvent {
    Tray(TrayAction),
    SettingsClosed {
        session: SettingsSession,
        edited: anyhow::Result<Option<AppConfig>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Sends events to the main thread and wakes it up.
#[derive(Debug, Clone)]
pub struct EventProxy {
    tx: UnboundedSender<AppEvent>,
    #[cfg(windows)]
    thread_id: u32,
}

impl EventProxy {
    pub fn send(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("Event loop is gone, dropping event");
            return;
        }
        self.wake();
    }

    #[cfg(windows)]
    fn wake(&self) {
        use windows_sys::Win32::UI::WindowsAndMessaging::{PostThreadMessageW, WM_APP};
        // SAFETY: the message carries no pointers; a dead thread only
        // makes the call fail.
        unsafe {
            PostThreadMessageW(self.thread_id, WM_APP, 0, 0);
        }
    }

    /// The tokio receiver wakes the loop by itself.
    #[cfg(not(windows))]
    fn wake(&self) {}
}

/// Must be called on the thread that later runs `run`.
pub fn channel() -> (EventProxy, UnboundedReceiver<AppEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let proxy = EventProxy {
        tx,
        // SAFETY: no preconditions.
        #[cfg(windows)]
        thread_id: unsafe { windows_sys::Win32::System::Threading::GetCurrentThreadId() },
    };
    (proxy, rx)
}

/// Blocks the main thread until the app should exit, handing every
/// event to `handle`.
///
/// On Windows the hotkey manager and the tray deliver events through the
/// thread's message queue, so that queue has to be pumped here.
#[cfg(windows)]
pub fn run(
    _runtime: &Runtime,
    mut events: UnboundedReceiver<AppEvent>,
    mut handle: impl FnMut(AppEvent) -> Flow,
) -> anyhow::Result<()> {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, TranslateMessage, MSG,
    };

    // SAFETY: MSG is plain data and every pointer handed to the Win32
    // calls points at this stack value.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        // 0 is WM_QUIT, -1 an error.
        while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);

            while let Ok(event) = events.try_recv() {
                if handle(event) == Flow::Exit {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn run(
    runtime: &Runtime,
    mut events: UnboundedReceiver<AppEvent>,
    mut handle: impl FnMut(AppEvent) -> Flow,
) -> anyhow::Result<()> {
    runtime.block_on(async {
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        return Err(anyhow::Error::from(e));
                    }
                    log::info!("Interrupted, shutting down");
                    return Ok(());
                }
                Some(event) = events.recv() => {
                    if handle(event) == Flow::Exit {
                        return Ok(());
                    }
                }
            }
        }
    })
}
