mod arboard_backend;
mod command;
#[cfg(windows)]
mod win32;

use std::thread::sleep;
use std::time::Duration;

use thiserror::Error;

use crate::keys::KeySimulator;

pub use arboard_backend::ArboardClipboard;
pub use command::CommandClipboard;
#[cfg(windows)]
pub use win32::Win32Clipboard;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("{method}: {message}")]
    Backend {
        method: &'static str,
        message: String,
    },
    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),
    #[error("clipboard command `{program}` failed: {message}")]
    Command { program: String, message: String },
}

impl ClipboardError {
    pub(crate) fn backend(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            method,
            message: err.to_string(),
        }
    }
}

/// One way of reaching the system clipboard.
///
/// `read` returns `Ok(None)` when the clipboard holds no text.
pub trait ClipboardStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn read(&self) -> Result<Option<String>, ClipboardError>;
    fn write(&self, text: &str) -> Result<(), ClipboardError>;
    fn clear(&self) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ClipboardTimings {
    /// Pause after clearing so the owner change reaches other processes.
    pub clear_settle: Duration,
}

impl Default for ClipboardTimings {
    fn default() -> Self {
        Self {
            clear_settle: Duration::from_millis(200),
        }
    }
}

/// How many strategies are retried after the alternate copy keystroke.
const RETRY_STRATEGIES: usize = 2;

/// Ordered fallback chain over clipboard strategies.
///
/// Every operation walks the strategies in order and stops at the first
/// one that succeeds. No single strategy is trusted on its own.
pub struct ClipboardChain {
    strategies: Vec<Box<dyn ClipboardStrategy>>,
    timings: ClipboardTimings,
}

impl ClipboardChain {
    pub fn new(strategies: Vec<Box<dyn ClipboardStrategy>>, timings: ClipboardTimings) -> Self {
        Self {
            strategies,
            timings,
        }
    }

    /// Library backend first, then the native Win32 API, then the
    /// platform's command-line clipboard tool.
    pub fn platform() -> Self {
        let mut strategies: Vec<Box<dyn ClipboardStrategy>> = vec![Box::new(ArboardClipboard::new())];
        #[cfg(windows)]
        strategies.push(Box::new(Win32Clipboard::default()));
        strategies.push(Box::new(CommandClipboard::platform()));
        Self::new(strategies, ClipboardTimings::default())
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Copies the current selection of the focused application.
    ///
    /// The clipboard is cleared first. Whatever survives the clear is
    /// rejected, so a target that ignores the copy keystroke yields `None`
    /// rather than stale text.
    pub fn capture_selection(&self, keys: &dyn KeySimulator) -> Option<String> {
        self.clear();
        let residual = self.snapshot();

        if let Err(e) = keys.copy() {
            log::warn!("Copy keystroke failed: {}", e);
        }

        if let Some(text) = self.read_fresh(&self.strategies, residual.as_deref()) {
            return Some(text);
        }

        log::debug!("All clipboard methods came back empty, retrying with alternate copy");
        match keys.alternate_copy() {
            Ok(()) => {
                let retry = &self.strategies[..RETRY_STRATEGIES.min(self.strategies.len())];
                self.read_fresh(retry, residual.as_deref())
            }
            Err(e) => {
                log::warn!("Alternate copy keystroke failed: {}", e);
                None
            }
        }
    }

    /// Writes `text` with the first strategy that accepts it.
    pub fn write(&self, text: &str) -> bool {
        for strategy in &self.strategies {
            match strategy.write(text) {
                Ok(()) => {
                    log::debug!("Clipboard written via {}", strategy.name());
                    return true;
                }
                Err(e) => log::debug!("Clipboard write via {} failed: {}", strategy.name(), e),
            }
        }
        log::warn!("Every clipboard write method failed");
        false
    }

    /// Best-effort clear through every strategy.
    pub fn clear(&self) {
        for strategy in &self.strategies {
            if let Err(e) = strategy.clear() {
                log::debug!("Clipboard clear via {} failed: {}", strategy.name(), e);
            }
        }
        sleep(self.timings.clear_settle);
    }

    fn snapshot(&self) -> Option<String> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.read().ok())
            .flatten()
    }

    fn read_fresh(
        &self,
        strategies: &[Box<dyn ClipboardStrategy>],
        residual: Option<&str>,
    ) -> Option<String> {
        for strategy in strategies {
            match strategy.read() {
                Ok(Some(text)) if is_fresh(&text, residual) => {
                    log::debug!("Captured {} chars via {}", text.chars().count(), strategy.name());
                    return Some(text);
                }
                Ok(Some(_)) => {
                    log::debug!("{} returned content that survived the clear, ignoring", strategy.name());
                }
                Ok(None) => log::debug!("{} returned no text", strategy.name()),
                Err(e) => log::debug!("Clipboard read via {} failed: {}", strategy.name(), e),
            }
        }
        None
    }
}

fn is_fresh(text: &str, residual: Option<&str>) -> bool {
    !text.is_empty() && residual.map_or(true, |residual| residual.is_empty() || text != residual)
}
