use std::sync::{Mutex, PoisonError};

use arboard::Clipboard;

use super::{ClipboardError, ClipboardStrategy};

const NAME: &str = "arboard";

/// Cross-platform clipboard library, the primary method.
///
/// On X11 and Wayland the written text is only served while the
/// `Clipboard` that set it is alive, so one handle is kept for the life
/// of the strategy. It is opened lazily again if the first attempt failed.
pub struct ArboardClipboard {
    handle: Mutex<Option<Clipboard>>,
}

impl ArboardClipboard {
    /// Opens the clipboard handle now. A failure is logged and retried on
    /// first use.
    pub fn new() -> Self {
        let handle = match Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(e) => {
                log::debug!("{} not ready yet: {}", NAME, e);
                None
            }
        };
        Self {
            handle: Mutex::new(handle),
        }
    }

    /// Runs `op` on the kept handle, opening it first if needed.
    fn with<T>(
        &self,
        op: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, arboard::Error> {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        let mut clipboard = match guard.take() {
            Some(clipboard) => clipboard,
            None => Clipboard::new()?,
        };
        let result = op(&mut clipboard);
        *guard = Some(clipboard);
        result
    }
}

impl Default for ArboardClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardStrategy for ArboardClipboard {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&self) -> Result<Option<String>, ClipboardError> {
        match self.with(|clipboard| clipboard.get_text()) {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::backend(NAME, e)),
        }
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        self.with(|clipboard| clipboard.set_text(text))
            .map_err(|e| ClipboardError::backend(NAME, e))
    }

    fn clear(&self) -> Result<(), ClipboardError> {
        self.with(|clipboard| clipboard.clear())
            .map_err(|e| ClipboardError::backend(NAME, e))
    }
}
