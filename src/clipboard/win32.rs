use clipboard_win::{formats, raw, Clipboard, Getter};

use super::{ClipboardError, ClipboardStrategy};

const NAME: &str = "win32";

/// Native Win32 clipboard in `CF_UNICODETEXT` format.
///
/// Opening is retried because other applications briefly hold the
/// clipboard while they update it.
#[derive(Debug, Clone, Copy)]
pub struct Win32Clipboard {
    open_attempts: usize,
}

impl Default for Win32Clipboard {
    fn default() -> Self {
        Self { open_attempts: 10 }
    }
}

impl Win32Clipboard {
    fn open(&self) -> Result<Clipboard, ClipboardError> {
        Clipboard::new_attempts(self.open_attempts).map_err(|e| ClipboardError::backend(NAME, e))
    }
}

impl ClipboardStrategy for Win32Clipboard {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&self) -> Result<Option<String>, ClipboardError> {
        // Closed again when `_clipboard` drops.
        let _clipboard = self.open()?;
        if !raw::is_format_avail(formats::CF_UNICODETEXT) {
            return Ok(None);
        }

        let mut text = String::new();
        formats::Unicode
            .read_clipboard(&mut text)
            .map_err(|e| ClipboardError::backend(NAME, e))?;
        Ok((!text.is_empty()).then_some(text))
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        clipboard_win::set_clipboard_string(text).map_err(|e| ClipboardError::backend(NAME, e))
    }

    fn clear(&self) -> Result<(), ClipboardError> {
        let _clipboard = self.open()?;
        raw::empty().map_err(|e| ClipboardError::backend(NAME, e))
    }
}
