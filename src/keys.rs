use std::thread::sleep;
use std::time::Duration;

use enigo::{
    Direction::{self, Click, Press, Release},
    Enigo, Key, Keyboard, Settings,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to initialize keyboard simulator: {0}")]
    Initialization(String),
    #[error("failed to simulate keyboard input: {0}")]
    Keyboard(String),
}

/// Synthetic keystrokes sent to whatever application has focus.
pub trait KeySimulator: Send + Sync {
    /// Copy shortcut, held slowly so apps that poll modifiers see it.
    fn copy(&self) -> Result<(), KeyError>;

    /// Releases a possibly stuck modifier, then taps the copy shortcut.
    fn alternate_copy(&self) -> Result<(), KeyError>;

    fn paste(&self) -> Result<(), KeyError>;
}

/// Delays between key events. All zero in tests.
#[derive(Debug, Clone, Copy)]
pub struct KeyTimings {
    pub key_gap: Duration,
    pub copy_settle: Duration,
    pub alternate_release_gap: Duration,
    pub alternate_settle: Duration,
    pub paste_gap: Duration,
}

impl Default for KeyTimings {
    fn default() -> Self {
        Self {
            key_gap: Duration::from_millis(200),
            copy_settle: Duration::from_millis(500),
            alternate_release_gap: Duration::from_millis(100),
            alternate_settle: Duration::from_millis(700),
            paste_gap: Duration::from_millis(100),
        }
    }
}

#[cfg(target_os = "macos")]
const SHORTCUT_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const SHORTCUT_MODIFIER: Key = Key::Control;

/// Keystrokes through enigo. A fresh `Enigo` is opened per gesture since
/// the connection is not `Send` on every platform.
#[derive(Debug, Default)]
pub struct EnigoKeys {
    timings: KeyTimings,
}

impl EnigoKeys {
    pub fn new(timings: KeyTimings) -> Self {
        Self { timings }
    }

    fn connect() -> Result<Enigo, KeyError> {
        Enigo::new(&Settings::default()).map_err(|e| KeyError::Initialization(e.to_string()))
    }

    fn chord(&self, letter: char, gap: Duration) -> Result<(), KeyError> {
        let mut enigo = Self::connect()?;
        key(&mut enigo, SHORTCUT_MODIFIER, Press)?;
        sleep(gap);
        key(&mut enigo, Key::Unicode(letter), Press)?;
        sleep(gap);
        key(&mut enigo, Key::Unicode(letter), Release)?;
        key(&mut enigo, SHORTCUT_MODIFIER, Release)
    }
}

fn key(enigo: &mut Enigo, key: Key, direction: Direction) -> Result<(), KeyError> {
    enigo
        .key(key, direction)
        .map_err(|e| KeyError::Keyboard(e.to_string()))
}

impl KeySimulator for EnigoKeys {
    fn copy(&self) -> Result<(), KeyError> {
        self.chord('c', self.timings.key_gap)?;
        sleep(self.timings.copy_settle);
        Ok(())
    }

    fn alternate_copy(&self) -> Result<(), KeyError> {
        let mut enigo = Self::connect()?;
        key(&mut enigo, SHORTCUT_MODIFIER, Release)?;
        sleep(self.timings.alternate_release_gap);

        key(&mut enigo, SHORTCUT_MODIFIER, Press)?;
        key(&mut enigo, Key::Unicode('c'), Click)?;
        key(&mut enigo, SHORTCUT_MODIFIER, Release)?;
        sleep(self.timings.alternate_settle);
        Ok(())
    }

    fn paste(&self) -> Result<(), KeyError> {
        self.chord('v', self.timings.paste_gap)
    }
}
