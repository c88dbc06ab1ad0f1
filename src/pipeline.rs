use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::ai_client::{RewriteRequest, RewriteService};
use crate::clipboard::ClipboardChain;
use crate::config::{self, SharedConfig};
use crate::error::AppError;
use crate::keys::KeySimulator;
use crate::notify::Notifier;

/// "Rewrite in progress" flag. At most one holder at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sets the flag if it was clear. The returned guard clears it again
    /// when dropped, whichever way the holder exits.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flight: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineStage {
    Idle = 0,
    Capturing = 1,
    Rewriting = 2,
    Replacing = 3,
}

impl PipelineStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Capturing,
            2 => Self::Rewriting,
            3 => Self::Replacing,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Replaced,
    NothingCaptured,
    RewriteFailed,
    WriteFailed,
    /// Clipboard was updated but the paste keystroke could not be sent.
    PasteFailed,
    /// The blocking worker was cancelled by runtime shutdown.
    Interrupted,
    Panicked,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineTimings {
    pub before_paste: Duration,
    pub after_paste: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            before_paste: Duration::from_millis(200),
            after_paste: Duration::from_millis(500),
        }
    }
}

/// Capture, rewrite and replace, once.
pub struct Pipeline {
    clipboard: Arc<ClipboardChain>,
    keys: Arc<dyn KeySimulator>,
    rewriter: Arc<dyn RewriteService>,
    notifier: Arc<dyn Notifier>,
    config: SharedConfig,
    timings: PipelineTimings,
    stage: AtomicU8,
}

impl Pipeline {
    pub fn new(
        clipboard: Arc<ClipboardChain>,
        keys: Arc<dyn KeySimulator>,
        rewriter: Arc<dyn RewriteService>,
        notifier: Arc<dyn Notifier>,
        config: SharedConfig,
    ) -> Self {
        Self {
            clipboard,
            keys,
            rewriter,
            notifier,
            config,
            timings: PipelineTimings::default(),
            stage: AtomicU8::new(PipelineStage::Idle as u8),
        }
    }

    pub fn with_timings(mut self, timings: PipelineTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        PipelineStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    fn enter(&self, stage: PipelineStage) {
        log::debug!("Pipeline stage: {:?}", stage);
        self.stage.store(stage as u8, Ordering::Release);
    }

    /// Runs the whole workflow. Every failure, panics included, ends as a
    /// notification and an outcome; nothing escapes to the caller.
    pub async fn run(&self) -> PipelineOutcome {
        let outcome = match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("Pipeline panicked: {}", message);
                self.notifier
                    .notify("Error", &format!("Error processing: {}", message));
                PipelineOutcome::Panicked
            }
        };
        self.enter(PipelineStage::Idle);
        log::info!("Pipeline finished: {:?}", outcome);
        outcome
    }

    async fn execute(&self) -> PipelineOutcome {
        let config = config::snapshot(&self.config);

        self.enter(PipelineStage::Capturing);
        let captured = match self
            .on_worker(|clipboard, keys| clipboard.capture_selection(keys))
            .await
        {
            Some(captured) => captured,
            None => return PipelineOutcome::Interrupted,
        };
        let Some(text) = captured else {
            log::warn!("{}", AppError::ClipboardUnavailable);
            self.notifier
                .notify("Error", "Failed to get text from clipboard");
            return PipelineOutcome::NothingCaptured;
        };

        self.notifier.notify("Processing", "Rephrasing text with AI...");

        self.enter(PipelineStage::Rewriting);
        let request = RewriteRequest::from_config(&config, &text);
        let rewritten = match self.rewriter.rewrite(&request).await {
            Ok(rewritten) => rewritten,
            Err(e) => {
                if e.is_credential_failure() {
                    self.notifier.notify(
                        "API Key Error",
                        "Please check your Google Generative AI API key",
                    );
                } else {
                    self.notifier.notify("Error", "Failed to rephrase text");
                }
                log::error!("{}", AppError::from(e));
                return PipelineOutcome::RewriteFailed;
            }
        };

        self.enter(PipelineStage::Replacing);
        let timings = self.timings;
        let replaced = self
            .on_worker(move |clipboard, keys| replace_selection(clipboard, keys, &rewritten, timings))
            .await
            .unwrap_or(PipelineOutcome::Interrupted);

        match replaced {
            PipelineOutcome::WriteFailed => {
                log::warn!("{}", AppError::ClipboardUnavailable);
                self.notifier
                    .notify("Error", "Failed to set rephrased text to clipboard");
            }
            PipelineOutcome::PasteFailed => {
                self.notifier.notify("Error", "Failed to paste rephrased text");
            }
            _ => {}
        }
        replaced
    }

    /// Runs blocking clipboard and keyboard work off the async threads.
    /// A panic on the worker is resumed here so `run` reports it.
    async fn on_worker<T, F>(&self, work: F) -> Option<T>
    where
        F: FnOnce(&ClipboardChain, &dyn KeySimulator) -> T + Send + 'static,
        T: Send + 'static,
    {
        let clipboard = Arc::clone(&self.clipboard);
        let keys = Arc::clone(&self.keys);
        match tokio::task::spawn_blocking(move || work(&clipboard, keys.as_ref())).await {
            Ok(value) => Some(value),
            Err(e) => match e.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(e) => {
                    log::warn!("Clipboard worker did not finish: {}", e);
                    None
                }
            },
        }
    }
}

fn replace_selection(
    clipboard: &ClipboardChain,
    keys: &dyn KeySimulator,
    text: &str,
    timings: PipelineTimings,
) -> PipelineOutcome {
    if !clipboard.write(text) {
        return PipelineOutcome::WriteFailed;
    }

    sleep(timings.before_paste);
    // Pasting instead of typing keeps chat apps from sending on newlines.
    let pasted = keys.paste();
    sleep(timings.after_paste);
    clipboard.clear();

    match pasted {
        Ok(()) => PipelineOutcome::Replaced,
        Err(e) => {
            log::warn!("Paste keystroke failed: {}", e);
            PipelineOutcome::PasteFailed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}

/// Entry point for the global shortcut.
///
/// Starts a pipeline run unless one is already going; overlapping
/// triggers are dropped, never queued.
pub struct Trigger {
    flight: Arc<SingleFlight>,
    pipeline: Arc<Pipeline>,
    runtime: Handle,
}

impl Trigger {
    pub fn new(pipeline: Arc<Pipeline>, runtime: Handle) -> Self {
        Self {
            flight: SingleFlight::new(),
            pipeline,
            runtime,
        }
    }

    /// Never blocks. Returns the spawned run, or `None` when busy.
    pub fn fire(&self) -> Option<JoinHandle<PipelineOutcome>> {
        let Some(guard) = self.flight.try_acquire() else {
            log::debug!("Rewrite already in progress, dropping trigger");
            return None;
        };

        let pipeline = Arc::clone(&self.pipeline);
        Some(self.runtime.spawn(async move {
            let _guard = guard;
            pipeline.run().await
        }))
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }
}
