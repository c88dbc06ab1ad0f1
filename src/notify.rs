/// Fire-and-forget user notifications.
///
/// Implementations swallow their own failures; callers never see them.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Writes notifications to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        if title.contains("Error") {
            log::error!("[{}] {}", title, message);
        } else {
            log::info!("[{}] {}", title, message);
        }
    }
}
