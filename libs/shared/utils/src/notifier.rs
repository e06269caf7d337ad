use tokio::sync::broadcast;
use tracing::{debug, error, info};

use shared_models::notification::{Notification, NotificationLevel};

pub type NotificationReceiver = broadcast::Receiver<Notification>;

/// Fan-out of user-facing notifications.
///
/// Every notification is logged and broadcast to whoever renders them; having
/// no subscriber is not an error.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.sender.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => error!(details = ?notification.details, "{}", notification.message),
            NotificationLevel::Success | NotificationLevel::Info => info!("{}", notification.message),
        }

        if self.sender.send(notification).is_err() {
            debug!("No notification subscribers");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Notification::new(NotificationLevel::Success, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(Notification::new(NotificationLevel::Info, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Notification::new(NotificationLevel::Error, message));
    }

    pub fn error_with_details(&self, message: impl Into<String>, details: Vec<String>) {
        self.notify(Notification::new(NotificationLevel::Error, message).with_details(details));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains everything currently buffered on a receiver. Lagged notifications
/// are skipped.
pub fn drain(receiver: &mut NotificationReceiver) -> Vec<Notification> {
    let mut notifications = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(notification) => notifications.push(notification),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    notifications
}
