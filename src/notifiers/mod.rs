pub mod twilio;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::utils::MonitorLogger;

/// Notification service trait, every outbound channel implements it
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether credentials were present at startup
    fn is_enabled(&self) -> bool;

    /// Submit one message, returns the provider's message id
    async fn deliver(&self, message: &str) -> Result<String, NotifyError>;

    /// Fire-and-forget send with the outcome written to `log`.
    /// No retry: a failed message is dropped.
    async fn send(&self, message: &str, log: &MonitorLogger) -> bool {
        if !self.is_enabled() {
            return false;
        }

        match self.deliver(message).await {
            Ok(id) => {
                log.log(&format!("📱 SMS sent (SID: {})", id));
                true
            }
            Err(e) => {
                log.log(&format!("❌ Failed to send SMS: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    struct RejectingNotifier {
        enabled: bool,
    }

    #[async_trait]
    impl Notifier for RejectingNotifier {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn deliver(&self, _message: &str) -> Result<String, NotifyError> {
            Err(NotifyError::Rejected {
                status: StatusCode::BAD_REQUEST,
                message: "The 'To' number is not a valid phone number.".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn rejected_message_is_logged_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = MonitorLogger::new("bandsintown", dir.path());
        let notifier = RejectingNotifier { enabled: true };

        assert!(!notifier.send("🎵 NEW CONCERT ALERT!", &log).await);

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains(
            "❌ Failed to send SMS: provider rejected message (400 Bad Request): \
             The 'To' number is not a valid phone number."
        ));
        assert!(!content.contains("SMS sent"));
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = MonitorLogger::new("bandsintown", dir.path());
        let notifier = RejectingNotifier { enabled: false };

        assert!(!notifier.send("hello", &log).await);
        assert!(!log.path().exists());
    }
}
