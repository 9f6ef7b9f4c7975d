//! Drives every monitor through check -> alert -> persist, one after another,
//! then sleeps for the configured interval.

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;

use crate::monitors::Monitor;
use crate::notifiers::Notifier;
use crate::utils::format_now;

pub struct Runner {
    monitors: Vec<Box<dyn Monitor>>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    check_count: u64,
}

impl Runner {
    pub fn new(monitors: Vec<Box<dyn Monitor>>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self {
            monitors,
            notifier,
            interval,
            check_count: 0,
        }
    }

    pub fn monitor_names(&self) -> Vec<&str> {
        self.monitors.iter().map(|m| m.name()).collect()
    }

    /// Load every monitor's persisted state
    pub async fn initialize(&mut self) {
        for monitor in &mut self.monitors {
            monitor.initialize().await;
        }
    }

    /// Run until the shutdown flag is raised. Sends startup, stop and fatal
    /// notifications on a best-effort basis.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("🎵 Unified Music Monitor System Starting");
        info!("📊 Active monitors: {}", self.monitors.len());
        for name in self.monitor_names() {
            info!("   - {}", name);
        }
        info!("⏱️  Check interval: {} seconds", self.interval.as_secs());

        self.initialize().await;

        if self.notifier.is_enabled() && !self.monitors.is_empty() {
            let names: Vec<String> = self.monitor_names().into_iter().map(display_name).collect();
            let startup = format!(
                "🎵 Music monitor started!\n\nActive monitors:\n{}\n\nYou'll be notified of new events.",
                names.join(", ")
            );
            self.notify(&startup).await;
        }

        match self.schedule(&mut shutdown).await {
            Ok(()) => {
                info!("🛑 Monitor stopped by user");
                self.notify("🛑 Music monitor stopped").await;
                Ok(())
            }
            Err(e) => {
                error!("❌ Fatal error: {}", e);
                self.notify(&format!("❌ Music monitor error: {}", e)).await;
                Err(e)
            }
        }
    }

    async fn schedule(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        loop {
            self.run_cycle(shutdown).await;
            if *shutdown.borrow() {
                return Ok(());
            }

            info!("💤 Sleeping {}s until next check...", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                    changed.map_err(|_| anyhow!("shutdown signal channel closed"))?;
                }
            }
        }
    }

    /// One pass over all monitors in configuration order. Returns how many
    /// monitors reported new data. The shutdown flag is honoured between
    /// monitors, never mid-check.
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> usize {
        self.check_count += 1;
        info!("{}", "=".repeat(60));
        info!("Check #{} - {}", self.check_count, format_now());
        info!("{}", "=".repeat(60));

        let mut detected = 0;
        for monitor in &mut self.monitors {
            if *shutdown.borrow() {
                break;
            }
            if process_monitor(monitor.as_mut(), self.notifier.as_ref()).await {
                detected += 1;
            }
        }
        detected
    }

    /// System-level message, logged against the first monitor
    async fn notify(&self, message: &str) -> bool {
        match self.monitors.first() {
            Some(monitor) => self.notifier.send(message, monitor.logger()).await,
            None => false,
        }
    }
}

/// Guarded check of a single monitor; failures stay inside this monitor
async fn process_monitor(monitor: &mut dyn Monitor, notifier: &dyn Notifier) -> bool {
    let log = monitor.logger().clone();
    log.log("Running check...");

    match monitor.check().await {
        Ok(Some(result)) => {
            log.log(&format!("✨ New data detected! ({})", result));
            let alert = monitor.format_alert(&result);
            notifier.send(&alert, &log).await;
            monitor.persist().await;
            true
        }
        Ok(None) => {
            log.log("No new data");
            monitor.persist().await;
            false
        }
        Err(e) => {
            log.log(&format!("❌ Check failed: {}", e));
            false
        }
    }
}

/// `taylor_swift` -> `Taylor Swift`
pub fn display_name(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C signal");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}

/// Flag raised once an operator signal arrives. A second signal while the
/// current work drains exits the process. If the handler cannot be installed
/// the sender is dropped, which the runner treats as fatal.
pub fn watch_shutdown() -> watch::Receiver<bool> {
    watch_signals(shutdown_signal, || {
        std::process::exit(130);
    })
}

fn watch_signals<S, F, R>(signal: S, on_repeat: R) -> watch::Receiver<bool>
where
    S: Fn() -> F + Send + 'static,
    F: Future<Output = std::io::Result<()>> + Send,
    R: FnOnce() + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal().await {
            error!("Failed to install signal handler: {}", e);
            return;
        }
        let _ = tx.send(true);
        info!("Finishing current check, press Ctrl+C again to force exit");

        match signal().await {
            Ok(()) => {
                warn!("Second signal received, exiting immediately");
                on_repeat();
            }
            Err(e) => error!("Failed to install signal handler: {}", e),
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, NotifyError};
    use crate::monitors::{CheckResult, Event};
    use crate::utils::MonitorLogger;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Outcome {
        Found,
        Quiet,
        Broken,
    }

    struct FakeMonitor {
        name: String,
        outcome: Outcome,
        logger: MonitorLogger,
        checks: Arc<AtomicUsize>,
        persists: Arc<AtomicUsize>,
    }

    impl FakeMonitor {
        fn new(name: &str, outcome: Outcome, dir: &Path) -> Self {
            Self {
                name: name.to_string(),
                outcome,
                logger: MonitorLogger::new(name, dir),
                checks: Arc::new(AtomicUsize::new(0)),
                persists: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Monitor for FakeMonitor {
        fn name(&self) -> &str {
            &self.name
        }

        fn logger(&self) -> &MonitorLogger {
            &self.logger
        }

        async fn initialize(&mut self) {}

        async fn check(&mut self) -> Result<Option<CheckResult>, FetchError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Found => Ok(Some(CheckResult::NewEvents {
                    events: vec![Event {
                        id: "e3".to_string(),
                        artist: "Taylor Swift".to_string(),
                        name: None,
                        venue: "Wembley Stadium".to_string(),
                        location: "London".to_string(),
                        date: "2024-06-21".to_string(),
                        url: String::new(),
                    }],
                    count: 1,
                })),
                Outcome::Quiet => Ok(None),
                Outcome::Broken => Err(FetchError::Status(StatusCode::BAD_GATEWAY)),
            }
        }

        fn format_alert(&self, result: &CheckResult) -> String {
            format!("{}: {}", self.name, result)
        }

        async fn persist(&mut self) {
            self.persists.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn deliver(&self, message: &str) -> Result<String, NotifyError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.to_string());
            Ok(format!("SM{}", sent.len()))
        }
    }

    fn runner(monitors: Vec<FakeMonitor>, notifier: &Arc<RecordingNotifier>) -> Runner {
        let monitors = monitors
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn Monitor>)
            .collect();
        Runner::new(monitors, notifier.clone(), Duration::from_secs(3600))
    }

    fn sent(notifier: &RecordingNotifier) -> Vec<String> {
        notifier.sent.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn failing_monitor_does_not_abort_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let broken = FakeMonitor::new("taylor_swift", Outcome::Broken, dir.path());
        let healthy = FakeMonitor::new("bandsintown", Outcome::Found, dir.path());
        let broken_persists = broken.persists.clone();
        let healthy_persists = healthy.persists.clone();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(vec![broken, healthy], &notifier);
        let (_tx, rx) = watch::channel(false);

        let detected = runner.run_cycle(&rx).await;

        assert_eq!(detected, 1);
        assert_eq!(sent(&notifier), vec!["bandsintown: 1 new event(s)"]);
        assert_eq!(broken_persists.load(Ordering::SeqCst), 0);
        assert_eq!(healthy_persists.load(Ordering::SeqCst), 1);

        let broken_log = std::fs::read_to_string(dir.path().join("taylor_swift_monitor.log")).unwrap();
        assert!(broken_log.contains("❌ Check failed: HTTP request failed, status code: 502 Bad Gateway"));
        let healthy_log = std::fs::read_to_string(dir.path().join("bandsintown_monitor.log")).unwrap();
        assert!(healthy_log.contains("📱 SMS sent (SID: SM1)"));
    }

    #[tokio::test]
    async fn quiet_monitor_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let quiet = FakeMonitor::new("ticketmaster", Outcome::Quiet, dir.path());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(vec![quiet], &notifier);
        let (_tx, rx) = watch::channel(false);

        assert_eq!(runner.run_cycle(&rx).await, 0);
        assert!(sent(&notifier).is_empty());
    }

    #[tokio::test]
    async fn raised_flag_stops_between_monitors_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let first = FakeMonitor::new("taylor_swift", Outcome::Found, dir.path());
        let checks = first.checks.clone();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(vec![first], &notifier);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        runner.run(rx).await.unwrap();

        assert_eq!(checks.load(Ordering::SeqCst), 0);
        let messages = sent(&notifier);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("🎵 Music monitor started!"));
        assert!(messages[0].contains("Taylor Swift"));
        assert_eq!(messages[1], "🛑 Music monitor stopped");
    }

    #[tokio::test]
    async fn lost_signal_channel_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = FakeMonitor::new("bandsintown", Outcome::Quiet, dir.path());
        let checks = monitor.checks.clone();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(vec![monitor], &notifier);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let err = runner.run(rx).await.unwrap_err();

        assert_eq!(err.to_string(), "shutdown signal channel closed");
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        let messages = sent(&notifier);
        assert_eq!(messages.last().unwrap(), "❌ Music monitor error: shutdown signal channel closed");
    }

    #[tokio::test]
    async fn no_monitors_means_no_notifications() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(Vec::new(), &notifier);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        runner.run(rx).await.unwrap();

        assert!(sent(&notifier).is_empty());
    }

    #[test]
    fn display_names_are_title_cased() {
        assert_eq!(display_name("taylor_swift"), "Taylor Swift");
        assert_eq!(display_name("bandsintown"), "Bandsintown");
    }

    #[tokio::test]
    async fn shutdown_signal_waits() {
        let result = tokio::time::timeout(Duration::from_millis(10), shutdown_signal()).await;
        assert!(result.is_err(), "shutdown_signal should wait for a signal");
    }

    #[tokio::test]
    async fn second_signal_forces_exit() {
        let signals = Arc::new(tokio::sync::Notify::new());
        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
        let source = signals.clone();
        let mut rx = watch_signals(
            move || {
                let source = source.clone();
                async move {
                    source.notified().await;
                    Ok(())
                }
            },
            move || {
                let _ = exit_tx.send(());
            },
        );

        signals.notify_one();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow());

        signals.notify_one();
        tokio::time::timeout(Duration::from_secs(1), exit_rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn single_signal_only_raises_flag() {
        let signals = Arc::new(tokio::sync::Notify::new());
        let (exit_tx, mut exit_rx) = tokio::sync::oneshot::channel::<()>();
        let source = signals.clone();
        let mut rx = watch_signals(
            move || {
                let source = source.clone();
                async move {
                    source.notified().await;
                    Ok(())
                }
            },
            move || {
                let _ = exit_tx.send(());
            },
        );

        signals.notify_one();
        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(exit_rx.try_recv().is_err());
    }
}
