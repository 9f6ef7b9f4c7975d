pub mod bandsintown;
pub mod countdown_monitor;
pub mod event_monitor;
pub mod ticketmaster;

use async_trait::async_trait;
use std::fmt::Display;

use crate::error::FetchError;
use crate::utils::MonitorLogger;

pub use countdown_monitor::{CountdownElement, CountdownMonitor};
pub use event_monitor::{Event, EventListMonitor, EventProvider};

/// What one poll found. Carries everything `format_alert` needs.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Countdown elements appeared or changed
    CountdownFound {
        elements: Vec<CountdownElement>,
        count: usize,
    },
    /// A previously seen countdown is gone
    CountdownEnded,
    /// Events not present in the previous run's id sets
    NewEvents { events: Vec<Event>, count: usize },
}

/// Monitor trait, all types of monitors need to implement this trait
#[async_trait]
pub trait Monitor: Send {
    /// State/log namespace, e.g. `bandsintown`
    fn name(&self) -> &str;

    /// Log stream owned by this monitor
    fn logger(&self) -> &MonitorLogger;

    /// Load the persisted state document
    async fn initialize(&mut self);

    /// Execute a check, returns what changed since the last check
    async fn check(&mut self) -> Result<Option<CheckResult>, FetchError>;

    /// Render a check result as a plain-text alert
    fn format_alert(&self, result: &CheckResult) -> String;

    /// Write the state document if the last check changed it
    async fn persist(&mut self);
}

impl Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckResult::CountdownFound { count, .. } => write!(f, "{} countdown element(s)", count),
            CheckResult::CountdownEnded => write!(f, "countdown ended"),
            CheckResult::NewEvents { count, .. } => write!(f, "{} new event(s)", count),
        }
    }
}
