use async_trait::async_trait;
use chrono::Local;
use log::debug;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::config::Paths;
use crate::error::FetchError;
use crate::monitors::{CheckResult, Monitor};
use crate::utils::{MonitorLogger, StateStore};

/// Pause between artist lookups, keeps rate-limited APIs happy
pub const ARTIST_DELAY: Duration = Duration::from_millis(500);

/// Events listed in full inside one alert
const ALERT_EVENT_LIMIT: usize = 3;

/// A scheduled show. Identity is the provider's `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub artist: String,
    /// Event title, when the provider has one
    pub name: Option<String>,
    pub venue: String,
    pub location: String,
    pub date: String,
    pub url: String,
}

/// Per-artist snapshot of the last successful fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistState {
    #[serde(default)]
    pub event_ids: Vec<String>,
    #[serde(default)]
    pub last_check: String,
}

/// Artist name -> snapshot
pub type EventState = BTreeMap<String, ArtistState>;

/// A tour-date feed queried once per artist
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Monitor name, also the state/log namespace
    fn name(&self) -> &str;

    /// Events currently listed for `artist`. `Ok(None)` means the provider
    /// answered with a non-200 status and the artist is skipped.
    async fn fetch_events(&self, artist: &str) -> Result<Option<Vec<Event>>, FetchError>;

    /// Render newly found events as an SMS body
    fn format_alert(&self, events: &[Event], count: usize) -> String;
}

/// Send a feed request and decode the JSON body. Non-200 answers yield `None`.
pub(crate) async fn fetch_json(request: RequestBuilder) -> Result<Option<Value>, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        debug!("Feed returned status {}, skipping", status);
        return Ok(None);
    }
    Ok(Some(response.json().await?))
}

/// Render a string field, tolerating numeric ids
pub(crate) fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Common alert layout: header, summary, first few events, overflow line
pub(crate) fn render_alert<F>(header: &str, summary: &str, events: &[Event], count: usize, title: F) -> String
where
    F: Fn(&Event) -> (String, String),
{
    let mut message = format!("{}\n\n{}\n\n", header, summary);

    for event in events.iter().take(ALERT_EVENT_LIMIT) {
        let (headline, date) = title(event);
        message.push_str(&format!("🎤 {}\n", headline));
        message.push_str(&format!("📍 {}, {}\n", event.venue, event.location));
        message.push_str(&format!("📅 {}\n\n", date));
    }

    if count > ALERT_EVENT_LIMIT {
        message.push_str(&format!("...and {} more!", count - ALERT_EVENT_LIMIT));
    }

    message
}

/// Watches a tour-date feed for events that were not listed last time
pub struct EventListMonitor {
    provider: Box<dyn EventProvider>,
    artists: Vec<String>,
    state: EventState,
    store: StateStore,
    logger: MonitorLogger,
    artist_delay: Duration,
    dirty: bool,
}

impl EventListMonitor {
    pub fn new(provider: Box<dyn EventProvider>, artists: Vec<String>, paths: &Paths) -> Self {
        let logger = MonitorLogger::new(provider.name(), &paths.log_dir);
        let store = StateStore::new(provider.name(), &paths.data_dir, logger.clone());

        Self {
            provider,
            artists,
            state: EventState::new(),
            store,
            logger,
            artist_delay: ARTIST_DELAY,
            dirty: false,
        }
    }

    pub fn with_artist_delay(mut self, delay: Duration) -> Self {
        self.artist_delay = delay;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &EventState {
        &self.state
    }

    /// Diff one artist's listing against the last run and replace the stored
    /// id set with the full current one
    pub fn record_artist(&mut self, artist: &str, events: Vec<Event>) -> Vec<Event> {
        let previous: HashSet<String> = self
            .state
            .get(artist)
            .map(|s| s.event_ids.iter().cloned().collect())
            .unwrap_or_default();

        let current_ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
        let new_events: Vec<Event> = events
            .into_iter()
            .filter(|e| !previous.contains(&e.id))
            .collect();

        self.state.insert(
            artist.to_string(),
            ArtistState {
                event_ids: current_ids,
                last_check: Local::now().to_rfc3339(),
            },
        );
        self.dirty = true;

        new_events
    }
}

#[async_trait]
impl Monitor for EventListMonitor {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn logger(&self) -> &MonitorLogger {
        &self.logger
    }

    async fn initialize(&mut self) {
        self.state = self.store.load();
    }

    async fn check(&mut self) -> Result<Option<CheckResult>, FetchError> {
        let mut all_new = Vec::new();
        let artists = self.artists.clone();

        for artist in &artists {
            match self.provider.fetch_events(artist).await {
                Ok(Some(events)) => {
                    debug!("{}: {} listed event(s) for {}", self.provider.name(), events.len(), artist);
                    let new_events = self.record_artist(artist, events);
                    if !new_events.is_empty() {
                        self.logger.log(&format!("{} new event(s) for {}", new_events.len(), artist));
                    }
                    all_new.extend(new_events);
                }
                Ok(None) => {}
                Err(e) => {
                    self.logger.log(&format!("Error checking {}: {}", artist, e));
                }
            }

            if !self.artist_delay.is_zero() {
                tokio::time::sleep(self.artist_delay).await;
            }
        }

        if all_new.is_empty() {
            return Ok(None);
        }

        let count = all_new.len();
        Ok(Some(CheckResult::NewEvents {
            events: all_new,
            count,
        }))
    }

    fn format_alert(&self, result: &CheckResult) -> String {
        match result {
            CheckResult::NewEvents { events, count } => self.provider.format_alert(events, *count),
            other => format!("{} update: {}", self.provider.name(), other),
        }
    }

    async fn persist(&mut self) {
        if self.dirty && self.store.save(&self.state) {
            self.dirty = false;
        }
    }
}
