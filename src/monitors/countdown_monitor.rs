use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::debug;
use regex::Regex;
use reqwest::header::USER_AGENT;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Paths;
use crate::error::FetchError;
use crate::monitors::{CheckResult, Monitor};
use crate::utils::{truncate_chars, MonitorLogger, StateStore};

/// Browser-like agent sent to storefronts
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const MAX_TEXT_CHARS: usize = 200;
const MAX_SCRIPT_CHARS: usize = 500;
const PREVIEW_CHARS: usize = 100;

const MARKER_ATTRIBUTES: [&str; 3] = ["data-countdown", "data-timer", "data-launch-date"];
const SCRIPT_KEYWORDS: [&str; 4] = ["countdown", "timer", "setinterval", "launch"];

/// Which heuristic produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Element,
    Text,
    Script,
    DataAttribute,
}

/// One countdown-looking thing found on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub tag: Option<String>,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
}

/// Persisted snapshot of the last alerted countdown set. `{}` when none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountdownState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl CountdownState {
    fn has_countdown(&self) -> bool {
        self.hash.as_deref().map_or(false, |h| !h.is_empty())
    }
}

/// Pattern matcher applying the four countdown heuristics to a page
pub struct CountdownDetector {
    marker: Regex,
    phrase: Regex,
    date_literal: Regex,
    with_class: Selector,
    with_id: Selector,
    scripts: Selector,
    marker_attributes: Vec<Selector>,
}

impl CountdownDetector {
    pub fn new() -> Result<Self> {
        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|e| anyhow!("Invalid pattern {}: {}", pattern, e))
        };
        let selector = |css: &str| {
            Selector::parse(css).map_err(|e| anyhow!("Invalid selector {}: {:?}", css, e))
        };

        let mut marker_attributes = Vec::new();
        for attr in MARKER_ATTRIBUTES {
            let css = format!("[{}]", attr);
            marker_attributes.push(selector(css.as_str())?);
        }

        Ok(Self {
            marker: regex(r"(?i)countdown|timer|clock")?,
            phrase: regex(r"(?i)countdown|coming soon|launching|drops in")?,
            date_literal: regex(r"\d{4}-\d{2}-\d{2}|\d{2}:\d{2}:\d{2}")?,
            with_class: selector("[class]")?,
            with_id: selector("[id]")?,
            scripts: selector("script")?,
            marker_attributes,
        })
    }

    /// Run every heuristic in turn. Hits are concatenated in heuristic order
    /// and never deduplicated, so one node may appear more than once.
    pub fn detect(&self, html: &str) -> Vec<CountdownElement> {
        let document = Html::parse_document(html);
        let mut found = Vec::new();

        // class or id naming a countdown widget
        for elem in document.select(&self.with_class) {
            if elem.value().classes().any(|c| self.marker.is_match(c)) {
                found.push(element_record(ElementKind::Element, elem, false));
            }
        }
        for elem in document.select(&self.with_id) {
            if elem.value().id().map_or(false, |id| self.marker.is_match(id)) {
                found.push(element_record(ElementKind::Element, elem, false));
            }
        }

        // visible text announcing a launch
        for node in document.tree.root().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let parent = node.parent().and_then(ElementRef::wrap);
            let parent_tag = parent.map(|p| p.value().name().to_string());
            if matches!(parent_tag.as_deref(), Some("script" | "style")) {
                continue;
            }
            let content: &str = text;
            if self.phrase.is_match(content) {
                found.push(CountdownElement {
                    kind: ElementKind::Text,
                    tag: parent_tag,
                    text: truncate_chars(content.trim(), MAX_TEXT_CHARS),
                    attributes: BTreeMap::new(),
                });
            }
        }

        // marker data attributes
        for selector in &self.marker_attributes {
            for elem in document.select(selector) {
                found.push(element_record(ElementKind::DataAttribute, elem, true));
            }
        }

        // inline scripts carrying a countdown keyword and a date/time literal
        for script in document.select(&self.scripts) {
            let content: String = script.text().collect();
            if content.is_empty() {
                continue;
            }
            let lower = content.to_lowercase();
            if SCRIPT_KEYWORDS.iter().any(|k| lower.contains(k))
                && self.date_literal.is_match(&content)
            {
                found.push(CountdownElement {
                    kind: ElementKind::Script,
                    tag: Some("script".to_string()),
                    text: truncate_chars(&content, MAX_SCRIPT_CHARS),
                    attributes: BTreeMap::new(),
                });
            }
        }

        found
    }
}

fn element_record(kind: ElementKind, elem: ElementRef<'_>, marker_only: bool) -> CountdownElement {
    let value = elem.value();
    let attributes = if marker_only {
        value
            .attrs()
            .filter(|(name, _)| {
                let name = name.to_lowercase();
                name.contains("countdown") || name.contains("timer") || name.contains("launch")
            })
            .map(|(name, v)| (name.to_string(), v.to_string()))
            .collect()
    } else {
        let mut attrs = BTreeMap::new();
        // raw attribute keeps source order
        if let Some(class) = value.attr("class") {
            attrs.insert("class".to_string(), class.to_string());
        }
        if let Some(id) = value.id() {
            attrs.insert("id".to_string(), id.to_string());
        }
        attrs
    };

    // stripped text pieces glued together
    let text: String = elem.text().map(str::trim).filter(|t| !t.is_empty()).collect();

    CountdownElement {
        kind,
        tag: Some(value.name().to_string()),
        text: truncate_chars(&text, MAX_TEXT_CHARS),
        attributes,
    }
}

/// Key-sorted JSON of the whole ordered hit list. Order-sensitive.
pub fn canonical_form(elements: &[CountdownElement]) -> String {
    serde_json::to_value(elements)
        .map(|value| value.to_string())
        .unwrap_or_default()
}

/// Storefront countdown monitor, alerts when countdown widgets appear,
/// change or disappear
pub struct CountdownMonitor {
    name: String,
    /// Human label used in alerts, e.g. "Taylor Swift"
    label: String,
    url: String,
    /// Host shown in alerts
    site: String,
    client: Client,
    detector: CountdownDetector,
    state: CountdownState,
    store: StateStore,
    logger: MonitorLogger,
    dirty: bool,
}

impl CountdownMonitor {
    pub fn new(name: &str, label: &str, url: &str, client: Client, paths: &Paths) -> Result<Self> {
        let logger = MonitorLogger::new(name, &paths.log_dir);
        let store = StateStore::new(name, &paths.data_dir, logger.clone());
        let site = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        Ok(Self {
            name: name.to_string(),
            label: label.to_string(),
            url: url.to_string(),
            site,
            client,
            detector: CountdownDetector::new()?,
            state: CountdownState::default(),
            store,
            logger,
            dirty: false,
        })
    }

    #[cfg(test)]
    pub fn state(&self) -> &CountdownState {
        &self.state
    }

    async fn fetch_page(&self) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let html = response.text().await?;
        debug!("Fetched {}: {} bytes", self.url, html.len());
        Ok(html)
    }

    /// Compare detected elements with the stored snapshot and stage the new one
    pub fn evaluate(&mut self, elements: Vec<CountdownElement>) -> Option<CheckResult> {
        let count = elements.len();

        if count == 0 {
            if self.state.has_countdown() {
                self.logger.log("📭 No countdown detected (countdown may have ended)");
                self.state = CountdownState::default();
                self.dirty = true;
                return Some(CheckResult::CountdownEnded);
            }
            self.logger.log("📭 No countdown detected");
            return None;
        }

        let hash = canonical_form(&elements);
        if self.state.hash.as_deref() == Some(hash.as_str()) {
            self.logger.log(&format!(
                "✓ Countdown still active ({} elements, no changes)",
                count
            ));
            return None;
        }

        self.logger.log(&format!(
            "🎉 NEW COUNTDOWN DETECTED! Found {} countdown element(s)",
            count
        ));
        self.state = CountdownState {
            hash: Some(hash),
            timestamp: Some(Local::now()),
            count: Some(count),
        };
        self.dirty = true;
        Some(CheckResult::CountdownFound { elements, count })
    }
}

#[async_trait]
impl Monitor for CountdownMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn logger(&self) -> &MonitorLogger {
        &self.logger
    }

    async fn initialize(&mut self) {
        self.state = self.store.load();
    }

    async fn check(&mut self) -> Result<Option<CheckResult>, FetchError> {
        self.logger.log(&format!("Checking {}...", self.url));

        let html = match self.fetch_page().await {
            Ok(html) => html,
            Err(e) => {
                self.logger.log(&format!("Error checking website: {}", e));
                return Ok(None);
            }
        };

        let elements = self.detector.detect(&html);
        Ok(self.evaluate(elements))
    }

    fn format_alert(&self, result: &CheckResult) -> String {
        match result {
            CheckResult::CountdownFound { elements, count } => {
                let mut message = format!("🚨 NEW {} countdown detected!\n\n", self.label);
                message.push_str(&format!("Found {} countdown(s) on {}\n\n", count, self.site));

                let previews: Vec<String> = elements
                    .iter()
                    .filter(|e| !e.text.is_empty())
                    .take(2)
                    .map(|e| truncate_chars(&e.text, PREVIEW_CHARS))
                    .collect();
                if !previews.is_empty() {
                    message.push_str("Preview:\n");
                    message.push_str(&previews.join("\n"));
                }
                message
            }
            CheckResult::CountdownEnded => format!(
                "ℹ️ {} countdown has ended or been removed from {}",
                self.label, self.site
            ),
            other => format!("{} update: {}", self.label, other),
        }
    }

    async fn persist(&mut self) {
        if self.dirty && self.store.save(&self.state) {
            self.dirty = false;
        }
    }
}
