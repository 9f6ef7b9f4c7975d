use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::error::FetchError;
use crate::monitors::event_monitor::{fetch_json, render_alert, text_field};
use crate::monitors::{Event, EventProvider};

pub const BANDSINTOWN_API: &str = "https://rest.bandsintown.com/artists";

/// Application id sent with every Bandsintown request
pub const BANDSINTOWN_APP_ID: &str = "unified_monitor";

/// Bandsintown artist-events feed
pub struct BandsintownFeed {
    client: Client,
    base_url: String,
    app_id: String,
}

impl BandsintownFeed {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: BANDSINTOWN_API.to_string(),
            app_id: BANDSINTOWN_APP_ID.to_string(),
        }
    }

    /// `<base>/<artist>/events/?app_id=<id>` with the artist as an encoded path segment
    pub fn events_url(&self, artist: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Url(self.base_url.clone()))?
            .pop_if_empty()
            .push(artist)
            .push("events")
            .push("");
        url.query_pairs_mut().append_pair("app_id", &self.app_id);
        Ok(url)
    }
}

/// Map a Bandsintown events array onto `Event`s. Entries without an id are
/// dropped. Any other body (an `errorMessage` object, say) yields `None`.
pub fn parse_events(artist: &str, body: &Value) -> Option<Vec<Event>> {
    let Some(items) = body.as_array() else {
        debug!("Unexpected Bandsintown payload for {}: {}", artist, body);
        return None;
    };

    let events = items
        .iter()
        .filter_map(|item| {
            let Some(id) = text_field(&item["id"]) else {
                debug!("Dropping Bandsintown event without id for {}", artist);
                return None;
            };
            let venue = &item["venue"];
            Some(Event {
                id,
                artist: artist.to_string(),
                name: None,
                venue: venue["name"].as_str().unwrap_or("Unknown").to_string(),
                location: venue["location"].as_str().unwrap_or("Unknown").to_string(),
                date: item["datetime"].as_str().unwrap_or("Unknown").to_string(),
                url: item["url"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect();
    Some(events)
}

#[async_trait]
impl EventProvider for BandsintownFeed {
    fn name(&self) -> &str {
        "bandsintown"
    }

    async fn fetch_events(&self, artist: &str) -> Result<Option<Vec<Event>>, FetchError> {
        let url = self.events_url(artist)?;
        let body = fetch_json(self.client.get(url)).await?;
        Ok(body.and_then(|body| parse_events(artist, &body)))
    }

    fn format_alert(&self, events: &[Event], count: usize) -> String {
        render_alert(
            "🎵 NEW CONCERT ALERT!",
            &format!("{} new show(s) announced:", count),
            events,
            count,
            |event| {
                // date part of an ISO datetime
                let date = event.date.split('T').next().unwrap_or(&event.date);
                (event.artist.clone(), date.to_string())
            },
        )
    }
}
