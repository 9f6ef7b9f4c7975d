use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::error::FetchError;
use crate::monitors::event_monitor::{fetch_json, render_alert, text_field};
use crate::monitors::{Event, EventProvider};

pub const TICKETMASTER_API: &str = "https://app.ticketmaster.com/discovery/v2/events.json";

/// Results requested per artist
const PAGE_SIZE: &str = "20";

/// Ticketmaster Discovery API keyword search, restricted to music events
pub struct TicketmasterFeed {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TicketmasterFeed {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            base_url: TICKETMASTER_API.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn query<'a>(&'a self, artist: &'a str) -> [(&'static str, &'a str); 4] {
        [
            ("apikey", self.api_key.as_str()),
            ("keyword", artist),
            ("classificationName", "Music"),
            ("size", PAGE_SIZE),
        ]
    }
}

/// Map a Discovery API search response onto `Event`s
pub fn parse_events(artist: &str, body: &Value) -> Vec<Event> {
    let Some(items) = body["_embedded"]["events"].as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(id) = text_field(&item["id"]) else {
                debug!("Dropping Ticketmaster event without id for {}", artist);
                return None;
            };
            let venue = &item["_embedded"]["venues"][0];
            let city = venue["city"]["name"].as_str().unwrap_or_default();
            let state = venue["state"]["stateCode"].as_str().unwrap_or_default();
            let location = [city, state]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(", ");

            Some(Event {
                id,
                artist: artist.to_string(),
                name: Some(item["name"].as_str().unwrap_or("Unknown Event").to_string()),
                venue: venue["name"].as_str().unwrap_or("Unknown").to_string(),
                location: if location.is_empty() { "Unknown".to_string() } else { location },
                date: item["dates"]["start"]["localDate"].as_str().unwrap_or("Unknown").to_string(),
                url: item["url"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl EventProvider for TicketmasterFeed {
    fn name(&self) -> &str {
        "ticketmaster"
    }

    async fn fetch_events(&self, artist: &str) -> Result<Option<Vec<Event>>, FetchError> {
        let request = self.client.get(&self.base_url).query(&self.query(artist));
        let body = fetch_json(request).await?;
        Ok(body.map(|body| parse_events(artist, &body)))
    }

    fn format_alert(&self, events: &[Event], count: usize) -> String {
        render_alert(
            "🎟️ NEW TICKETMASTER EVENT!",
            &format!("{} new event(s) found:", count),
            events,
            count,
            |event| {
                let name = event.name.clone().unwrap_or_else(|| event.artist.clone());
                (name, event.date.clone())
            },
        )
    }
}
