use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::dish::NewDish;

/// Public capstone menu document.
pub const DEFAULT_MENU_URL: &str =
    "https://raw.githubusercontent.com/Meta-Mobile-Developer-PC/Working-With-Data-API/main/capstone.json";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("menu request to {url} returned HTTP {status}")]
    Status { status: u16, url: String },
    #[error("malformed menu payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("menu request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "FETCH/NETWORK",
            FetchError::Status { .. } => "FETCH/STATUS",
            FetchError::Payload(_) => "FETCH/PAYLOAD",
            FetchError::Timeout { .. } => "FETCH/TIMEOUT",
        }
    }
}

/// Where the canonical menu comes from.
pub trait MenuSource: Send + Sync {
    fn fetch_menu(&self) -> BoxFuture<'_, Result<Vec<NewDish>, FetchError>>;
}

pub struct HttpMenuSource {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpMenuSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout: None,
        }
    }

    /// Bounds the whole round trip. Without it a hung request waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self) -> Result<Vec<NewDish>, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|err| self.classify(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        let bytes = response.bytes().await.map_err(|err| self.classify(err))?;
        let menu = parse_menu_payload(&bytes)?;
        info!(
            target: "littlelemon",
            event = "menu_fetched",
            url = %self.url,
            accepted = menu.accepted.len(),
            rejected = menu.rejected
        );
        Ok(menu.accepted)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => FetchError::Timeout {
                url: self.url.clone(),
                timeout_ms: timeout.as_millis() as u64,
            },
            _ => FetchError::Network {
                url: self.url.clone(),
                source: err,
            },
        }
    }
}

impl MenuSource for HttpMenuSource {
    fn fetch_menu(&self) -> BoxFuture<'_, Result<Vec<NewDish>, FetchError>> {
        self.fetch().boxed()
    }
}

#[derive(Deserialize)]
struct MenuDocument {
    menu: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct ParsedMenu {
    pub accepted: Vec<NewDish>,
    pub rejected: usize,
}

/// Decodes `{ "menu": [...] }`. A missing array fails the whole payload;
/// individual malformed records are skipped and logged.
pub fn parse_menu_payload(bytes: &[u8]) -> Result<ParsedMenu, FetchError> {
    let document: MenuDocument = serde_json::from_slice(bytes)?;
    let mut parsed = ParsedMenu::default();
    for (index, value) in document.menu.iter().enumerate() {
        match NewDish::from_value(value) {
            Ok(dish) => parsed.accepted.push(dish),
            Err(err) => {
                parsed.rejected += 1;
                warn!(
                    target: "littlelemon",
                    event = "menu_record_rejected",
                    index,
                    code = err.code(),
                    field = err.field(),
                    error = %err
                );
            }
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capstone_shape() {
        let payload = br#"{
            "menu": [
                {"name": "Greek Salad", "price": "12.99", "description": "Crispy", "image": "greekSalad.jpg", "category": "starters"},
                {"name": "Pasta", "price": 18.99, "description": "Penne", "image": "pasta.jpg", "category": "mains", "id": 9}
            ]
        }"#;
        let parsed = parse_menu_payload(payload).unwrap();
        assert_eq!(parsed.rejected, 0);
        assert_eq!(parsed.accepted.len(), 2);
        assert_eq!(parsed.accepted[0].price, 12.99);
        assert_eq!(parsed.accepted[1].category, "mains");
    }

    #[test]
    fn skips_records_without_category() {
        let payload = br#"{"menu": [
            {"name": "Bruschetta", "price": 7.99},
            {"name": "Lemon Dessert", "price": 6.99, "category": "desserts"}
        ]}"#;
        let parsed = parse_menu_payload(payload).unwrap();
        assert_eq!(parsed.rejected, 1);
        assert_eq!(parsed.accepted.len(), 1);
        assert_eq!(parsed.accepted[0].name, "Lemon Dessert");
    }

    #[test]
    fn missing_menu_field_is_a_payload_error() {
        let err = parse_menu_payload(br#"{"items": []}"#).unwrap_err();
        assert_eq!(err.code(), "FETCH/PAYLOAD");
    }

    #[test]
    fn non_json_is_a_payload_error() {
        let err = parse_menu_payload(b"<html>").unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }
}
