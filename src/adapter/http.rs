//! JSON-over-HTTP platform gateway.
//!
//! Talks to a gateway service exposing the feed and playback surfaces of a
//! streaming platform:
//!
//! | call                     | request                              |
//! |--------------------------|--------------------------------------|
//! | discover                 | `GET  {base}/feed/{kind}`            |
//! | search                   | `GET  {base}/search?q=..&limit=..`   |
//! | report_playback_start    | `POST {base}/playback/start`         |
//! | resolve                  | `GET  {base}/items/{id}/playback`    |
//! | heartbeat                | `POST {base}/playback/heartbeat`     |
//! | report_progress          | `POST {base}/playback/progress`      |

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    AdapterError, AdapterResult, ContentSource, Heartbeat, Platform, PlaybackChannel,
    PlaybackTarget,
};
use crate::config::Config;
use crate::config::secrets::{ExposeSecret, SecretString};
use crate::error::{Error, Result};
use crate::model::{ContentItem, SourceKind};

const USER_AGENT: &str = concat!("feedshaper/", env!("CARGO_PKG_VERSION"));

pub struct HttpGateway {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    item_id: &'a str,
}

#[derive(Serialize)]
struct HeartbeatRequest<'a> {
    item_id: &'a str,
    #[serde(flatten)]
    beat: &'a Heartbeat,
    identifiers: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ProgressRequest<'a> {
    item_id: &'a str,
    position_secs: f64,
    identifiers: &'a BTreeMap<String, String>,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid platform_url {raw:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("platform_url {raw:?} cannot take a path")));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// [`PlatformFactory`](super::PlatformFactory) for the `http` platform.
    pub fn from_config(config: &Config) -> Result<Platform> {
        let base_url = config
            .platform_url
            .as_deref()
            .ok_or_else(|| Error::Config("platform `http` requires platform_url".into()))?;
        let token = config
            .platform_token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_owned()));
        let gateway = Self::new(base_url, token, config.call_timeout)?;
        Ok(Platform::new("http", gateway))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint under the base path. Each segment is percent-encoded, so
    /// platform ids can never escape their slot.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AdapterResult<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AdapterError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AdapterError::NotFound(endpoint.to_string()));
        }
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AdapterResult<T> {
        self.send(endpoint, request)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("{endpoint}: {e}")))
    }

    async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> AdapterResult<()> {
        let segments: Vec<&str> = endpoint.split('/').collect();
        let request = self.client.post(self.url(&segments)).json(body);
        self.send(endpoint, request).await?;
        Ok(())
    }
}

fn tag_source(mut items: Vec<ContentItem>, kind: SourceKind) -> Vec<ContentItem> {
    for item in &mut items {
        item.source = kind;
    }
    items
}

#[async_trait]
impl ContentSource for HttpGateway {
    async fn discover(&self, kind: SourceKind) -> AdapterResult<Vec<ContentItem>> {
        let endpoint = format!("feed/{kind}");
        let request = self.client.get(self.url(&["feed", &kind.to_string()]));
        let items: Vec<ContentItem> = self.get_json(&endpoint, request).await?;
        debug!(kind = %kind, count = items.len(), "feed fetched");
        Ok(tag_source(items, kind))
    }

    async fn search(&self, keyword: &str, limit: usize) -> AdapterResult<Vec<ContentItem>> {
        let request = self
            .client
            .get(self.url(&["search"]))
            .query(&[("q", keyword.to_string()), ("limit", limit.to_string())]);
        let mut items: Vec<ContentItem> = self.get_json("search", request).await?;
        items.truncate(limit);
        Ok(tag_source(items, SourceKind::Search))
    }

    async fn report_playback_start(&self, item: &ContentItem) -> AdapterResult<()> {
        self.post("playback/start", &StartRequest { item_id: &item.id }).await
    }
}

#[async_trait]
impl PlaybackChannel for HttpGateway {
    async fn resolve(&self, item: &ContentItem) -> AdapterResult<PlaybackTarget> {
        let endpoint = format!("items/{}/playback", item.id);
        let request = self.client.get(self.url(&["items", &item.id, "playback"]));
        let target: PlaybackTarget = self.get_json(&endpoint, request).await?;
        if target.item_id != item.id {
            return Err(AdapterError::Decode(format!(
                "resolved {} for requested {}",
                target.item_id, item.id
            )));
        }
        Ok(target)
    }

    async fn heartbeat(&self, target: &PlaybackTarget, beat: &Heartbeat) -> AdapterResult<()> {
        let body = HeartbeatRequest {
            item_id: &target.item_id,
            beat,
            identifiers: &target.identifiers,
        };
        self.post("playback/heartbeat", &body).await
    }

    async fn report_progress(
        &self,
        target: &PlaybackTarget,
        position_secs: f64,
    ) -> AdapterResult<()> {
        let body = ProgressRequest {
            item_id: &target.item_id,
            position_secs,
            identifiers: &target.identifiers,
        };
        self.post("playback/progress", &body).await
    }
}
