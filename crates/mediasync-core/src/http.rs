//! JSON-over-HTTP implementation of [`MediaService`].
//!
//! Talks to a videos API shaped like the hosting service's v1 endpoints:
//! `videos/list`, `videos/show`, `videos/update`, `videos/conversions/list`.

use std::io::{self, Read};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::download::ResourceFetcher;
use crate::error::RemoteError;
use crate::media::MediaRecord;
use crate::remote::{ListQuery, MediaService, MediaUpdate, Page};
use crate::tags::{Tag, TagSet};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    videos: Vec<MediaRecord>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    video: MediaRecord,
}

#[derive(Debug, Deserialize)]
struct ConversionsResponse {
    #[serde(default)]
    conversions: Vec<Conversion>,
}

#[derive(Debug, Deserialize)]
struct Conversion {
    #[serde(default)]
    template: Option<Template>,
    #[serde(default)]
    link: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Template {
    #[serde(default)]
    name: String,
    #[serde(default)]
    format: Option<Format>,
}

#[derive(Debug, Deserialize)]
struct Format {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default = "default_protocol")]
    protocol: String,
    address: String,
    path: String,
}

fn default_protocol() -> String {
    "https".to_string()
}

impl Conversion {
    fn is_original(&self) -> bool {
        self.template.as_ref().is_some_and(|t| {
            t.name.eq_ignore_ascii_case("original")
                || t.format.as_ref().is_some_and(|f| f.key == "original")
        })
    }

    fn uri(&self) -> Option<String> {
        let link = self.link.as_ref()?;
        let path = link.path.trim_start_matches('/');
        Some(format!("{}://{}/{}", link.protocol, link.address, path))
    }
}

#[derive(Clone)]
pub struct HttpMediaService {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpMediaService {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_secret)
            .query(&[("api_key", self.api_key.as_str()), ("api_format", "json")])
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        warn!(status = status.as_u16(), "Media API request failed");
        Err(RemoteError::Api {
            status_code: status.as_u16(),
            message,
        })
    }

    fn show(&self, key: &str) -> Result<MediaRecord, RemoteError> {
        let request = self
            .client
            .get(self.url("videos/show"))
            .query(&[("video_key", key)]);
        let response: ShowResponse = self.send(request)?.json()?;
        Ok(response.video)
    }
}

impl MediaService for HttpMediaService {
    #[instrument(skip(self, query))]
    fn list_page(&self, query: &ListQuery, offset: u64, limit: u64) -> Result<Page, RemoteError> {
        let request = self
            .client
            .get(self.url("videos/list"))
            .query(query)
            .query(&[("result_offset", offset), ("result_limit", limit)]);
        let response: ListResponse = self.send(request)?.json()?;
        debug!(count = response.videos.len(), total = ?response.total, "Fetched page");
        Ok(Page {
            records: response.videos,
            total: response.total,
        })
    }

    #[instrument(skip(self, update))]
    fn update_by_key(&self, key: &str, update: &MediaUpdate) -> Result<(), RemoteError> {
        let mut form = update.to_params();
        form.push(("video_key".to_string(), key.to_string()));
        let request = self.client.post(self.url("videos/update")).form(&form);
        self.send(request)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove_tags_by_key(&self, key: &str, tags: &[Tag]) -> Result<(), RemoteError> {
        let current: TagSet = self.show(key)?.tags;
        let remaining = current.without(tags);
        if remaining == current {
            return Ok(());
        }
        self.update_by_key(key, &MediaUpdate::tags(remaining))
    }

    #[instrument(skip(self))]
    fn original_uri(&self, key: &str) -> Result<String, RemoteError> {
        let request = self
            .client
            .get(self.url("videos/conversions/list"))
            .query(&[("video_key", key)]);
        let response: ConversionsResponse = self.send(request)?.json()?;
        response
            .conversions
            .iter()
            .filter(|c| c.is_original())
            .find_map(Conversion::uri)
            .ok_or_else(|| RemoteError::NotFound {
                key: format!("original of {key}"),
            })
    }
}

impl ResourceFetcher for HttpMediaService {
    fn fetch(&self, uri: &str) -> io::Result<Box<dyn Read>> {
        let response = self
            .client
            .get(uri)
            .timeout(Duration::from_secs(6 * 60 * 60))
            .send()
            .and_then(Response::error_for_status)
            .map_err(io::Error::other)?;
        Ok(Box::new(response))
    }
}
