use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::TabmetaError;
use crate::hierarchy::Level;

/// Opaque handle to a remote container. Owned by the adapter; the core reads
/// `container_type`/`label`/`native_id` and computes new values for `metadata`.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    pub container_type: Level,
    pub native_id: String,
    pub label: String,
    pub metadata: Map<String, Value>,
}

/// The three query shapes the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerQuery {
    Id(String),
    Label(String),
    All,
}

/// Minimal contract the import core requires from the remote platform.
///
/// `find` lists containers of `level` among the children of `parent`, or
/// globally when `parent` is absent. The adapter is responsible for any
/// multi-hop expansion (e.g. acquisitions under a project) it needs to run
/// internally.
pub trait PlatformClient: Send + Sync {
    fn find(
        &self,
        parent: Option<&ContainerRef>,
        level: Level,
        query: &ContainerQuery,
    ) -> Result<Vec<ContainerRef>, TabmetaError>;

    fn get_ancestor(
        &self,
        container: &ContainerRef,
        level: Level,
    ) -> Result<Option<ContainerRef>, TabmetaError>;

    /// Human-readable label sequence from the root down to `container`.
    fn label_path(&self, container: &ContainerRef) -> Result<Vec<String>, TabmetaError>;

    fn write_metadata(
        &self,
        container: &ContainerRef,
        metadata: &Map<String, Value>,
    ) -> Result<(), TabmetaError>;
}

#[derive(Debug, Deserialize)]
struct ApiContainer {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    container_type: Option<String>,
    #[serde(default)]
    info: Map<String, Value>,
    #[serde(default)]
    parents: HashMap<String, Option<String>>,
}

impl ApiContainer {
    fn into_ref(self, fallback_level: Level) -> ContainerRef {
        // Old platform releases omit container_type on analyses.
        let container_type = self
            .container_type
            .as_deref()
            .and_then(|ct| ct.parse().ok())
            .unwrap_or(fallback_level);
        let label = self.label.or(self.name).unwrap_or_default();
        ContainerRef {
            container_type,
            native_id: self.id,
            label,
            metadata: self.info,
        }
    }
}

#[derive(Clone)]
pub struct HttpPlatformClient {
    client: Client,
    base_url: String,
}

impl HttpPlatformClient {
    pub fn new(base_url: &str) -> Result<Self, TabmetaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tabmeta/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TabmetaError::PlatformHttp(err.to_string()))?,
        );

        if let Ok(api_key) = std::env::var("TABMETA_API_KEY") {
            if !api_key.trim().is_empty() {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(api_key.trim())
                        .map_err(|err| TabmetaError::PlatformHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| TabmetaError::PlatformHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn get_container(&self, native_id: &str) -> Result<ContainerRef, TabmetaError> {
        let url = format!("{}/api/containers/{native_id}", self.base_url);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let api: ApiContainer = Self::read_json(response)?;
        Ok(api.into_ref(Level::Analysis))
    }

    fn fetch_document(&self, native_id: &str) -> Result<ApiContainer, TabmetaError> {
        let url = format!("{}/api/containers/{native_id}", self.base_url);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        Self::read_json(response)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, TabmetaError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "platform request failed".to_string());
            return Err(TabmetaError::PlatformStatus { status, message });
        }
        response
            .json()
            .map_err(|err| TabmetaError::PlatformHttp(err.to_string()))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, TabmetaError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(TabmetaError::PlatformHttp(err.to_string()));
                }
            }
        }
    }
}

impl PlatformClient for HttpPlatformClient {
    fn find(
        &self,
        parent: Option<&ContainerRef>,
        level: Level,
        query: &ContainerQuery,
    ) -> Result<Vec<ContainerRef>, TabmetaError> {
        let url = match parent {
            Some(parent) => format!(
                "{}/api/containers/{}/{}",
                self.base_url,
                parent.native_id,
                level_plural(level)
            ),
            None => format!("{}/api/{}", self.base_url, level_plural(level)),
        };

        let response = self.send_with_retries(|| {
            let request = self.client.get(&url);
            match query {
                ContainerQuery::Id(id) => request.query(&[("_id", id.as_str())]),
                ContainerQuery::Label(label) => {
                    let key = if level == Level::File { "name" } else { "label" };
                    request.query(&[(key, label.as_str())])
                }
                ContainerQuery::All => request,
            }
        })?;
        let containers: Vec<ApiContainer> = Self::read_json(response)?;
        Ok(containers
            .into_iter()
            .map(|api| api.into_ref(level))
            .collect())
    }

    fn get_ancestor(
        &self,
        container: &ContainerRef,
        level: Level,
    ) -> Result<Option<ContainerRef>, TabmetaError> {
        let document = self.fetch_document(&container.native_id)?;
        let Some(Some(parent_id)) = document.parents.get(level.as_str()).cloned() else {
            return Ok(None);
        };
        Ok(Some(self.get_container(&parent_id)?))
    }

    fn label_path(&self, container: &ContainerRef) -> Result<Vec<String>, TabmetaError> {
        let document = self.fetch_document(&container.native_id)?;
        let mut labels = Vec::new();
        let mut level = Some(Level::Group);
        while let Some(current) = level {
            if current == container.container_type {
                break;
            }
            if let Some(Some(parent_id)) = document.parents.get(current.as_str()) {
                let parent = self.fetch_document(parent_id)?;
                labels.push(parent.label.or(parent.name).unwrap_or_default());
            }
            level = current.child();
        }
        labels.push(container.label.clone());
        Ok(labels)
    }

    fn write_metadata(
        &self,
        container: &ContainerRef,
        metadata: &Map<String, Value>,
    ) -> Result<(), TabmetaError> {
        let url = format!(
            "{}/api/containers/{}/info",
            self.base_url, container.native_id
        );
        let response = self.send_with_retries(|| self.client.post(&url).json(metadata))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "platform request failed".to_string());
            return Err(TabmetaError::PlatformStatus { status, message });
        }
        Ok(())
    }
}

fn level_plural(level: Level) -> &'static str {
    match level {
        Level::Group => "groups",
        Level::Project => "projects",
        Level::Subject => "subjects",
        Level::Session => "sessions",
        Level::Acquisition => "acquisitions",
        Level::Analysis => "analyses",
        Level::File => "files",
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
