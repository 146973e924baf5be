//! Resource loading: URL resolution, concurrent fetch, decoding and validation.
//!
//! # Architecture
//!
//! ```text
//! dataURL + join urls ──▶ resolve against base ──▶ dedupe ──▶ fetch (concurrent)
//!                                                                   │
//!        LoadedResources ◀── validate ◀── parse_csv / JSON array ◀──┘
//! ```
//!
//! Fetching goes through the [`ResourceFetcher`] capability so callers (and tests) decide
//! how bytes are obtained. [`DefaultFetcher`] handles `http`, `https` and, unless built with
//! [`DefaultFetcher::remote_only`], `file` URLs.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Url};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::logs::{log_info, log_info_indent};
use crate::chart::ChartSpec;
use crate::error::{FetchError, FetchResult, PipelineError, PipelineResult};
use crate::models::{Dataset, TypeMap};
use crate::parser::{decode_bytes_auto, parse_csv, RawRow};
use crate::validation::{validate_rows, SourceMode};

// =============================================================================
// Fetchers
// =============================================================================

/// Capability to retrieve the text of a resource.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchResult<String>;
}

/// Fetches `http` and `https` URLs with `reqwest`, detecting the text encoding.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fetcher with an optional request timeout and user agent.
    pub fn with_settings(timeout: Option<Duration>, user_agent: Option<&str>) -> FetchResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder.build().map_err(|e| FetchError::Request {
            url: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<String> {
        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url.clone()).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().map(String::from),
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(decode_bytes_auto(&bytes))
    }
}

/// Reads `file` URLs from disk, detecting the text encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

#[async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<String> {
        let path = url.to_file_path().map_err(|_| FetchError::Request {
            url: url.to_string(),
            message: "not a local file path".to_string(),
        })?;
        let bytes = tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
            url: url.to_string(),
            source,
        })?;
        Ok(decode_bytes_auto(&bytes))
    }
}

/// Routes each URL to the fetcher for its scheme.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: Option<FileFetcher>,
}

impl DefaultFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: Some(FileFetcher),
        }
    }

    /// A fetcher that refuses `file` URLs, for serving untrusted requests.
    pub fn remote_only(http: HttpFetcher) -> Self {
        Self { http, file: None }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(HttpFetcher::default())
    }
}

#[async_trait]
impl ResourceFetcher for DefaultFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<String> {
        match url.scheme() {
            "http" | "https" => self.http.fetch(url).await,
            "file" if self.file.is_some() => FileFetcher.fetch(url).await,
            scheme => Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

// =============================================================================
// URL resolution and decoding
// =============================================================================

/// Resolve `raw` against `base` when it is relative.
pub fn resolve_url(raw: &str, base: Option<&Url>) -> PipelineResult<Url> {
    let invalid = |message: String| PipelineError::InvalidUrl {
        url: raw.to_string(),
        message,
    };

    match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    }
    .map_err(|e| invalid(e.to_string()))
}

/// Whether a resource is parsed as CSV rather than JSON.
pub fn is_csv_url(url: &Url) -> bool {
    url.path().ends_with(".csv")
}

/// Decode resource text into raw rows: CSV by extension, a JSON array of objects otherwise.
pub fn decode_resource(url: &Url, text: &str) -> PipelineResult<(Vec<RawRow>, SourceMode)> {
    if is_csv_url(url) {
        Ok((parse_csv(text), SourceMode::Csv))
    } else {
        Ok((decode_json_rows(url.as_str(), text)?, SourceMode::Json))
    }
}

/// Decode a JSON array of flat row objects; `source` names the resource in errors.
pub fn decode_json_rows(source: &str, text: &str) -> PipelineResult<Vec<RawRow>> {
    let decode_error = |message: String| PipelineError::Decode {
        url: source.to_string(),
        message,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| decode_error(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(decode_error("expected an array of row objects".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(row) => Ok(row),
            _ => Err(decode_error(format!("item {} is not an object", index))),
        })
        .collect()
}

// =============================================================================
// Loading
// =============================================================================

/// A fetched, validated resource.
#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub url: Url,
    pub data: Dataset,
    pub types: TypeMap,
}

/// The primary resource and one resource per join, in join order.
#[derive(Debug, Clone)]
pub struct LoadedResources {
    pub data: LoadedResource,
    pub joins: Vec<LoadedResource>,
}

/// Fetch, decode and validate the chart's primary resource and every join resource.
///
/// Each distinct URL is fetched once; all fetches run concurrently. Cancelling `cancel`
/// abandons the outstanding fetches with [`PipelineError::Cancelled`].
pub async fn load_resources(
    spec: &ChartSpec,
    base_url: Option<&Url>,
    fetcher: &dyn ResourceFetcher,
    cancel: &CancellationToken,
) -> PipelineResult<LoadedResources> {
    let data_url = resolve_url(&spec.data_url, base_url)?;
    let join_urls = spec
        .joins
        .iter()
        .map(|join| resolve_url(&join.url, base_url))
        .collect::<PipelineResult<Vec<_>>>()?;

    let mut distinct: Vec<&Url> = Vec::with_capacity(join_urls.len() + 1);
    for url in std::iter::once(&data_url).chain(&join_urls) {
        if !distinct.contains(&url) {
            distinct.push(url);
        }
    }

    log_info(format!("Fetching {} resource(s)", distinct.len()));
    let fetches = futures::future::try_join_all(distinct.iter().map(|url| fetcher.fetch(url)));
    let texts = tokio::select! {
        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
        texts = fetches => texts?,
    };

    let mut loaded: IndexMap<Url, LoadedResource> = IndexMap::with_capacity(distinct.len());
    for (url, text) in distinct.into_iter().zip(texts) {
        let (raw, mode) = decode_resource(url, &text)?;
        let (data, types) = validate_rows(&raw, mode)?;
        log_info_indent(format!("{}: {} rows, {} fields", url, data.len(), types.len()), 1);
        loaded.insert(
            url.clone(),
            LoadedResource {
                url: url.clone(),
                data,
                types,
            },
        );
    }

    let joins = join_urls
        .iter()
        .filter_map(|url| loaded.get(url).cloned())
        .collect();
    let data = loaded
        .shift_remove(&data_url)
        .ok_or_else(|| PipelineError::InvalidUrl {
            url: data_url.to_string(),
            message: "resource missing after load".to_string(),
        })?;

    Ok(LoadedResources { data, joins })
}
