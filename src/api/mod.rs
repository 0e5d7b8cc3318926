use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One listed user, as returned by the paginated endpoint. Only `user_id`
/// matters to the selection logic; the rest is display data.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserRecord {
    pub user_id: u64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_login: String,
    #[serde(default)]
    pub num_courses: u32,
    #[serde(default)]
    pub course_codes: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PageResponse {
    pub users: Vec<UserRecord>,
    pub pagination: PageInfo,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CourseCatalog {
    pub courses: Vec<String>,
    pub total: usize,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    user_ids: &'a [u64],
}

/// Parameters of one page fetch. `courses` is joined into a single
/// comma-delimited query parameter and only sent when non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
    pub courses: Vec<String>,
}

impl PageRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if !self.courses.is_empty() {
            query.push(("courses", self.courses.iter().join(",")));
        }
        query
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The remote list service: one paginated endpoint, one filter catalog, one
/// export endpoint. The controller is generic over this so tests can run
/// against an in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait ListApi {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, ApiError>;
    async fn fetch_courses(&self) -> Result<Vec<String>, ApiError>;
    async fn export_users(&self, ids: &[u64]) -> Result<Vec<u8>, ApiError>;
}

#[derive(Clone, Debug)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(
        base_url: &str,
        timeout_seconds: u64,
        proxy: Option<&str>,
    ) -> Result<Self, ApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "pagepick/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(Duration::from_secs(timeout_seconds));
        if let Some(proxy_url) = proxy.filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ApiError::ProxySetup {
                proxy: proxy_url.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::ClientBuild { source: e })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl ListApi for HttpApi {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, ApiError> {
        let url = self.endpoint("api/users");
        let response = self
            .http
            .get(&url)
            .query(&request.query())
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }
        response
            .json::<PageResponse>()
            .await
            .map_err(|e| ApiError::Decode { url, source: e })
    }

    async fn fetch_courses(&self) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint("api/courses");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let catalog = response
            .json::<CourseCatalog>()
            .await
            .map_err(|e| ApiError::Decode { url, source: e })?;
        Ok(catalog.courses)
    }

    async fn export_users(&self, ids: &[u64]) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint("api/backup");
        let response = self
            .http
            .post(&url)
            .json(&ExportRequest { user_ids: ids })
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Decode { url, source: e })?;
        Ok(bytes.to_vec())
    }
}
