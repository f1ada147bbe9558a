//! REST transport over `reqwest`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{CollectionSource, MutationAck, MutationSink, Page, ReferenceSource};
use crate::bulk::Mutation;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::model::{EmployeeId, Keyed, PoolKind, ReferenceId, ReferenceNode, TagId};
use crate::query::CanonicalQuery;

/// Shared HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if no base URL is configured or the
    /// client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ApiError::Transport("api.base_url is not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url),
        })
    }

    /// A collection endpoint such as `employees` or `archive`.
    #[must_use]
    pub fn collection<R>(&self, path: &str) -> HttpCollection<R> {
        HttpCollection {
            api: self.clone(),
            path: path.trim_matches('/').to_string(),
            _row: PhantomData,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path.trim_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, params = query.len(), "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        decode(response).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ApiError::Transport(err.to_string()))?;

    if !status.is_success() {
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        let message = body
            .message
            .or(body.detail)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    // Some mutation endpoints answer 204 with no body.
    let bytes = if bytes.is_empty() { &b"{}"[..] } else { &bytes[..] };
    serde_json::from_slice(bytes).map_err(|err| ApiError::Decode(err.to_string()))
}

/// One paginated collection endpoint.
#[derive(Debug, Clone)]
pub struct HttpCollection<R> {
    api: HttpApi,
    path: String,
    _row: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R> CollectionSource for HttpCollection<R>
where
    R: DeserializeOwned + Keyed + Clone + Send + Sync + 'static,
{
    type Row = R;

    async fn fetch_page(&self, query: &CanonicalQuery) -> Result<Page<R>, ApiError> {
        self.api.get_json(&self.path, &query.to_query_pairs()).await
    }
}

#[async_trait]
impl ReferenceSource for HttpApi {
    async fn fetch_pool(
        &self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
    ) -> Result<Vec<ReferenceNode>, ApiError> {
        let params: Vec<(String, String)> = match (kind.parent_param(), parent) {
            (Some(param), Some(parent)) => vec![(param.to_string(), parent.to_string())],
            _ => Vec::new(),
        };
        self.get_json(&format!("lookups/{}", kind.endpoint()), &params)
            .await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagBody<'a> {
    employee_ids: &'a [EmployeeId],
    tag_id: TagId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    employee_ids: &'a [EmployeeId],
    status_id: ReferenceId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineManagerBody<'a> {
    employee_ids: &'a [EmployeeId],
    line_manager_id: EmployeeId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdsBody<'a> {
    employee_ids: &'a [EmployeeId],
}

#[async_trait]
impl MutationSink for HttpApi {
    async fn apply(
        &self,
        mutation: &Mutation,
        employee_ids: &[EmployeeId],
    ) -> Result<MutationAck, ApiError> {
        match *mutation {
            Mutation::AddTag { tag } => {
                let body = TagBody { employee_ids, tag_id: tag };
                self.post_json("employees/tags/add", &body).await
            }
            Mutation::RemoveTag { tag } => {
                let body = TagBody { employee_ids, tag_id: tag };
                self.post_json("employees/tags/remove", &body).await
            }
            Mutation::SetStatus { status } => {
                let body = StatusBody {
                    employee_ids,
                    status_id: status,
                };
                self.post_json("employees/status", &body).await
            }
            Mutation::AssignLineManager { manager } => {
                let body = LineManagerBody {
                    employee_ids,
                    line_manager_id: manager,
                };
                self.post_json("employees/line-manager", &body).await
            }
            Mutation::SoftDelete => {
                self.post_json("employees/delete", &IdsBody { employee_ids })
                    .await
            }
            Mutation::HardDelete => {
                self.post_json("archive/delete", &IdsBody { employee_ids })
                    .await
            }
            Mutation::Restore => {
                self.post_json("archive/restore", &IdsBody { employee_ids })
                    .await
            }
        }
    }
}
