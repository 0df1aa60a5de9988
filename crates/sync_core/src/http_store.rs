use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use shared::{
    domain::{CollectionPath, Fields, RecordId},
    error::{ApiError, ErrorCode, StoreError},
    protocol::{CreateRecordRequest, CreateRecordResponse, StoreEvent, UpdateRecordRequest},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::EngineConfig, error::EngineError, AdapterSubscription, DeliverySink, RemoteStore};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for the document server: REST writes plus one websocket per subscribed collection.
pub struct HttpRemoteStore {
    http: Client,
    base_url: Url,
    session_token: Option<String>,
    connect_timeout: Duration,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, session_token: Option<String>) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| EngineError::unavailable(format!("invalid store url {base_url:?}: {err}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(EngineError::unavailable(
                "store url must start with http:// or https://",
            ));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            session_token,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let base_url = config
            .store
            .base_url
            .as_deref()
            .ok_or_else(|| EngineError::unavailable("store base url is not configured"))?;
        let store = Self::new(base_url, config.initial_session_token.clone())?;
        Ok(match config.store.connect_timeout_ms {
            Some(ms) => store.with_connect_timeout(Duration::from_millis(ms)),
            None => store,
        })
    }

    fn endpoint(&self, segments: &[&str], path: &CollectionPath) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::unavailable("store url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("path", path.as_str());
        Ok(url)
    }

    fn records_url(&self, id: Option<&RecordId>, path: &CollectionPath) -> Result<Url, StoreError> {
        match id {
            Some(id) => self.endpoint(&["records", id.as_str()], path),
            None => self.endpoint(&["records"], path),
        }
    }

    fn ws_url(&self, path: &CollectionPath) -> Result<Url, StoreError> {
        let mut url = self.endpoint(&["ws"], path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| StoreError::unavailable("cannot derive websocket url"))?;
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn subscribe(
        &self,
        path: &CollectionPath,
        sink: DeliverySink,
    ) -> Result<AdapterSubscription, StoreError> {
        let ws_url = self.ws_url(path)?;
        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|err| StoreError::unavailable(format!("invalid websocket url: {err}")))?;
        if let Some(token) = &self.session_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| StoreError::new(ErrorCode::Unauthorized, "malformed session token"))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                StoreError::unavailable(format!(
                    "websocket {ws_url} did not open within {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|err| {
                StoreError::unavailable(format!("failed to connect websocket {ws_url}: {err}"))
            })?;
        let (_, mut ws_reader) = ws_stream.split();

        let expected = path.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let delivered = match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<StoreEvent>(&text) {
                        Ok(StoreEvent::Snapshot { path, records }) if path == expected => {
                            sink.snapshot(records)
                        }
                        Ok(StoreEvent::Snapshot { path, .. }) => {
                            warn!(%path, %expected, "http store: ignoring snapshot for another path");
                            true
                        }
                        Ok(StoreEvent::Error(error)) => sink.error(error.into()),
                        Err(err) => sink.error(StoreError::internal(format!(
                            "invalid store event: {err}"
                        ))),
                    },
                    Ok(Message::Close(_)) => {
                        sink.error(StoreError::unavailable("subscription closed by server"));
                        break;
                    }
                    Ok(_) => true,
                    Err(err) => {
                        sink.error(StoreError::unavailable(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                };
                if !delivered {
                    break;
                }
            }
            debug!(path = %expected, "http store: subscription stream ended");
        });

        Ok(AdapterSubscription::new(move || task.abort()))
    }

    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<RecordId, StoreError> {
        let url = self.records_url(None, path)?;
        let response = self
            .authorize(self.http.post(url))
            .json(&CreateRecordRequest { fields })
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: CreateRecordResponse = response
            .json()
            .await
            .map_err(|err| StoreError::internal(format!("invalid create response: {err}")))?;
        Ok(body.id)
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        patch: Fields,
    ) -> Result<(), StoreError> {
        let url = self.records_url(Some(id), path)?;
        let response = self
            .authorize(self.http.patch(url))
            .json(&UpdateRecordRequest { patch })
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> Result<(), StoreError> {
        let url = self.records_url(Some(id), path)?;
        let response = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::unavailable(format!("store request failed: {err}"))
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ApiError>().await {
        Ok(api_error) => Err(api_error.into()),
        Err(_) => Err(StoreError::new(code_for_status(status), status.to_string())),
    }
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Validation,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ErrorCode::Unavailable
        }
        _ => ErrorCode::Internal,
    }
}

#[cfg(test)]
#[path = "tests/http_store_tests.rs"]
mod tests;
