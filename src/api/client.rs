use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::BiddingApi;
use crate::api::error::ApiError;
use crate::api::models::{
    BidBody, Credentials, DataEnvelope, MaybeData, NewServiceRequest, RequestId, RequestRef,
    ServiceRequest, TokenResponse, Worker, WorkerId, WorkerRef, WorkerServiceRequest,
    WorkersEnvelope,
};
use crate::registration::RegisterPayload;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api/v1/";

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base: Self::base_api(base_url)?,
            token,
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Accepts `host:port`, `host:port/api` or the full `.../api/v1` prefix and
    /// always yields the versioned root with a trailing slash, so relative
    /// joins keep the prefix.
    fn base_api(base_url: &str) -> Result<Url, ApiError> {
        let normalized = crate::utils::normalize_url(base_url);
        let trimmed = normalized.trim_end_matches('/');
        let root = if trimmed.ends_with("/api/v1") {
            format!("{}/", trimmed)
        } else if trimmed.ends_with("/api") {
            format!("{}/v1/", trimmed)
        } else {
            format!("{}/api/v1/", trimmed)
        };
        Ok(Url::parse(&root)?)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!("HTTP {} from backend: {}", status, text);
            return Err(ApiError::from_response(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn ack(resp: reqwest::Response) -> Result<(), ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        warn!("HTTP {} from backend: {}", status, text);
        Err(ApiError::from_response(status, &text))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let resp = self.with_auth(self.http.get(url)).send().await?;
        Self::read(resp).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let resp = self.with_auth(self.http.post(url)).json(body).send().await?;
        Self::read(resp).await
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let resp = self.with_auth(self.http.post(url)).json(body).send().await?;
        Self::ack(resp).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<String, ApiError> {
        let resp: TokenResponse = self
            .post("auth/login", &Credentials { email, password })
            .await?;
        info!("Logged in as {}", email);
        self.token = Some(resp.access_token.clone());
        Ok(resp.access_token)
    }

    pub async fn register(&mut self, payload: &RegisterPayload) -> Result<String, ApiError> {
        let path = match payload {
            RegisterPayload::Worker(_) => "auth/registerasworker",
            RegisterPayload::Client(_) => "auth/registerasclient",
        };
        let resp: TokenResponse = self.post(path, payload).await?;
        info!("Registered new {} account", payload.role());
        self.token = Some(resp.access_token.clone());
        Ok(resp.access_token)
    }

    pub async fn workers(&self) -> Result<Vec<Worker>, ApiError> {
        let envelope: WorkersEnvelope = self.get("auth/getworkers").await?;
        Ok(envelope.workers)
    }

    pub async fn create_request(&self, request: &NewServiceRequest) -> Result<ServiceRequest, ApiError> {
        let created: MaybeData<ServiceRequest> = self.post("servicerequests/create", request).await?;
        let created = created.into_inner();
        info!("Created service request {}", created.id);
        Ok(created)
    }

    pub async fn invite_worker(&self, request_id: RequestId, worker_id: WorkerId) -> Result<(), ApiError> {
        self.post_ack(
            "servicerequests/invite",
            &WorkerRef {
                service_request_id: request_id,
                worker_id,
            },
        )
        .await
    }
}

#[async_trait]
impl BiddingApi for ApiClient {
    async fn client_requests(&self) -> Result<Vec<ServiceRequest>, ApiError> {
        let envelope: DataEnvelope<Vec<ServiceRequest>> = self.get("servicerequests/client").await?;
        Ok(envelope.data)
    }

    async fn worker_requests(&self) -> Result<Vec<WorkerServiceRequest>, ApiError> {
        let envelope: DataEnvelope<Vec<WorkerServiceRequest>> = self.get("servicerequests/worker").await?;
        Ok(envelope.data)
    }

    async fn join_bidding(&self, request_id: RequestId) -> Result<(), ApiError> {
        self.post_ack(
            "servicerequests/joinbidding",
            &RequestRef {
                service_request_id: request_id,
            },
        )
        .await
    }

    async fn place_bid(&self, request_id: RequestId, money: f64) -> Result<(), ApiError> {
        self.post_ack(
            "servicerequests/placebid",
            &BidBody {
                service_request_id: request_id,
                money,
            },
        )
        .await
    }

    async fn leave_bidding(&self, request_id: RequestId) -> Result<(), ApiError> {
        self.post_ack(
            "servicerequests/leave",
            &RequestRef {
                service_request_id: request_id,
            },
        )
        .await
    }

    async fn accept_offer(&self, request_id: RequestId, worker_id: WorkerId) -> Result<(), ApiError> {
        self.post_ack(
            "servicerequests/accept",
            &WorkerRef {
                service_request_id: request_id,
                worker_id,
            },
        )
        .await
    }
}
