pub mod client;
pub mod error;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::ApiError;
use models::{RequestId, ServiceRequest, WorkerId, WorkerServiceRequest};

/// The slice of the backend the bidding lobby depends on.
///
/// [`ApiClient`] is the real implementation; tests drive the lobby with an
/// in-memory backend instead.
#[async_trait]
pub trait BiddingApi: Send + Sync {
    async fn client_requests(&self) -> Result<Vec<ServiceRequest>, ApiError>;

    async fn worker_requests(&self) -> Result<Vec<WorkerServiceRequest>, ApiError>;

    async fn join_bidding(&self, request_id: RequestId) -> Result<(), ApiError>;

    async fn place_bid(&self, request_id: RequestId, money: f64) -> Result<(), ApiError>;

    async fn leave_bidding(&self, request_id: RequestId) -> Result<(), ApiError>;

    async fn accept_offer(&self, request_id: RequestId, worker_id: WorkerId)
    -> Result<(), ApiError>;
}
