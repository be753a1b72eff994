//! In-memory stand-in for the marketplace backend, used by the lobby tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Notify;

use crate::api::BiddingApi;
use crate::api::error::ApiError;
use crate::api::models::{
    Category, Participant, ParticipantStatus, RequestId, RequestStatus, ServiceRequest, Urgency,
    WorkerId, WorkerServiceRequest,
};

#[derive(Default)]
struct State {
    requests: Vec<ServiceRequest>,
    fail_next: Option<(u16, String)>,
    fail_lists: Option<(u16, String)>,
    invited: Vec<(RequestId, WorkerId)>,
    calls: Vec<&'static str>,
}

/// Acts as the server for a single signed-in worker (`worker_id`); the client
/// endpoints return every request as if the caller owned them all.
pub(crate) struct FakeBackend {
    worker_id: WorkerId,
    state: Mutex<State>,
    gate: Option<Arc<Notify>>,
}

pub(crate) fn open_request(id: RequestId) -> ServiceRequest {
    ServiceRequest {
        id,
        category: Category::Plumber,
        description: "Kitchen sink is leaking".into(),
        budget: 6000.0,
        urgency: Urgency::Urgent,
        status: RequestStatus::Open,
        latitude: 36.7538,
        longitude: 3.0588,
        created_at: None,
        client_id: Some(1),
        participants: Vec::new(),
    }
}

pub(crate) fn participant(request_id: RequestId, worker_id: WorkerId, status: ParticipantStatus, bid: f64) -> Participant {
    Participant {
        service_request_id: request_id,
        worker_id,
        status,
        bid,
        worker: None,
    }
}

impl FakeBackend {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            state: Mutex::new(State::default()),
            gate: None,
        }
    }

    pub fn with_request(self, request: ServiceRequest) -> Self {
        self.lock().requests.push(request);
        self
    }

    /// Mutating calls wait on the returned handle before touching state.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn fail_next(&self, status: u16, body: &str) {
        self.lock().fail_next = Some((status, body.to_string()));
    }

    /// Every later list call fails until the backend is rebuilt.
    pub fn fail_lists(&self, status: u16, body: &str) {
        self.lock().fail_lists = Some((status, body.to_string()));
    }

    /// What `POST /servicerequests/invite` does: the worker gets a pending
    /// row it still has to join.
    pub fn invite(self, request_id: RequestId, worker_id: WorkerId) -> Self {
        {
            let mut state = self.lock();
            if let Some(request) = state.requests.iter_mut().find(|r| r.id == request_id) {
                request
                    .participants
                    .push(participant(request_id, worker_id, ParticipantStatus::Pending, 0.0));
            }
            state.invited.push((request_id, worker_id));
        }
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn request(&self, id: RequestId) -> Option<ServiceRequest> {
        self.lock().requests.iter().find(|r| r.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, call: &'static str) -> Result<(), ApiError> {
        if let Some(gate) = &self.gate {
            if call != "client_requests" && call != "worker_requests" {
                gate.notified().await;
            }
        }
        let mut state = self.lock();
        state.calls.push(call);
        let list_call = call == "client_requests" || call == "worker_requests";
        if let (true, Some((status, body))) = (list_call, &state.fail_lists) {
            return Err(ApiError::from_response(
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            ));
        }
        match state.fail_next.take() {
            Some((status, body)) => Err(ApiError::from_response(
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                &body,
            )),
            None => Ok(()),
        }
    }

    fn with_open_request<T>(
        &self,
        id: RequestId,
        f: impl FnOnce(&mut ServiceRequest) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.lock();
        let request = state
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("Service request not found"))?;
        f(request)
    }
}

fn not_found(message: &str) -> ApiError {
    ApiError::NotFound(Some(message.to_string()))
}

#[async_trait]
impl BiddingApi for FakeBackend {
    async fn client_requests(&self) -> Result<Vec<ServiceRequest>, ApiError> {
        self.enter("client_requests").await?;
        Ok(self.lock().requests.clone())
    }

    async fn worker_requests(&self) -> Result<Vec<WorkerServiceRequest>, ApiError> {
        self.enter("worker_requests").await?;
        let rows = self
            .lock()
            .requests
            .iter()
            .filter_map(|request| {
                request.participant(self.worker_id).map(|p| WorkerServiceRequest {
                    service_request_id: request.id,
                    worker_id: p.worker_id,
                    status: p.status.clone(),
                    bid: p.bid,
                    client_completed: false,
                    worker_completed: false,
                    service_request: request.clone(),
                })
            })
            .collect();
        Ok(rows)
    }

    async fn join_bidding(&self, request_id: RequestId) -> Result<(), ApiError> {
        self.enter("join_bidding").await?;
        let worker_id = self.worker_id;
        {
            let mut state = self.lock();
            let before = state.invited.len();
            state.invited.retain(|entry| *entry != (request_id, worker_id));
            if state.invited.len() != before {
                return Ok(());
            }
        }
        self.with_open_request(request_id, |request| {
            if request.status != RequestStatus::Open {
                return Err(not_found("Service request is closed"));
            }
            if request.participant(worker_id).is_some() {
                return Err(ApiError::Conflict(Some(
                    "You have already joined this service request".into(),
                )));
            }
            request
                .participants
                .push(participant(request_id, worker_id, ParticipantStatus::Pending, 0.0));
            Ok(())
        })
    }

    async fn place_bid(&self, request_id: RequestId, money: f64) -> Result<(), ApiError> {
        self.enter("place_bid").await?;
        let worker_id = self.worker_id;
        self.with_open_request(request_id, |request| {
            let entry = request
                .participants
                .iter_mut()
                .find(|p| p.worker_id == worker_id)
                .ok_or_else(|| not_found("You are not part of this bidding"))?;
            entry.bid = money;
            entry.status = ParticipantStatus::Bidding;
            Ok(())
        })
    }

    async fn leave_bidding(&self, request_id: RequestId) -> Result<(), ApiError> {
        self.enter("leave_bidding").await?;
        let worker_id = self.worker_id;
        self.with_open_request(request_id, |request| {
            let before = request.participants.len();
            request.participants.retain(|p| p.worker_id != worker_id);
            if request.participants.len() == before {
                return Err(not_found("You are not part of this bidding"));
            }
            Ok(())
        })
    }

    async fn accept_offer(&self, request_id: RequestId, worker_id: WorkerId) -> Result<(), ApiError> {
        self.enter("accept_offer").await?;
        self.with_open_request(request_id, |request| {
            let entry = request
                .participants
                .iter_mut()
                .find(|p| p.worker_id == worker_id)
                .ok_or_else(|| not_found("Participant not found"))?;
            entry.status = ParticipantStatus::Accepted;
            Ok(())
        })
    }
}
