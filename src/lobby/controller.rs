use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};

use crate::api::BiddingApi;
use crate::api::models::{
    Participant, ParticipantStatus, RequestId, RequestStatus, Role, ServiceRequest, WorkerId,
    WorkerServiceRequest,
};
use crate::lobby::messaging::{LocalChannel, MessageChannel};
use crate::lobby::transcript::{
    DeliveryStatus, MAX_MESSAGE_LEN, Message, MessageId, MessageKind, ThreadKey, Transcript,
};
use crate::lobby::{Action, LobbyError, LobbyState};

/// Who is looking at the lobby.
#[derive(Debug, Clone, PartialEq)]
enum Viewer {
    Worker {
        state: LobbyState,
        own: Option<Participant>,
        /// Set once this lobby's own join went through. A pending row the
        /// worker did not join from here is an invitation.
        joined: bool,
    },
    Owner,
}

#[derive(Debug)]
struct Inner {
    viewer: Viewer,
    request: Option<ServiceRequest>,
    participants: Vec<Participant>,
    transcript: Transcript,
    closed: bool,
}

/// What the backend currently says about this lobby.
struct Remote {
    request: Option<ServiceRequest>,
    own: Option<Participant>,
}

impl Inner {
    fn worker_state(&self) -> Option<LobbyState> {
        match &self.viewer {
            Viewer::Worker { state, .. } => Some(*state),
            Viewer::Owner => None,
        }
    }

    fn own_worker_id(&self) -> Option<WorkerId> {
        match &self.viewer {
            Viewer::Worker { own, .. } => own.as_ref().map(|p| p.worker_id),
            Viewer::Owner => None,
        }
    }

    fn reconcile(&mut self, remote: Remote) {
        let known_id = self.own_worker_id();
        match &mut self.viewer {
            Viewer::Owner => {
                if let Some(request) = remote.request {
                    self.participants = request.participants.clone();
                    self.request = Some(request);
                }
            }
            Viewer::Worker { state, own, joined } => {
                match remote.request {
                    Some(request) => {
                        self.participants = request.participants.clone();
                        self.request = Some(request);
                    }
                    // No row for this request: the server does not list us
                    // as a participant any more.
                    None => {
                        if let Some(id) = known_id {
                            self.participants.retain(|p| p.worker_id != id);
                        }
                    }
                }
                if *state == LobbyState::Left {
                    *own = None;
                    return;
                }
                match remote.own {
                    Some(entry) => {
                        if let Some(next) = LobbyState::from_status(&entry.status) {
                            *state = next;
                        } else {
                            warn!("Unknown participant status {:?}, keeping {}", entry.status, state);
                        }
                        *own = Some(entry);
                    }
                    None => {
                        *state = LobbyState::NotJoined;
                        *own = None;
                        *joined = false;
                    }
                }
            }
        }
    }
}

/// Renderable copy of the lobby at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub request_id: RequestId,
    pub role: Role,
    /// The worker's own position; `None` for the request owner.
    pub state: Option<LobbyState>,
    pub request: Option<ServiceRequest>,
    pub participants: Vec<Participant>,
    pub own: Option<Participant>,
    pub current_bid: Option<f64>,
    pub transcript: Vec<Message>,
    pub busy: bool,
    pub closed: bool,
}

impl LobbySnapshot {
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, worker_id: WorkerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.worker_id == worker_id)
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, LobbyError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(flag))
            .map_err(|_| LobbyError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one lobby against the backend.
///
/// All operations take `&self`: wrap the controller in an `Arc` to render
/// [`LobbyController::snapshot`] while an action is in flight. Only one
/// backend action runs at a time; a second one fails with
/// [`LobbyError::Busy`]. After [`LobbyController::close`] late results are
/// dropped instead of being applied.
pub struct LobbyController<A, C = LocalChannel> {
    api: A,
    channel: C,
    request_id: RequestId,
    role: Role,
    viewer_id: Option<WorkerId>,
    inner: Mutex<Inner>,
    busy: AtomicBool,
}

impl<A: BiddingApi> LobbyController<A, LocalChannel> {
    pub fn new(api: A, role: Role, request_id: RequestId) -> Self {
        Self::with_channel(api, LocalChannel, role, request_id)
    }
}

impl<A: BiddingApi, C: MessageChannel> LobbyController<A, C> {
    pub fn with_channel(api: A, channel: C, role: Role, request_id: RequestId) -> Self {
        let viewer = match role {
            Role::Worker => Viewer::Worker {
                state: LobbyState::NotJoined,
                own: None,
                joined: false,
            },
            Role::Client => Viewer::Owner,
        };
        Self {
            api,
            channel,
            request_id,
            role,
            viewer_id: None,
            inner: Mutex::new(Inner {
                viewer,
                request: None,
                participants: Vec::new(),
                transcript: Transcript::new(),
                closed: false,
            }),
            busy: AtomicBool::new(false),
        }
    }

    /// Seeds the lobby with the request as it was shown in a list, before the
    /// first refresh.
    pub fn with_request(self, request: ServiceRequest) -> Self {
        {
            let mut inner = self.inner();
            inner.participants = request.participants.clone();
            inner.request = Some(request);
        }
        self
    }

    /// Account id of the signed-in worker. Keys the worker's chat thread
    /// before the backend has returned a participation row.
    pub fn with_viewer_id(mut self, worker_id: WorkerId) -> Self {
        self.viewer_id = Some(worker_id);
        self
    }

    pub fn with_transcript(self, transcript: Transcript) -> Self {
        self.inner().transcript = transcript;
        self
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn thread_key(&self) -> ThreadKey {
        self.thread_for(&self.inner())
    }

    fn thread_for(&self, inner: &Inner) -> ThreadKey {
        let worker_id = match self.role {
            Role::Worker => self.viewer_id.or_else(|| inner.own_worker_id()),
            Role::Client => None,
        };
        ThreadKey {
            request_id: self.request_id,
            worker_id,
        }
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        let inner = self.inner();
        let own = match &inner.viewer {
            Viewer::Worker { own, .. } => own.clone(),
            Viewer::Owner => None,
        };
        let current_bid = own
            .as_ref()
            .filter(|p| p.has_bid())
            .map(|p| p.bid)
            .or_else(|| inner.transcript.latest_bid());
        LobbySnapshot {
            request_id: self.request_id,
            role: self.role,
            state: inner.worker_state(),
            request: inner.request.clone(),
            participants: inner.participants.clone(),
            own,
            current_bid,
            transcript: inner.transcript.messages().to_vec(),
            busy: self.is_busy(),
            closed: inner.closed,
        }
    }

    /// Stops applying results to this lobby. Calls already in flight still
    /// complete on the server.
    pub fn close(&self) {
        let mut inner = self.inner();
        if !inner.closed {
            debug!("Closing lobby for request {}", self.request_id);
            inner.closed = true;
        }
    }

    pub async fn refresh(&self) -> Result<(), LobbyError> {
        self.ensure_open()?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        let remote = self.fetch().await?;
        self.commit(|inner| inner.reconcile(remote));
        Ok(())
    }

    pub async fn join_bidding(&self) -> Result<(), LobbyError> {
        self.ensure_open()?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        {
            let inner = self.inner();
            let state = self.worker_state(&inner, Action::Join)?;
            let joined = matches!(inner.viewer, Viewer::Worker { joined: true, .. });
            match state {
                LobbyState::NotJoined => {}
                // answering an invitation
                LobbyState::Pending if !joined => {}
                LobbyState::Left => {
                    return Err(LobbyError::Conflict(
                        "You left this negotiation and cannot rejoin it".into(),
                    ));
                }
                _ => {
                    return Err(LobbyError::Conflict(
                        "You have already joined this service request".into(),
                    ));
                }
            }
            if let Some(request) = &inner.request {
                if request.status != RequestStatus::Open {
                    return Err(LobbyError::NotFound(format!(
                        "Service request {} is no longer open",
                        request.id
                    )));
                }
            }
        }

        self.api.join_bidding(self.request_id).await?;
        info!("Joined bidding on request {}", self.request_id);
        self.commit(|inner| {
            if let Viewer::Worker { state, joined, .. } = &mut inner.viewer {
                *state = LobbyState::Pending;
                *joined = true;
            }
        });
        self.refresh_after(Action::Join).await;
        Ok(())
    }

    pub async fn place_bid(&self, amount: f64) -> Result<(), LobbyError> {
        self.ensure_open()?;
        validate_amount(amount)?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        {
            let inner = self.inner();
            let state = self.worker_state(&inner, Action::Bid)?;
            if !state.is_participating() {
                return Err(LobbyError::InvalidTransition {
                    state,
                    action: Action::Bid,
                });
            }
        }

        self.api.place_bid(self.request_id, amount).await?;
        info!("Placed bid of {} on request {}", amount, self.request_id);
        self.commit(|inner| {
            if let Viewer::Worker { state, .. } = &mut inner.viewer {
                *state = LobbyState::Bidding;
            }
            inner.transcript.push_bid(Role::Worker, amount, Utc::now());
        });
        self.refresh_after(Action::Bid).await;
        Ok(())
    }

    /// Parses the bid field as typed by the user, then places the bid.
    pub async fn place_bid_input(&self, input: &str) -> Result<(), LobbyError> {
        let amount = parse_amount(input)?;
        self.place_bid(amount).await
    }

    /// Leaving twice is a no-op; leaving closes the lobby.
    pub async fn leave_bidding(&self) -> Result<(), LobbyError> {
        if self.inner().worker_state() == Some(LobbyState::Left) {
            return Ok(());
        }
        self.ensure_open()?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        {
            let inner = self.inner();
            let state = self.worker_state(&inner, Action::Leave)?;
            if !state.is_participating() {
                return Err(LobbyError::InvalidTransition {
                    state,
                    action: Action::Leave,
                });
            }
        }

        self.api.leave_bidding(self.request_id).await?;
        info!("Left bidding on request {}", self.request_id);
        self.commit(|inner| {
            let own_id = inner.own_worker_id();
            if let Viewer::Worker { state, own, .. } = &mut inner.viewer {
                *state = LobbyState::Left;
                *own = None;
            }
            if let Some(id) = own_id {
                inner.participants.retain(|p| p.worker_id != id);
            }
        });
        self.refresh_after(Action::Leave).await;
        self.close();
        Ok(())
    }

    /// Owner side: accept one participant's offer.
    ///
    /// Only the participant changes; the request status and the other
    /// participants are left for the backend to settle and show up on the
    /// following refresh.
    pub async fn accept_offer(&self, worker_id: WorkerId) -> Result<(), LobbyError> {
        self.ensure_open()?;
        let _busy = BusyGuard::acquire(&self.busy)?;
        {
            let inner = self.inner();
            if inner.viewer != Viewer::Owner {
                return Err(LobbyError::Forbidden {
                    role: self.role,
                    action: Action::Accept,
                });
            }
            let participant = inner
                .participants
                .iter()
                .find(|p| p.worker_id == worker_id)
                .ok_or_else(|| {
                    LobbyError::NotFound(format!("Worker {} is not part of this bidding", worker_id))
                })?;
            match &participant.status {
                ParticipantStatus::Pending | ParticipantStatus::Bidding => {}
                ParticipantStatus::Accepted => {
                    return Err(LobbyError::Conflict(
                        "This offer has already been accepted".into(),
                    ));
                }
                ParticipantStatus::Other(status) => {
                    return Err(LobbyError::Conflict(format!(
                        "Cannot accept an offer that is {}",
                        status
                    )));
                }
            }
        }

        self.api.accept_offer(self.request_id, worker_id).await?;
        info!("Accepted worker {} on request {}", worker_id, self.request_id);
        self.commit(|inner| {
            if let Some(p) = inner.participants.iter_mut().find(|p| p.worker_id == worker_id) {
                p.status = ParticipantStatus::Accepted;
            }
        });
        self.refresh_after(Action::Accept).await;
        Ok(())
    }

    /// Appends a chat line and hands it to the message channel.
    pub async fn send_message(&self, text: &str) -> Result<MessageId, LobbyError> {
        self.ensure_open()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LobbyError::Validation("Message cannot be empty".into()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(LobbyError::Validation(format!(
                "Messages are limited to {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let (thread, message) = {
            let mut inner = self.inner();
            let id = inner.transcript.push(
                self.role,
                text.to_string(),
                MessageKind::Text,
                DeliveryStatus::Pending,
                Utc::now(),
            );
            let thread = self.thread_for(&inner);
            let message = inner.transcript.get(id).cloned();
            (thread, message)
        };
        let Some(message) = message else {
            return Err(LobbyError::Validation("Message could not be recorded".into()));
        };

        let delivery = self.channel.deliver(thread, &message).await;
        self.commit(|inner| {
            inner.transcript.set_delivery(message.id, delivery);
        });
        Ok(message.id)
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), LobbyError> {
        if self.inner().closed {
            Err(LobbyError::Closed)
        } else {
            Ok(())
        }
    }

    fn worker_state(&self, inner: &Inner, action: Action) -> Result<LobbyState, LobbyError> {
        inner.worker_state().ok_or(LobbyError::Forbidden {
            role: self.role,
            action,
        })
    }

    /// Applies `f` unless the lobby was closed while the call was in flight.
    fn commit(&self, f: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.inner();
        if inner.closed {
            debug!("Lobby {} closed, dropping late update", self.request_id);
            return false;
        }
        f(&mut inner);
        true
    }

    async fn fetch(&self) -> Result<Remote, LobbyError> {
        match self.role {
            Role::Worker => {
                let rows = self.api.worker_requests().await?;
                Ok(remote_from_rows(self.request_id, rows))
            }
            Role::Client => {
                let request = self
                    .api
                    .client_requests()
                    .await?
                    .into_iter()
                    .find(|r| r.id == self.request_id)
                    .ok_or_else(|| {
                        LobbyError::NotFound(format!("Service request {} not found", self.request_id))
                    })?;
                Ok(Remote {
                    request: Some(request),
                    own: None,
                })
            }
        }
    }

    // The action itself already succeeded; a failed re-fetch only means the
    // view stays stale until the next refresh.
    async fn refresh_after(&self, action: Action) {
        match self.fetch().await {
            Ok(remote) => {
                self.commit(|inner| inner.reconcile(remote));
            }
            Err(e) => warn!("Refresh after {:?} on request {} failed: {}", action, self.request_id, e),
        }
    }
}

fn remote_from_rows(request_id: RequestId, rows: Vec<WorkerServiceRequest>) -> Remote {
    match rows.into_iter().find(|row| row.service_request_id == request_id) {
        Some(row) => {
            let own = row.as_participant();
            let mut request = row.service_request;
            // Some payloads omit the participant list on the worker side.
            if request.participant(own.worker_id).is_none() {
                request.participants.push(own.clone());
            }
            Remote {
                request: Some(request),
                own: Some(own),
            }
        }
        None => Remote {
            request: None,
            own: None,
        },
    }
}

pub fn validate_amount(amount: f64) -> Result<f64, LobbyError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(LobbyError::Validation("Please enter a valid bid amount".into()))
    }
}

pub fn parse_amount(input: &str) -> Result<f64, LobbyError> {
    input
        .trim()
        .parse::<f64>()
        .map_err(|_| LobbyError::Validation("Please enter a valid bid amount".into()))
        .and_then(validate_amount)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::fake::{FakeBackend, open_request, participant};

    const WORKER: WorkerId = 7;

    fn worker_lobby(backend: FakeBackend) -> LobbyController<FakeBackend> {
        LobbyController::new(backend, Role::Worker, 42)
    }

    #[tokio::test]
    async fn join_adds_pending_participant() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)))
            .with_request(open_request(42));
        assert_eq!(lobby.snapshot().participant_count(), 0);

        lobby.join_bidding().await.unwrap();

        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Pending));
        assert_eq!(snap.participant_count(), 1);
        let me = snap.participant(WORKER).unwrap();
        assert_eq!(me.status, ParticipantStatus::Pending);
        assert_eq!(me.bid, 0.0);
    }

    #[tokio::test]
    async fn joining_twice_conflicts() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        let err = lobby.join_bidding().await.unwrap_err();
        assert!(matches!(err, LobbyError::Conflict(_)));
        assert_eq!(lobby.api().request(42).unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn server_side_conflict_is_reported_as_conflict() {
        // Lobby opened before a refresh, so it still believes it is NotJoined.
        let mut request = open_request(42);
        request
            .participants
            .push(participant(42, WORKER, ParticipantStatus::Pending, 0.0));
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(request));
        let err = lobby.join_bidding().await.unwrap_err();
        assert!(matches!(err, LobbyError::Conflict(ref m) if m.contains("already joined")));
    }

    #[tokio::test]
    async fn closed_request_cannot_be_joined() {
        let mut request = open_request(42);
        request.status = RequestStatus::Closed;
        let backend = FakeBackend::new(WORKER).with_request(request.clone());
        let lobby = worker_lobby(backend).with_request(request);
        let err = lobby.join_bidding().await.unwrap_err();
        assert!(matches!(err, LobbyError::NotFound(_)));
        assert!(lobby.api().calls().is_empty());
    }

    #[tokio::test]
    async fn place_bid_moves_to_bidding_and_logs_bid() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        lobby.place_bid(5000.0).await.unwrap();

        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Bidding));
        let me = snap.participant(WORKER).unwrap();
        assert_eq!(me.bid, 5000.0);
        assert_eq!(me.status, ParticipantStatus::Bidding);
        assert_eq!(snap.current_bid, Some(5000.0));
        let last = snap.transcript.last().unwrap();
        assert!(last.is_bid());
        assert_eq!(last.amount(), Some(5000.0));
    }

    #[tokio::test]
    async fn invalid_amounts_never_reach_the_server() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        let before = lobby.api().calls().len();

        for amount in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                lobby.place_bid(amount).await,
                Err(LobbyError::Validation(_))
            ));
        }
        for input in ["", "   ", "abc", "12abc", "-5"] {
            assert!(matches!(
                lobby.place_bid_input(input).await,
                Err(LobbyError::Validation(_))
            ));
        }
        assert_eq!(lobby.api().calls().len(), before);
    }

    #[tokio::test]
    async fn failed_bid_leaves_lobby_untouched() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        let before = lobby.snapshot();

        lobby
            .api()
            .fail_next(500, r#"{"message":"Bidding is temporarily disabled"}"#);
        let err = lobby.place_bid(5000.0).await.unwrap_err();

        assert_eq!(lobby.snapshot(), before);
        assert_eq!(err.alert(Action::Bid).message, "Bidding is temporarily disabled");

        lobby.api().fail_next(500, "");
        let err = lobby.place_bid(5000.0).await.unwrap_err();
        assert_eq!(err.alert(Action::Bid).message, "Failed to place bid");
        assert!(!lobby.is_busy());
    }

    #[tokio::test]
    async fn leaving_removes_worker_and_closes() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        lobby.leave_bidding().await.unwrap();

        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Left));
        assert!(snap.participant(WORKER).is_none());
        assert!(snap.closed);
        assert!(lobby.api().request(42).unwrap().participant(WORKER).is_none());
        assert!(matches!(lobby.join_bidding().await, Err(LobbyError::Closed)));
        lobby.leave_bidding().await.unwrap();
    }

    #[tokio::test]
    async fn cannot_bid_or_leave_before_joining() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        assert!(matches!(
            lobby.place_bid(100.0).await,
            Err(LobbyError::InvalidTransition { state: LobbyState::NotJoined, .. })
        ));
        assert!(matches!(
            lobby.leave_bidding().await,
            Err(LobbyError::InvalidTransition { state: LobbyState::NotJoined, .. })
        ));
    }

    #[tokio::test]
    async fn owner_accepts_an_offer() {
        let mut request = open_request(42);
        request
            .participants
            .push(participant(42, 3, ParticipantStatus::Bidding, 4800.0));
        request
            .participants
            .push(participant(42, 4, ParticipantStatus::Pending, 0.0));
        let lobby = LobbyController::new(FakeBackend::new(WORKER).with_request(request), Role::Client, 42);
        lobby.refresh().await.unwrap();
        assert_eq!(lobby.snapshot().state, None);
        assert_eq!(lobby.snapshot().participant_count(), 2);

        lobby.accept_offer(3).await.unwrap();
        let snap = lobby.snapshot();
        assert_eq!(snap.participant(3).unwrap().status, ParticipantStatus::Accepted);
        assert_eq!(snap.participant(4).unwrap().status, ParticipantStatus::Pending);
        assert_eq!(snap.request.unwrap().status, RequestStatus::Open);

        assert!(matches!(lobby.accept_offer(3).await, Err(LobbyError::Conflict(_))));
        assert!(matches!(lobby.accept_offer(99).await, Err(LobbyError::NotFound(_))));
    }

    #[tokio::test]
    async fn roles_are_enforced() {
        let worker = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        assert!(matches!(
            worker.accept_offer(1).await,
            Err(LobbyError::Forbidden { role: Role::Worker, .. })
        ));
        let owner = LobbyController::new(FakeBackend::new(WORKER).with_request(open_request(42)), Role::Client, 42);
        assert!(matches!(
            owner.join_bidding().await,
            Err(LobbyError::Forbidden { role: Role::Client, .. })
        ));
    }

    #[tokio::test]
    async fn second_action_while_busy_is_rejected() {
        let (backend, gate) = FakeBackend::new(WORKER).with_request(open_request(42)).gated();
        let lobby = Arc::new(worker_lobby(backend));

        let task = {
            let lobby = lobby.clone();
            tokio::spawn(async move { lobby.join_bidding().await })
        };
        while !lobby.is_busy() {
            tokio::task::yield_now().await;
        }
        assert!(lobby.snapshot().busy);
        assert!(matches!(lobby.join_bidding().await, Err(LobbyError::Busy)));

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert!(!lobby.is_busy());
        assert_eq!(lobby.snapshot().state, Some(LobbyState::Pending));
    }

    #[tokio::test]
    async fn results_after_close_are_dropped() {
        let (backend, gate) = FakeBackend::new(WORKER).with_request(open_request(42)).gated();
        let lobby = Arc::new(worker_lobby(backend));

        let task = {
            let lobby = lobby.clone();
            tokio::spawn(async move { lobby.join_bidding().await })
        };
        while !lobby.is_busy() {
            tokio::task::yield_now().await;
        }
        lobby.close();
        gate.notify_one();
        task.await.unwrap().unwrap();

        assert_eq!(lobby.snapshot().state, Some(LobbyState::NotJoined));
        assert_eq!(lobby.snapshot().participant_count(), 0);
        assert_eq!(lobby.api().request(42).unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn messages_are_validated_and_kept_local() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)))
            .with_transcript(Transcript::demo(Utc::now()));
        assert!(matches!(lobby.send_message("   ").await, Err(LobbyError::Validation(_))));
        assert!(matches!(
            lobby.send_message(&"x".repeat(MAX_MESSAGE_LEN + 1)).await,
            Err(LobbyError::Validation(_))
        ));

        let id = lobby.send_message("  When can you start?  ").await.unwrap();
        let snap = lobby.snapshot();
        assert_eq!(snap.transcript.len(), 5);
        let msg = snap.transcript.iter().find(|m| m.id == id).unwrap();
        assert_eq!(msg.text, "When can you start?");
        assert_eq!(msg.sender, Role::Worker);
        assert_eq!(msg.delivery, DeliveryStatus::LocalOnly);
        assert!(lobby.api().calls().is_empty());
    }

    #[tokio::test]
    async fn refresh_tracks_server_state() {
        let mut request = open_request(42);
        request
            .participants
            .push(participant(42, WORKER, ParticipantStatus::Accepted, 5200.0));
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(request));
        lobby.refresh().await.unwrap();
        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Accepted));
        assert_eq!(snap.current_bid, Some(5200.0));
        assert_eq!(lobby.thread_key().worker_id, Some(WORKER));
    }

    #[tokio::test]
    async fn invited_worker_can_join_once() {
        let backend = FakeBackend::new(WORKER)
            .with_request(open_request(42))
            .invite(42, WORKER);
        let lobby = worker_lobby(backend);
        lobby.refresh().await.unwrap();
        assert_eq!(lobby.snapshot().state, Some(LobbyState::Pending));

        lobby.join_bidding().await.unwrap();
        assert_eq!(lobby.snapshot().state, Some(LobbyState::Pending));
        assert_eq!(lobby.api().request(42).unwrap().participants.len(), 1);

        assert!(matches!(lobby.join_bidding().await, Err(LobbyError::Conflict(_))));
        let joins = lobby.api().calls().iter().filter(|c| **c == "join_bidding").count();
        assert_eq!(joins, 1);
    }

    #[tokio::test]
    async fn failed_refetch_keeps_confirmed_join() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.api().fail_lists(503, r#"{"message":"Service unavailable"}"#);

        lobby.join_bidding().await.unwrap();

        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Pending));
        assert!(!snap.busy);
        assert!(!lobby.is_busy());
        assert_eq!(lobby.api().request(42).unwrap().participants.len(), 1);
        assert_eq!(lobby.api().calls(), vec!["join_bidding", "worker_requests"]);
        assert!(matches!(lobby.refresh().await, Err(LobbyError::Api(_))));
        assert!(!lobby.is_busy());
    }

    #[tokio::test]
    async fn failed_refetch_keeps_confirmed_bid() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)));
        lobby.join_bidding().await.unwrap();
        lobby.api().fail_lists(500, "");

        lobby.place_bid(5000.0).await.unwrap();

        let snap = lobby.snapshot();
        assert_eq!(snap.state, Some(LobbyState::Bidding));
        assert_eq!(snap.current_bid, Some(5000.0));
        assert!(snap.transcript.last().unwrap().is_bid());
        assert!(!lobby.is_busy());
        assert_eq!(lobby.api().request(42).unwrap().participant(WORKER).unwrap().bid, 5000.0);
    }

    #[tokio::test]
    async fn thread_key_follows_viewer_id_across_join() {
        let lobby = worker_lobby(FakeBackend::new(WORKER).with_request(open_request(42)))
            .with_viewer_id(WORKER);
        lobby.refresh().await.unwrap();
        let before = lobby.thread_key();
        assert_eq!(before.worker_id, Some(WORKER));

        lobby.send_message("Is the leak under the sink?").await.unwrap();
        lobby.join_bidding().await.unwrap();
        assert_eq!(lobby.thread_key(), before);

        let owner = LobbyController::new(FakeBackend::new(WORKER), Role::Client, 42).with_viewer_id(3);
        assert_eq!(owner.thread_key().worker_id, None);
    }

    #[test]
    fn parse_amount_accepts_decimal_input() {
        assert_eq!(parse_amount(" 4500.5 ").unwrap(), 4500.5);
    }
}
