//! Negotiation lobby: one viewer's participation in one service request.
//!
//! A worker moves through `NotJoined → Pending → Bidding → Accepted`, or ends
//! in `Left` after leaving. The request owner sees the same lobby from the
//! other side and can accept offers. Every transition is confirmed by the
//! backend before it is reflected locally.

pub mod controller;
pub mod messaging;
pub mod transcript;

use std::fmt;

use crate::api::ApiError;
use crate::api::models::{ParticipantStatus, Role};

pub use controller::{LobbyController, LobbySnapshot};
pub use messaging::{LocalChannel, MessageChannel};
pub use transcript::{DeliveryStatus, Message, MessageKind, ThreadKey, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobbyState {
    NotJoined,
    Pending,
    Bidding,
    Accepted,
    /// Absorbing: a worker that left cannot rejoin the same request.
    Left,
}

impl LobbyState {
    pub fn from_status(status: &ParticipantStatus) -> Option<Self> {
        match status {
            ParticipantStatus::Pending => Some(LobbyState::Pending),
            ParticipantStatus::Bidding => Some(LobbyState::Bidding),
            ParticipantStatus::Accepted => Some(LobbyState::Accepted),
            ParticipantStatus::Other(_) => None,
        }
    }

    pub fn is_participating(self) -> bool {
        matches!(self, LobbyState::Pending | LobbyState::Bidding)
    }
}

impl fmt::Display for LobbyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LobbyState::NotJoined => "not joined",
            LobbyState::Pending => "pending",
            LobbyState::Bidding => "bidding",
            LobbyState::Accepted => "accepted",
            LobbyState::Left => "left",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Join,
    Bid,
    Leave,
    Accept,
    Message,
    Refresh,
}

impl Action {
    /// Alert text used when the backend gives no message of its own.
    pub fn fallback(self) -> &'static str {
        match self {
            Action::Join => "Failed to join bidding. Please try again.",
            Action::Bid => "Failed to place bid",
            Action::Leave => "Failed to leave lobby",
            Action::Accept => "Failed to accept offer",
            Action::Message => "Failed to send message",
            Action::Refresh => "Failed to load service requests",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Join => "join the bidding",
            Action::Bid => "place a bid",
            Action::Leave => "leave the lobby",
            Action::Accept => "accept an offer",
            Action::Message => "send a message",
            Action::Refresh => "refresh the lobby",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error(transparent)]
    Api(ApiError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("cannot {action} while {state}")]
    InvalidTransition { state: LobbyState, action: Action },
    #[error("a {role} cannot {action}")]
    Forbidden { role: Role, action: Action },
    #[error("Please wait for the current action to finish")]
    Busy,
    #[error("the lobby has been closed")]
    Closed,
}

impl From<ApiError> for LobbyError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict(message) => LobbyError::Conflict(
                message.unwrap_or_else(|| "You have already joined this service request".into()),
            ),
            ApiError::NotFound(message) => LobbyError::NotFound(
                message.unwrap_or_else(|| "This service request is no longer available".into()),
            ),
            other => LobbyError::Api(other),
        }
    }
}

/// What the user is shown when an action fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

impl LobbyError {
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            LobbyError::Api(err) => err.user_message(fallback),
            LobbyError::Closed => fallback.to_string(),
            other => other.to_string(),
        }
    }

    pub fn alert(&self, action: Action) -> Alert {
        let title = match (self, action) {
            (LobbyError::Validation(_), Action::Bid) => "Invalid Bid",
            (LobbyError::Validation(_), _) => "Invalid Input",
            _ => "Error",
        };
        Alert {
            title: title.to_string(),
            message: self.user_message(action.fallback()),
        }
    }
}
