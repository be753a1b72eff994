use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RequestId = i64;
pub type WorkerId = i64;

// Backend enums travel as plain strings. Unknown values are kept verbatim so
// they can still be shown instead of failing the whole payload.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)+
                    Self::Other(raw) => raw.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                let trimmed = raw.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($wire) {
                        return Self::$variant;
                    }
                )+
                Self::Other(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::from(raw.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Lifecycle of a service request as owned by the client.
    RequestStatus {
        Open => "open",
        InProgress => "in_progress",
        Closed => "closed",
    }
);

string_enum!(
    /// Status of one worker inside one request's bidding.
    ParticipantStatus {
        Pending => "pending",
        Bidding => "bidding",
        Accepted => "accepted",
    }
);

string_enum!(
    Urgency {
        Urgent => "urgent",
        High => "high",
        Medium => "medium",
        Normal => "normal",
        Low => "low",
    }
);

string_enum!(
    Category {
        Plumber => "Plumber",
        Electrician => "Electrician",
        Carpenter => "Carpenter",
        Painter => "Painter",
        Mechanic => "Mechanic",
        Cleaner => "Cleaner",
        Gardener => "Gardener",
    }
);

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Plumber,
        Category::Electrician,
        Category::Carpenter,
        Category::Painter,
        Category::Mechanic,
        Category::Cleaner,
        Category::Gardener,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

/// Denormalized worker profile attached to participants and returned by the
/// worker directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Worker {
    pub id: Option<WorkerId>,
    pub name: String,
    pub genre: Option<String>,
    pub rating: f32,
    pub verified: bool,
    pub picture: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub wilaya: Option<String>,
    #[serde(rename = "baladia", alias = "baladiya")]
    pub baladiya: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub service_request_id: RequestId,
    pub worker_id: WorkerId,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub worker: Option<Worker>,
}

impl Participant {
    pub fn has_bid(&self) -> bool {
        self.bid > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: RequestId,
    pub category: Category,
    pub description: String,
    pub budget: f64,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl ServiceRequest {
    pub fn participant(&self, worker_id: WorkerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.worker_id == worker_id)
    }
}

/// One row of `GET /servicerequests/worker`: the worker's own participation
/// together with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerServiceRequest {
    pub service_request_id: RequestId,
    pub worker_id: WorkerId,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub client_completed: bool,
    #[serde(default)]
    pub worker_completed: bool,
    pub service_request: ServiceRequest,
}

impl WorkerServiceRequest {
    pub fn is_completed(&self) -> bool {
        self.client_completed && self.worker_completed
    }

    pub fn as_participant(&self) -> Participant {
        Participant {
            service_request_id: self.service_request_id,
            worker_id: self.worker_id,
            status: self.status.clone(),
            bid: self.bid,
            worker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewServiceRequest {
    pub category: Category,
    pub description: String,
    pub status: RequestStatus,
    pub budget: f64,
    pub urgency: Urgency,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestRef {
    pub service_request_id: RequestId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BidBody {
    pub service_request_id: RequestId,
    pub money: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorkerRef {
    pub service_request_id: RequestId,
    pub worker_id: WorkerId,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default)]
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkersEnvelope {
    #[serde(default)]
    pub workers: Vec<Worker>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

/// Some endpoints wrap their payload in `{ "data": ... }`, some don't.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MaybeData<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> MaybeData<T> {
    pub fn into_inner(self) -> T {
        match self {
            MaybeData::Wrapped { data } => data,
            MaybeData::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
