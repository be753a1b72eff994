use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::models::{RequestId, Role, WorkerId};
use crate::utils::format_amount;

pub type MessageId = u64;

/// Longest chat line the lobby accepts.
pub const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub request_id: RequestId,
    /// `None` is the request-wide thread the owner sees.
    pub worker_id: Option<WorkerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Bid { amount: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Handed to the messaging channel, no answer yet.
    Pending,
    /// Kept on this device only.
    LocalOnly,
    /// Acknowledged by the server or the messaging channel.
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::LocalOnly => "local_only",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(DeliveryStatus::Pending),
            "local_only" => Some(DeliveryStatus::LocalOnly),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Role,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub delivery: DeliveryStatus,
}

impl Message {
    pub fn amount(&self) -> Option<f64> {
        match self.kind {
            MessageKind::Bid { amount } => Some(amount),
            MessageKind::Text => None,
        }
    }

    pub fn is_bid(&self) -> bool {
        matches!(self.kind, MessageKind::Bid { .. })
    }
}

/// Append-only chat log of one lobby. Entries are never removed; only the
/// delivery status of an entry changes once its delivery attempt settles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: MessageId,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a transcript from stored messages, oldest first.
    pub fn from_messages(mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.id);
        let next_id = messages.last().map(|m| m.id + 1).unwrap_or(0);
        Self { messages, next_id }
    }

    /// The canned conversation the lobby opens with in demo mode.
    pub fn demo(now: DateTime<Utc>) -> Self {
        let script = [
            (5, Role::Client, "Hello! I'm interested in your services for this project."),
            (4, Role::Worker, "Hi! I'd be happy to help. I've reviewed your requirements."),
            (3, Role::Client, "What would be your best price for this work?"),
            (2, Role::Worker, "Based on the scope, I can offer a competitive rate. Let me place a bid."),
        ];
        let mut transcript = Self::new();
        for (minutes_ago, sender, text) in script {
            transcript.push(
                sender,
                text.to_string(),
                MessageKind::Text,
                DeliveryStatus::LocalOnly,
                now - Duration::minutes(minutes_ago),
            );
        }
        transcript
    }

    pub fn push(
        &mut self,
        sender: Role,
        text: String,
        kind: MessageKind,
        delivery: DeliveryStatus,
        sent_at: DateTime<Utc>,
    ) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(Message {
            id,
            sender,
            text,
            sent_at,
            kind,
            delivery,
        });
        id
    }

    pub fn push_bid(&mut self, sender: Role, amount: f64, sent_at: DateTime<Utc>) -> MessageId {
        let text = format!("I'm placing a bid of {} for this project.", format_amount(amount));
        self.push(
            sender,
            text,
            MessageKind::Bid { amount },
            DeliveryStatus::Delivered,
            sent_at,
        )
    }

    /// Returns false when no message has that id.
    pub fn set_delivery(&mut self, id: MessageId, delivery: DeliveryStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.delivery = delivery;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn latest_bid(&self) -> Option<f64> {
        self.messages.iter().rev().find_map(Message::amount)
    }
}
