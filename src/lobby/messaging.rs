use async_trait::async_trait;
use log::debug;

use crate::lobby::transcript::{DeliveryStatus, Message, ThreadKey};

/// Delivery channel for lobby chat messages.
///
/// The backend has no chat endpoint, so the only implementation shipped here
/// keeps messages on the device. A poll or push based channel plugs in here
/// and decides the final delivery status of every message it is handed.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn deliver(&self, thread: ThreadKey, message: &Message) -> DeliveryStatus;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalChannel;

#[async_trait]
impl MessageChannel for LocalChannel {
    async fn deliver(&self, thread: ThreadKey, message: &Message) -> DeliveryStatus {
        debug!(
            "Keeping message {} of request {} local",
            message.id, thread.request_id
        );
        DeliveryStatus::LocalOnly
    }
}
