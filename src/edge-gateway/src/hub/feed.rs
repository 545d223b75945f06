// Copyright 2023 RobustMQ Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::{BroadcastMessage, ConnectionHub};
use crate::error::GatewayError;

/// Bounded queue between internal producers and the hub. A single consumer
/// drains it in arrival order.
#[derive(Clone)]
pub struct BroadcastFeed {
    sender: mpsc::Sender<BroadcastMessage>,
}

/// Receiving end of a feed whose consumer has not been started yet.
pub struct FeedReceiver {
    receiver: mpsc::Receiver<BroadcastMessage>,
}

impl BroadcastFeed {
    pub fn channel(capacity: usize) -> (BroadcastFeed, FeedReceiver) {
        let (sender, receiver) = mpsc::channel::<BroadcastMessage>(capacity.max(1));
        (BroadcastFeed { sender }, FeedReceiver { receiver })
    }

    /// A feed with its consumer already running against `hub`.
    pub fn start(hub: Arc<ConnectionHub>, capacity: usize) -> (BroadcastFeed, JoinHandle<()>) {
        let (feed, receiver) = BroadcastFeed::channel(capacity);
        (feed, receiver.consume(hub))
    }

    /// Enqueues without waiting; a saturated feed is an error for the producer.
    pub fn try_publish(&self, message: BroadcastMessage) -> Result<(), GatewayError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => GatewayError::BroadcastFull,
            TrySendError::Closed(_) => {
                GatewayError::Internal("broadcast feed is not running".to_string())
            }
        })
    }
}

impl FeedReceiver {
    pub fn consume(mut self, hub: Arc<ConnectionHub>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = self.receiver.recv().await {
                let attempts = hub.dispatch(&message).await;
                debug!(
                    "broadcast {} delivered to {} connections",
                    message.kind, attempts
                );
            }
            info!("broadcast feed consumer stopped");
        })
    }
}
