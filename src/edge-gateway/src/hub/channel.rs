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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common_base::utils::time_util::{now_secs, UnixTimestamp};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    Full,
    Closed,
}

/// Sending half of one client connection. Clones share the same queue and
/// close signal.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    id: u64,
    sender: mpsc::Sender<String>,
    closed: CancellationToken,
    connected_at: UnixTimestamp,
    last_seen: Arc<AtomicU64>,
}

/// Receiving half, owned by the connection's writer task.
#[derive(Debug)]
pub struct ChannelReceiver {
    receiver: mpsc::Receiver<String>,
    closed: CancellationToken,
}

impl ClientChannel {
    pub fn new(id: u64, capacity: usize) -> (ClientChannel, ChannelReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let channel = ClientChannel {
            id,
            sender,
            closed: closed.clone(),
            connected_at: UnixTimestamp::now(),
            last_seen: Arc::new(AtomicU64::new(now_secs())),
        };
        (channel, ChannelReceiver { receiver, closed })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues a frame without waiting.
    pub fn try_send(&self, frame: String) -> Result<(), SendFailure> {
        if self.closed.is_cancelled() {
            return Err(SendFailure::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendFailure::Full,
            TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves once the channel has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    pub fn connected_at(&self) -> UnixTimestamp {
        self.connected_at
    }

    pub fn last_seen(&self) -> UnixTimestamp {
        UnixTimestamp::from_secs(self.last_seen.load(Ordering::Relaxed))
    }
}

impl ChannelReceiver {
    /// Next queued frame, or `None` once the channel has been closed.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            frame = self.receiver.recv() => frame,
        }
    }
}
