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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use common_base::utils::time_util::UnixTimestamp;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub mod channel;
pub mod feed;
pub mod message;

pub use channel::{ChannelReceiver, ClientChannel, SendFailure};
pub use feed::BroadcastFeed;
pub use message::{Audience, BroadcastMessage};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: u64,
    pub connected_at: UnixTimestamp,
    pub last_seen: UnixTimestamp,
    pub channels: Vec<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<String, ClientChannel>,
    /// channel name -> subscribed identities
    channels: HashMap<String, HashSet<String>>,
}

impl HubState {
    fn drop_subscriptions(&mut self, identity: &str) {
        self.channels.retain(|_, subscribers| {
            subscribers.remove(identity);
            !subscribers.is_empty()
        });
    }

    fn subscriptions_of(&self, identity: &str) -> Vec<String> {
        let mut channels: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, subscribers)| subscribers.contains(identity))
            .map(|(name, _)| name.clone())
            .collect();
        channels.sort();
        channels
    }
}

/// Live client connections, at most one per identity, and their channel
/// subscriptions.
pub struct ConnectionHub {
    state: RwLock<HubState>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl ConnectionHub {
    pub fn new(queue_capacity: usize) -> Self {
        ConnectionHub {
            state: RwLock::new(HubState::default()),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// A fresh channel with a unique id, not yet registered.
    pub fn open_channel(&self) -> (ClientChannel, ChannelReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ClientChannel::new(id, self.queue_capacity)
    }

    /// Makes `channel` the live connection for `identity`, closing whatever
    /// was registered before. Subscriptions of the old connection are dropped.
    pub async fn register(&self, identity: &str, channel: ClientChannel) {
        let previous = {
            let mut state = self.state.write().await;
            let previous = state.connections.insert(identity.to_string(), channel);
            if previous.is_some() {
                state.drop_subscriptions(identity);
            }
            previous
        };
        if let Some(previous) = previous {
            info!(
                "closing connection {} of {} replaced by a new connection",
                previous.id(),
                identity
            );
            previous.close();
        }
        debug!("websocket client {} registered", identity);
    }

    pub async fn unregister(&self, identity: &str) {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.connections.remove(identity);
            if removed.is_some() {
                state.drop_subscriptions(identity);
            }
            removed
        };
        if let Some(channel) = removed {
            channel.close();
            debug!("websocket client {} unregistered", identity);
        }
    }

    /// Removes `identity` only while `connection_id` is still the live
    /// connection, so a replaced connection cannot evict its successor.
    pub async fn unregister_connection(&self, identity: &str, connection_id: u64) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            match state.connections.get(identity) {
                Some(current) if current.id() == connection_id => {
                    state.drop_subscriptions(identity);
                    state.connections.remove(identity)
                }
                _ => None,
            }
        };
        match removed {
            Some(channel) => {
                channel.close();
                debug!("websocket client {} unregistered", identity);
                true
            }
            None => false,
        }
    }

    /// Subscribes a connected identity to `channel`. Returns false when the
    /// identity has no live connection.
    pub async fn subscribe(&self, identity: &str, channel: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(identity) {
            warn!(
                "cannot subscribe {} to channel {}: client not connected",
                identity, channel
            );
            return false;
        }
        let subscribers = state.channels.entry(channel.to_string()).or_default();
        subscribers.insert(identity.to_string());
        debug!(
            "{} subscribed to channel {} ({} subscribers)",
            identity,
            channel,
            subscribers.len()
        );
        true
    }

    pub async fn unsubscribe(&self, identity: &str, channel: &str) {
        let mut state = self.state.write().await;
        if let Some(subscribers) = state.channels.get_mut(channel) {
            subscribers.remove(identity);
            if subscribers.is_empty() {
                state.channels.remove(channel);
                debug!("channel {} removed, no subscribers left", channel);
            }
        }
    }

    /// Queues `message` for each registered identity in `identities` and
    /// returns the number of delivery attempts. Recipients whose queue is
    /// full or closed are dropped.
    pub async fn deliver(&self, identities: &[String], message: &BroadcastMessage) -> usize {
        let frame = message.to_frame();
        let mut attempts = 0;
        let mut failed = Vec::new();
        {
            let state = self.state.read().await;
            for identity in identities {
                let Some(channel) = state.connections.get(identity) else {
                    continue;
                };
                attempts += 1;
                if let Err(e) = channel.try_send(frame.clone()) {
                    failed.push((identity.clone(), channel.id(), e));
                }
            }
        }
        self.drop_failed(failed).await;
        attempts
    }

    /// Queues `message` for every subscriber of `channel`.
    pub async fn deliver_channel(&self, channel: &str, message: &BroadcastMessage) -> usize {
        let subscribers: Vec<String> = match self.state.read().await.channels.get(channel) {
            Some(subscribers) => subscribers.iter().cloned().collect(),
            None => return 0,
        };
        self.deliver(&subscribers, message).await
    }

    /// Queues `message` for every connected client.
    pub async fn deliver_all(&self, message: &BroadcastMessage) -> usize {
        let frame = message.to_frame();
        let mut attempts = 0;
        let mut failed = Vec::new();
        {
            let state = self.state.read().await;
            for (identity, channel) in state.connections.iter() {
                attempts += 1;
                if let Err(e) = channel.try_send(frame.clone()) {
                    failed.push((identity.clone(), channel.id(), e));
                }
            }
        }
        self.drop_failed(failed).await;
        attempts
    }

    /// Routes a feed message to its audience.
    pub async fn dispatch(&self, message: &BroadcastMessage) -> usize {
        match message.audience() {
            Audience::Users(targets) => self.deliver(&targets, message).await,
            Audience::Channel(channel) => self.deliver_channel(&channel, message).await,
            Audience::Everyone => self.deliver_all(message).await,
        }
    }

    async fn drop_failed(&self, failed: Vec<(String, u64, SendFailure)>) {
        for (identity, connection_id, reason) in failed {
            warn!(
                "dropping websocket client {} (connection {}): queue {:?}",
                identity, connection_id, reason
            );
            self.unregister_connection(&identity, connection_id).await;
        }
    }

    /// Evicts connections not heard from for longer than `max_idle`.
    pub async fn sweep_stale(&self, max_idle: Duration) -> usize {
        let now = UnixTimestamp::now();
        let stale: Vec<(String, u64)> = {
            let state = self.state.read().await;
            state
                .connections
                .iter()
                .filter(|(_, channel)| now.elapsed_since(channel.last_seen()) > max_idle)
                .map(|(identity, channel)| (identity.clone(), channel.id()))
                .collect()
        };
        let mut removed = 0;
        for (identity, connection_id) in stale {
            if self.unregister_connection(&identity, connection_id).await {
                info!("removed stale websocket connection of {}", identity);
                removed += 1;
            }
        }
        removed
    }

    /// Runs `sweep_stale` every `interval` until the hub is dropped.
    pub fn start_stale_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_idle: Duration,
    ) -> JoinHandle<()> {
        let hub: Weak<ConnectionHub> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.sweep_stale(max_idle).await;
            }
        })
    }

    pub async fn is_online(&self, identity: &str) -> bool {
        self.state.read().await.connections.contains_key(identity)
    }

    pub async fn connection_info(&self, identity: &str) -> Option<ConnectionInfo> {
        let state = self.state.read().await;
        state.connections.get(identity).map(|channel| ConnectionInfo {
            connection_id: channel.id(),
            connected_at: channel.connected_at(),
            last_seen: channel.last_seen(),
            channels: state.subscriptions_of(identity),
        })
    }

    pub async fn connected_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.state.read().await.connections.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Subscriber count per channel.
    pub async fn channel_stats(&self) -> BTreeMap<String, usize> {
        self.state
            .read()
            .await
            .channels
            .iter()
            .map(|(name, subscribers)| (name.clone(), subscribers.len()))
            .collect()
    }

    /// Closes and forgets every connection.
    pub async fn shutdown(&self) {
        let drained: Vec<ClientChannel> = {
            let mut state = self.state.write().await;
            state.channels.clear();
            state.connections.drain().map(|(_, channel)| channel).collect()
        };
        for channel in &drained {
            channel.close();
        }
        info!("connection hub closed {} connections", drained.len());
    }
}
