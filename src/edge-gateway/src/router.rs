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

use axum::http::Method;

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    User,
    Admin,
}

/// One forwarding rule: `method path` on the gateway goes to `target` on
/// `service`. `:name` segments in `target` are filled from the matched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    pub path: String,
    pub service: String,
    pub target: String,
    pub access: RouteAccess,
    /// Revoke the caller's credential before forwarding.
    pub revokes_credential: bool,
}

impl RouteEntry {
    pub fn new(
        method: Method,
        path: &str,
        service: &str,
        target: &str,
        access: RouteAccess,
    ) -> Self {
        RouteEntry {
            method,
            path: path.to_string(),
            service: service.to_string(),
            target: target.to_string(),
            access,
            revokes_credential: false,
        }
    }

    pub fn revoking(mut self) -> Self {
        self.revokes_credential = true;
        self
    }
}

/// Replaces every `:name` segment of `template` with the matching parameter.
/// Segments with no matching parameter are left as they are.
pub fn render_path(template: &str, params: &[(String, String)]) -> String {
    template
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .unwrap_or(segment),
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn default_routes() -> Vec<RouteEntry> {
    use RouteAccess::{Admin, Public, User};

    let get = Method::GET;
    let post = Method::POST;
    let put = Method::PUT;
    let delete = Method::DELETE;

    vec![
        // auth
        RouteEntry::new(post.clone(), "/api/auth/register", "auth", "/register", Public),
        RouteEntry::new(post.clone(), "/api/auth/login", "auth", "/login", Public),
        RouteEntry::new(post.clone(), "/api/auth/refresh", "auth", "/refresh", Public),
        RouteEntry::new(get.clone(), "/api/auth/verify", "auth", "/verify", Public),
        RouteEntry::new(post.clone(), "/api/auth/forgot-password", "auth", "/forgot-password", Public),
        RouteEntry::new(post.clone(), "/api/auth/reset-password", "auth", "/reset-password", Public),
        RouteEntry::new(post.clone(), "/api/auth/logout", "auth", "/logout", User).revoking(),
        // users
        RouteEntry::new(get.clone(), "/api/users/profile", "user", "/profile", User),
        RouteEntry::new(put.clone(), "/api/users/profile", "user", "/profile", User),
        RouteEntry::new(delete.clone(), "/api/users/profile", "user", "/profile", User),
        RouteEntry::new(get.clone(), "/api/users/search", "user", "/search", User),
        RouteEntry::new(get.clone(), "/api/users/:id", "user", "/users/:id", User),
        RouteEntry::new(post.clone(), "/api/users/block/:id", "user", "/block/:id", User),
        RouteEntry::new(delete.clone(), "/api/users/block/:id", "user", "/block/:id", User),
        RouteEntry::new(post.clone(), "/api/users/report/:id", "user", "/report/:id", User),
        // media
        RouteEntry::new(post.clone(), "/api/media/upload", "media", "/upload", User),
        RouteEntry::new(get.clone(), "/api/media/:id", "media", "/media/:id", User),
        RouteEntry::new(delete.clone(), "/api/media/:id", "media", "/media/:id", User),
        RouteEntry::new(get.clone(), "/api/media/user/:user_id", "media", "/user/:user_id", User),
        // matches
        RouteEntry::new(get.clone(), "/api/matches", "match", "/api/v1/matches", User),
        RouteEntry::new(get.clone(), "/api/matches/algorithm", "match", "/api/v1/matches/algorithm", User),
        RouteEntry::new(get.clone(), "/api/matches/preferences", "match", "/api/v1/matches/preferences", User),
        RouteEntry::new(post.clone(), "/api/matches/like", "match", "/api/v1/matches/like", User),
        RouteEntry::new(post.clone(), "/api/matches/unlike", "match", "/api/v1/matches/unlike", User),
        RouteEntry::new(post.clone(), "/api/matches/block", "match", "/api/v1/matches/block", User),
        RouteEntry::new(get.clone(), "/api/matches/received-likes", "match", "/api/v1/matches/received-likes", User),
        RouteEntry::new(get.clone(), "/api/matches/health", "match", "/health", Public),
        // matrix
        RouteEntry::new(get.clone(), "/api/matrix/users", "match", "/api/v1/matrix/users", User),
        RouteEntry::new(get.clone(), "/api/matrix/compatible/:user_id", "match", "/api/v1/matrix/compatible/:user_id", User),
        RouteEntry::new(post.clone(), "/api/matrix/export", "match", "/api/v1/matrix/export", User),
        // chat
        RouteEntry::new(get.clone(), "/api/chat/conversations", "chat", "/conversations", User),
        RouteEntry::new(get.clone(), "/api/chat/conversations/:id", "chat", "/conversations/:id", User),
        RouteEntry::new(get.clone(), "/api/chat/conversations/:id/messages", "chat", "/conversations/:id/messages", User),
        RouteEntry::new(post.clone(), "/api/chat/conversations/:id/messages", "chat", "/conversations/:id/messages", User),
        RouteEntry::new(put.clone(), "/api/chat/conversations/:id/read", "chat", "/conversations/:id/read", User),
        // notifications
        RouteEntry::new(get.clone(), "/api/notifications", "notify", "/notifications", User),
        RouteEntry::new(put.clone(), "/api/notifications/read-all", "notify", "/notifications/read-all", User),
        RouteEntry::new(put.clone(), "/api/notifications/:id/read", "notify", "/notifications/:id/read", User),
        RouteEntry::new(delete.clone(), "/api/notifications/:id", "notify", "/notifications/:id", User),
        // payments
        RouteEntry::new(post.clone(), "/api/payments/webhook", "payments", "/api/stripe/webhook", Public),
        RouteEntry::new(post.clone(), "/api/payments/checkout", "payments", "/api/stripe/create-checkout-session", User),
        RouteEntry::new(get.clone(), "/api/payments/subscription", "payments", "/api/subscription", User),
        RouteEntry::new(post.clone(), "/api/payments/subscription", "payments", "/api/subscription", User),
        RouteEntry::new(delete.clone(), "/api/payments/subscription", "payments", "/api/subscription", User),
        RouteEntry::new(get.clone(), "/api/payments/subscription/premium-status", "payments", "/api/subscription/premium-status", User),
        RouteEntry::new(get.clone(), "/api/payments/history", "payments", "/api/payments/history", User),
        // admin
        RouteEntry::new(get.clone(), "/api/admin/performance", "match", "/api/v1/admin/performance", Admin),
        RouteEntry::new(post.clone(), "/api/admin/cache/clear", "match", "/api/v1/admin/cache/clear", Admin),
        RouteEntry::new(post.clone(), "/api/admin/indexes/create", "match", "/api/v1/admin/indexes/create", Admin),
        RouteEntry::new(get.clone(), "/api/admin/users", "admin", "/api/v1/users", Admin),
        RouteEntry::new(get.clone(), "/api/admin/users/:id", "admin", "/api/v1/users/:id", Admin),
        RouteEntry::new(delete, "/api/admin/users/:id", "admin", "/api/v1/users/:id", Admin),
        RouteEntry::new(post, "/api/admin/payments/sync/:user_id", "payments", "/api/admin/payments/sync/:user_id", Admin),
        RouteEntry::new(get, "/api/admin/stats", "admin", "/api/v1/stats", Admin),
        RouteEntry::new(put, "/api/admin/users/:id/status", "admin", "/api/v1/users/:id/status", Admin),
    ]
}
