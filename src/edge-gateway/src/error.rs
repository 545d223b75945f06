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

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_base::error::CommonError;
use common_jwt::json_web_token::TokenError;
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("insufficient privileges")]
    Forbidden,

    #[error("Service {0} not available")]
    UnknownService(String),

    #[error("Service {0} unavailable")]
    UpstreamUnavailable(String),

    #[error("Broadcast channel full, message not sent")]
    BroadcastFull,

    #[error("internal access only")]
    InternalTrust,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    CommonError(#[from] CommonError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Token(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::UnknownService(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::BroadcastFull => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InternalTrust => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) | GatewayError::CommonError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Token(e) => e.code(),
            GatewayError::Forbidden => "forbidden",
            GatewayError::UnknownService(_) => "service_unavailable",
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
            GatewayError::BroadcastFull => "broadcast_full",
            GatewayError::InternalTrust => "internal_unauthorized",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Internal(_) | GatewayError::CommonError(_) => "internal_error",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("gateway internal error: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({
            "error": message,
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}
