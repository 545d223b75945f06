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

use axum::extract::State;
use axum::Json;
use common_base::utils::time_util::UnixTimestamp;
use serde_json::{json, Value};

use crate::gateway::Gateway;

pub async fn health(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": UnixTimestamp::now(),
        "services": gateway.registry.status(),
        "rate_limit": gateway.admission.stats(),
        "websocket": {
            "connections": gateway.hub.connection_count().await,
        },
    }))
}
