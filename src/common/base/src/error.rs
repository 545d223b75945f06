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

use std::net::AddrParseError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("{0}")]
    CommonError(String),

    #[error("invalid configuration {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to initialize logger: {0}")]
    LogInit(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    AddrParseError(#[from] AddrParseError),
}

impl CommonError {
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CommonError::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
