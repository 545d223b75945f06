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

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn now_secs() -> u64 {
    UnixTimestamp::now().to_secs()
}

/// Wall-clock instant used for token arithmetic and status reporting.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnixTimestamp(SystemTime);

impl UnixTimestamp {
    pub fn now() -> Self {
        UnixTimestamp(SystemTime::now())
    }

    pub fn from_secs(secs: u64) -> Self {
        UnixTimestamp(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn to_secs(&self) -> u64 {
        self.0
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Time left until `self`, zero when `self` is already in the past.
    pub fn remaining_from(&self, now: UnixTimestamp) -> Duration {
        self.0.duration_since(now.0).unwrap_or(Duration::ZERO)
    }

    /// Time since `earlier`, zero when `earlier` is not in the past.
    pub fn elapsed_since(&self, earlier: UnixTimestamp) -> Duration {
        self.0.duration_since(earlier.0).unwrap_or(Duration::ZERO)
    }

    pub fn to_rfc3339(&self) -> String {
        DateTime::<Utc>::from(self.0).to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl Default for UnixTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}
