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

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub display_name: String,
    pub base_url: String,
}

impl ServiceDescriptor {
    pub fn new(name: &str, base_url: &str) -> Self {
        ServiceDescriptor {
            name: name.to_string(),
            display_name: format!("{}-service", name),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Logical service name to base URL. Built once at startup and read-only after.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    pub fn from_map(services: &BTreeMap<String, String>) -> Self {
        ServiceRegistry {
            services: services
                .iter()
                .map(|(name, url)| (name.clone(), ServiceDescriptor::new(name, url)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Name to display name, as reported by `/health`.
    pub fn status(&self) -> BTreeMap<String, String> {
        self.services
            .values()
            .map(|s| (s.name.clone(), s.display_name.clone()))
            .collect()
    }
}
