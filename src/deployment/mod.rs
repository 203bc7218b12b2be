/*
 * Copyright 2021 Daniel Bornkessel
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The cluster document describing the desired set of project deployments.
/// It is written by an external component and only observed here; the
/// operator treats `spec.projects` as the sole source of truth.
#[derive(CustomResource, Serialize, Deserialize, PartialEq, Default, Debug, Clone, JsonSchema)]
#[kube(
    group = "giantswarm.io",
    version = "v1",
    kind = "DraughtsmanDeployment",
    plural = "draughtsmandeployments",
    singular = "draughtsmandeployment",
    shortname = "dd"
)]
#[serde(rename_all = "camelCase")]
pub struct DraughtsmanDeploymentSpec {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

/// One desired project deployment as written into the custom resource.
#[derive(Serialize, Deserialize, PartialEq, Default, Debug, Clone, JsonSchema)]
pub struct ProjectEntry {
    /// Decimal identifier of the upstream deployment event this entry was
    /// created for.
    pub id: String,
    pub name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// The domain view of a project deployment used throughout reconciliation.
///
/// `git_ref` holds the full desired ref when the project comes from the
/// custom resource, but may be a truncated prefix when it comes from the
/// package manager's release listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub git_ref: String,
}

impl From<&ProjectEntry> for Project {
    fn from(entry: &ProjectEntry) -> Self {
        Project {
            id: entry.id.clone(),
            name: entry.name.clone(),
            git_ref: entry.git_ref.clone(),
        }
    }
}
