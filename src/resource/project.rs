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

use std::sync::Arc;

use async_trait::async_trait;

use crate::deployment::{DraughtsmanDeployment, Project};
use crate::error::{Error, Result};
use crate::eventer::{DeploymentEvent, Eventer};
use crate::framework::{Patch, Resource};
use crate::installer::{self, Installer};
use crate::notifier::Notifier;

/// The identifier of the resource.
const NAME: &str = "project";

/// How the delete patch is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteSemantics {
    /// Enumerates the current projects whose name is still present in the
    /// desired set; the historical behavior.
    #[default]
    Legacy,
    /// Enumerates current minus desired: the releases a future delete
    /// implementation would actually remove.
    Difference,
}

impl std::str::FromStr for DeleteSemantics {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "legacy" => Ok(DeleteSemantics::Legacy),
            "difference" => Ok(DeleteSemantics::Difference),
            other => Err(Error::invalid_config(format!(
                "delete semantics '{}' not implemented",
                other
            ))),
        }
    }
}

pub struct ProjectResourceConfig {
    pub eventer: Arc<dyn Eventer>,
    pub installer: Arc<dyn Installer>,
    pub notifier: Arc<dyn Notifier>,

    pub delete_semantics: DeleteSemantics,
}

/// Reconciles the desired project set from the custom resource against
/// the releases the package manager reports as deployed.
pub struct ProjectResource {
    eventer: Arc<dyn Eventer>,
    installer: Arc<dyn Installer>,
    notifier: Arc<dyn Notifier>,

    delete_semantics: DeleteSemantics,
}

impl ProjectResource {
    pub fn new(config: ProjectResourceConfig) -> Result<Self> {
        Ok(ProjectResource {
            eventer: config.eventer,
            installer: config.installer,
            notifier: config.notifier,
            delete_semantics: config.delete_semantics,
        })
    }

    /// Installs each project in order and reports the outcome: install,
    /// then event status, then chat notification. On install failure the
    /// failed status and failed notification are posted before the
    /// install error is returned; an error from either of those
    /// compensations takes precedence over the install error.
    async fn deploy(&self, projects: &[Project]) -> Result<()> {
        for project in projects {
            // The id addresses the upstream deployment event; without it
            // neither outcome can be reported, so a malformed id aborts
            // the pass before anything is installed.
            let id: i64 = project
                .id
                .parse()
                .map_err(|_| Error::MalformedEventId(project.id.clone()))?;

            let event = DeploymentEvent {
                id,
                name: project.name.clone(),
                sha: project.git_ref.clone(),
            };

            let install_result = self
                .installer
                .install(&installer::Project {
                    name: project.name.clone(),
                    git_ref: project.git_ref.clone(),
                })
                .await;

            match install_result {
                Ok(()) => {
                    self.eventer.set_success_status(&event).await?;
                    self.notifier.success(project).await?;
                }
                Err(install_err) => {
                    if let Err(event_err) = self.eventer.set_failed_status(&event).await {
                        error!(
                            "could not report failed deployment of '{}' (install error was: {}): {}",
                            project.name, install_err, event_err
                        );
                        return Err(event_err);
                    }
                    if let Err(notify_err) = self
                        .notifier
                        .failed(project, &install_err.to_string())
                        .await
                    {
                        error!(
                            "could not announce failed deployment of '{}' (install error was: {}): {}",
                            project.name, install_err, notify_err
                        );
                        return Err(notify_err);
                    }

                    return Err(install_err);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Resource for ProjectResource {
    type Current = Vec<Project>;
    type Desired = Vec<Project>;
    type Change = Vec<Project>;

    fn name(&self) -> &str {
        NAME
    }

    async fn current_state(&self, _obj: &DraughtsmanDeployment) -> Result<Vec<Project>> {
        let list = self.installer.list().await?;

        // Releases carry no deployment event id; the id only exists on
        // desired projects.
        Ok(list
            .into_iter()
            .map(|release| Project {
                id: String::new(),
                name: release.name,
                git_ref: release.git_ref,
            })
            .collect())
    }

    async fn desired_state(&self, obj: &DraughtsmanDeployment) -> Result<Vec<Project>> {
        Ok(obj.spec.projects.iter().map(Project::from).collect())
    }

    async fn update_patch(
        &self,
        _obj: &DraughtsmanDeployment,
        current: &Vec<Project>,
        desired: &Vec<Project>,
    ) -> Result<Patch<Vec<Project>>> {
        let create: Vec<Project> = desired
            .iter()
            .filter(|d| !current.iter().any(|c| c.name == d.name))
            .cloned()
            .collect();

        // The listed ref may be truncated, so the desired ref is compared
        // by prefix: a release whose truncated ref still prefixes the
        // desired ref is not drift.
        let update: Vec<Project> = desired
            .iter()
            .filter(|d| match current.iter().find(|c| c.name == d.name) {
                Some(c) => !d.git_ref.starts_with(&c.git_ref),
                None => false,
            })
            .cloned()
            .collect();

        Ok(Patch {
            create: Some(create),
            update: Some(update),
            delete: None,
        })
    }

    async fn delete_patch(
        &self,
        _obj: &DraughtsmanDeployment,
        current: &Vec<Project>,
        desired: &Vec<Project>,
    ) -> Result<Patch<Vec<Project>>> {
        let delete: Vec<Project> = match self.delete_semantics {
            DeleteSemantics::Legacy => current
                .iter()
                .filter(|c| desired.iter().any(|d| d.name == c.name))
                .cloned()
                .collect(),
            DeleteSemantics::Difference => current
                .iter()
                .filter(|c| !desired.iter().any(|d| d.name == c.name))
                .cloned()
                .collect(),
        };

        Ok(Patch {
            create: None,
            update: None,
            delete: Some(delete),
        })
    }

    async fn apply_create_change(
        &self,
        _obj: &DraughtsmanDeployment,
        change: &Vec<Project>,
    ) -> Result<()> {
        if change.is_empty() {
            debug!("the projects are already created in the Kubernetes cluster");
            return Ok(());
        }

        debug!("creating projects in the Kubernetes cluster");
        self.deploy(change).await?;
        debug!("created projects in the Kubernetes cluster");

        Ok(())
    }

    async fn apply_update_change(
        &self,
        _obj: &DraughtsmanDeployment,
        change: &Vec<Project>,
    ) -> Result<()> {
        if change.is_empty() {
            debug!("the projects are already up to date in the Kubernetes cluster");
            return Ok(());
        }

        debug!("updating projects in the Kubernetes cluster");
        self.deploy(change).await?;
        debug!("updated projects in the Kubernetes cluster");

        Ok(())
    }

    async fn apply_delete_change(
        &self,
        _obj: &DraughtsmanDeployment,
        _change: &Vec<Project>,
    ) -> Result<()> {
        // TODO: remove releases once delete semantics are settled; see
        // DeleteSemantics::Difference.
        debug!("skipping delete change; release removal is not implemented");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{DraughtsmanDeploymentSpec, ProjectEntry};
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct TestInstaller {
        log: CallLog,
        releases: Vec<installer::Project>,
        install_error: Option<String>,
    }

    #[async_trait]
    impl Installer for TestInstaller {
        async fn install(&self, project: &installer::Project) -> Result<()> {
            self.log.lock().unwrap().push(format!(
                "install({},{})",
                project.name, project.git_ref
            ));
            match &self.install_error {
                Some(message) => Err(Error::helm(message.clone())),
                None => Ok(()),
            }
        }

        async fn list(&self) -> Result<Vec<installer::Project>> {
            self.log.lock().unwrap().push("list".to_string());
            Ok(self.releases.clone())
        }
    }

    struct TestEventer {
        log: CallLog,
    }

    #[async_trait]
    impl Eventer for TestEventer {
        async fn set_failed_status(&self, event: &DeploymentEvent) -> Result<()> {
            self.log.lock().unwrap().push(format!(
                "event-failed({},{},{})",
                event.id, event.name, event.sha
            ));
            Ok(())
        }

        async fn set_success_status(&self, event: &DeploymentEvent) -> Result<()> {
            self.log.lock().unwrap().push(format!(
                "event-success({},{},{})",
                event.id, event.name, event.sha
            ));
            Ok(())
        }
    }

    struct TestNotifier {
        log: CallLog,
    }

    #[async_trait]
    impl Notifier for TestNotifier {
        async fn success(&self, project: &Project) -> Result<()> {
            self.log.lock().unwrap().push(format!(
                "notify-success({},{},{})",
                project.id, project.name, project.git_ref
            ));
            Ok(())
        }

        async fn failed(&self, project: &Project, error_message: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!(
                "notify-failed({},{})",
                project.name, error_message
            ));
            Ok(())
        }
    }

    struct Harness {
        resource: ProjectResource,
        log: CallLog,
    }

    fn harness(releases: Vec<installer::Project>, install_error: Option<&str>) -> Harness {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));

        let resource = ProjectResource::new(ProjectResourceConfig {
            eventer: Arc::new(TestEventer { log: log.clone() }),
            installer: Arc::new(TestInstaller {
                log: log.clone(),
                releases,
                install_error: install_error.map(str::to_string),
            }),
            notifier: Arc::new(TestNotifier { log: log.clone() }),
            delete_semantics: DeleteSemantics::Legacy,
        })
        .unwrap();

        Harness { resource, log }
    }

    fn deployment(projects: Vec<(&str, &str, &str)>) -> DraughtsmanDeployment {
        DraughtsmanDeployment::new(
            "draughtsman",
            DraughtsmanDeploymentSpec {
                projects: projects
                    .into_iter()
                    .map(|(id, name, git_ref)| ProjectEntry {
                        id: id.to_string(),
                        name: name.to_string(),
                        git_ref: git_ref.to_string(),
                    })
                    .collect(),
            },
        )
    }

    fn release(name: &str, git_ref: &str) -> installer::Project {
        installer::Project {
            name: name.to_string(),
            git_ref: git_ref.to_string(),
        }
    }

    fn project(id: &str, name: &str, git_ref: &str) -> Project {
        Project {
            id: id.to_string(),
            name: name.to_string(),
            git_ref: git_ref.to_string(),
        }
    }

    #[tokio::test]
    async fn a_new_project_lands_in_the_create_set() {
        let h = harness(vec![], None);
        let obj = deployment(vec![("7", "api", "abc123")]);

        let current = h.resource.current_state(&obj).await.unwrap();
        let desired = h.resource.desired_state(&obj).await.unwrap();
        let patch = h.resource.update_patch(&obj, &current, &desired).await.unwrap();

        assert_eq!(patch.create.unwrap(), vec![project("7", "api", "abc123")]);
        assert_eq!(patch.update.unwrap(), vec![]);
        assert!(patch.delete.is_none());
    }

    #[tokio::test]
    async fn a_truncated_but_matching_ref_is_not_drift() {
        let h = harness(vec![release("api", "abc")], None);
        let obj = deployment(vec![("7", "api", "abcdef0")]);

        let current = h.resource.current_state(&obj).await.unwrap();
        let desired = h.resource.desired_state(&obj).await.unwrap();
        let patch = h.resource.update_patch(&obj, &current, &desired).await.unwrap();

        assert_eq!(patch.create.unwrap(), vec![]);
        assert_eq!(patch.update.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn a_diverged_ref_lands_in_the_update_set() {
        let h = harness(vec![release("api", "abc")], None);
        let obj = deployment(vec![("7", "api", "zzzzzzz")]);

        let current = h.resource.current_state(&obj).await.unwrap();
        let desired = h.resource.desired_state(&obj).await.unwrap();
        let patch = h.resource.update_patch(&obj, &current, &desired).await.unwrap();

        assert_eq!(patch.create.unwrap(), vec![]);
        assert_eq!(patch.update.unwrap(), vec![project("7", "api", "zzzzzzz")]);
    }

    #[tokio::test]
    async fn create_and_update_sets_are_disjoint_subsets_of_desired() {
        let h = harness(
            vec![release("api", "abc"), release("worker", "fff")],
            None,
        );
        let obj = deployment(vec![
            ("1", "api", "abcdef0"),
            ("2", "worker", "0000000"),
            ("3", "scheduler", "1234567"),
        ]);

        let current = h.resource.current_state(&obj).await.unwrap();
        let desired = h.resource.desired_state(&obj).await.unwrap();
        let patch = h.resource.update_patch(&obj, &current, &desired).await.unwrap();

        let create = patch.create.unwrap();
        let update = patch.update.unwrap();

        assert_eq!(create, vec![project("3", "scheduler", "1234567")]);
        assert_eq!(update, vec![project("2", "worker", "0000000")]);
        for p in create.iter().chain(update.iter()) {
            assert!(desired.contains(p));
        }
        for p in &create {
            assert!(!update.contains(p));
        }
    }

    #[tokio::test]
    async fn a_successful_install_reports_event_then_notification() {
        let h = harness(vec![], None);
        let obj = deployment(vec![]);
        let change = vec![project("7", "api", "abc123")];

        h.resource.apply_create_change(&obj, &change).await.unwrap();

        assert_eq!(
            *h.log.lock().unwrap(),
            vec![
                "install(api,abc123)",
                "event-success(7,api,abc123)",
                "notify-success(7,api,abc123)",
            ]
        );
    }

    #[tokio::test]
    async fn a_failed_install_compensates_then_returns_the_install_error() {
        let h = harness(vec![], Some("boom"));
        let obj = deployment(vec![]);
        let change = vec![project("7", "api", "abc123")];

        let err = h
            .resource
            .apply_update_change(&obj, &change)
            .await
            .unwrap_err();

        assert!(err.is_helm());
        assert!(err.to_string().contains("boom"));

        let log = h.log.lock().unwrap();
        assert_eq!(log[0], "install(api,abc123)");
        assert_eq!(log[1], "event-failed(7,api,abc123)");
        assert!(log[2].starts_with("notify-failed(api,"));
        assert!(log[2].contains("boom"));
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn a_malformed_event_id_aborts_before_any_side_effect() {
        let h = harness(vec![], None);
        let obj = deployment(vec![]);
        let change = vec![project("af1234", "api", "abc123")];

        let err = h
            .resource
            .apply_create_change(&obj, &change)
            .await
            .unwrap_err();

        assert!(err.is_permanent());
        assert!(h.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_empty_change_is_already_reconciled() {
        let h = harness(vec![], None);
        let obj = deployment(vec![]);

        h.resource.apply_create_change(&obj, &vec![]).await.unwrap();
        h.resource.apply_update_change(&obj, &vec![]).await.unwrap();

        assert!(h.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_delete_patch_keeps_projects_still_desired() {
        let h = harness(vec![release("api", "abc"), release("old", "fff")], None);
        let obj = deployment(vec![("7", "api", "abcdef0")]);

        let current = h.resource.current_state(&obj).await.unwrap();
        let desired = h.resource.desired_state(&obj).await.unwrap();
        let patch = h.resource.delete_patch(&obj, &current, &desired).await.unwrap();

        assert_eq!(patch.delete.unwrap(), vec![project("", "api", "abc")]);
    }

    #[tokio::test]
    async fn difference_delete_patch_keeps_projects_no_longer_desired() {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let resource = ProjectResource::new(ProjectResourceConfig {
            eventer: Arc::new(TestEventer { log: log.clone() }),
            installer: Arc::new(TestInstaller {
                log: log.clone(),
                releases: vec![release("api", "abc"), release("old", "fff")],
                install_error: None,
            }),
            notifier: Arc::new(TestNotifier { log }),
            delete_semantics: DeleteSemantics::Difference,
        })
        .unwrap();
        let obj = deployment(vec![("7", "api", "abcdef0")]);

        let current = resource.current_state(&obj).await.unwrap();
        let desired = resource.desired_state(&obj).await.unwrap();
        let patch = resource.delete_patch(&obj, &current, &desired).await.unwrap();

        assert_eq!(patch.delete.unwrap(), vec![project("", "old", "fff")]);
    }

    #[tokio::test]
    async fn applying_the_delete_change_is_a_no_op() {
        let h = harness(vec![], None);
        let obj = deployment(vec![]);

        h.resource
            .apply_delete_change(&obj, &vec![project("7", "api", "abc123")])
            .await
            .unwrap();

        assert!(h.log.lock().unwrap().is_empty());
    }
}
