//! Drives the fully wrapped resource stack (metrics, retry, log) through
//! the framework with recording fakes for the three external systems.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use draughtsman_operator::backoff::ExponentialBackoff;
use draughtsman_operator::deployment::{
    DraughtsmanDeployment, DraughtsmanDeploymentSpec, Project, ProjectEntry,
};
use draughtsman_operator::error::{Error, Result};
use draughtsman_operator::eventer::{DeploymentEvent, Eventer};
use draughtsman_operator::framework::{self, Framework, FrameworkConfig};
use draughtsman_operator::installer::{self, Installer};
use draughtsman_operator::notifier::Notifier;
use draughtsman_operator::resource::project::ProjectResourceConfig;
use draughtsman_operator::resource::{DeleteSemantics, ProjectResource};

type CallLog = Arc<Mutex<Vec<String>>>;

struct FakeInstaller {
    log: CallLog,
    releases: Vec<installer::Project>,
    /// Number of leading install calls that fail before installs succeed.
    install_failures: AtomicUsize,
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, project: &installer::Project) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("install({},{})", project.name, project.git_ref));

        if self
            .install_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::helm("Error: release failed"));
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<installer::Project>> {
        self.log.lock().unwrap().push("list".to_string());
        Ok(self.releases.clone())
    }
}

struct FakeEventer {
    log: CallLog,
}

#[async_trait]
impl Eventer for FakeEventer {
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

struct FakeNotifier {
    log: CallLog,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn success(&self, project: &Project) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("notify-success({})", project.name));
        Ok(())
    }

    async fn failed(&self, project: &Project, error_message: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("notify-failed({},{})", project.name, error_message));
        Ok(())
    }
}

fn quick_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(1),
        multiplier: 1.0,
        randomization_factor: 0.0,
        max_elapsed_time: Some(Duration::from_millis(200)),
        ..ExponentialBackoff::default()
    }
}

fn build_framework(
    releases: Vec<installer::Project>,
    install_failures: usize,
) -> (Framework<impl framework::Resource>, CallLog) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let resource = ProjectResource::new(ProjectResourceConfig {
        eventer: Arc::new(FakeEventer { log: log.clone() }),
        installer: Arc::new(FakeInstaller {
            log: log.clone(),
            releases,
            install_failures: AtomicUsize::new(install_failures),
        }),
        notifier: Arc::new(FakeNotifier { log: log.clone() }),
        delete_semantics: DeleteSemantics::Legacy,
    })
    .unwrap();

    let framework = Framework::new(FrameworkConfig {
        resources: framework::wrap(vec![resource], quick_backoff()),
        backoff: quick_backoff(),
    })
    .unwrap();

    (framework, log)
}

fn deployment(projects: Vec<(&str, &str, &str)>) -> DraughtsmanDeployment {
    DraughtsmanDeployment::new(
        "draughtsman-deployment",
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

#[tokio::test]
async fn a_fresh_project_is_installed_and_reported_exactly_once() {
    let (framework, log) = build_framework(vec![], 0);
    let obj = deployment(vec![("7", "api", "abc123")]);

    framework.process_update(&obj).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "list",
            "install(api,abc123)",
            "event-success(7,api,abc123)",
            "notify-success(api)",
        ]
    );
}

#[tokio::test]
async fn a_truncated_matching_ref_causes_no_work_beyond_the_listing() {
    let (framework, log) = build_framework(vec![release("api", "abc")], 0);
    let obj = deployment(vec![("7", "api", "abcdef0")]);

    framework.process_update(&obj).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["list"]);
}

#[tokio::test]
async fn a_diverged_ref_is_upgraded() {
    let (framework, log) = build_framework(vec![release("api", "abc")], 0);
    let obj = deployment(vec![("7", "api", "zzzzzzz")]);

    framework.process_update(&obj).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "list",
            "install(api,zzzzzzz)",
            "event-success(7,api,zzzzzzz)",
            "notify-success(api)",
        ]
    );
}

#[tokio::test]
async fn an_install_failure_is_compensated_and_the_retry_reenters_cleanly() {
    let (framework, log) = build_framework(vec![], 1);
    let obj = deployment(vec![("7", "api", "abc123")]);

    framework.process_update(&obj).await.unwrap();

    let log = log.lock().unwrap();
    let attempt = &log[1..];

    // First attempt: install fails, the failed status and notification go
    // out in order, then the retry layer re-runs the apply and the second
    // attempt succeeds without duplicating the failure reports.
    assert_eq!(attempt[0], "install(api,abc123)");
    assert_eq!(attempt[1], "event-failed(7,api,abc123)");
    assert!(attempt[2].starts_with("notify-failed(api,"));
    assert_eq!(attempt[3], "install(api,abc123)");
    assert_eq!(attempt[4], "event-success(7,api,abc123)");
    assert_eq!(attempt[5], "notify-success(api)");
    assert_eq!(attempt.len(), 6);
}

#[tokio::test]
async fn deleting_the_custom_resource_triggers_no_installs() {
    let (framework, log) = build_framework(vec![release("api", "abc")], 0);
    let obj = deployment(vec![("7", "api", "abcdef0")]);

    framework.process_delete(&obj).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["list"]);
}
