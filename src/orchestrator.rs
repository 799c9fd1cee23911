use crate::k8s::ClusterClient;
use crate::launch::LaunchStore;
use crate::model::{AbortReason, ConnectDescriptor, ExplicitTarget, ResourceKind};
use crate::routing;
use crate::surface::InteractionSurface;
use crate::wizard::{
    Effect, Event, ISOLATION_HELP_URL, PromptRequest, Step, Wizard, validate_port,
};
use anyhow::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const TUNNEL_BINARY: &str = "ktether-tunnel";

#[derive(Debug, Clone)]
pub struct TunnelHandle {
    binary: PathBuf,
}

impl TunnelHandle {
    pub fn probe() -> Option<Self> {
        which::which(TUNNEL_BINARY)
            .ok()
            .map(|binary| Self { binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

pub fn check_prerequisites() -> Option<String> {
    if which::which("kubectl").is_err() {
        return Some(
            "kubectl was not found on PATH; install it before redirecting workloads".to_string(),
        );
    }
    None
}

enum RunOutcome {
    Completed(ConnectDescriptor),
    Aborted(AbortReason),
}

pub struct Orchestrator<C, S> {
    cluster: C,
    surface: S,
    launch: LaunchStore,
    tunnel: Option<TunnelHandle>,
    prerequisite_notice: Option<String>,
}

impl<C: ClusterClient, S: InteractionSurface> Orchestrator<C, S> {
    pub fn new(
        cluster: C,
        surface: S,
        launch: LaunchStore,
        tunnel: Option<TunnelHandle>,
        prerequisite_notice: Option<String>,
    ) -> Self {
        Self {
            cluster,
            surface,
            launch,
            tunnel,
            prerequisite_notice,
        }
    }

    pub async fn run(
        &mut self,
        reason: &str,
        target: Option<ExplicitTarget>,
        kind: ResourceKind,
    ) -> Option<ConnectDescriptor> {
        let started = Instant::now();

        if let Some(notice) = self.prerequisite_notice.clone() {
            self.surface.notify(&notice);
            self.report(reason, started, "prerequisites unmet");
            return None;
        }
        let Some(tunnel) = self.tunnel.clone() else {
            self.surface.notify(&format!(
                "The tunnel component '{TUNNEL_BINARY}' is not available on this machine"
            ));
            self.report(reason, started, "tunnel capability unavailable");
            return None;
        };
        debug!(tunnel = %tunnel.binary().display(), "tunnel capability available");

        let context = self.cluster.context().clone();
        let (descriptor, outcome) = match Wizard::start(kind, target, context) {
            Ok((mut wizard, first)) => match self.drive(&mut wizard, first).await {
                Ok(RunOutcome::Completed(descriptor)) => (Some(descriptor), "completed"),
                Ok(RunOutcome::Aborted(abort)) => (None, abort.title()),
                Err(failure) => {
                    error!(
                        error = ?failure,
                        partial = ?wizard.partial(),
                        "redirection wizard failed"
                    );
                    self.surface.notify(&format!(
                        "Failed to prepare the redirection: {failure:#}"
                    ));
                    (None, "failed")
                }
            },
            Err(failure) => {
                error!(error = ?failure, "redirection wizard rejected its target");
                self.surface.notify(&format!(
                    "Failed to prepare the redirection: {failure:#}"
                ));
                (None, "failed")
            }
        };

        self.report(reason, started, outcome);
        descriptor
    }

    fn report(&self, reason: &str, started: Instant, outcome: &str) {
        info!(
            reason,
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            finished_at = %Local::now().format("%Y-%m-%d %H:%M:%S"),
            "redirection wizard finished"
        );
    }

    async fn drive(&mut self, wizard: &mut Wizard, first: Effect) -> Result<RunOutcome> {
        let mut effect = first;
        loop {
            let event = self.perform(effect).await?;
            match wizard.advance(event)? {
                Step::Next(next) => effect = next,
                Step::Done(descriptor) => return Ok(RunOutcome::Completed(descriptor)),
                Step::Aborted(abort) => return Ok(RunOutcome::Aborted(abort)),
            }
        }
    }

    async fn perform(&mut self, effect: Effect) -> Result<Event> {
        let namespace = self.cluster.context().namespace.clone();
        match effect {
            Effect::Placeholder(step) => {
                self.surface.show_placeholder(&step);
                Ok(Event::Ack)
            }
            Effect::RefreshCredentials => Ok(Event::CredentialsRefreshed(
                self.cluster.refresh_credentials().await,
            )),
            Effect::ListNamespaces => match self.cluster.list_namespaces().await {
                Ok(namespaces) => Ok(Event::Namespaces(Some(namespaces))),
                Err(failure) => {
                    warn!("namespace listing failed: {failure:#}");
                    Ok(Event::Namespaces(None))
                }
            },
            Effect::ListServices => Ok(Event::Services(
                self.cluster.list_services(&namespace).await?,
            )),
            Effect::ListBackingPods { service } => {
                match self.cluster.backing_pods(&service, &namespace).await {
                    Ok(pods) => Ok(Event::BackingPods(pods)),
                    Err(failure) => {
                        warn!("backing pod lookup for {service} failed: {failure:#}");
                        Ok(Event::BackingPods(Vec::new()))
                    }
                }
            }
            Effect::ListContainers { pod } => {
                match self.cluster.container_names(&pod, &namespace).await {
                    Ok(containers) => Ok(Event::Containers(Some(containers))),
                    Err(failure) => {
                        warn!("container lookup for {pod} failed: {failure:#}");
                        Ok(Event::Containers(None))
                    }
                }
            }
            Effect::LoadLaunchConfigs => match self.launch.configurations() {
                Ok(configs) => Ok(Event::LaunchConfigs(configs)),
                Err(failure) => {
                    warn!("launch configuration store unreadable: {failure:#}");
                    Ok(Event::LaunchConfigs(Vec::new()))
                }
            },
            Effect::DeriveRoutingToken => Ok(Event::RoutingToken(routing::routing_token(
                &routing::local_username(),
            ))),
            Effect::Prompt(PromptRequest::Choice(step)) => {
                self.surface.hide_placeholder();
                Ok(Event::Choice(self.surface.show_choice(&step)?))
            }
            Effect::Prompt(PromptRequest::Text { step, error }) => {
                self.surface.hide_placeholder();
                let validate = |input: &str| validate_port(input).map(|_| ());
                Ok(Event::Text(self.surface.show_text_input(
                    &step,
                    error.as_deref(),
                    &validate,
                )?))
            }
            Effect::OpenIsolationHelp => {
                self.surface
                    .notify(&format!("Read about traffic isolation: {ISOLATION_HELP_URL}"));
                Ok(Event::Ack)
            }
            Effect::RequestNewLaunchConfig => {
                self.surface.notify(
                    "Add the new configuration to your launch file, then run ktether again",
                );
                Ok(Event::Ack)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Orchestrator, TunnelHandle};
    use crate::k8s::ClusterClient;
    use crate::launch::LaunchStore;
    use crate::model::{ClusterContext, ExplicitTarget, Isolation, ResourceKind, WizardStep};
    use crate::surface::{InteractionSurface, Validator};
    use crate::wizard::{ISOLATION_YES, NO_CONFIG_CHOICE};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Write;

    struct FakeCluster {
        context: ClusterContext,
        services: Vec<String>,
        pods: Vec<String>,
        containers: Vec<String>,
        refresh_ok: bool,
        fail_services: bool,
    }

    impl FakeCluster {
        fn new() -> Self {
            Self {
                context: ClusterContext {
                    kubeconfig_path: None,
                    cluster: "https://cluster.example".to_string(),
                    namespace: "default".to_string(),
                },
                services: vec!["api".to_string(), "billing".to_string()],
                pods: vec!["api-7d9f8c6b5-abcde".to_string()],
                containers: vec!["web".to_string()],
                refresh_ok: true,
                fail_services: false,
            }
        }
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
        fn context(&self) -> &ClusterContext {
            &self.context
        }

        async fn refresh_credentials(&self) -> bool {
            self.refresh_ok
        }

        async fn list_namespaces(&self) -> Result<Vec<String>> {
            Ok(vec!["default".to_string(), "kube-system".to_string()])
        }

        async fn list_services(&self, _namespace: &str) -> Result<Vec<String>> {
            if self.fail_services {
                anyhow::bail!("connection refused");
            }
            Ok(self.services.clone())
        }

        async fn backing_pods(&self, _service: &str, _namespace: &str) -> Result<Vec<String>> {
            Ok(self.pods.clone())
        }

        async fn container_names(&self, _pod: &str, _namespace: &str) -> Result<Vec<String>> {
            Ok(self.containers.clone())
        }
    }

    #[derive(Default)]
    struct ScriptedSurface {
        choices: VecDeque<Option<String>>,
        texts: VecDeque<Option<String>>,
        notices: Vec<String>,
        placeholders: usize,
    }

    impl InteractionSurface for ScriptedSurface {
        fn show_placeholder(&mut self, _step: &WizardStep) {
            self.placeholders += 1;
        }

        fn hide_placeholder(&mut self) {}

        fn show_choice(&mut self, step: &WizardStep) -> Result<Option<String>> {
            Ok(self
                .choices
                .pop_front()
                .unwrap_or_else(|| panic!("unscripted choice prompt: {}", step.title)))
        }

        fn show_text_input(
            &mut self,
            step: &WizardStep,
            _error: Option<&str>,
            _validate: Validator<'_>,
        ) -> Result<Option<String>> {
            Ok(self
                .texts
                .pop_front()
                .unwrap_or_else(|| panic!("unscripted text prompt: {}", step.title)))
        }

        fn notify(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }
    }

    fn tunnel() -> Option<TunnelHandle> {
        Some(TunnelHandle {
            binary: "/usr/local/bin/ktether-tunnel".into(),
        })
    }

    fn launch_store() -> (LaunchStore, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "configurations:\n  - name: debug api\n    kind: cargo\n  - name: api (redirected)\n    kind: ktether\n"
        )
        .expect("write");
        (LaunchStore::at(file.path().to_path_buf()), file)
    }

    #[tokio::test]
    async fn service_run_produces_a_complete_descriptor() {
        let (store, _guard) = launch_store();
        let surface = ScriptedSurface {
            choices: VecDeque::from([
                Some("api".to_string()),
                Some("debug api".to_string()),
                Some(ISOLATION_YES.to_string()),
            ]),
            texts: VecDeque::from([Some("8080".to_string())]),
            ..ScriptedSurface::default()
        };
        let mut orchestrator =
            Orchestrator::new(FakeCluster::new(), surface, store, tunnel(), None);

        let descriptor = orchestrator
            .run("debug", None, ResourceKind::Service)
            .await
            .expect("descriptor");

        assert_eq!(descriptor.resource_name, "api");
        assert_eq!(descriptor.resource_kind, ResourceKind::Service);
        assert_eq!(descriptor.container_name, Some("web".to_string()));
        assert_eq!(descriptor.ports, vec![8080]);
        assert_eq!(descriptor.launch_configuration, Some("debug api".to_string()));
        assert!(matches!(descriptor.isolation, Isolation::Header(_)));
        assert_eq!(orchestrator.surface.placeholders, 1);
    }

    #[tokio::test]
    async fn pod_run_skips_isolation_and_normalizes_the_name() {
        let (store, _guard) = launch_store();
        let surface = ScriptedSurface {
            choices: VecDeque::from([Some(NO_CONFIG_CHOICE.to_string())]),
            texts: VecDeque::from([Some("9229".to_string())]),
            ..ScriptedSurface::default()
        };
        let mut orchestrator =
            Orchestrator::new(FakeCluster::new(), surface, store, tunnel(), None);

        let descriptor = orchestrator
            .run(
                "debug",
                Some(ExplicitTarget {
                    name: "api-7d9f8c6b5-abcde".to_string(),
                    namespace: Some("default".to_string()),
                }),
                ResourceKind::Pod,
            )
            .await
            .expect("descriptor");

        assert_eq!(descriptor.resource_name, "api-7d9f8c6b5");
        assert_eq!(descriptor.isolation, Isolation::NotApplicable);
        assert_eq!(descriptor.launch_configuration, None);
    }

    #[tokio::test]
    async fn cancellation_yields_no_descriptor_and_no_failure_notice() {
        let (store, _guard) = launch_store();
        let surface = ScriptedSurface {
            choices: VecDeque::from([None]),
            ..ScriptedSurface::default()
        };
        let mut orchestrator =
            Orchestrator::new(FakeCluster::new(), surface, store, tunnel(), None);

        let descriptor = orchestrator.run("debug", None, ResourceKind::Service).await;
        assert!(descriptor.is_none());
        assert!(orchestrator.surface.notices.is_empty());
    }

    #[tokio::test]
    async fn discovery_failure_hits_the_boundary_once() {
        let (store, _guard) = launch_store();
        let mut cluster = FakeCluster::new();
        cluster.fail_services = true;
        let mut orchestrator =
            Orchestrator::new(cluster, ScriptedSurface::default(), store, tunnel(), None);

        let descriptor = orchestrator.run("debug", None, ResourceKind::Service).await;
        assert!(descriptor.is_none());
        assert_eq!(orchestrator.surface.notices.len(), 1);
        assert!(orchestrator.surface.notices[0].starts_with("Failed to prepare the redirection"));
    }

    #[tokio::test]
    async fn failed_credential_refresh_aborts_without_a_failure_notice() {
        let (store, _guard) = launch_store();
        let mut cluster = FakeCluster::new();
        cluster.refresh_ok = false;
        let mut orchestrator =
            Orchestrator::new(cluster, ScriptedSurface::default(), store, tunnel(), None);

        let descriptor = orchestrator.run("debug", None, ResourceKind::Service).await;
        assert!(descriptor.is_none());
        assert!(orchestrator.surface.notices.is_empty());
    }

    #[tokio::test]
    async fn missing_tunnel_capability_gates_the_run() {
        let (store, _guard) = launch_store();
        let mut orchestrator = Orchestrator::new(
            FakeCluster::new(),
            ScriptedSurface::default(),
            store,
            None,
            None,
        );

        let descriptor = orchestrator.run("debug", None, ResourceKind::Service).await;
        assert!(descriptor.is_none());
        assert_eq!(orchestrator.surface.placeholders, 0);
        assert_eq!(orchestrator.surface.notices.len(), 1);
    }

    #[tokio::test]
    async fn unmet_prerequisites_gate_the_run() {
        let (store, _guard) = launch_store();
        let mut orchestrator = Orchestrator::new(
            FakeCluster::new(),
            ScriptedSurface::default(),
            store,
            tunnel(),
            Some("kubectl was not found on PATH".to_string()),
        );

        let descriptor = orchestrator.run("debug", None, ResourceKind::Service).await;
        assert!(descriptor.is_none());
        assert_eq!(orchestrator.surface.placeholders, 0);
    }

    #[tokio::test]
    async fn namespace_mismatch_reports_one_consolidated_failure() {
        let (store, _guard) = launch_store();
        let surface = ScriptedSurface::default();
        let mut orchestrator =
            Orchestrator::new(FakeCluster::new(), surface, store, tunnel(), None);

        let descriptor = orchestrator
            .run(
                "debug",
                Some(ExplicitTarget {
                    name: "api".to_string(),
                    namespace: Some("staging".to_string()),
                }),
                ResourceKind::Service,
            )
            .await;

        assert!(descriptor.is_none());
        assert_eq!(orchestrator.surface.notices.len(), 1);
        assert!(orchestrator.surface.notices[0].contains("staging"));
    }
}
