use crate::launch::LaunchConfig;
use crate::model::{
    AbortReason, ClusterContext, ConnectDescriptor, ConnectRequest, ExplicitTarget, Isolation,
    ResourceKind, StepKind, StepPlan, WizardStep,
};
use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

pub const ROUTING_MANAGER_SERVICE: &str = "routingmanager-service";
pub const CREATE_NEW_CONFIG_CHOICE: &str = "Create a new launch configuration";
pub const NO_CONFIG_CHOICE: &str = "Continue without a launch configuration";
pub const ISOLATION_NO: &str = "No";
pub const ISOLATION_YES: &str = "Yes";
pub const ISOLATION_LEARN_MORE: &str = "Learn more";
pub const ISOLATION_HELP_URL: &str = "https://ktether.dev/docs/traffic-isolation";
pub const PORT_REQUIRED_MESSAGE: &str = "a value is required (enter 0 to skip redirection)";
pub const PORT_RANGE_MESSAGE: &str = "port must be between 0 and 65535";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Effect {
    Placeholder(WizardStep),
    RefreshCredentials,
    ListNamespaces,
    ListServices,
    ListBackingPods { service: String },
    ListContainers { pod: String },
    LoadLaunchConfigs,
    DeriveRoutingToken,
    Prompt(PromptRequest),
    OpenIsolationHelp,
    RequestNewLaunchConfig,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PromptRequest {
    Choice(WizardStep),
    Text {
        step: WizardStep,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    Ack,
    CredentialsRefreshed(bool),
    Namespaces(Option<Vec<String>>),
    Services(Vec<String>),
    BackingPods(Vec<String>),
    Containers(Option<Vec<String>>),
    LaunchConfigs(Vec<LaunchConfig>),
    RoutingToken(String),
    Choice(Option<String>),
    Text(Option<String>),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Step {
    Next(Effect),
    Done(ConnectDescriptor),
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum State {
    Placeholder,
    Credentials,
    NamespaceCheck,
    ServiceList,
    ServiceChoice,
    BackingPodLookup,
    ContainerQuery,
    ContainerChoice,
    PortInput { step: WizardStep },
    LaunchList,
    LaunchChoice,
    NewConfigDispatch,
    TokenDerivation,
    IsolationChoice { step: WizardStep },
    IsolationHelp { step: WizardStep },
    Done,
}

pub fn validate_port(input: &str) -> std::result::Result<u16, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PORT_REQUIRED_MESSAGE.to_string());
    }

    match trimmed.parse::<u32>() {
        Ok(port) if port <= 65_535 => Ok(port as u16),
        _ => Err(PORT_RANGE_MESSAGE.to_string()),
    }
}

pub fn workload_prefix(pod_name: &str) -> String {
    match pod_name.rsplit_once('-') {
        Some((prefix, _)) if !prefix.is_empty() => prefix.to_string(),
        _ => pod_name.to_string(),
    }
}

#[derive(Debug)]
pub struct Wizard {
    kind: ResourceKind,
    state: State,
    request: ConnectRequest,
    plan: StepPlan,
    context: ClusterContext,
    explicit: Option<ExplicitTarget>,
    routing_token: Option<String>,
    complete: bool,
}

impl Wizard {
    pub fn start(
        kind: ResourceKind,
        explicit: Option<ExplicitTarget>,
        context: ClusterContext,
    ) -> Result<(Self, Effect)> {
        if kind == ResourceKind::Pod && explicit.is_none() {
            bail!("a pod target requires an explicit pod name; interactive pod discovery is not supported");
        }

        let plan = StepPlan::for_kind(kind);
        let (step_index, total_steps) = plan.peek();
        let placeholder = WizardStep {
            title: format!("Redirect a {}", kind.title().to_ascii_lowercase()),
            step_index,
            total_steps,
            placeholder: Some(format!("Validating context for cluster {}", context.cluster)),
            choices: Vec::new(),
        };

        let wizard = Self {
            kind,
            state: State::Placeholder,
            request: ConnectRequest {
                resource_kind: Some(kind),
                ..ConnectRequest::default()
            },
            plan,
            context,
            explicit,
            routing_token: None,
            complete: false,
        };

        Ok((wizard, Effect::Placeholder(placeholder)))
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn partial(&self) -> &ConnectRequest {
        &self.request
    }

    pub fn advance(&mut self, event: Event) -> Result<Step> {
        let state = std::mem::replace(&mut self.state, State::Done);
        match (state, event) {
            (State::Placeholder, Event::Ack) => {
                self.state = State::Credentials;
                Ok(Step::Next(Effect::RefreshCredentials))
            }
            (State::Credentials, Event::CredentialsRefreshed(false)) => {
                warn!(
                    cluster = %self.context.cluster,
                    "credential refresh failed, aborting without error"
                );
                Ok(Step::Aborted(AbortReason::CredentialRefresh))
            }
            (State::Credentials, Event::CredentialsRefreshed(true)) => self.prevalidate_target(),
            (State::NamespaceCheck, Event::Namespaces(None)) => {
                warn!(
                    namespace = %self.context.namespace,
                    "could not list namespaces, continuing without the cross-check"
                );
                self.enter_resolution()
            }
            (State::NamespaceCheck, Event::Namespaces(Some(namespaces))) => {
                let supplied = self.supplied_namespace().context(
                    "namespace cross-check reached without an explicit target namespace",
                )?;
                if !namespaces.iter().any(|namespace| namespace == &supplied) {
                    bail!(
                        "namespace '{supplied}' was not found in cluster {}",
                        self.context.cluster
                    );
                }
                self.enter_resolution()
            }
            (State::ServiceList, Event::Services(services)) => {
                let mut services = services
                    .into_iter()
                    .filter(|name| name != ROUTING_MANAGER_SERVICE)
                    .collect::<Vec<_>>();
                if services.is_empty() {
                    bail!(
                        "no services found in namespace {} of cluster {}",
                        self.context.namespace,
                        self.context.cluster
                    );
                }
                services.sort();

                let (step_index, total_steps) = self.plan.begin(StepKind::PickService);
                self.state = State::ServiceChoice;
                Ok(Step::Next(Effect::Prompt(PromptRequest::Choice(WizardStep {
                    title: "Choose a service to redirect".to_string(),
                    step_index,
                    total_steps,
                    placeholder: Some("Service whose traffic will reach your machine".to_string()),
                    choices: services,
                }))))
            }
            (State::ServiceChoice, Event::Choice(None)) => Ok(Step::Aborted(AbortReason::Cancelled)),
            (State::ServiceChoice, Event::Choice(Some(service))) => {
                self.request.resource_name = Some(service.clone());
                self.state = State::BackingPodLookup;
                Ok(Step::Next(Effect::ListBackingPods { service }))
            }
            (State::BackingPodLookup, Event::BackingPods(pods)) => {
                // First pod stands in for the whole set; pods backing one
                // service are assumed container-homogeneous.
                let representative = pods.into_iter().next();
                self.begin_container_resolution(representative)
            }
            (State::ContainerQuery, Event::Containers(None)) => {
                warn!("container lookup failed, continuing without a container name");
                self.plan.skip(StepKind::PickContainer);
                self.collect_port()
            }
            (State::ContainerQuery, Event::Containers(Some(containers))) => {
                if containers.is_empty() {
                    debug!("no containers reported, continuing without a container name");
                    self.plan.skip(StepKind::PickContainer);
                    return self.collect_port();
                }
                if containers.len() == 1 {
                    self.request.container_name = containers.into_iter().next();
                    self.plan.skip(StepKind::PickContainer);
                    return self.collect_port();
                }

                let mut containers = containers;
                containers.sort();
                self.plan.ensure(StepKind::PickContainer);
                let (step_index, total_steps) = self.plan.begin(StepKind::PickContainer);
                self.state = State::ContainerChoice;
                Ok(Step::Next(Effect::Prompt(PromptRequest::Choice(WizardStep {
                    title: "Choose a container".to_string(),
                    step_index,
                    total_steps,
                    placeholder: Some("Container whose traffic will be redirected".to_string()),
                    choices: containers,
                }))))
            }
            (State::ContainerChoice, Event::Choice(None)) => {
                Ok(Step::Aborted(AbortReason::Cancelled))
            }
            (State::ContainerChoice, Event::Choice(Some(container))) => {
                self.request.container_name = Some(container);
                self.collect_port()
            }
            (State::PortInput { .. }, Event::Text(None)) => {
                Ok(Step::Aborted(AbortReason::Cancelled))
            }
            (State::PortInput { step }, Event::Text(Some(input))) => match validate_port(&input) {
                Ok(port) => {
                    self.request.ports = Some(vec![port]);
                    self.state = State::LaunchList;
                    Ok(Step::Next(Effect::LoadLaunchConfigs))
                }
                Err(message) => {
                    self.state = State::PortInput { step: step.clone() };
                    Ok(Step::Next(Effect::Prompt(PromptRequest::Text {
                        step,
                        error: Some(message),
                    })))
                }
            },
            (State::LaunchList, Event::LaunchConfigs(configs)) => {
                let mut choices = configs
                    .into_iter()
                    .filter(|config| !config.is_generated())
                    .map(|config| config.name)
                    .collect::<Vec<_>>();
                choices.push(CREATE_NEW_CONFIG_CHOICE.to_string());
                choices.push(NO_CONFIG_CHOICE.to_string());

                let (step_index, total_steps) = self.plan.begin(StepKind::PickLaunchConfig);
                self.state = State::LaunchChoice;
                Ok(Step::Next(Effect::Prompt(PromptRequest::Choice(WizardStep {
                    title: "Choose a launch configuration".to_string(),
                    step_index,
                    total_steps,
                    placeholder: Some(
                        "Configuration to start alongside the redirection".to_string(),
                    ),
                    choices,
                }))))
            }
            (State::LaunchChoice, Event::Choice(None)) => Ok(Step::Aborted(AbortReason::Cancelled)),
            (State::LaunchChoice, Event::Choice(Some(choice))) => {
                if choice == CREATE_NEW_CONFIG_CHOICE {
                    self.state = State::NewConfigDispatch;
                    return Ok(Step::Next(Effect::RequestNewLaunchConfig));
                }
                self.request.launch_configuration = if choice == NO_CONFIG_CHOICE {
                    None
                } else {
                    Some(choice)
                };
                self.state = State::TokenDerivation;
                Ok(Step::Next(Effect::DeriveRoutingToken))
            }
            (State::NewConfigDispatch, Event::Ack) => {
                Ok(Step::Aborted(AbortReason::AwaitingNewLaunchConfig))
            }
            (State::TokenDerivation, Event::RoutingToken(token)) => {
                self.routing_token = Some(token);
                self.select_isolation()
            }
            (State::IsolationChoice { .. }, Event::Choice(None)) => {
                Ok(Step::Aborted(AbortReason::Cancelled))
            }
            (State::IsolationChoice { step }, Event::Choice(Some(choice))) => {
                match choice.as_str() {
                    ISOLATION_LEARN_MORE => {
                        self.state = State::IsolationHelp { step };
                        Ok(Step::Next(Effect::OpenIsolationHelp))
                    }
                    ISOLATION_NO => {
                        self.request.isolation = Isolation::Disabled;
                        self.finish()
                    }
                    ISOLATION_YES => {
                        let token = self
                            .routing_token
                            .clone()
                            .context("isolation chosen before the routing token was derived")?;
                        self.request.isolation = Isolation::Header(token);
                        self.finish()
                    }
                    other => bail!("unrecognized isolation choice '{other}'"),
                }
            }
            (State::IsolationHelp { step }, Event::Ack) => {
                self.state = State::IsolationChoice { step: step.clone() };
                Ok(Step::Next(Effect::Prompt(PromptRequest::Choice(step))))
            }
            (state, event) => bail!(
                "wizard protocol violation: {event:?} is not valid while waiting in {state:?}"
            ),
        }
    }

    fn supplied_namespace(&self) -> Option<String> {
        self.explicit
            .as_ref()
            .and_then(|target| target.namespace.clone())
    }

    fn prevalidate_target(&mut self) -> Result<Step> {
        if let Some(supplied) = self.supplied_namespace() {
            if supplied != self.context.namespace {
                let name = self
                    .explicit
                    .as_ref()
                    .map(|target| target.name.clone())
                    .unwrap_or_default();
                bail!(
                    "namespace '{supplied}' for target '{name}' does not match the active context namespace '{}'; switch your kubeconfig context first",
                    self.context.namespace
                );
            }
            self.state = State::NamespaceCheck;
            return Ok(Step::Next(Effect::ListNamespaces));
        }

        self.enter_resolution()
    }

    fn enter_resolution(&mut self) -> Result<Step> {
        match self.kind {
            ResourceKind::Service => {
                self.request.target_cluster = Some(self.context.cluster.clone());
                self.request.target_namespace = Some(self.context.namespace.clone());

                if let Some(target) = self.explicit.clone() {
                    self.request.resource_name = Some(target.name.clone());
                    self.plan.skip(StepKind::PickService);
                    self.state = State::BackingPodLookup;
                    return Ok(Step::Next(Effect::ListBackingPods {
                        service: target.name,
                    }));
                }

                self.state = State::ServiceList;
                Ok(Step::Next(Effect::ListServices))
            }
            ResourceKind::Pod => {
                let target = self
                    .explicit
                    .clone()
                    .context("a pod target requires an explicit pod name")?;
                self.request.resource_name = Some(workload_prefix(&target.name));
                self.request.target_cluster = Some(self.context.cluster.clone());
                self.request.target_namespace = Some(self.context.namespace.clone());
                self.begin_container_resolution(Some(target.name))
            }
        }
    }

    fn begin_container_resolution(&mut self, pod: Option<String>) -> Result<Step> {
        self.request.container_name = None;

        let Some(pod) = pod else {
            debug!("no pod name available, skipping container selection");
            self.plan.skip(StepKind::PickContainer);
            return self.collect_port();
        };
        if self.request.target_namespace.is_none() {
            debug!("target namespace not recorded, skipping container selection");
            self.plan.skip(StepKind::PickContainer);
            return self.collect_port();
        }

        self.state = State::ContainerQuery;
        Ok(Step::Next(Effect::ListContainers { pod }))
    }

    fn collect_port(&mut self) -> Result<Step> {
        let (step_index, total_steps) = self.plan.begin(StepKind::CollectPort);
        let step = WizardStep {
            title: "Local port".to_string(),
            step_index,
            total_steps,
            placeholder: Some(
                "Port on this machine that receives redirected traffic (0 to skip)".to_string(),
            ),
            choices: Vec::new(),
        };
        self.state = State::PortInput { step: step.clone() };
        Ok(Step::Next(Effect::Prompt(PromptRequest::Text {
            step,
            error: None,
        })))
    }

    fn select_isolation(&mut self) -> Result<Step> {
        if self.kind == ResourceKind::Pod {
            self.request.isolation = Isolation::NotApplicable;
            return self.finish();
        }

        let (step_index, total_steps) = self.plan.begin(StepKind::PickIsolation);
        let step = WizardStep {
            title: "Isolate your redirected traffic".to_string(),
            step_index,
            total_steps,
            placeholder: Some(
                "Only requests carrying your routing header will reach your machine".to_string(),
            ),
            choices: vec![
                ISOLATION_NO.to_string(),
                ISOLATION_YES.to_string(),
                ISOLATION_LEARN_MORE.to_string(),
            ],
        };
        self.state = State::IsolationChoice { step: step.clone() };
        Ok(Step::Next(Effect::Prompt(PromptRequest::Choice(step))))
    }

    fn finish(&mut self) -> Result<Step> {
        self.complete = true;
        self.state = State::Done;
        let request = std::mem::take(&mut self.request);
        Ok(Step::Done(request.promote()?))
    }
}
