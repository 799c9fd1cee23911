use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Service,
}

impl ResourceKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Service => "Service",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pod),
            "svc" | "service" | "services" => Some(Self::Service),
            _ => None,
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClusterContext {
    pub kubeconfig_path: Option<PathBuf>,
    pub cluster: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExplicitTarget {
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub enum Isolation {
    #[default]
    Undecided,
    NotApplicable,
    Disabled,
    Header(String),
}

impl Isolation {
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NotApplicable)
    }
}

impl Serialize for Isolation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Header(token) => serializer.serialize_some(token),
            _ => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ConnectRequest {
    pub resource_name: Option<String>,
    pub resource_kind: Option<ResourceKind>,
    pub target_cluster: Option<String>,
    pub target_namespace: Option<String>,
    pub container_name: Option<String>,
    pub ports: Option<Vec<u16>>,
    pub launch_configuration: Option<String>,
    pub isolation: Isolation,
}

impl ConnectRequest {
    pub fn promote(self) -> Result<ConnectDescriptor> {
        let resource_kind = self
            .resource_kind
            .context("resource kind was never recorded")?;
        let isolation = match self.isolation {
            Isolation::Undecided => {
                anyhow::bail!("isolation was never decided for {resource_kind}")
            }
            decided => decided,
        };

        Ok(ConnectDescriptor {
            resource_name: self
                .resource_name
                .context("resource name was never resolved")?,
            resource_kind,
            target_cluster: self
                .target_cluster
                .context("target cluster was never recorded")?,
            target_namespace: self
                .target_namespace
                .context("target namespace was never recorded")?,
            container_name: self.container_name,
            ports: self.ports.context("no port was collected")?,
            launch_configuration: self.launch_configuration,
            isolation,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ConnectDescriptor {
    pub resource_name: String,
    pub resource_kind: ResourceKind,
    pub target_cluster: String,
    pub target_namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub ports: Vec<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_configuration: Option<String>,
    #[serde(skip_serializing_if = "Isolation::is_not_applicable")]
    pub isolation: Isolation,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WizardStep {
    pub title: String,
    pub step_index: usize,
    pub total_steps: usize,
    pub placeholder: Option<String>,
    pub choices: Vec<String>,
}

impl WizardStep {
    pub fn numbered_title(&self) -> String {
        format!("{} ({}/{})", self.title, self.step_index, self.total_steps)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StepKind {
    PickService,
    PickContainer,
    CollectPort,
    PickLaunchConfig,
    PickIsolation,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StepPlan {
    shown: usize,
    remaining: Vec<StepKind>,
}

impl StepPlan {
    pub fn for_kind(kind: ResourceKind) -> Self {
        let remaining = match kind {
            ResourceKind::Pod => vec![
                StepKind::PickContainer,
                StepKind::CollectPort,
                StepKind::PickLaunchConfig,
            ],
            ResourceKind::Service => vec![
                StepKind::PickService,
                StepKind::CollectPort,
                StepKind::PickLaunchConfig,
                StepKind::PickIsolation,
            ],
        };

        Self { shown: 0, remaining }
    }

    pub fn total(&self) -> usize {
        self.shown + self.remaining.len()
    }

    pub fn peek(&self) -> (usize, usize) {
        (self.shown + 1, self.total())
    }

    pub fn begin(&mut self, step: StepKind) -> (usize, usize) {
        if let Some(position) = self.remaining.iter().position(|kind| *kind == step) {
            self.remaining.remove(position);
        }
        self.shown += 1;
        (self.shown, self.total())
    }

    pub fn skip(&mut self, step: StepKind) {
        self.remaining.retain(|kind| *kind != step);
    }

    pub fn ensure(&mut self, step: StepKind) {
        if !self.remaining.contains(&step) {
            self.remaining.insert(0, step);
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AbortReason {
    Cancelled,
    CredentialRefresh,
    AwaitingNewLaunchConfig,
}

impl AbortReason {
    pub fn title(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::CredentialRefresh => "credential refresh failed",
            Self::AwaitingNewLaunchConfig => "awaiting new launch configuration",
        }
    }
}
