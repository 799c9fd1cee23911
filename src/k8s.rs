use crate::model::ClusterContext;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

#[async_trait]
pub trait ClusterClient {
    fn context(&self) -> &ClusterContext;
    async fn refresh_credentials(&self) -> bool;
    async fn list_namespaces(&self) -> Result<Vec<String>>;
    async fn list_services(&self, namespace: &str) -> Result<Vec<String>>;
    async fn backing_pods(&self, service: &str, namespace: &str) -> Result<Vec<String>>;
    async fn container_names(&self, pod: &str, namespace: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: ClusterContext,
}

impl KubeGateway {
    pub async fn new() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let context = ClusterContext {
            kubeconfig_path: kubeconfig.as_ref().and(kubeconfig_path()),
            cluster: config.cluster_url.to_string(),
            namespace: config.default_namespace.clone(),
        };
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        Ok(Self { client, context })
    }
}

#[async_trait]
impl ClusterClient for KubeGateway {
    fn context(&self) -> &ClusterContext {
        &self.context
    }

    async fn refresh_credentials(&self) -> bool {
        match self.client.apiserver_version().await {
            Ok(_) => true,
            Err(error) => {
                warn!("credential refresh against {} failed: {error}", self.context.cluster);
                false
            }
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&list_params())
            .await
            .context("failed to list namespaces")?;

        let mut names = list
            .into_iter()
            .map(|namespace| namespace.name_any())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<String>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = services
            .list(&list_params())
            .await
            .with_context(|| format!("failed to list services in {namespace}"))?;

        Ok(list
            .into_iter()
            .map(|service| service.name_any())
            .collect())
    }

    async fn backing_pods(&self, service: &str, namespace: &str) -> Result<Vec<String>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = services
            .get(service)
            .await
            .with_context(|| format!("failed to fetch service {namespace}/{service}"))?;

        let selector = service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .cloned()
            .unwrap_or_default();
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&list_params().labels(&selector_query(&selector)))
            .await
            .with_context(|| format!("failed to list pods backing {namespace}/{}", service.name_any()))?;

        Ok(list.into_iter().map(|pod| pod.name_any()).collect())
    }

    async fn container_names(&self, pod: &str, namespace: &str) -> Result<Vec<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(pod)
            .await
            .with_context(|| format!("failed to fetch pod {namespace}/{pod}"))?;

        let mut names = Vec::new();
        if let Some(spec) = pod.spec.as_ref() {
            for container in &spec.containers {
                names.push(container.name.clone());
            }
            for container in spec.init_containers.as_ref().into_iter().flatten() {
                names.push(container.name.clone());
            }
        }

        Ok(names)
    }
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn kubeconfig_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KUBECONFIG")
        && let Some(first) = path.split(':').find(|entry| !entry.trim().is_empty())
    {
        return Some(PathBuf::from(first));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".kube/config"))
        .filter(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::selector_query;
    use std::collections::BTreeMap;

    #[test]
    fn selector_query_joins_sorted_pairs() {
        let mut selector = BTreeMap::new();
        selector.insert("app".to_string(), "api".to_string());
        selector.insert("tier".to_string(), "backend".to_string());
        assert_eq!(selector_query(&selector), "app=api,tier=backend");
    }
}
