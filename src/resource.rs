//! Classification of the execution environment into a monitored resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::env::{self, EnvSource};

/// The infrastructure entity that produced a log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        MonitoredResource {
            resource_type: resource_type.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// The generic fallback resource with no labels.
    pub fn global() -> Self {
        MonitoredResource::new(GLOBAL)
    }
}

pub const GAE_APP: &str = "gae_app";
pub const CLOUD_FUNCTION: &str = "cloud_function";
pub const CLOUD_RUN_REVISION: &str = "cloud_run_revision";
pub const K8S_CONTAINER: &str = "k8s_container";
pub const GLOBAL: &str = "global";

/// Execution environment recognized from environment signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedEnvironment {
    AppEngine {
        project_id: String,
        service: String,
        version: String,
        zone: String,
    },
    CloudFunction {
        project_id: String,
        function_name: String,
        region: String,
    },
    CloudRun {
        project_id: String,
        service: String,
        revision: String,
        configuration: String,
        location: String,
    },
    Kubernetes {
        project_id: String,
        location: String,
        cluster: String,
        namespace: String,
        pod: String,
        container: String,
    },
    Global {
        project_id: Option<String>,
    },
}

impl DetectedEnvironment {
    /// Probe the environment in precedence order; the first complete
    /// match wins and anything unrecognized is `Global`.
    pub fn detect(env: &dyn EnvSource) -> Self {
        let project = project_id(env);
        let project_or_empty = || project.clone().unwrap_or_default();
        let or_empty = |key: &str| env.var(key).unwrap_or_default();

        if let (Some(service), Some(version)) =
            (env.var(env::GAE_SERVICE_ENV), env.var(env::GAE_VERSION_ENV))
        {
            return DetectedEnvironment::AppEngine {
                project_id: project_or_empty(),
                service,
                version,
                zone: or_empty(env::GAE_ZONE_ENV),
            };
        }

        if env.var(env::FUNCTION_TARGET_ENV).is_some() {
            // gen1 exports FUNCTION_NAME, gen2 runs on Knative and only has K_SERVICE.
            let name = env
                .var(env::FUNCTION_NAME_ENV)
                .or_else(|| env.var(env::K_SERVICE_ENV));
            if let Some(function_name) = name {
                return DetectedEnvironment::CloudFunction {
                    project_id: project_or_empty(),
                    function_name,
                    region: or_empty(env::FUNCTION_REGION_ENV),
                };
            }
        }

        if let (Some(service), Some(revision), Some(configuration)) = (
            env.var(env::K_SERVICE_ENV),
            env.var(env::K_REVISION_ENV),
            env.var(env::K_CONFIGURATION_ENV),
        ) {
            return DetectedEnvironment::CloudRun {
                project_id: project_or_empty(),
                service,
                revision,
                configuration,
                location: or_empty(env::CLOUD_RUN_LOCATION_ENV),
            };
        }

        if env.var(env::KUBERNETES_SERVICE_HOST_ENV).is_some() {
            return DetectedEnvironment::Kubernetes {
                project_id: project_or_empty(),
                location: or_empty(env::CLUSTER_LOCATION_ENV),
                cluster: or_empty(env::CLUSTER_NAME_ENV),
                namespace: or_empty(env::POD_NAMESPACE_ENV),
                pod: or_empty(env::HOSTNAME_ENV),
                container: or_empty(env::CONTAINER_NAME_ENV),
            };
        }

        DetectedEnvironment::Global {
            project_id: project,
        }
    }

    pub fn into_resource(self) -> MonitoredResource {
        match self {
            DetectedEnvironment::AppEngine {
                project_id,
                service,
                version,
                zone,
            } => MonitoredResource::new(GAE_APP)
                .with_label("project_id", project_id)
                .with_label("module_id", service)
                .with_label("version_id", version)
                .with_label("zone", zone),
            DetectedEnvironment::CloudFunction {
                project_id,
                function_name,
                region,
            } => MonitoredResource::new(CLOUD_FUNCTION)
                .with_label("project_id", project_id)
                .with_label("function_name", function_name)
                .with_label("region", region),
            DetectedEnvironment::CloudRun {
                project_id,
                service,
                revision,
                configuration,
                location,
            } => MonitoredResource::new(CLOUD_RUN_REVISION)
                .with_label("project_id", project_id)
                .with_label("service_name", service)
                .with_label("revision_name", revision)
                .with_label("configuration_name", configuration)
                .with_label("location", location),
            DetectedEnvironment::Kubernetes {
                project_id,
                location,
                cluster,
                namespace,
                pod,
                container,
            } => MonitoredResource::new(K8S_CONTAINER)
                .with_label("project_id", project_id)
                .with_label("location", location)
                .with_label("cluster_name", cluster)
                .with_label("namespace_name", namespace)
                .with_label("pod_name", pod)
                .with_label("container_name", container),
            DetectedEnvironment::Global { project_id } => {
                let resource = MonitoredResource::global();
                match project_id {
                    Some(project_id) => resource.with_label("project_id", project_id),
                    None => resource,
                }
            }
        }
    }
}

/// Project id from the environment, if any runtime exported one.
///
/// `GCLOUD_PROJECT` (App Engine flexible) is consulted before
/// `GOOGLE_CLOUD_PROJECT` (standard and newer runtimes).
pub fn project_id(env: &dyn EnvSource) -> Option<String> {
    env.var(env::GCLOUD_PROJECT_ENV)
        .or_else(|| env.var(env::GOOGLE_CLOUD_PROJECT_ENV))
}

/// Resolves the [`MonitoredResource`] for the current process.
///
/// Resolution never fails: missing signals degrade to the `global`
/// resource. Callers are expected to resolve once and keep the result.
pub struct ResourceResolver;

impl ResourceResolver {
    pub fn resolve(env: &dyn EnvSource) -> MonitoredResource {
        DetectedEnvironment::detect(env).into_resource()
    }

    /// Resolve against the real process environment.
    pub fn resolve_process() -> MonitoredResource {
        Self::resolve(&env::ProcessEnv)
    }
}
