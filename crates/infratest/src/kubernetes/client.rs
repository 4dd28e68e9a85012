use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::{Api, PostParams},
    Client,
};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::config::namespace_from_env;

/// The two control-plane calls a job watch needs.
///
/// Implementations must be safe to share between concurrent watches; the
/// watcher never mutates the client.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Create the job and return the object the API server stored.
    async fn create(&self, job: &Job) -> Result<Job, kube::Error>;

    /// Fetch the current state of a job by name.
    async fn get(&self, name: &str) -> Result<Job, kube::Error>;
}

/// [`JobClient`] backed by a namespaced `Api<Job>`.
#[derive(Clone)]
pub struct KubeJobClient {
    jobs: Api<Job>,
    namespace: String,
}

impl KubeJobClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            jobs: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Uses `INFRATEST_NAMESPACE`, falling back to `default`.
    pub fn from_env(client: Client) -> Self {
        let namespace = namespace_from_env();
        Self::new(client, &namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl JobClient for KubeJobClient {
    async fn create(&self, job: &Job) -> Result<Job, kube::Error> {
        debug!(namespace = %self.namespace, job = ?job.metadata.name, "Creating job");
        self.jobs.create(&PostParams::default(), job).await
    }

    async fn get(&self, name: &str) -> Result<Job, kube::Error> {
        self.jobs.get(name).await
    }
}
