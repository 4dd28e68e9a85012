pub mod client;
pub mod resources;

pub use client::{JobClient, KubeJobClient};
pub use resources::{unique_job_name, JobTemplate};

#[cfg(test)]
pub use client::MockJobClient;
