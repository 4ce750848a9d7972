mod client;
mod endpoint;
mod types;

pub use client::KubeflowClient;
pub use endpoint::discover_endpoint;
