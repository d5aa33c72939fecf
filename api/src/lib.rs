pub mod cluster_config;
pub mod service_account;

pub use cluster_config::v1alpha1::{ClusterConfig, API_VERSION, KIND};
pub use cluster_config::{ClusterIam, ClusterMeta};
pub use service_account::{AccountKey, ServiceAccountMeta, ServiceAccountSpec, DEFAULT_NAMESPACE};
