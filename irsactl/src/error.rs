//! Error types for irsactl

use std::fmt::Display;

/// Result type used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Desired service accounts could not be loaded or failed validation
    #[error("loading iamserviceaccount(s): {message}")]
    Load { message: String },

    /// The cluster could not be reached or is not in a state we can work with
    #[error("cluster {cluster} is not operable: {message}")]
    Cluster { cluster: String, message: String },

    /// A cluster-wide precondition is not met, nothing has been changed
    #[error("{message}")]
    Precondition { message: String, hint: String },

    /// Reading existing service accounts or stacks failed
    #[error("querying existing state: {message}")]
    StateQuery { message: String },

    /// The delegated batch failed as a whole or in part
    #[error("creating iamserviceaccount(s): {message}")]
    Provisioning { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("aws error: {0}")]
    Aws(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn load(message: impl Into<String>) -> Self {
        Error::Load {
            message: message.into(),
        }
    }

    pub fn cluster(cluster: impl Into<String>, message: impl Display) -> Self {
        Error::Cluster {
            cluster: cluster.into(),
            message: message.to_string(),
        }
    }

    pub fn state_query(err: impl Display) -> Self {
        Error::StateQuery {
            message: err.to_string(),
        }
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        Error::Provisioning {
            message: message.into(),
        }
    }

    pub fn aws(err: impl Display) -> Self {
        Error::Aws(err.to_string())
    }
}
