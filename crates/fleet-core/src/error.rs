use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("only members with the <@&{role}> role can {action}")]
    RoleDenied { role: String, action: String },

    #[error("retried {remaining:?} too early")]
    RateLimited { remaining: Duration },

    #[error("{context}: {cause:#}")]
    Action {
        context: String,
        cause: anyhow::Error,
    },

    #[error("malformed interaction: {0}")]
    MalformedInteraction(String),

    #[error("missing option '{0}'")]
    MissingOption(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;

impl FleetError {
    /// Wrap a backend failure with what the workflow was trying to do.
    pub fn action(context: impl Into<String>, cause: anyhow::Error) -> Self {
        FleetError::Action {
            context: context.into(),
            cause,
        }
    }

    /// Outcomes that are part of normal operation rather than faults.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            FleetError::RoleDenied { .. } | FleetError::RateLimited { .. }
        )
    }

    /// Text shown privately to the member whose event caused the error.
    pub fn notice(&self) -> String {
        match self {
            FleetError::RoleDenied { role, action } => {
                format!("Only members with the <@&{role}> role can {action}. Please wait :-)")
            }
            FleetError::RateLimited { remaining } => format!(
                "Please wait at least {:.0} seconds before retrying.",
                remaining.as_secs_f64()
            ),
            other => format!("The bot encountered an error:\n{other}"),
        }
    }
}
