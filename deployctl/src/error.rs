use std::fmt;

/// The remote operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    DescribeService,
    DescribeTaskDefinition,
    RegisterTaskDefinition,
    UpdateService,
    ListServices,
    GetParameters,
    WriteOutput,
    GetSecret,
    OpenTunnel,
    CreateDatabase,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::DescribeService => "describe service",
            Step::DescribeTaskDefinition => "describe task definition",
            Step::RegisterTaskDefinition => "register task definition",
            Step::UpdateService => "update service",
            Step::ListServices => "list services",
            Step::GetParameters => "get parameters",
            Step::WriteOutput => "write output",
            Step::GetSecret => "get secret",
            Step::OpenTunnel => "open ssh tunnel",
            Step::CreateDatabase => "create database",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Cluster,
    Service,
    TaskDefinition,
    Parameter,
    Secret,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Cluster => "cluster",
            Resource::Service => "service",
            Resource::TaskDefinition => "task definition",
            Resource::Parameter => "parameter",
            Resource::Secret => "secret",
        })
    }
}

/// What a collaborator (ECS, SSM, Secrets Manager) reports back when a call
/// fails. Collaborators don't know which step of a command they serve; the
/// caller attaches that with [`Error::at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    NotFound { resource: Resource, key: String },
    Api(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::NotFound { resource, key } => write!(f, "{} '{}' not found", resource, key),
            CallError::Api(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CallError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad input. Raised before any remote call is made.
    Validation(String),
    NotFound { resource: Resource, key: String },
    Remote { step: Step, message: String },
    /// An earlier mutation went through and a later one failed. `completed`
    /// describes what is now left behind (e.g. the ARN of a registered but
    /// unused task definition revision).
    PartialCompletion {
        completed: String,
        step: Step,
        message: String,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn remote(step: Step, message: impl fmt::Display) -> Self {
        Error::Remote {
            step,
            message: message.to_string(),
        }
    }

    /// Attach the failing step to a collaborator error.
    pub fn at(step: Step, error: CallError) -> Self {
        match error {
            CallError::NotFound { resource, key } => Error::NotFound { resource, key },
            CallError::Api(message) => Error::Remote { step, message },
        }
    }

    pub fn partial(completed: impl Into<String>, step: Step, error: CallError) -> Self {
        Error::PartialCompletion {
            completed: completed.into(),
            step,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(message) => write!(f, "invalid input: {}", message),
            Error::NotFound { resource, key } => write!(f, "{} '{}' not found", resource, key),
            Error::Remote { step, message } => write!(f, "{} failed: {}", step, message),
            Error::PartialCompletion {
                completed,
                step,
                message,
            } => write!(
                f,
                "{} failed after partial completion ({}): {}",
                step, completed, message
            ),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_keeps_not_found_and_tags_api_errors_with_the_step() {
        let not_found = Error::at(
            Step::DescribeService,
            CallError::NotFound {
                resource: Resource::Service,
                key: "web".to_string(),
            },
        );
        assert_eq!(
            not_found,
            Error::NotFound {
                resource: Resource::Service,
                key: "web".to_string()
            }
        );

        let remote = Error::at(Step::RegisterTaskDefinition, CallError::Api("throttled".into()));
        assert_eq!(remote.to_string(), "register task definition failed: throttled");
    }

    #[test]
    fn partial_completion_names_what_was_left_behind() {
        let error = Error::partial(
            "registered arn:aws:ecs:task-definition/web:8",
            Step::UpdateService,
            CallError::Api("access denied".into()),
        );
        let message = error.to_string();
        assert!(message.starts_with("update service failed after partial completion"));
        assert!(message.contains("web:8"));
        assert!(message.ends_with("access denied"));
    }
}
