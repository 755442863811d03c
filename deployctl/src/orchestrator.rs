use {
    crate::error::CallError,
    aws_sdk_ecs::types::{
        Compatibility, ContainerDefinition, EphemeralStorage, IpcMode, NetworkMode, PidMode,
        ProxyConfiguration, RuntimePlatform, TaskDefinition, TaskDefinitionPlacementConstraint,
        Volume,
    },
};

/// Everything needed to register a new task definition revision.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinitionRegistration {
    pub family: String,
    pub container_definitions: Vec<ContainerDefinition>,
    pub requires_compatibilities: Vec<Compatibility>,
    pub execution_role_arn: String,
    pub task_role_arn: String,
    pub network_mode: NetworkMode,
    pub volumes: Option<Vec<Volume>>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub runtime_platform: Option<RuntimePlatform>,
    pub placement_constraints: Option<Vec<TaskDefinitionPlacementConstraint>>,
    pub ipc_mode: Option<IpcMode>,
    pub pid_mode: Option<PidMode>,
    pub proxy_configuration: Option<ProxyConfiguration>,
    pub ephemeral_storage: Option<EphemeralStorage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceUpdate {
    /// Point the service at another task definition revision.
    TaskDefinition(String),
    DesiredCount(i32),
}

/// The container orchestration calls the tools need.
///
/// Every method is one remote call. Implementations report a missing cluster,
/// service or task definition as [`CallError::NotFound`] and anything else as
/// [`CallError::Api`].
#[allow(async_fn_in_trait)]
pub trait Orchestrator {
    /// Returns the ARN of the task definition the service currently runs.
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<String, CallError>;

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, CallError>;

    async fn register_task_definition(
        &self,
        registration: TaskDefinitionRegistration,
    ) -> Result<TaskDefinition, CallError>;

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: ServiceUpdate,
    ) -> Result<(), CallError>;

    /// ARNs of every service in the cluster.
    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, CallError>;
}
