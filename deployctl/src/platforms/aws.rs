use {
    crate::{
        database::SecretStore,
        error::{CallError, Resource},
        orchestrator::{Orchestrator, ServiceUpdate, TaskDefinitionRegistration},
        parameters::{FetchedParameters, ParameterStore},
    },
    aws_sdk_ecs as ecs,
    aws_sdk_ecs::{
        error::{DisplayErrorContext, SdkError},
        operation::{
            describe_services::DescribeServicesError,
            describe_task_definition::DescribeTaskDefinitionError,
            list_services::ListServicesError, update_service::UpdateServiceError,
        },
        types::TaskDefinition,
    },
    aws_sdk_secretsmanager as secretsmanager,
    aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError,
    aws_sdk_ssm as ssm,
    tracing::debug,
};

/// Load region and credentials from the standard AWS environment chain.
pub async fn load_config() -> aws_config::SdkConfig {
    aws_config::load_from_env().await
}

fn api_error(error: impl std::error::Error) -> CallError {
    CallError::Api(DisplayErrorContext(error).to_string())
}

/// The modeled error of a request the service answered, if any.
fn service_error<E, R>(error: &SdkError<E, R>) -> Option<&E> {
    match error {
        SdkError::ServiceError(context) => Some(context.err()),
        _ => None,
    }
}

fn not_found(resource: Resource, key: &str) -> CallError {
    CallError::NotFound {
        resource,
        key: key.to_string(),
    }
}

const UNKNOWN_TASK_DEFINITION: &str = "Unable to describe task definition";

pub struct Ecs {
    client: ecs::Client,
}

impl Ecs {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Ecs {
            client: ecs::Client::new(config),
        }
    }
}

impl Orchestrator for Ecs {
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<String, CallError> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|error| {
                if matches!(
                    service_error(&error),
                    Some(DescribeServicesError::ClusterNotFoundException(_))
                ) {
                    not_found(Resource::Cluster, cluster)
                } else {
                    api_error(error)
                }
            })?;

        for failure in output.failures.unwrap_or_default() {
            debug!(
                "describe_services failure: {:?} {:?}",
                failure.arn, failure.reason
            );
        }

        // Deleted services are still described for a while, as INACTIVE.
        let described = output
            .services
            .unwrap_or_default()
            .into_iter()
            .find(|described| {
                matches!(described.status.as_deref(), Some("ACTIVE") | Some("DRAINING"))
            })
            .ok_or_else(|| not_found(Resource::Service, service))?;

        described
            .task_definition
            .ok_or_else(|| CallError::Api(format!("service '{}' has no task definition", service)))
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, CallError> {
        let output = self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(|error| match service_error(&error) {
                // ECS answers an unknown family or revision with a plain
                // ClientException; other client errors share the type.
                Some(DescribeTaskDefinitionError::ClientException(exception))
                    if exception
                        .message()
                        .is_some_and(|message| message.contains(UNKNOWN_TASK_DEFINITION)) =>
                {
                    not_found(Resource::TaskDefinition, task_definition)
                }
                _ => api_error(error),
            })?;

        output
            .task_definition
            .ok_or_else(|| not_found(Resource::TaskDefinition, task_definition))
    }

    async fn register_task_definition(
        &self,
        registration: TaskDefinitionRegistration,
    ) -> Result<TaskDefinition, CallError> {
        let output = self
            .client
            .register_task_definition()
            .family(registration.family)
            .set_container_definitions(Some(registration.container_definitions))
            .set_requires_compatibilities(Some(registration.requires_compatibilities))
            .execution_role_arn(registration.execution_role_arn)
            .task_role_arn(registration.task_role_arn)
            .network_mode(registration.network_mode)
            .set_volumes(registration.volumes)
            .set_cpu(registration.cpu)
            .set_memory(registration.memory)
            .set_runtime_platform(registration.runtime_platform)
            .set_placement_constraints(registration.placement_constraints)
            .set_ipc_mode(registration.ipc_mode)
            .set_pid_mode(registration.pid_mode)
            .set_proxy_configuration(registration.proxy_configuration)
            .set_ephemeral_storage(registration.ephemeral_storage)
            .send()
            .await
            .map_err(api_error)?;

        output
            .task_definition
            .ok_or_else(|| CallError::Api("response has no task definition".to_string()))
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: ServiceUpdate,
    ) -> Result<(), CallError> {
        let request = self.client.update_service().cluster(cluster).service(service);
        let request = match update {
            ServiceUpdate::TaskDefinition(task_definition) => {
                request.task_definition(task_definition)
            }
            ServiceUpdate::DesiredCount(desired_count) => request.desired_count(desired_count),
        };

        request
            .send()
            .await
            .map_err(|error| match service_error(&error) {
                Some(UpdateServiceError::ClusterNotFoundException(_)) => {
                    not_found(Resource::Cluster, cluster)
                }
                Some(UpdateServiceError::ServiceNotFoundException(_)) => {
                    not_found(Resource::Service, service)
                }
                _ => api_error(error),
            })?;

        Ok(())
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, CallError> {
        let mut service_arns = Vec::new();
        let mut next_token = None;
        loop {
            let output = self
                .client
                .list_services()
                .cluster(cluster)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|error| {
                    if matches!(
                        service_error(&error),
                        Some(ListServicesError::ClusterNotFoundException(_))
                    ) {
                        not_found(Resource::Cluster, cluster)
                    } else {
                        api_error(error)
                    }
                })?;

            service_arns.extend(output.service_arns.unwrap_or_default());
            next_token = output.next_token;
            if next_token.is_none() {
                break;
            }
        }
        Ok(service_arns)
    }
}

pub struct Ssm {
    client: ssm::Client,
}

impl Ssm {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Ssm {
            client: ssm::Client::new(config),
        }
    }
}

impl ParameterStore for Ssm {
    async fn get_parameters(&self, names: &[String]) -> Result<FetchedParameters, CallError> {
        let output = self
            .client
            .get_parameters()
            .set_names(Some(names.to_vec()))
            .with_decryption(true)
            .send()
            .await
            .map_err(api_error)?;

        Ok(FetchedParameters {
            values: output
                .parameters
                .unwrap_or_default()
                .into_iter()
                .filter_map(|parameter| Some((parameter.name?, parameter.value?)))
                .collect(),
            invalid: output.invalid_parameters.unwrap_or_default(),
        })
    }
}

pub struct SecretsManager {
    client: secretsmanager::Client,
}

impl SecretsManager {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        SecretsManager {
            client: secretsmanager::Client::new(config),
        }
    }
}

impl SecretStore for SecretsManager {
    async fn get_secret_string(&self, secret_id: &str) -> Result<String, CallError> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|error| {
                if matches!(
                    service_error(&error),
                    Some(GetSecretValueError::ResourceNotFoundException(_))
                ) {
                    not_found(Resource::Secret, secret_id)
                } else {
                    api_error(error)
                }
            })?;

        output
            .secret_string
            .ok_or_else(|| CallError::Api(format!("secret '{}' has no string value", secret_id)))
    }
}
