//! In-memory collaborators that record every call.

use {
    crate::{
        database::SecretStore,
        error::{CallError, Resource},
        orchestrator::{Orchestrator, ServiceUpdate, TaskDefinitionRegistration},
        parameters::{FetchedParameters, ParameterStore},
    },
    aws_sdk_ecs::types::{ContainerDefinition, KeyValuePair, Secret, TaskDefinition},
    std::{collections::HashMap, sync::Mutex},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DescribeService(String, String),
    DescribeTaskDefinition(String),
    RegisterTaskDefinition(TaskDefinitionRegistration),
    UpdateService(String, String, ServiceUpdate),
    ListServices(String),
}

#[derive(Default)]
pub struct FakeOrchestrator {
    pub services: HashMap<(String, String), String>,
    pub task_definitions: HashMap<String, TaskDefinition>,
    pub service_arns: Vec<String>,
    pub fail_register: bool,
    pub fail_update_service: Option<String>,
    pub calls: Mutex<Vec<Call>>,
    pub revision: Mutex<i32>,
}

impl FakeOrchestrator {
    /// A cluster `main` running service `web` on `task_definition`.
    pub fn running(task_definition: TaskDefinition) -> Self {
        let arn = task_definition
            .task_definition_arn
            .clone()
            .unwrap_or_else(|| "arn:aws:ecs:us-east-1:123456789012:task-definition/app:1".into());
        let mut fake = FakeOrchestrator::default();
        fake.services
            .insert(("main".to_string(), "web".to_string()), arn.clone());
        fake.task_definitions.insert(arn, task_definition);
        *fake.revision.lock().unwrap() = 1;
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<TaskDefinitionRegistration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::RegisterTaskDefinition(registration) => Some(registration),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Orchestrator for FakeOrchestrator {
    async fn describe_service(&self, cluster: &str, service: &str) -> Result<String, CallError> {
        self.record(Call::DescribeService(cluster.into(), service.into()));
        self.services
            .get(&(cluster.to_string(), service.to_string()))
            .cloned()
            .ok_or_else(|| CallError::NotFound {
                resource: Resource::Service,
                key: service.to_string(),
            })
    }

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<TaskDefinition, CallError> {
        self.record(Call::DescribeTaskDefinition(task_definition.into()));
        self.task_definitions
            .get(task_definition)
            .cloned()
            .ok_or_else(|| CallError::NotFound {
                resource: Resource::TaskDefinition,
                key: task_definition.to_string(),
            })
    }

    async fn register_task_definition(
        &self,
        registration: TaskDefinitionRegistration,
    ) -> Result<TaskDefinition, CallError> {
        self.record(Call::RegisterTaskDefinition(registration.clone()));
        if self.fail_register {
            return Err(CallError::Api("ClientException: too many revisions".into()));
        }
        let mut revision = self.revision.lock().unwrap();
        *revision += 1;
        Ok(TaskDefinition::builder()
            .task_definition_arn(format!(
                "arn:aws:ecs:us-east-1:123456789012:task-definition/{}:{}",
                registration.family, *revision
            ))
            .family(registration.family)
            .revision(*revision)
            .set_container_definitions(Some(registration.container_definitions))
            .build())
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: ServiceUpdate,
    ) -> Result<(), CallError> {
        self.record(Call::UpdateService(cluster.into(), service.into(), update));
        match &self.fail_update_service {
            Some(failing) if failing == service => {
                Err(CallError::Api("AccessDeniedException: not authorized".into()))
            }
            _ => Ok(()),
        }
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, CallError> {
        self.record(Call::ListServices(cluster.into()));
        Ok(self.service_arns.clone())
    }
}

/// Parameter store backed by a map. Records every batch requested.
#[derive(Default)]
pub struct FakeParameterStore {
    pub values: HashMap<String, String>,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl FakeParameterStore {
    pub fn with(values: &[(&str, &str)]) -> Self {
        FakeParameterStore {
            values: values
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl ParameterStore for FakeParameterStore {
    async fn get_parameters(&self, names: &[String]) -> Result<FetchedParameters, CallError> {
        self.batches.lock().unwrap().push(names.to_vec());
        let mut fetched = FetchedParameters::default();
        for name in names {
            match self.values.get(name) {
                Some(value) => fetched.values.push((name.clone(), value.clone())),
                None => fetched.invalid.push(name.clone()),
            }
        }
        Ok(fetched)
    }
}

#[derive(Default)]
pub struct FakeSecretStore {
    pub secrets: HashMap<String, String>,
    pub requested: Mutex<Vec<String>>,
}

impl SecretStore for FakeSecretStore {
    async fn get_secret_string(&self, secret_id: &str) -> Result<String, CallError> {
        self.requested.lock().unwrap().push(secret_id.to_string());
        self.secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| CallError::NotFound {
                resource: Resource::Secret,
                key: secret_id.to_string(),
            })
    }
}

pub fn env(pairs: &[(&str, &str)]) -> Vec<KeyValuePair> {
    pairs
        .iter()
        .map(|(name, value)| KeyValuePair::builder().name(*name).value(*value).build())
        .collect()
}

pub fn secret(name: &str, value_from: &str) -> Secret {
    Secret::builder().name(name).value_from(value_from).build()
}

pub fn container(name: &str, image: &str, environment: &[(&str, &str)]) -> ContainerDefinition {
    ContainerDefinition::builder()
        .name(name)
        .image(image)
        .set_environment(Some(env(environment)))
        .build()
}
