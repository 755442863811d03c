use {
    crate::{
        config::RoleConfig,
        error::{Error, Step},
        merge::merge_ordered,
        orchestrator::{Orchestrator, ServiceUpdate, TaskDefinitionRegistration},
        overrides::{parse_environment, parse_secrets, ContainerScope},
    },
    aws_sdk_ecs::types::{
        Compatibility, ContainerDefinition, KeyValuePair, NetworkMode, Secret, TaskDefinition,
    },
    indexmap::IndexMap,
    tracing::{debug, info, warn},
};

pub const DB_USERNAME_SECRET: &str = "DB_USERNAME";
pub const DB_PASSWORD_SECRET: &str = "DB_PASSWORD";

/// `update-service` inputs as they arrive on the command line.
#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub cluster: String,
    pub service: String,
    pub image: String,
    pub username_secret_arn: String,
    pub password_secret_arn: String,
    pub target_env: Option<String>,
    /// JSON environment overrides.
    pub env_vars: String,
    /// Comma-separated container allow-list.
    pub container_names: Option<String>,
    /// JSON object of extra secret name to secret ARN.
    pub additional_secrets: Option<String>,
    pub dry_run: bool,
}

/// What gets written into every targeted container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPatch {
    pub image: String,
    pub environment: IndexMap<String, String>,
    /// Database credentials first, then the additional secrets.
    pub secrets: IndexMap<String, String>,
}

impl ContainerPatch {
    pub fn from_args(args: &DeployArgs) -> Result<Self, Error> {
        let environment = parse_environment(&args.env_vars)?;
        let additional_secrets = parse_secrets(args.additional_secrets.as_deref())?;
        if !additional_secrets.is_empty() {
            info!("Adding {} additional secret(s)", additional_secrets.len());
        }

        let secrets = merge_ordered(
            [
                (DB_USERNAME_SECRET.to_string(), args.username_secret_arn.clone()),
                (DB_PASSWORD_SECRET.to_string(), args.password_secret_arn.clone()),
            ],
            additional_secrets,
        );

        Ok(ContainerPatch {
            image: args.image.clone(),
            environment,
            secrets,
        })
    }
}

/// Apply `patch` to one container. Every field other than `image`,
/// `environment` and `secrets` is carried over as is.
pub fn patch_container(
    container: &ContainerDefinition,
    patch: &ContainerPatch,
) -> ContainerDefinition {
    let environment = merge_ordered(
        container
            .environment
            .iter()
            .flatten()
            .filter_map(|pair| Some((pair.name.clone()?, pair.value.clone()))),
        patch
            .environment
            .iter()
            .map(|(name, value)| (name.clone(), Some(value.clone()))),
    );

    let secrets = merge_ordered(
        container
            .secrets
            .iter()
            .flatten()
            .filter_map(|secret| Some((secret.name.clone()?, secret.value_from.clone()))),
        patch
            .secrets
            .iter()
            .map(|(name, value_from)| (name.clone(), Some(value_from.clone()))),
    );

    let mut updated = container.clone();
    updated.image = Some(patch.image.clone());
    updated.environment = Some(
        environment
            .into_iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).set_value(value).build())
            .collect(),
    );
    updated.secrets = Some(
        secrets
            .into_iter()
            .map(|(name, value_from)| {
                Secret::builder()
                    .name(name)
                    .set_value_from(value_from)
                    .build()
            })
            .collect(),
    );
    updated
}

/// Rebuild the container list of a task definition, in its original order.
pub fn patch_containers(
    containers: &[ContainerDefinition],
    scope: &ContainerScope,
    patch: &ContainerPatch,
) -> Vec<ContainerDefinition> {
    if let ContainerScope::Only(names) = scope {
        for name in names {
            if !containers
                .iter()
                .any(|container| container.name.as_deref() == Some(name.as_str()))
            {
                warn!("Container '{}' is not in the task definition", name);
            }
        }
    }

    containers
        .iter()
        .map(|container| {
            let name = container.name.as_deref().unwrap_or_default();
            if scope.includes(name) {
                info!("Updating container '{}' with image: {}", name, patch.image);
                patch_container(container, patch)
            } else {
                info!("Keeping container '{}' unchanged (not in update list)", name);
                container.clone()
            }
        })
        .collect()
}

/// Carry the structural fields of `source` over to a new registration.
pub fn build_registration(
    source: &TaskDefinition,
    container_definitions: Vec<ContainerDefinition>,
    role: String,
) -> Result<TaskDefinitionRegistration, Error> {
    let family = source.family.clone().ok_or_else(|| {
        Error::remote(
            Step::DescribeTaskDefinition,
            "task definition has no family",
        )
    })?;

    Ok(TaskDefinitionRegistration {
        family,
        container_definitions,
        requires_compatibilities: source
            .requires_compatibilities
            .clone()
            .unwrap_or_else(|| vec![Compatibility::Fargate]),
        execution_role_arn: role.clone(),
        task_role_arn: role,
        network_mode: source.network_mode.clone().unwrap_or(NetworkMode::Awsvpc),
        volumes: source.volumes.clone(),
        cpu: source.cpu.clone(),
        memory: source.memory.clone(),
        runtime_platform: source.runtime_platform.clone(),
        placement_constraints: source.placement_constraints.clone(),
        ipc_mode: source.ipc_mode.clone(),
        pid_mode: source.pid_mode.clone(),
        proxy_configuration: source.proxy_configuration.clone(),
        ephemeral_storage: source.ephemeral_storage.clone(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub previous_task_definition: String,
    /// ARN of the registered revision. `None` for a dry run.
    pub task_definition: Option<String>,
    pub registration: TaskDefinitionRegistration,
}

/// Register a new revision of the service's task definition with the patch
/// applied, then point the service at it.
///
/// All inputs are validated before the first remote call. If registration
/// succeeds and the service update fails, the new revision is left unused and
/// the failure is reported as [`Error::PartialCompletion`].
pub async fn deploy<O: Orchestrator>(
    orchestrator: &O,
    roles: &RoleConfig,
    args: &DeployArgs,
) -> Result<Deployment, Error> {
    let patch = ContainerPatch::from_args(args)?;
    let scope = ContainerScope::parse(args.container_names.as_deref());

    info!("Fetching current task definition...");
    let current_arn = orchestrator
        .describe_service(&args.cluster, &args.service)
        .await
        .map_err(|e| Error::at(Step::DescribeService, e))?;
    info!("Current task definition ARN: {}", current_arn);

    let source = orchestrator
        .describe_task_definition(&current_arn)
        .await
        .map_err(|e| Error::at(Step::DescribeTaskDefinition, e))?;

    match &scope {
        ContainerScope::All => {
            info!("No specific containers specified, will update all containers")
        }
        ContainerScope::Only(names) => info!("Containers to update: {}", names.join(", ")),
    }

    let containers = patch_containers(
        source.container_definitions.as_deref().unwrap_or_default(),
        &scope,
        &patch,
    );

    info!("Total containers in task definition: {}", containers.len());
    for container in &containers {
        info!(
            "  - {}: {}",
            container.name.as_deref().unwrap_or_default(),
            container.image.as_deref().unwrap_or_default()
        );
    }

    let role = roles.role_for(args.target_env.as_deref());
    debug!("Using execution and task role {}", role);
    let registration = build_registration(&source, containers, role)?;

    if args.dry_run {
        info!("Dry run, not registering: {:#?}", registration);
        return Ok(Deployment {
            previous_task_definition: current_arn,
            task_definition: None,
            registration,
        });
    }

    info!("Registering new task definition...");
    let registered = orchestrator
        .register_task_definition(registration.clone())
        .await
        .map_err(|e| Error::at(Step::RegisterTaskDefinition, e))?;
    let new_arn = registered.task_definition_arn.ok_or_else(|| {
        Error::remote(
            Step::RegisterTaskDefinition,
            "response is missing the task definition ARN",
        )
    })?;
    info!("New task definition ARN: {}", new_arn);

    info!("Updating ECS service with new task definition...");
    orchestrator
        .update_service(
            &args.cluster,
            &args.service,
            ServiceUpdate::TaskDefinition(new_arn.clone()),
        )
        .await
        .map_err(|e| {
            Error::partial(
                format!(
                    "registered {} but service '{}' still runs {}",
                    new_arn, args.service, current_arn
                ),
                Step::UpdateService,
                e,
            )
        })?;
    info!("Service updated!");

    Ok(Deployment {
        previous_task_definition: current_arn,
        task_definition: Some(new_arn),
        registration,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::Resource,
            testing::{container, env, secret, Call, FakeOrchestrator},
        },
        aws_sdk_ecs::types::{CpuArchitecture, PortMapping, RuntimePlatform, Volume},
    };

    const SOURCE_ARN: &str = "arn:aws:ecs:us-east-1:123456789012:task-definition/app:1";

    fn roles() -> RoleConfig {
        RoleConfig {
            production: "prod-role".to_string(),
            development: "dev-role".to_string(),
            prefix: None,
        }
    }

    fn args(env_vars: &str) -> DeployArgs {
        DeployArgs {
            cluster: "main".to_string(),
            service: "web".to_string(),
            image: "a:2".to_string(),
            username_secret_arn: "arn:user".to_string(),
            password_secret_arn: "arn:pass".to_string(),
            env_vars: env_vars.to_string(),
            ..Default::default()
        }
    }

    fn task_definition(containers: Vec<ContainerDefinition>) -> TaskDefinition {
        TaskDefinition::builder()
            .task_definition_arn(SOURCE_ARN)
            .family("app")
            .revision(1)
            .set_container_definitions(Some(containers))
            .build()
    }

    fn environment_of(container: &ContainerDefinition) -> Vec<(String, String)> {
        container
            .environment
            .iter()
            .flatten()
            .map(|pair| {
                (
                    pair.name.clone().unwrap_or_default(),
                    pair.value.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    fn secrets_of(container: &ContainerDefinition) -> Vec<(String, String)> {
        container
            .secrets
            .iter()
            .flatten()
            .map(|secret| {
                (
                    secret.name.clone().unwrap_or_default(),
                    secret.value_from.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn single_container_gets_image_environment_and_db_secrets() {
        let fake = FakeOrchestrator::running(task_definition(vec![container(
            "web",
            "a:1",
            &[("FOO", "1")],
        )]));

        let deployment = deploy(&fake, &roles(), &args(r#"{"FOO": "2", "BAR": "3"}"#))
            .await
            .unwrap();

        let web = &deployment.registration.container_definitions[0];
        assert_eq!(web.name.as_deref(), Some("web"));
        assert_eq!(web.image.as_deref(), Some("a:2"));
        assert_eq!(environment_of(web), owned(&[("FOO", "2"), ("BAR", "3")]));
        assert_eq!(
            secrets_of(web),
            owned(&[("DB_USERNAME", "arn:user"), ("DB_PASSWORD", "arn:pass")])
        );

        assert_eq!(
            deployment.task_definition.as_deref(),
            Some("arn:aws:ecs:us-east-1:123456789012:task-definition/app:2")
        );
        assert_eq!(
            fake.calls().last(),
            Some(&Call::UpdateService(
                "main".into(),
                "web".into(),
                ServiceUpdate::TaskDefinition(
                    "arn:aws:ecs:us-east-1:123456789012:task-definition/app:2".into()
                )
            ))
        );
    }

    #[tokio::test]
    async fn containers_outside_the_allow_list_are_untouched() {
        let sidecar = ContainerDefinition::builder()
            .name("sidecar")
            .image("envoy:1")
            .port_mappings(PortMapping::builder().container_port(9901).build())
            .set_environment(Some(env(&[("MODE", "proxy")])))
            .secrets(secret("TOKEN", "arn:token"))
            .build();
        let fake = FakeOrchestrator::running(task_definition(vec![
            container("web", "a:1", &[]),
            sidecar.clone(),
        ]));

        let mut args = args(r#"{"FOO": "2"}"#);
        args.container_names = Some("web".to_string());
        let deployment = deploy(&fake, &roles(), &args).await.unwrap();

        let containers = &deployment.registration.container_definitions;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].image.as_deref(), Some("a:2"));
        assert_eq!(containers[1], sidecar);
    }

    #[tokio::test]
    async fn membership_and_order_are_preserved() {
        let fake = FakeOrchestrator::running(task_definition(vec![
            container("migrate", "a:1", &[]),
            container("web", "a:1", &[]),
            container("worker", "a:1", &[]),
        ]));

        let mut args = args("{}");
        args.container_names = Some("worker, web".to_string());
        let deployment = deploy(&fake, &roles(), &args).await.unwrap();

        let names: Vec<_> = deployment
            .registration
            .container_definitions
            .iter()
            .map(|container| container.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, ["migrate", "web", "worker"]);
        let images: Vec<_> = deployment
            .registration
            .container_definitions
            .iter()
            .map(|container| container.image.clone().unwrap_or_default())
            .collect();
        assert_eq!(images, ["a:1", "a:2", "a:2"]);
    }

    #[test]
    fn untouched_environment_keys_survive_and_secrets_merge() {
        let source = ContainerDefinition::builder()
            .name("web")
            .image("a:1")
            .set_environment(Some(env(&[("KEEP", "k"), ("FOO", "1")])))
            .secrets(secret("DB_PASSWORD", "arn:old-pass"))
            .secrets(secret("API_KEY", "arn:api"))
            .build();

        let mut args = args(r#"[{"name": "FOO", "value": "2"}]"#);
        args.additional_secrets = Some(r#"{"API_KEY": "arn:api-v2", "NEW": "arn:new"}"#.into());
        let patch = ContainerPatch::from_args(&args).unwrap();

        let patched = patch_container(&source, &patch);
        assert_eq!(environment_of(&patched), owned(&[("KEEP", "k"), ("FOO", "2")]));
        assert_eq!(
            secrets_of(&patched),
            owned(&[
                ("DB_PASSWORD", "arn:pass"),
                ("API_KEY", "arn:api-v2"),
                ("DB_USERNAME", "arn:user"),
                ("NEW", "arn:new"),
            ])
        );
    }

    #[test]
    fn registration_copies_structural_fields_and_fills_defaults() {
        let bare = task_definition(vec![]);
        let registration = build_registration(&bare, vec![], "dev-role".into()).unwrap();
        assert_eq!(registration.family, "app");
        assert_eq!(registration.network_mode, NetworkMode::Awsvpc);
        assert_eq!(registration.requires_compatibilities, vec![Compatibility::Fargate]);
        assert_eq!(registration.execution_role_arn, "dev-role");
        assert_eq!(registration.task_role_arn, "dev-role");
        assert_eq!(registration.cpu, None);
        assert_eq!(registration.volumes, None);

        let full = TaskDefinition::builder()
            .family("app")
            .cpu("512")
            .memory("1024")
            .network_mode(NetworkMode::Bridge)
            .requires_compatibilities(Compatibility::Ec2)
            .volumes(Volume::builder().name("data").build())
            .runtime_platform(
                RuntimePlatform::builder()
                    .cpu_architecture(CpuArchitecture::Arm64)
                    .build(),
            )
            .build();
        let registration = build_registration(&full, vec![], "prod-role".into()).unwrap();
        assert_eq!(registration.cpu.as_deref(), Some("512"));
        assert_eq!(registration.memory.as_deref(), Some("1024"));
        assert_eq!(registration.network_mode, NetworkMode::Bridge);
        assert_eq!(registration.requires_compatibilities, vec![Compatibility::Ec2]);
        assert_eq!(registration.volumes, full.volumes);
        assert_eq!(registration.runtime_platform, full.runtime_platform);
        assert_eq!(registration.ephemeral_storage, None);
    }

    #[tokio::test]
    async fn production_target_selects_the_production_role() {
        let fake = FakeOrchestrator::running(task_definition(vec![container("web", "a:1", &[])]));

        let mut args = args("{}");
        args.target_env = Some("production".into());
        let deployment = deploy(&fake, &roles(), &args).await.unwrap();
        assert_eq!(deployment.registration.execution_role_arn, "prod-role");

        args.target_env = Some("dev".into());
        let deployment = deploy(&fake, &roles(), &args).await.unwrap();
        assert_eq!(deployment.registration.task_role_arn, "dev-role");
    }

    #[tokio::test]
    async fn repeated_runs_register_identical_content() {
        let fake = FakeOrchestrator::running(task_definition(vec![
            container("web", "a:1", &[("FOO", "1")]),
            container("sidecar", "b:1", &[]),
        ]));

        let args = args(r#"{"FOO": "2", "BAR": "3"}"#);
        let first = deploy(&fake, &roles(), &args).await.unwrap();
        let second = deploy(&fake, &roles(), &args).await.unwrap();

        assert_ne!(first.task_definition, second.task_definition);
        assert_eq!(first.registration, second.registration);
        assert_eq!(fake.registrations().len(), 2);
    }

    #[tokio::test]
    async fn malformed_overrides_make_no_remote_calls() {
        let fake = FakeOrchestrator::running(task_definition(vec![container("web", "a:1", &[])]));

        let error = deploy(&fake, &roles(), &args("{not valid}")).await.unwrap_err();
        assert!(matches!(error, Error::Validation(_)));

        let mut bad_secrets = args("{}");
        bad_secrets.additional_secrets = Some("[1, 2]".into());
        let error = deploy(&fake, &roles(), &bad_secrets).await.unwrap_err();
        assert!(matches!(error, Error::Validation(_)));

        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let fake = FakeOrchestrator::running(task_definition(vec![]));
        let mut args = args("{}");
        args.service = "api".into();

        let error = deploy(&fake, &roles(), &args).await.unwrap_err();
        assert_eq!(
            error,
            Error::NotFound {
                resource: Resource::Service,
                key: "api".into()
            }
        );
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_registration_is_a_remote_error_without_service_update() {
        let mut fake =
            FakeOrchestrator::running(task_definition(vec![container("web", "a:1", &[])]));
        fake.fail_register = true;

        let error = deploy(&fake, &roles(), &args("{}")).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Remote {
                step: Step::RegisterTaskDefinition,
                ..
            }
        ));
        assert!(!fake
            .calls()
            .iter()
            .any(|call| matches!(call, Call::UpdateService(..))));
    }

    #[tokio::test]
    async fn failed_service_update_reports_the_dangling_revision() {
        let mut fake =
            FakeOrchestrator::running(task_definition(vec![container("web", "a:1", &[])]));
        fake.fail_update_service = Some("web".into());

        match deploy(&fake, &roles(), &args("{}")).await.unwrap_err() {
            Error::PartialCompletion {
                completed, step, ..
            } => {
                assert_eq!(step, Step::UpdateService);
                assert!(completed.contains("task-definition/app:2"));
                assert!(completed.contains(SOURCE_ARN));
            }
            other => panic!("expected partial completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dry_run_registers_nothing() {
        let fake = FakeOrchestrator::running(task_definition(vec![container("web", "a:1", &[])]));
        let mut args = args("{}");
        args.dry_run = true;

        let deployment = deploy(&fake, &roles(), &args).await.unwrap();
        assert_eq!(deployment.task_definition, None);
        assert_eq!(deployment.previous_task_definition, SOURCE_ARN);
        assert!(fake.registrations().is_empty());
        assert_eq!(fake.calls().len(), 2);
    }
}
