use {
    clap::Parser,
    deployctl::{
        config::RoleConfig,
        database::{create_database, DatabaseArgs, TunnelConfig},
        deploy::{deploy, DeployArgs},
        parameters::{fetch_parameters, write_exports, OutputFormat, ParameterRequest},
        platforms::aws::{load_config, Ecs, SecretsManager, Ssm},
        toggle::{toggle, Power, ToggleTarget},
        Error,
    },
    std::{path::PathBuf, time::Duration},
    tracing::Level,
};

#[derive(Parser)]
#[command(author, version)]
/// deployctl operates AWS resources from CI/CD pipelines.
///
/// Each subcommand is a single-shot tool: it reads its arguments, makes a few
/// AWS API calls, prints what it did and exits non-zero on any failure. AWS
/// credentials and region come from the usual AWS environment.
struct Args {
    /// Log debug output
    #[clap(short, long, global = true, action = clap::ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Deploy a new image to an ECS service.
    ///
    /// Registers a new revision of the service's current task definition with
    /// the image replaced and the environment variables and secrets merged in,
    /// then points the service at that revision. Existing environment
    /// variables and secrets are kept unless overridden. Containers not named
    /// in --container-names are copied unchanged.
    ///
    /// If the revision is registered but the service update fails, the error
    /// names the unused revision that was left behind.
    UpdateService {
        /// Name of the ECS cluster
        #[clap(long)]
        cluster: String,
        /// Name of the ECS service
        #[clap(long)]
        service: String,
        /// Docker image URL for the updated application
        #[clap(long)]
        image: String,
        /// ARN of the database username secret, exposed as DB_USERNAME
        #[clap(long)]
        username_secret_arn: String,
        /// ARN of the database password secret, exposed as DB_PASSWORD
        #[clap(long)]
        password_secret_arn: String,
        /// Target environment; "production" selects the production role
        #[clap(long)]
        target_env: Option<String>,
        /// JSON object of environment variables, or a list of {"name", "value"}
        #[clap(long)]
        env_vars: String,
        /// Comma-separated container names to update (default: all)
        #[clap(long)]
        container_names: Option<String>,
        /// JSON object of additional secrets, {"NAME": "arn:aws:secretsmanager:..."}
        #[clap(long)]
        additional_secrets: Option<String>,
        /// Role for production deployments [env: DEPLOYCTL_PRODUCTION_ROLE]
        #[clap(long)]
        production_role: Option<String>,
        /// Role for every other deployment [env: DEPLOYCTL_DEVELOPMENT_ROLE]
        #[clap(long)]
        development_role: Option<String>,
        /// Prefix added to the role name as <PREFIX>_<ROLE> [env: DEPLOYCTL_ROLE_PREFIX]
        #[clap(long)]
        role_prefix: Option<String>,
        /// Show the task definition that would be registered and stop
        #[clap(long, action = clap::ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Turn an ECS service, or every service in a cluster, on or off.
    ///
    /// Turning on sets the desired task count to 1, turning off sets it to 0.
    #[command(group(clap::ArgGroup::new("power").required(true).args(["turn_on", "turn_off"])))]
    ToggleService {
        /// Cluster short name
        #[clap(long)]
        cluster: String,
        /// Service to toggle
        #[clap(long)]
        service: Option<String>,
        /// Toggle every service in the cluster
        #[clap(long, alias = "shutdown-all-cluster-tasks", action = clap::ArgAction::SetTrue)]
        all: bool,
        /// Scale to one task
        #[clap(long, action = clap::ArgAction::SetTrue)]
        turn_on: bool,
        /// Scale to zero tasks
        #[clap(long, action = clap::ArgAction::SetTrue)]
        turn_off: bool,
    },
    /// Export SSM parameters for later pipeline steps.
    ///
    /// Each argument has the form <ENV_VAR>:<PARAMETER_NAME>. Parameters are
    /// decrypted, and ENV_VAR is upper-cased in the output.
    GetParameters {
        /// <ENV_VAR>:<PARAMETER_NAME> pairs
        #[clap(required = true)]
        parameters: Vec<String>,
        /// Output format
        #[clap(long, value_enum, default_value_t = OutputFormat::GithubOutput)]
        format: OutputFormat,
    },
    /// Create a Postgres database through an SSH bastion.
    ///
    /// The SSH key and database credentials are read from Secrets Manager. The
    /// database is only created if it does not exist yet.
    CreateDatabase {
        #[clap(long)]
        bastion_host: String,
        #[clap(long)]
        bastion_user: String,
        /// Local port for the SSH tunnel
        #[clap(long)]
        local_port: u16,
        /// Database endpoint, as reachable from the bastion
        #[clap(long)]
        remote_host: String,
        #[clap(long, default_value_t = 5432)]
        remote_port: u16,
        /// Name of the database to create
        #[clap(long)]
        db_name: String,
        #[clap(long)]
        ssh_key_secret_arn: String,
        #[clap(long)]
        username_secret_arn: String,
        #[clap(long)]
        password_secret_arn: String,
        /// Seconds to wait for the tunnel to come up
        #[clap(long, default_value_t = 5)]
        tunnel_timeout: u64,
        /// ssh binary to run
        #[clap(long, default_value = "ssh")]
        ssh_program: String,
    },
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn get_github_output() -> Option<PathBuf> {
    std::env::var_os("GITHUB_OUTPUT")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

async fn run(args: Args) -> Result<(), Error> {
    match args.subcommand {
        Subcommand::UpdateService {
            cluster,
            service,
            image,
            username_secret_arn,
            password_secret_arn,
            target_env,
            env_vars,
            container_names,
            additional_secrets,
            production_role,
            development_role,
            role_prefix,
            dry_run,
        } => {
            let mut roles = RoleConfig::from_env();
            if let Some(production_role) = production_role {
                roles.production = production_role;
            }
            if let Some(development_role) = development_role {
                roles.development = development_role;
            }
            if role_prefix.is_some() {
                roles.prefix = role_prefix;
            }

            let deploy_args = DeployArgs {
                cluster,
                service,
                image,
                username_secret_arn,
                password_secret_arn,
                target_env,
                env_vars,
                container_names,
                additional_secrets,
                dry_run,
            };

            let config = load_config().await;
            deploy(&Ecs::new(&config), &roles, &deploy_args).await?;
        }
        Subcommand::ToggleService {
            cluster,
            service,
            all,
            turn_on,
            turn_off: _,
        } => {
            let target = ToggleTarget::from_args(service.as_deref(), all)?;
            let power = if turn_on { Power::On } else { Power::Off };

            let config = load_config().await;
            toggle(&Ecs::new(&config), &cluster, &target, power).await?;
        }
        Subcommand::GetParameters { parameters, format } => {
            let requests = parameters
                .iter()
                .map(|token| ParameterRequest::parse(token))
                .collect::<Result<Vec<_>, _>>()?;

            let config = load_config().await;
            let exports = fetch_parameters(&Ssm::new(&config), &requests).await?;
            write_exports(format, &exports, get_github_output().as_deref())?;
        }
        Subcommand::CreateDatabase {
            bastion_host,
            bastion_user,
            local_port,
            remote_host,
            remote_port,
            db_name,
            ssh_key_secret_arn,
            username_secret_arn,
            password_secret_arn,
            tunnel_timeout,
            ssh_program,
        } => {
            let database_args = DatabaseArgs {
                tunnel: TunnelConfig {
                    program: ssh_program,
                    bastion_host,
                    bastion_user,
                    local_port,
                    remote_host,
                    remote_port,
                    ready_timeout: Duration::from_secs(tunnel_timeout),
                },
                database: db_name,
                ssh_key_secret_arn,
                username_secret_arn,
                password_secret_arn,
            };

            let config = load_config().await;
            create_database(&SecretsManager::new(&config), &database_args).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(error) = run(args).await {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}
