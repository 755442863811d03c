use {
    crate::error::{CallError, Error, Step},
    sqlx::{
        postgres::{PgConnectOptions, PgConnection},
        Connection,
    },
    std::{
        io::Write,
        path::Path,
        process::Stdio,
        time::{Duration, Instant},
    },
    tempfile::NamedTempFile,
    tokio::{
        net::TcpStream,
        process::{Child, Command},
    },
    tracing::{debug, info, warn},
};

#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn get_secret_string(&self, secret_id: &str) -> Result<String, CallError>;
}

/// How to reach the database through the bastion.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// The ssh binary to run.
    pub program: String,
    pub bastion_host: String,
    pub bastion_user: String,
    pub local_port: u16,
    /// Database endpoint as seen from the bastion.
    pub remote_host: String,
    pub remote_port: u16,
    /// How long to wait for the forwarded port to accept connections.
    pub ready_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseArgs {
    pub tunnel: TunnelConfig,
    pub database: String,
    pub ssh_key_secret_arn: String,
    pub username_secret_arn: String,
    pub password_secret_arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOutcome {
    Created,
    AlreadyExists,
}

const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Database names are restricted to plain, unquoted-style Postgres identifiers.
pub fn validate_database_name(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LENGTH {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "database name '{}' is not a valid identifier",
            name
        )))
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn ssh_args(config: &TunnelConfig, key_path: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        key_path.display().to_string(),
        "-N".to_string(),
        "-L".to_string(),
        format!(
            "{}:{}:{}",
            config.local_port, config.remote_host, config.remote_port
        ),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        format!("{}@{}", config.bastion_user, config.bastion_host),
    ]
}

/// A running `ssh -L` port forward. The key file and the ssh process are
/// cleaned up on drop if [`Tunnel::close`] isn't reached.
pub struct Tunnel {
    child: Child,
    _key: NamedTempFile,
}

impl Tunnel {
    pub async fn open(config: &TunnelConfig, private_key: &str) -> Result<Self, Error> {
        let tunnel_error = |e: std::io::Error| Error::remote(Step::OpenTunnel, e);

        // tempfile creates the file with mode 0600, which ssh insists on.
        let mut key = tempfile::Builder::new()
            .prefix("deployctl-key-")
            .suffix(".pem")
            .tempfile()
            .map_err(tunnel_error)?;
        key.write_all(private_key.as_bytes()).map_err(tunnel_error)?;
        if !private_key.ends_with('\n') {
            key.write_all(b"\n").map_err(tunnel_error)?;
        }
        key.flush().map_err(tunnel_error)?;

        let args = ssh_args(config, key.path());
        debug!("Running {} {}", config.program, args.join(" "));
        let child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(tunnel_error)?;

        let mut tunnel = Tunnel { child, _key: key };
        tunnel
            .wait_until_ready(config.local_port, config.ready_timeout)
            .await?;
        Ok(tunnel)
    }

    async fn wait_until_ready(&mut self, local_port: u16, timeout: Duration) -> Result<(), Error> {
        let started = Instant::now();
        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .map_err(|e| Error::remote(Step::OpenTunnel, e))?
            {
                return Err(Error::remote(
                    Step::OpenTunnel,
                    format!("ssh exited early with {}", status),
                ));
            }
            if TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                debug!("Tunnel ready after {:?}", started.elapsed());
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(Error::remote(
                    Step::OpenTunnel,
                    format!(
                        "port {} not reachable after {:?}",
                        local_port, timeout
                    ),
                ));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop ssh tunnel: {}", e);
        }
    }
}

async fn ensure_database(
    options: &PgConnectOptions,
    database: &str,
) -> Result<DatabaseOutcome, sqlx::Error> {
    let mut connection = PgConnection::connect_with(options).await?;

    let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(database)
        .fetch_optional(&mut connection)
        .await?
        .is_some();

    let outcome = if exists {
        DatabaseOutcome::AlreadyExists
    } else {
        let statement = format!("CREATE DATABASE {}", quote_identifier(database));
        sqlx::query(&statement).execute(&mut connection).await?;
        DatabaseOutcome::Created
    };

    Ok(outcome_after_close(outcome, connection.close().await))
}

/// The database is already in its final state once the connection closes, so
/// a failed close is only logged.
fn outcome_after_close(
    outcome: DatabaseOutcome,
    closed: Result<(), sqlx::Error>,
) -> DatabaseOutcome {
    if let Err(e) = closed {
        warn!("Failed to close database connection: {}", e);
    }
    outcome
}

async fn get_secret<S: SecretStore>(secrets: &S, secret_id: &str) -> Result<String, Error> {
    secrets
        .get_secret_string(secret_id)
        .await
        .map_err(|e| Error::at(Step::GetSecret, e))
}

/// Create `args.database` on the Postgres server behind the bastion unless it
/// already exists.
pub async fn create_database<S: SecretStore>(
    secrets: &S,
    args: &DatabaseArgs,
) -> Result<DatabaseOutcome, Error> {
    validate_database_name(&args.database)?;

    let private_key = get_secret(secrets, &args.ssh_key_secret_arn).await?;
    let username = get_secret(secrets, &args.username_secret_arn).await?;
    let password = get_secret(secrets, &args.password_secret_arn).await?;

    info!(
        "Opening tunnel to {}:{} through {}",
        args.tunnel.remote_host, args.tunnel.remote_port, args.tunnel.bastion_host
    );
    let tunnel = Tunnel::open(&args.tunnel, &private_key).await?;

    let options = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(args.tunnel.local_port)
        .username(&username)
        .password(&password)
        .database("postgres");
    let result = ensure_database(&options, &args.database).await;

    tunnel.close().await;

    let outcome = result.map_err(|e| Error::remote(Step::CreateDatabase, e))?;
    match outcome {
        DatabaseOutcome::Created => info!("Database '{}' created", args.database),
        DatabaseOutcome::AlreadyExists => info!("Database '{}' already exists", args.database),
    }
    Ok(outcome)
}
