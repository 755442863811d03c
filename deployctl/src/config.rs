fn get_env_var(env_name: &str, option_env: Option<&'static str>, default: &str) -> String {
    match std::env::var(env_name) {
        Ok(value) => value,
        Err(_) => option_env.unwrap_or(default).to_string(),
    }
}

fn get_optional_env_var(env_name: &str, option_env: Option<&'static str>) -> Option<String> {
    let value = match std::env::var(env_name) {
        Ok(value) => Some(value),
        Err(_) => option_env.map(str::to_string),
    };
    value.filter(|value| !value.is_empty())
}

pub fn get_production_role() -> String {
    get_env_var(
        "DEPLOYCTL_PRODUCTION_ROLE",
        option_env!("DEPLOYCTL_PRODUCTION_ROLE"),
        "production_ecs_task_execution_role",
    )
}

pub fn get_development_role() -> String {
    get_env_var(
        "DEPLOYCTL_DEVELOPMENT_ROLE",
        option_env!("DEPLOYCTL_DEVELOPMENT_ROLE"),
        "dev_ecs_task_execution_role",
    )
}

pub fn get_role_prefix() -> Option<String> {
    get_optional_env_var("DEPLOYCTL_ROLE_PREFIX", option_env!("DEPLOYCTL_ROLE_PREFIX"))
}

/// Target environment tag that selects the production role. Anything else,
/// including no tag at all, gets the development role.
pub const PRODUCTION_TARGET: &str = "production";

/// Execution/task role names used when registering task definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    pub production: String,
    pub development: String,
    /// Prepended as `<prefix>_<role>` when set, for accounts whose role
    /// names carry a region code.
    pub prefix: Option<String>,
}

impl RoleConfig {
    pub fn from_env() -> Self {
        RoleConfig {
            production: get_production_role(),
            development: get_development_role(),
            prefix: get_role_prefix(),
        }
    }

    pub fn role_for(&self, target_env: Option<&str>) -> String {
        let role = if target_env == Some(PRODUCTION_TARGET) {
            &self.production
        } else {
            &self.development
        };
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, role),
            None => role.clone(),
        }
    }
}
