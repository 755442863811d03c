use {
    crate::error::Error,
    indexmap::IndexMap,
    serde::Deserialize,
};

/// Environment overrides come either as a plain object or in the ECS
/// `[{"name": ..., "value": ...}]` shape that pipelines often already have.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentInput {
    Map(IndexMap<String, String>),
    List(Vec<NameValue>),
}

#[derive(Deserialize)]
struct NameValue {
    name: String,
    value: String,
}

pub fn parse_environment(json: &str) -> Result<IndexMap<String, String>, Error> {
    let input: EnvironmentInput = serde_json::from_str(json).map_err(|e| {
        Error::validation(format!(
            "environment overrides must be a JSON object of NAME: value strings \
             or a list of {{\"name\", \"value\"}} entries ({})",
            e
        ))
    })?;

    Ok(match input {
        EnvironmentInput::Map(map) => map,
        EnvironmentInput::List(list) => list
            .into_iter()
            .map(|entry| (entry.name, entry.value))
            .collect(),
    })
}

/// Additional secrets: a JSON object of secret name to secret ARN.
pub fn parse_secrets(json: Option<&str>) -> Result<IndexMap<String, String>, Error> {
    match json.map(str::trim).filter(|json| !json.is_empty()) {
        None => Ok(IndexMap::new()),
        Some(json) => serde_json::from_str(json).map_err(|e| {
            Error::validation(format!(
                "additional secrets must be a JSON object of NAME: secret ARN strings ({})",
                e
            ))
        }),
    }
}

/// Which containers of a task definition an update applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerScope {
    All,
    Only(Vec<String>),
}

impl ContainerScope {
    /// Parse a comma-separated allow-list. Blank entries are dropped and a
    /// list with nothing left in it means every container.
    pub fn parse(container_names: Option<&str>) -> Self {
        let names: Vec<String> = container_names
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            ContainerScope::All
        } else {
            ContainerScope::Only(names)
        }
    }

    pub fn includes(&self, container_name: &str) -> bool {
        match self {
            ContainerScope::All => true,
            ContainerScope::Only(names) => names.iter().any(|name| name == container_name),
        }
    }
}
