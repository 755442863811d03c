use {
    crate::error::{CallError, Error, Resource, Step},
    std::{fs::OpenOptions, io::Write, path::Path},
    tracing::{debug, info},
};

/// SSM accepts at most this many names per `GetParameters` call.
pub const MAX_PARAMETERS_PER_CALL: usize = 10;

/// One `env_var:parameter_name` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRequest {
    pub env_var: String,
    pub name: String,
}

impl ParameterRequest {
    pub fn parse(token: &str) -> Result<Self, Error> {
        match token.split(':').collect::<Vec<_>>().as_slice() {
            [env_var, name] if !env_var.is_empty() && !name.is_empty() => Ok(ParameterRequest {
                env_var: env_var.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::validation(format!(
                "parameter '{}' must have the form 'env_var:parameter_name'",
                token
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedParameters {
    /// `(name, value)` pairs that were found.
    pub values: Vec<(String, String)>,
    /// Names the store doesn't know.
    pub invalid: Vec<String>,
}

#[allow(async_fn_in_trait)]
pub trait ParameterStore {
    /// Fetch and decrypt up to [`MAX_PARAMETERS_PER_CALL`] parameters.
    async fn get_parameters(&self, names: &[String]) -> Result<FetchedParameters, CallError>;
}

/// A resolved parameter, ready to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub value: String,
}

/// Resolve every request against the store. Each distinct parameter is
/// fetched once, in batches of at most [`MAX_PARAMETERS_PER_CALL`]. Exports
/// come back in request order with upper-cased names.
pub async fn fetch_parameters<S: ParameterStore>(
    store: &S,
    requests: &[ParameterRequest],
) -> Result<Vec<Export>, Error> {
    let mut names: Vec<String> = Vec::new();
    for request in requests {
        if !names.contains(&request.name) {
            names.push(request.name.clone());
        }
    }

    let mut values = std::collections::HashMap::new();
    let mut invalid = Vec::new();
    for chunk in names.chunks(MAX_PARAMETERS_PER_CALL) {
        debug!("Fetching {} parameter(s)", chunk.len());
        let fetched = store
            .get_parameters(chunk)
            .await
            .map_err(|e| Error::at(Step::GetParameters, e))?;
        values.extend(fetched.values);
        invalid.extend(fetched.invalid);
    }

    if !invalid.is_empty() {
        return Err(Error::NotFound {
            resource: Resource::Parameter,
            key: invalid.join(", "),
        });
    }

    requests
        .iter()
        .map(|request| match values.get(&request.name) {
            Some(value) => Ok(Export {
                name: request.env_var.to_uppercase(),
                value: value.clone(),
            }),
            None => Err(Error::NotFound {
                resource: Resource::Parameter,
                key: request.name.clone(),
            }),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Append to `$GITHUB_OUTPUT`, or print `::set-output` commands when it
    /// isn't set.
    GithubOutput,
    Dotenv,
    Export,
}

/// Escape a value for a `::set-output` workflow command.
fn escape_command_value(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render one export for a `$GITHUB_OUTPUT` file. Multi-line values use the
/// heredoc form with a delimiter that doesn't occur in the value.
fn github_output_entry(export: &Export) -> String {
    if !export.value.contains('\n') && !export.value.contains('\r') {
        return format!("{}={}\n", export.name, export.value);
    }
    let mut delimiter = String::from("DEPLOYCTL_EOF");
    while export.value.contains(&delimiter) {
        delimiter.push('_');
    }
    format!(
        "{}<<{}\n{}\n{}\n",
        export.name, delimiter, export.value, delimiter
    )
}

/// Render exports as text. `github_output` is the `$GITHUB_OUTPUT` path, if
/// any; with [`OutputFormat::GithubOutput`] the returned text belongs in that
/// file instead of on stdout.
pub fn render(format: OutputFormat, exports: &[Export], github_output: Option<&Path>) -> String {
    exports
        .iter()
        .map(|export| match format {
            OutputFormat::GithubOutput if github_output.is_some() => github_output_entry(export),
            OutputFormat::GithubOutput => format!(
                "::set-output name={}::{}\n",
                export.name,
                escape_command_value(&export.value)
            ),
            OutputFormat::Dotenv => format!("{}={}\n", export.name, export.value),
            OutputFormat::Export => {
                format!("export {}={}\n", export.name, shell_quote(&export.value))
            }
        })
        .collect()
}

/// Write the exports to wherever `format` says they go.
pub fn write_exports(
    format: OutputFormat,
    exports: &[Export],
    github_output: Option<&Path>,
) -> Result<(), Error> {
    let rendered = render(format, exports, github_output);
    match (format, github_output) {
        (OutputFormat::GithubOutput, Some(path)) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::remote(Step::WriteOutput, e))?;
            file.write_all(rendered.as_bytes())
                .map_err(|e| Error::remote(Step::WriteOutput, e))?;
            info!("Wrote {} output(s) to {}", exports.len(), path.display());
        }
        _ => print!("{}", rendered),
    }
    Ok(())
}
