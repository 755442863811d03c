use {
    crate::{
        error::{CallError, Error, Step},
        orchestrator::{Orchestrator, ServiceUpdate},
    },
    tracing::info,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn desired_count(self) -> i32 {
        match self {
            Power::On => 1,
            Power::Off => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleTarget {
    Service(String),
    /// Every service in the cluster.
    AllServices,
}

impl ToggleTarget {
    /// `all` takes precedence over a named service.
    pub fn from_args(service: Option<&str>, all: bool) -> Result<Self, Error> {
        match (service.map(str::trim).filter(|s| !s.is_empty()), all) {
            (_, true) => Ok(ToggleTarget::AllServices),
            (Some(service), false) => Ok(ToggleTarget::Service(service.to_string())),
            (None, false) => Err(Error::validation(
                "either a service or --all must be given",
            )),
        }
    }
}

async fn toggle_single_service<O: Orchestrator>(
    orchestrator: &O,
    cluster: &str,
    service: &str,
    power: Power,
) -> Result<(), CallError> {
    orchestrator
        .update_service(
            cluster,
            service,
            ServiceUpdate::DesiredCount(power.desired_count()),
        )
        .await?;
    info!(
        "Service {} app count {}!",
        service,
        match power {
            Power::On => "increased",
            Power::Off => "decreased",
        }
    );
    Ok(())
}

/// Set the desired count of the target service(s). Returns the services that
/// were toggled, in the order they were updated.
///
/// Services are updated one at a time and the first failure stops the run.
/// When some services were already toggled, the error is a partial completion.
pub async fn toggle<O: Orchestrator>(
    orchestrator: &O,
    cluster: &str,
    target: &ToggleTarget,
    power: Power,
) -> Result<Vec<String>, Error> {
    let services = match target {
        ToggleTarget::Service(service) => vec![service.clone()],
        ToggleTarget::AllServices => orchestrator
            .list_services(cluster)
            .await
            .map_err(|e| Error::at(Step::ListServices, e))?,
    };

    let mut toggled = Vec::with_capacity(services.len());
    for service in services {
        if let Err(e) = toggle_single_service(orchestrator, cluster, &service, power).await {
            return Err(if toggled.is_empty() {
                Error::at(Step::UpdateService, e)
            } else {
                Error::partial(
                    format!("toggled {}; stopped at {}", toggled.join(", "), service),
                    Step::UpdateService,
                    e,
                )
            });
        }
        toggled.push(service);
    }

    match target {
        ToggleTarget::AllServices => info!("All services were toggled!"),
        ToggleTarget::Service(_) => info!("Service toggled!"),
    }
    Ok(toggled)
}
