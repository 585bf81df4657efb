//! Simulation - registry of container orchestrators built from a blueprint

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    ContainerId, ContainerSnapshot, RuntimeOptions, SimulationBlueprint, StateStore,
    TransportKind,
};
use tracing::{info, instrument, warn};

use crate::container::{ContainerOrchestrator, StopOutcome};
use crate::error::{OrchestratorError, Result};

/// Every container of a blueprint, keyed by id
///
/// Containers share one [`RuntimeOptions`], so toggling demo mode affects
/// all of them at their next publish.
pub struct Simulation {
    options: Arc<RuntimeOptions>,
    containers: BTreeMap<ContainerId, ContainerOrchestrator>,
}

impl Simulation {
    pub fn from_blueprint(blueprint: &SimulationBlueprint) -> Self {
        let options = Arc::new(RuntimeOptions::with_demo_mode(blueprint.options.demo_mode));
        let containers = blueprint
            .containers
            .iter()
            .map(|config| {
                let orchestrator = ContainerOrchestrator::new(
                    config.clone(),
                    blueprint.transport.clone(),
                    blueprint.runtime.clone(),
                    Arc::clone(&options),
                );
                (config.id, orchestrator)
            })
            .collect();

        Self {
            options,
            containers,
        }
    }

    /// Persist every container's transitions to `store`
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.containers = std::mem::take(&mut self.containers)
            .into_iter()
            .map(|(id, orchestrator)| (id, orchestrator.with_store(Arc::clone(&store))))
            .collect();
        self
    }

    /// Reproducible values; each container derives its own seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.containers = std::mem::take(&mut self.containers)
            .into_iter()
            .map(|(id, orchestrator)| (id, orchestrator.with_seed(seed ^ (u64::from(id) << 32))))
            .collect();
        self
    }

    pub fn options(&self) -> &Arc<RuntimeOptions> {
        &self.options
    }

    pub fn ids(&self) -> Vec<ContainerId> {
        self.containers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn container(&self, id: ContainerId) -> Option<&ContainerOrchestrator> {
        self.containers.get(&id)
    }

    pub fn container_mut(&mut self, id: ContainerId) -> Option<&mut ContainerOrchestrator> {
        self.containers.get_mut(&id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &ContainerOrchestrator> {
        self.containers.values()
    }

    #[instrument(name = "simulation_start", skip(self))]
    pub async fn start(&mut self, id: ContainerId, kind: TransportKind) -> Result<()> {
        self.containers
            .get_mut(&id)
            .ok_or(OrchestratorError::UnknownContainer(id))?
            .start(kind)
            .await
    }

    /// Start each listed container; failures are returned, not fatal
    pub async fn start_many(
        &mut self,
        ids: &[ContainerId],
        kind: TransportKind,
    ) -> Vec<(ContainerId, Result<()>)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = self.start(id, kind).await;
            if let Err(e) = &result {
                warn!(container_id = id, error = %e, "container failed to start");
            }
            results.push((id, result));
        }
        results
    }

    #[instrument(name = "simulation_stop", skip(self))]
    pub async fn stop(&mut self, id: ContainerId) -> Result<StopOutcome> {
        let orchestrator = self
            .containers
            .get_mut(&id)
            .ok_or(OrchestratorError::UnknownContainer(id))?;
        Ok(orchestrator.stop().await)
    }

    /// Stop every container, one bounded stop after another
    pub async fn stop_all(&mut self) -> Vec<(ContainerId, StopOutcome)> {
        let mut outcomes = Vec::new();
        for (id, orchestrator) in self.containers.iter_mut() {
            let outcome = orchestrator.stop().await;
            if outcome != StopOutcome::AlreadyInactive {
                outcomes.push((*id, outcome));
            }
        }
        info!(stopped = outcomes.len(), "all containers stopped");
        outcomes
    }

    pub fn snapshots(&self) -> Vec<ContainerSnapshot> {
        self.containers
            .values()
            .map(ContainerOrchestrator::snapshot)
            .collect()
    }

    /// Sum of message counts across containers
    pub fn total_messages(&self) -> u64 {
        self.containers
            .values()
            .map(ContainerOrchestrator::message_count)
            .sum()
    }
}
