//! Fluent builder for constructing a [`Sim`].

use std::collections::{BTreeSet, VecDeque};
use std::num::NonZeroUsize;

use tracing::info;

use meso_conflux::{Conflux, ConfluxDirectory};
use meso_core::{PersonId, SimConfig, WorkerId};
use meso_network::RoadNetwork;
use meso_person::{Person, TripChain};

use crate::incident::IncidentSchedule;
use crate::{ScheduledIncident, Sim, SimError, SimResult, Worker};

/// Fluent builder for [`Sim`].
///
/// # Required inputs
///
/// - [`SimConfig`]: total ticks, seed, tick duration, supply parameters
/// - [`RoadNetwork`]: one conflux is created per node with incoming links
///
/// # Optional inputs (have defaults)
///
/// | Method              | Default                                        |
/// |---------------------|------------------------------------------------|
/// | `.persons(v)`       | nobody                                         |
/// | `.trip_chains(v)`   | nobody                                         |
/// | `.partition(v)`     | contiguous blocks over `config.num_threads` workers |
/// | `.incident(i)`      | no incidents                                   |
///
/// # Example
///
/// ```rust,ignore
/// let chains = load_trip_chains_csv(&trips, &network, &DijkstraPaths)?;
/// let mut sim = SimBuilder::new(config, network)
///     .trip_chains(chains)
///     .build()?;
/// sim.run(&mut NoopObserver)?;
/// ```
pub struct SimBuilder {
    config:    SimConfig,
    network:   RoadNetwork,
    persons:   Vec<Person>,
    chains:    Vec<(PersonId, TripChain)>,
    partition: Option<Vec<WorkerId>>,
    incidents: Vec<ScheduledIncident>,
}

impl SimBuilder {
    pub fn new(config: SimConfig, network: RoadNetwork) -> Self {
        Self {
            config,
            network,
            persons:   Vec::new(),
            chains:    Vec::new(),
            partition: None,
            incidents: Vec::new(),
        }
    }

    /// Supply ready-built persons.
    pub fn persons(mut self, persons: Vec<Person>) -> Self {
        self.persons.extend(persons);
        self
    }

    /// Supply trip chains; each becomes a person with the configured
    /// vehicle length when the simulation is built.
    pub fn trip_chains(mut self, chains: Vec<(PersonId, TripChain)>) -> Self {
        self.chains.extend(chains);
        self
    }

    /// Assign conflux `i` to worker `owners[i]`.  Must cover every conflux.
    pub fn partition(mut self, owners: Vec<WorkerId>) -> Self {
        self.partition = Some(owners);
        self
    }

    pub fn incident(mut self, incident: ScheduledIncident) -> Self {
        self.incidents.push(incident);
        self
    }

    /// Validate inputs, build and partition the confluxes, and return a
    /// ready-to-run [`Sim`].
    pub fn build(self) -> SimResult<Sim> {
        self.config.validate()?;
        let network = self.network;
        let directory = ConfluxDirectory::new(&network);
        if directory.is_empty() {
            return Err(SimError::Config("network has no intersections".into()));
        }

        // ── Validate incidents ────────────────────────────────────────────
        for inc in &self.incidents {
            let reason = if network.get_segment(inc.segment).is_none() {
                Some("unknown segment")
            } else if inc.end <= inc.start {
                Some("ends before it starts")
            } else if !(inc.flow_rate.is_finite() && inc.flow_rate >= 0.0) {
                Some("flow rate must be a non-negative number")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SimError::InvalidIncident { segment: inc.segment, reason: reason.into() });
            }
        }

        // ── Persons ───────────────────────────────────────────────────────
        let vehicle_length = self.config.supply.vehicle_length_m;
        let mut persons = self.persons;
        for (id, chain) in self.chains {
            persons.push(Person::new(id, chain, &network, vehicle_length)?);
        }
        let mut ids = BTreeSet::new();
        for p in &persons {
            if !ids.insert(p.id) {
                return Err(SimError::DuplicatePerson(p.id));
            }
            if directory.starting_conflux(p, &network).is_none() {
                return Err(SimError::NoStartingConflux { person: p.id });
            }
        }
        persons.sort_by(|a, b| a.start_secs().total_cmp(&b.start_secs()).then(a.id.cmp(&b.id)));

        // ── Partition confluxes across workers ────────────────────────────
        let owners = match self.partition {
            Some(owners) => {
                if owners.len() != directory.len() {
                    return Err(SimError::PartitionMismatch { expected: directory.len(), got: owners.len() });
                }
                owners
            }
            None => {
                let workers = self
                    .config
                    .num_threads
                    .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, NonZeroUsize::get));
                block_partition(directory.len(), workers)
            }
        };
        let worker_count = owners.iter().map(|w| w.index() + 1).max().unwrap_or(1);

        let tick_secs = self.config.tick_duration_secs;
        let mut per_worker: Vec<Vec<Conflux>> = (0..worker_count).map(|_| Vec::new()).collect();
        let mut placement = Vec::with_capacity(directory.len());
        for (id, &owner) in directory.ids().zip(&owners) {
            let conflux = Conflux::new(
                id,
                directory.node_of(id),
                &network,
                &self.config.supply,
                tick_secs,
                self.config.seed,
            );
            let slots = &mut per_worker[owner.index()];
            placement.push((owner, slots.len()));
            slots.push(conflux);
        }
        let workers: Vec<Worker> = per_worker
            .into_iter()
            .enumerate()
            .map(|(i, confluxes)| Worker::new(WorkerId(i as u16), confluxes))
            .collect();

        info!(
            confluxes = directory.len(),
            workers = workers.len(),
            persons = persons.len(),
            incidents = self.incidents.len(),
            "simulation built"
        );

        Ok(Sim {
            clock: self.config.make_clock(),
            config: self.config,
            network,
            directory,
            workers,
            placement,
            pending: VecDeque::from(persons),
            incidents: IncidentSchedule::new(&self.incidents),
            completed: 0,
        })
    }
}

/// Split `confluxes` into `workers` contiguous blocks of near-equal size.
/// Never creates more workers than confluxes.
pub fn block_partition(confluxes: usize, workers: usize) -> Vec<WorkerId> {
    let workers = workers.clamp(1, confluxes.max(1));
    (0..confluxes).map(|i| WorkerId((i * workers / confluxes.max(1)) as u16)).collect()
}
