//! Advanced planning and scheduling engine.
//!
//! A discrete-event simulation builds a finite-capacity schedule from a
//! planning graph of jobs, manufacturing orders, alternate paths,
//! operations and activities. A live scenario is mutated only by versioned
//! transmissions, each applied atomically under a timed reader/writer lock
//! and followed by a re-simulation. A heuristic search controller runs
//! trial simulations on private copies to pick insertions and prunings.
//!
//! # Modules
//!
//! - **`models`**: Planning graph, typed ids, ticks, `Schedule` and `ResourceBlock`
//! - **`capacity`**: Capacity intervals, recurrence expansion, occupancy profiles
//! - **`events`**: Simulation events and the ordered event queue
//! - **`dispatching`**: Ready-queue dispatchers, sequencing rules, move keys
//! - **`simulation`**: The simulation loop, batching, stage hooks and KPIs
//! - **`codec`**: Versioned binary layout `(unique id, version, ordered fields)`
//! - **`scenario`**: Live scenario, transmissions, audit, undo, moves
//! - **`copilot`**: InsertJobs and PruneScenario trial searches
//! - **`validation`**: Input integrity checks raised before any mutation
//! - **`config`**: Engine configuration, loadable from TOML
//! - **`error`**: Error types
//!
//! # Time
//!
//! All times are [`Ticks`](models::Ticks): 100-nanosecond units from the
//! scenario epoch.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Law (2015), "Simulation Modeling and Analysis"

pub mod capacity;
pub mod codec;
pub mod config;
pub mod copilot;
pub mod dispatching;
pub mod error;
pub mod events;
pub mod models;
pub mod scenario;
pub mod simulation;
pub mod validation;

pub use config::EngineConfig;
pub use error::{ApsError, ApsResult};
pub use scenario::{Scenario, ScenarioDetail, Transmission};
pub use simulation::{SimulationMode, Simulator};
