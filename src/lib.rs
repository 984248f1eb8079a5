pub mod config;
pub mod docking;
pub mod dynamics;
pub mod error;
mod gnc_mod;
pub mod io;
pub mod sim;
pub mod vehicle;

// The gnc module: expose gnc_mod as `gnc` publicly
pub mod gnc {
    pub use crate::gnc_mod::*;
}

pub use config::FlightConfig;
pub use error::{FlightError, Result};
pub use sim::Simulation;
