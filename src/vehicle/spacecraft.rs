use nalgebra::Vector3;

use crate::dynamics::body::{BodyHandle, MassProperties};
use crate::error::{FlightError, Result};
use super::port::{DockingPort, PortId};
use super::rcs::{thruster_layout, Thruster, THRUSTER_COUNT};

/// Index of a spacecraft within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CraftId(pub usize);

// ---------------------------------------------------------------------------
// Spacecraft definition (box hull with a 24-thruster RCS)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SpacecraftSpec {
    pub name: String,
    pub mass: f64,                  // kg
    pub half_extents: Vector3<f64>, // m
    pub max_thrust: f64,            // N per thruster
}

impl SpacecraftSpec {
    pub fn mass_properties(&self) -> Result<MassProperties> {
        MassProperties::solid_box(self.mass, self.half_extents)
    }

    pub fn validate(&self) -> Result<()> {
        self.mass_properties()?;
        if !(self.max_thrust > 0.0 && self.max_thrust.is_finite()) {
            return Err(FlightError::configuration(format!(
                "{}: max thrust must be positive, got {}",
                self.name, self.max_thrust
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Spacecraft builder
// ---------------------------------------------------------------------------

pub struct SpacecraftBuilder {
    name: String,
    mass: f64,
    half_extents: Vector3<f64>,
    max_thrust: f64,
}

impl SpacecraftBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mass: 1.0,
            half_extents: Vector3::new(0.5, 0.5, 1.0),
            max_thrust: 1.0,
        }
    }

    pub fn mass(mut self, v: f64) -> Self { self.mass = v; self }
    pub fn half_extents(mut self, v: Vector3<f64>) -> Self { self.half_extents = v; self }
    pub fn max_thrust(mut self, v: f64) -> Self { self.max_thrust = v; self }

    pub fn build(self) -> SpacecraftSpec {
        SpacecraftSpec {
            name: self.name,
            mass: self.mass,
            half_extents: self.half_extents,
            max_thrust: self.max_thrust,
        }
    }
}

// ---------------------------------------------------------------------------
// Spawned spacecraft: definition bound to a physics body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Spacecraft {
    pub id: CraftId,
    pub spec: SpacecraftSpec,
    pub body: BodyHandle,
    pub thrusters: [Thruster; THRUSTER_COUNT],
    ports: [DockingPort; 2],
}

impl Spacecraft {
    pub fn new(id: CraftId, spec: SpacecraftSpec, body: BodyHandle) -> Result<Self> {
        spec.validate()?;
        let h = spec.half_extents;
        Ok(Self {
            id,
            thrusters: thruster_layout(&h),
            ports: [DockingPort::new(PortId::Front, &h), DockingPort::new(PortId::Back, &h)],
            spec,
            body,
        })
    }

    pub fn port(&self, id: PortId) -> &DockingPort {
        &self.ports[id.index()]
    }

    pub fn port_mut(&mut self, id: PortId) -> &mut DockingPort {
        &mut self.ports[id.index()]
    }

    pub fn ports(&self) -> &[DockingPort; 2] {
        &self.ports
    }
}

// ---------------------------------------------------------------------------
// Preset spacecraft
// ---------------------------------------------------------------------------

pub mod presets {
    use super::*;

    /// Small crew shuttle: 1 kg box, 1 x 1 x 2 m, 1 N thrusters.
    pub fn shuttle() -> SpacecraftSpec {
        SpacecraftBuilder::new("Shuttle")
            .mass(1.0)
            .half_extents(Vector3::new(0.5, 0.5, 1.0))
            .max_thrust(1.0)
            .build()
    }

    /// Larger, slower station tender.
    pub fn tender() -> SpacecraftSpec {
        SpacecraftBuilder::new("Tender")
            .mass(4.0)
            .half_extents(Vector3::new(1.0, 0.75, 1.5))
            .max_thrust(2.0)
            .build()
    }
}
