//! Per-grid facade for host solvers.
//!
//! A [`GridAdapter`] owns one [`OversetGroup`] holding the single grid its
//! rank contributes, plus the communicator, and exposes the step-level calls
//! a solver driver makes: initialise, register data, connect, exchange,
//! finish.

use crate::config::OversetConfig;
use crate::connectivity::{ConnectivityReport, OversetGroup};
use crate::donor::callbacks::SolverCallbacks;
use crate::exchange::communicator::Communicator;
use crate::exchange::device::{DeviceCallbacks, DeviceHandles};
use crate::exchange::field::FieldAccess;
use crate::geometry::RigidMotion;
use crate::overset_error::OversetError;
use crate::registry::{FaceData, GridData, GridTag};
use serde::{Deserialize, Deserializer, Serialize};

fn default_ref_length() -> f64 {
    1.0
}

/// Accepts `true`/`false` as well as the `0`/`1` integers solver input
/// decks use.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// Simulation properties the adapter needs from the solver's input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterProperties {
    pub ndims: usize,
    pub nfields: usize,
    #[serde(rename = "moving-grid", default, deserialize_with = "flag")]
    pub moving_grid: bool,
    #[serde(rename = "use-gpu", default, deserialize_with = "flag")]
    pub use_gpu: bool,
    #[serde(rename = "meshRefLength", default = "default_ref_length")]
    pub mesh_ref_length: f64,
}

impl Default for AdapterProperties {
    fn default() -> Self {
        Self {
            ndims: 3,
            nfields: 1,
            moving_grid: false,
            use_gpu: false,
            mesh_ref_length: default_ref_length(),
        }
    }
}

/// One rank's grid in an overset assembly.
pub struct GridAdapter<C: Communicator> {
    grid_id: i32,
    n_grids: usize,
    comm: C,
    group: OversetGroup,
    properties: Option<AdapterProperties>,
    tag: Option<GridTag>,
}

impl<C: Communicator> GridAdapter<C> {
    pub fn new(grid_id: i32, n_grids: usize, comm: C) -> Result<Self, OversetError> {
        Self::with_config(grid_id, n_grids, comm, OversetConfig::default())
    }

    pub fn with_config(
        grid_id: i32,
        n_grids: usize,
        comm: C,
        config: OversetConfig,
    ) -> Result<Self, OversetError> {
        let group_id = u32::try_from(grid_id)
            .map_err(|_| OversetError::InvalidConfig(format!("negative grid id {grid_id}")))?;
        Ok(Self {
            grid_id,
            n_grids,
            comm,
            group: OversetGroup::init(group_id, config)?,
            properties: None,
            tag: None,
        })
    }

    pub fn grid_id(&self) -> i32 {
        self.grid_id
    }

    pub fn n_grids(&self) -> usize {
        self.n_grids
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn group(&self) -> &OversetGroup {
        &self.group
    }

    pub fn properties(&self) -> Option<&AdapterProperties> {
        self.properties.as_ref()
    }

    fn props(&self, operation: &str) -> Result<&AdapterProperties, OversetError> {
        self.properties.as_ref().ok_or_else(|| {
            OversetError::InvalidConfig(format!("`{operation}` called before sif_initialize"))
        })
    }

    /// Store the simulation properties. Only three-dimensional grids are
    /// supported.
    pub fn sif_initialize(&mut self, properties: AdapterProperties) -> Result<(), OversetError> {
        if properties.ndims != 3 {
            return Err(OversetError::InvalidConfig(format!(
                "ndims must be 3, got {}",
                properties.ndims
            )));
        }
        if properties.nfields == 0 {
            return Err(OversetError::InvalidConfig("nfields must be positive".into()));
        }
        if !(properties.mesh_ref_length.is_finite() && properties.mesh_ref_length > 0.0) {
            return Err(OversetError::InvalidConfig(format!(
                "meshRefLength must be positive, got {}",
                properties.mesh_ref_length
            )));
        }
        log::debug!("grid {}: {properties:?}", self.grid_id);
        self.properties = Some(properties);
        Ok(())
    }

    /// Register grid and face data, solver callbacks and, for moving grids,
    /// the rigid motion.
    pub fn init_data(
        &mut self,
        grid: GridData,
        faces: Option<FaceData>,
        callbacks: Option<Box<dyn SolverCallbacks>>,
        motion: Option<RigidMotion>,
    ) -> Result<GridTag, OversetError> {
        let moving = self.props("init_data")?.moving_grid;
        if moving && motion.is_none() {
            return Err(OversetError::InvalidConfig(
                "moving-grid is set but no motion was supplied".into(),
            ));
        }
        let tag = self.group.register_grid(grid)?;
        if let Some(faces) = faces {
            self.group.register_face_data(tag, faces)?;
        }
        if let Some(cb) = callbacks {
            self.group.set_callbacks(cb)?;
        }
        if let Some(m) = motion.filter(|_| moving) {
            self.group.register_moving_grid_data(tag, m)?;
        }
        self.tag = Some(tag);
        Ok(tag)
    }

    /// Attach the device hooks; requires `use-gpu`.
    pub fn init_device(
        &mut self,
        callbacks: Box<dyn DeviceCallbacks>,
        handles: DeviceHandles,
    ) -> Result<(), OversetError> {
        if !self.props("init_device")?.use_gpu {
            return Err(OversetError::InvalidConfig(
                "device hooks supplied but use-gpu is not set".into(),
            ));
        }
        self.group.set_device(callbacks, handles)
    }

    /// Move the grid by its registered rigid motion.
    pub fn move_grid(&mut self) -> Result<(), OversetError> {
        let tag = self.tag.ok_or(OversetError::InvalidConfig("no grid registered".into()))?;
        self.group.apply_rigid_motion(tag)
    }

    pub fn preprocess(&mut self) -> Result<(), OversetError> {
        self.group.preprocess(&self.comm)
    }

    pub fn perform_connectivity(&mut self) -> Result<ConnectivityReport, OversetError> {
        self.group.perform_full_connectivity(&self.comm)
    }

    pub fn perform_point_connectivity(&mut self) -> Result<ConnectivityReport, OversetError> {
        self.group.perform_point_connectivity(&self.comm)
    }

    pub fn unblank_part1(&mut self) -> Result<(), OversetError> {
        self.group.unblank_part1(&self.comm)
    }

    pub fn unblank_part2(
        &mut self,
        fields: &mut dyn FieldAccess,
    ) -> Result<ConnectivityReport, OversetError> {
        let nfields = self.props("unblank_part2")?.nfields;
        self.group.unblank_part2(&self.comm, fields, nfields)
    }

    pub fn exchange_solution(&mut self, fields: &mut dyn FieldAccess) -> Result<usize, OversetError> {
        let p = self.props("exchange_solution")?;
        let (nfields, gpu) = (p.nfields, p.use_gpu);
        if gpu {
            self.group.exchange_solution_device(&self.comm, fields, nfields)
        } else {
            self.group.exchange_solution(&self.comm, fields, nfields)
        }
    }

    pub fn exchange_gradient(&mut self, fields: &mut dyn FieldAccess) -> Result<usize, OversetError> {
        let p = self.props("exchange_gradient")?;
        let (nfields, gpu) = (p.nfields, p.use_gpu);
        if gpu {
            self.group.exchange_gradient_device(&self.comm, fields, nfields)
        } else {
            self.group.exchange_gradient(&self.comm, fields, nfields)
        }
    }

    /// Copy the integer iblank codes of the grid into host arrays. Any of
    /// the arrays may be empty to skip it.
    pub fn write_iblank(
        &self,
        nodes: &mut [i32],
        cells: &mut [i32],
        faces: &mut [i32],
    ) -> Result<(), OversetError> {
        let tag = self.tag.ok_or(OversetError::InvalidConfig("no grid registered".into()))?;
        let pairs = [
            (nodes, self.group.node_iblank(tag)?, "node"),
            (cells, self.group.cell_iblank(tag)?, "cell"),
            (faces, self.group.face_iblank(tag)?, "face"),
        ];
        for (dst, src, what) in pairs {
            if dst.is_empty() {
                continue;
            }
            if dst.len() != src.len() {
                return Err(OversetError::topology(
                    tag,
                    format!("{what} iblank array holds {} entries, grid has {}", dst.len(), src.len()),
                ));
            }
            dst.copy_from_slice(&src);
        }
        Ok(())
    }

    pub fn finish(&mut self, step: u64) -> Result<(), OversetError> {
        log::info!("grid {}: finishing at step {step}", self.grid_id);
        self.group.finish()
    }
}
