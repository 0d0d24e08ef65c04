//! [`OversetGroup`]: the entry points a host solver drives every step.

use super::pass::{
    AGREE_TAG, BlankingOutcome, PassContext, blanking_pass, donor_pass, gather_boxes,
};
use super::state::ConnectivityState;
use crate::blanking::GridMetrics;
use crate::blanking::classifier::{classify_cells, classify_faces, union_nodes};
use crate::config::OversetConfig;
use crate::donor::callbacks::SolverCallbacks;
use crate::donor::receptors::{collect_fringe_receptors, collect_unblank_receptors};
use crate::donor::record::{DonorRecord, DonorSet, Receptor, ReceptorId};
use crate::exchange::collective::agree;
use crate::exchange::communicator::{CommTag, Communicator};
use crate::exchange::coordinator::{
    DeviceTransport, GRADIENT_TAG, HostTransport, SOLUTION_TAG, UNBLANK_TAG, exchange,
};
use crate::exchange::device::{DeviceCallbacks, DeviceHandles};
use crate::exchange::field::{DataKind, FieldAccess};
use crate::exchange::plan::ExchangePlan;
use crate::geometry::RigidMotion;
use crate::overset_error::OversetError;
use crate::registry::{FaceData, GeometryRegistry, GridData, GridTag};
use crate::search::SpatialIndex;
use crate::topology::iblank::{GridBlanking, IblankStatus};
use std::collections::BTreeMap;

/// Summary of one connectivity pass on this rank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectivityReport {
    pub version: u64,
    pub hole_nodes: usize,
    pub fringe_nodes: usize,
    /// Nodes cut by wall hole maps.
    pub wall_cut: usize,
    /// Nodes cut by overlapping grids.
    pub overlap_cut: usize,
    pub receptors: usize,
    pub resolved: usize,
    /// Previously resolved receptors that kept their old donor.
    pub retained: usize,
    /// Points filled during an unblank pass.
    pub unblanked: usize,
    pub modal_conversions: usize,
    pub unresolved: Vec<(GridTag, ReceptorId)>,
}

impl ConnectivityReport {
    /// One [`OversetError::NoDonorFound`] per unresolved receptor.
    pub fn no_donor_errors(&self) -> impl Iterator<Item = OversetError> + '_ {
        self.unresolved
            .iter()
            .map(|&(grid, receptor)| OversetError::NoDonorFound { grid, receptor })
    }
}

/// Committed connectivity of one version.
#[derive(Clone, Debug, Default)]
struct Active {
    blanking: BTreeMap<GridTag, GridBlanking>,
    donors: DonorSet,
    plan: ExchangePlan,
}

struct Device {
    callbacks: Box<dyn DeviceCallbacks>,
    handles: DeviceHandles,
}

/// All grids of this rank taking part in one overset assembly.
///
/// Every collective method takes the communicator explicitly; all ranks of
/// the group must call the same sequence of collective methods.
pub struct OversetGroup {
    group_id: u32,
    config: OversetConfig,
    state: ConnectivityState,
    registry: GeometryRegistry,
    index: SpatialIndex,
    metrics: BTreeMap<GridTag, GridMetrics>,
    callbacks: Option<Box<dyn SolverCallbacks>>,
    device: Option<Device>,
    active: Option<Active>,
    provisional: Option<BTreeMap<GridTag, GridBlanking>>,
    version: u64,
    last_report: Option<ConnectivityReport>,
}

impl std::fmt::Debug for OversetGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OversetGroup")
            .field("group_id", &self.group_id)
            .field("state", &self.state)
            .field("grids", &self.registry.len())
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl OversetGroup {
    pub fn init(group_id: u32, config: OversetConfig) -> Result<Self, OversetError> {
        config.validate()?;
        log::info!("overset group {group_id}: initialised ({:?} mode)", config.mode);
        Ok(Self {
            group_id,
            index: SpatialIndex::new(config.box_tolerance),
            config,
            state: ConnectivityState::Uninitialized,
            registry: GeometryRegistry::new(),
            metrics: BTreeMap::new(),
            callbacks: None,
            device: None,
            active: None,
            provisional: None,
            version: 0,
            last_report: None,
        })
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), OversetError> {
        if self.state == ConnectivityState::Finalized {
            return Err(OversetError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn invalid(&self, operation: &'static str) -> OversetError {
        OversetError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn drop_derived(&mut self) {
        self.index = SpatialIndex::new(self.config.box_tolerance);
        self.metrics.clear();
        self.active = None;
        self.provisional = None;
        self.last_report = None;
        self.state = ConnectivityState::Registered;
    }

    // ----- registration ---------------------------------------------------

    /// Register or replace a grid. Drops all derived connectivity.
    pub fn register_grid(&mut self, data: GridData) -> Result<GridTag, OversetError> {
        if !self.state.can_register() {
            return Err(self.invalid("register_grid"));
        }
        let tag = self.registry.register_grid(data)?;
        self.drop_derived();
        Ok(tag)
    }

    pub fn register_face_data(&mut self, tag: GridTag, data: FaceData) -> Result<(), OversetError> {
        if !self.state.can_register() {
            return Err(self.invalid("register_face_data"));
        }
        self.registry.register_face_data(tag, data)?;
        self.drop_derived();
        Ok(())
    }

    pub fn register_moving_grid_data(
        &mut self,
        tag: GridTag,
        motion: RigidMotion,
    ) -> Result<(), OversetError> {
        self.ensure_live("register_moving_grid_data")?;
        self.registry.register_moving_grid_data(tag, motion)
    }

    /// Move a grid by its registered rigid motion.
    pub fn apply_rigid_motion(&mut self, tag: GridTag) -> Result<(), OversetError> {
        self.ensure_live("apply_rigid_motion")?;
        self.registry.apply_rigid_motion(tag)
    }

    /// Replace the node coordinates of a deforming grid.
    pub fn update_coordinates(&mut self, tag: GridTag, coords: &[f64]) -> Result<(), OversetError> {
        self.ensure_live("update_coordinates")?;
        self.registry.update_coordinates(tag, coords)
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn SolverCallbacks>) -> Result<(), OversetError> {
        self.ensure_live("set_callbacks")?;
        self.callbacks = Some(callbacks);
        Ok(())
    }

    pub fn set_device(
        &mut self,
        callbacks: Box<dyn DeviceCallbacks>,
        handles: DeviceHandles,
    ) -> Result<(), OversetError> {
        self.ensure_live("set_device")?;
        self.device = Some(Device { callbacks, handles });
        Ok(())
    }

    // ----- connectivity ---------------------------------------------------

    /// Refresh the spatial index and metrics of grids whose geometry changed.
    fn sync_geometry(&mut self) -> Result<(), OversetError> {
        let dirty = self.registry.take_dirty();
        if dirty.is_empty() && self.metrics.len() == self.registry.len() {
            return Ok(());
        }
        self.index.sync(&self.registry, &dirty);
        self.metrics.retain(|tag, _| self.registry.get(*tag).is_ok());
        for grid in self.registry.grids() {
            if dirty.contains(&grid.tag()) || !self.metrics.contains_key(&grid.tag()) {
                self.metrics.insert(grid.tag(), GridMetrics::compute(grid)?);
            }
        }
        Ok(())
    }

    fn context(&self) -> PassContext<'_> {
        PassContext {
            registry: &self.registry,
            index: &self.index,
            metrics: &self.metrics,
            config: &self.config,
            callbacks: self.callbacks.as_deref(),
        }
    }

    /// Build the spatial index and per-grid metrics.
    pub fn preprocess<C: Communicator>(&mut self, comm: &C) -> Result<(), OversetError> {
        if !matches!(
            self.state,
            ConnectivityState::Registered | ConnectivityState::Preprocessed
        ) {
            return Err(self.invalid("preprocess"));
        }
        self.index = SpatialIndex::build(&self.registry, self.config.box_tolerance);
        self.registry.take_dirty();
        let metrics = self
            .registry
            .grids()
            .map(|g| GridMetrics::compute(g).map(|m| (g.tag(), m)))
            .collect::<Result<BTreeMap<_, _>, _>>();
        self.metrics = agree(comm, AGREE_TAG, metrics)?;
        self.state = ConnectivityState::Preprocessed;
        log::info!(
            "overset group {}: preprocessed {} grids on rank {}",
            self.group_id,
            self.registry.len(),
            comm.rank()
        );
        Ok(())
    }

    fn commit(&mut self, rank: usize, blanking: BTreeMap<GridTag, GridBlanking>, mut donors: DonorSet) -> u64 {
        self.version += 1;
        donors.version = self.version;
        donors.sort_records();
        let plan = ExchangePlan::build(rank, &donors);
        self.active = Some(Active {
            blanking,
            donors,
            plan,
        });
        self.version
    }

    fn report(
        &self,
        blanking: &BTreeMap<GridTag, GridBlanking>,
        donors: &DonorSet,
    ) -> ConnectivityReport {
        let count = |status: IblankStatus| -> usize {
            blanking
                .values()
                .map(|b| GridBlanking::count(&b.nodes, status))
                .sum()
        };
        ConnectivityReport {
            hole_nodes: count(IblankStatus::Hole),
            fringe_nodes: count(IblankStatus::Fringe),
            receptors: donors.receptors.len(),
            resolved: donors.resolved_count(),
            ..ConnectivityReport::default()
        }
    }

    fn keep_report(&mut self, report: &ConnectivityReport) {
        for err in report.no_donor_errors() {
            log::debug!("overset group {}: {err}", self.group_id);
        }
        self.last_report = Some(report.clone());
    }

    /// Blank every grid, find donors for all receptors and commit a new
    /// version. On error the previous version stays active.
    pub fn perform_full_connectivity<C: Communicator>(
        &mut self,
        comm: &C,
    ) -> Result<ConnectivityReport, OversetError> {
        if !self.state.can_connect() {
            return Err(self.invalid("perform_full_connectivity"));
        }
        let synced = self.sync_geometry();
        agree(comm, AGREE_TAG, synced)?;

        let ctx = self.context();
        let boxes = gather_boxes(&ctx, comm)?;
        let BlankingOutcome {
            blanking,
            wall_cut,
            overlap_cut,
        } = blanking_pass(&ctx, comm, &boxes)?;
        let receptors = collect_fringe_receptors(&self.registry, &blanking, self.config.mode, ctx.callbacks);
        let receptors = agree(comm, AGREE_TAG, receptors)?;
        let outcome = donor_pass(&ctx, comm, &boxes, &blanking, receptors, None)?;

        let mut report = self.report(&blanking, &outcome.set);
        report.wall_cut = wall_cut;
        report.overlap_cut = overlap_cut;
        report.modal_conversions = outcome.modal_conversions;
        report.unresolved = outcome.unresolved;
        report.version = self.commit(comm.rank(), blanking, outcome.set);
        self.state = ConnectivityState::Connected;
        log::info!(
            "overset group {}: v{} rank {}: {} hole, {} fringe, {}/{} receptors resolved",
            self.group_id,
            report.version,
            comm.rank(),
            report.hole_nodes,
            report.fringe_nodes,
            report.resolved,
            report.receptors
        );
        self.keep_report(&report);
        Ok(report)
    }

    /// Re-run the donor search for the current blanking, e.g. after the
    /// solver moved its receptor points. Receptors that lose their donor keep
    /// the previous record.
    pub fn perform_point_connectivity<C: Communicator>(
        &mut self,
        comm: &C,
    ) -> Result<ConnectivityReport, OversetError> {
        if self.state != ConnectivityState::Connected {
            return Err(self.invalid("perform_point_connectivity"));
        }
        let synced = self.sync_geometry();
        agree(comm, AGREE_TAG, synced)?;
        let Some(active) = self.active.as_ref() else {
            return Err(self.invalid("perform_point_connectivity"));
        };

        let ctx = self.context();
        let boxes = gather_boxes(&ctx, comm)?;
        let receptors =
            collect_fringe_receptors(&self.registry, &active.blanking, self.config.mode, ctx.callbacks);
        let receptors = agree(comm, AGREE_TAG, receptors)?;
        let outcome = donor_pass(&ctx, comm, &boxes, &active.blanking, receptors, Some(&active.donors))?;

        let blanking = active.blanking.clone();
        let mut report = self.report(&blanking, &outcome.set);
        report.retained = outcome.retained;
        report.modal_conversions = outcome.modal_conversions;
        report.unresolved = outcome.unresolved;
        report.version = self.commit(comm.rank(), blanking, outcome.set);
        log::info!(
            "overset group {}: point connectivity v{} ({} retained)",
            self.group_id,
            report.version,
            report.retained
        );
        self.keep_report(&report);
        Ok(report)
    }

    /// First half of the moving-grid protocol: blank the grids at their
    /// registered (new) position without touching the active donors.
    pub fn unblank_part1<C: Communicator>(&mut self, comm: &C) -> Result<(), OversetError> {
        if !matches!(
            self.state,
            ConnectivityState::Connected | ConnectivityState::UnblankingPart1
        ) {
            return Err(self.invalid("unblank_part1"));
        }
        let synced = self.sync_geometry();
        agree(comm, AGREE_TAG, synced)?;
        let ctx = self.context();
        let boxes = gather_boxes(&ctx, comm)?;
        let outcome = blanking_pass(&ctx, comm, &boxes)?;
        log::debug!(
            "overset group {}: provisional blanking with {} cut nodes",
            self.group_id,
            outcome.wall_cut + outcome.overlap_cut
        );
        self.provisional = Some(outcome.blanking);
        self.state = ConnectivityState::UnblankingPart1;
        Ok(())
    }

    /// Second half of the moving-grid protocol.
    ///
    /// Blanks at the current position, keeps a node a hole only if it is a
    /// hole in both blankings, fills `nfields` solution values into points
    /// that stop being holes, then rebuilds the donors. Receptors that were
    /// resolved before and find no donor now keep their old record. The new
    /// version replaces the old one only after all of this succeeded.
    pub fn unblank_part2<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<ConnectivityReport, OversetError> {
        if self.state != ConnectivityState::UnblankingPart1 {
            return Err(self.invalid("unblank_part2"));
        }
        self.state = ConnectivityState::UnblankingPart2;
        let result = self.run_unblank_part2(comm, fields, nfields);
        self.state = if result.is_ok() {
            self.provisional = None;
            ConnectivityState::Connected
        } else {
            ConnectivityState::UnblankingPart1
        };
        result
    }

    fn run_unblank_part2<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<ConnectivityReport, OversetError> {
        let synced = self.sync_geometry();
        agree(comm, AGREE_TAG, synced)?;
        let (Some(provisional), Some(active)) = (self.provisional.as_ref(), self.active.as_ref())
        else {
            return Err(self.invalid("unblank_part2"));
        };

        let ctx = self.context();
        let boxes = gather_boxes(&ctx, comm)?;
        let current = blanking_pass(&ctx, comm, &boxes)?.blanking;

        let mut union = BTreeMap::new();
        for grid in self.registry.grids() {
            let tag = grid.tag();
            let (Some(cur), Some(prov)) = (current.get(&tag), provisional.get(&tag)) else {
                continue;
            };
            let nodes = union_nodes(&cur.nodes, &prov.nodes);
            let cells = classify_cells(grid, &nodes);
            let faces = classify_faces(grid, &nodes, &cells);
            union.insert(tag, GridBlanking { nodes, cells, faces });
        }

        // Fill points that stop being holes from the other grids.
        let unblank = collect_unblank_receptors(
            &self.registry,
            &current,
            provisional,
            self.config.mode,
            ctx.callbacks,
        );
        let unblank = agree(comm, AGREE_TAG, unblank)?;
        let fill = donor_pass(&ctx, comm, &boxes, &union, unblank, None)?;
        let fill_set = DonorSet {
            version: self.version,
            ..fill.set
        };
        let fill_plan = ExchangePlan::build(comm.rank(), &fill_set);
        let filled = match self.device.as_mut() {
            Some(dev) => {
                let mut transport =
                    DeviceTransport::new(fields, dev.callbacks.as_mut(), dev.handles, true);
                exchange(comm, UNBLANK_TAG, &fill_set, &fill_plan, DataKind::Solution, nfields, &mut transport)
            }
            None => {
                let mut transport = HostTransport { fields };
                exchange(comm, UNBLANK_TAG, &fill_set, &fill_plan, DataKind::Solution, nfields, &mut transport)
            }
        };
        let filled = agree(comm, AGREE_TAG, filled)?;

        let ctx = self.context();
        let receptors = collect_fringe_receptors(&self.registry, &union, self.config.mode, ctx.callbacks);
        let receptors = agree(comm, AGREE_TAG, receptors)?;
        let outcome = donor_pass(&ctx, comm, &boxes, &union, receptors, Some(&active.donors))?;

        let mut report = self.report(&union, &outcome.set);
        report.retained = outcome.retained;
        report.unblanked = filled;
        report.modal_conversions = fill.modal_conversions + outcome.modal_conversions;
        report.unresolved = outcome.unresolved;
        report.version = self.commit(comm.rank(), union, outcome.set);
        log::info!(
            "overset group {}: unblank v{} filled {filled} points, retained {}",
            self.group_id,
            report.version,
            report.retained
        );
        self.keep_report(&report);
        Ok(report)
    }

    // ----- exchange -------------------------------------------------------

    fn run_exchange<C: Communicator>(
        &mut self,
        comm: &C,
        operation: &'static str,
        kind: DataKind,
        nfields: usize,
        fields: &mut dyn FieldAccess,
        on_device: bool,
    ) -> Result<usize, OversetError> {
        self.ensure_live(operation)?;
        if !self.state.can_exchange() {
            return Err(OversetError::NotConnected {
                operation,
                state: self.state,
            });
        }
        let Some(active) = self.active.as_ref() else {
            return Err(OversetError::NotConnected {
                operation,
                state: self.state,
            });
        };
        let tag: CommTag = match kind {
            DataKind::Solution => SOLUTION_TAG,
            DataKind::Gradient => GRADIENT_TAG,
        };
        let resume = self.state;
        self.state = ConnectivityState::Exchanging;
        let result = if on_device {
            match self.device.as_mut() {
                Some(dev) => {
                    let mut transport =
                        DeviceTransport::new(fields, dev.callbacks.as_mut(), dev.handles, false);
                    exchange(comm, tag, &active.donors, &active.plan, kind, nfields, &mut transport)
                }
                None => Err(OversetError::MissingCallbacks("device exchange")),
            }
        } else {
            let mut transport = HostTransport { fields };
            exchange(comm, tag, &active.donors, &active.plan, kind, nfields, &mut transport)
        };
        self.state = resume;
        result
    }

    /// Interpolate `nfields` solution values into every resolved receptor.
    /// Returns the number of receptors filled on this rank.
    pub fn exchange_solution<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<usize, OversetError> {
        self.run_exchange(comm, "exchange_solution", DataKind::Solution, nfields, fields, false)
    }

    /// Interpolate `3 * nfields` gradient values into every resolved receptor.
    pub fn exchange_gradient<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<usize, OversetError> {
        self.run_exchange(comm, "exchange_gradient", DataKind::Gradient, nfields, fields, false)
    }

    pub fn exchange_solution_device<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<usize, OversetError> {
        self.run_exchange(comm, "exchange_solution_device", DataKind::Solution, nfields, fields, true)
    }

    pub fn exchange_gradient_device<C: Communicator>(
        &mut self,
        comm: &C,
        fields: &mut dyn FieldAccess,
        nfields: usize,
    ) -> Result<usize, OversetError> {
        self.run_exchange(comm, "exchange_gradient_device", DataKind::Gradient, nfields, fields, true)
    }

    /// Release all state. Every later call fails with `InvalidState`.
    pub fn finish(&mut self) -> Result<(), OversetError> {
        self.ensure_live("finish")?;
        self.registry.clear();
        self.index = SpatialIndex::new(self.config.box_tolerance);
        self.metrics.clear();
        self.callbacks = None;
        self.device = None;
        self.active = None;
        self.provisional = None;
        self.state = ConnectivityState::Finalized;
        log::info!("overset group {}: finished", self.group_id);
        Ok(())
    }

    // ----- queries --------------------------------------------------------

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Version of the active donor set; `0` before the first pass.
    pub fn version(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.donors.version)
    }

    pub fn config(&self) -> &OversetConfig {
        &self.config
    }

    pub fn registry(&self) -> &GeometryRegistry {
        &self.registry
    }

    pub fn last_report(&self) -> Option<&ConnectivityReport> {
        self.last_report.as_ref()
    }

    fn blanking(&self, operation: &'static str, tag: GridTag) -> Result<&GridBlanking, OversetError> {
        self.ensure_live(operation)?;
        self.registry.get(tag)?;
        self.active
            .as_ref()
            .and_then(|a| a.blanking.get(&tag))
            .ok_or(OversetError::NotConnected {
                operation,
                state: self.state,
            })
    }

    pub fn node_iblank(&self, tag: GridTag) -> Result<Vec<i32>, OversetError> {
        Ok(self.blanking("node_iblank", tag)?.node_codes())
    }

    pub fn cell_iblank(&self, tag: GridTag) -> Result<Vec<i32>, OversetError> {
        Ok(self.blanking("cell_iblank", tag)?.cell_codes())
    }

    pub fn face_iblank(&self, tag: GridTag) -> Result<Vec<i32>, OversetError> {
        Ok(self.blanking("face_iblank", tag)?.face_codes())
    }

    /// Typed node status of the active version.
    pub fn node_status(&self, tag: GridTag) -> Result<&[IblankStatus], OversetError> {
        Ok(&self.blanking("node_status", tag)?.nodes)
    }

    /// Records for which this rank is the donor.
    pub fn donor_records(&self) -> &[DonorRecord] {
        self.active.as_ref().map_or(&[], |a| &a.donors.records)
    }

    /// Receptors owned by this rank.
    pub fn receptors(&self) -> &[Receptor] {
        self.active.as_ref().map_or(&[], |a| &a.donors.receptors)
    }

    pub fn unresolved(&self) -> Vec<&Receptor> {
        self.active
            .as_ref()
            .map(|a| a.donors.unresolved().collect())
            .unwrap_or_default()
    }

    pub fn exchange_plan(&self) -> Option<&ExchangePlan> {
        self.active.as_ref().map(|a| &a.plan)
    }
}
