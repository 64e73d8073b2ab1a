//! Run-scoped workspace storage.
//!
//! A [`SpectrumStore`] owns one [`RunContext`] per run. Each context holds at
//! most one workspace per [`Phase`], so a workspace is addressed by a
//! structured [`WorkspaceId`] instead of a `"<run>_<name>"` string. The
//! string form only appears when results leave the store (save, display).

use std::collections::BTreeMap;
use std::fmt;

use crate::config::OutputNames;
use crate::error::{Error, Result};
use crate::metadata::RunNumber;
use crate::workspace::Workspace;

/// Processing stage a workspace belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Raw,
    DetectorsGrouped,
    Monitor,
    MonitorNormalised,
    VanadiumNormalised,
    Reduced,
}

impl Phase {
    /// Every phase, in processing order.
    pub const ALL: [Phase; 6] = [
        Phase::Raw,
        Phase::DetectorsGrouped,
        Phase::Monitor,
        Phase::MonitorNormalised,
        Phase::VanadiumNormalised,
        Phase::Reduced,
    ];

    /// Intermediate phases exposed in control mode.
    pub const INTERMEDIATE: [Phase; 5] = [
        Phase::Raw,
        Phase::Monitor,
        Phase::DetectorsGrouped,
        Phase::MonitorNormalised,
        Phase::VanadiumNormalised,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(OutputNames::default().name(*self))
    }
}

/// Address of a workspace inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspaceId {
    pub run: RunNumber,
    pub phase: Phase,
}

impl WorkspaceId {
    #[must_use]
    pub fn new(run: RunNumber, phase: Phase) -> Self {
        Self { run, phase }
    }

    /// `"<run>_<name>"` using the configured output names.
    #[must_use]
    pub fn qualified_name(&self, names: &OutputNames) -> String {
        format!("{}_{}", self.run, names.name(self.phase))
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.run, self.phase)
    }
}

/// Workspaces belonging to one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run: RunNumber,
    slots: BTreeMap<Phase, Workspace>,
}

impl RunContext {
    #[must_use]
    pub fn new(run: RunNumber) -> Self {
        Self {
            run,
            slots: BTreeMap::new(),
        }
    }

    /// Run number of this context.
    #[must_use]
    pub fn run(&self) -> RunNumber {
        self.run
    }

    /// Identifier of a phase in this run.
    #[must_use]
    pub fn id(&self, phase: Phase) -> WorkspaceId {
        WorkspaceId::new(self.run, phase)
    }

    /// Stores a workspace, returning the one it replaces.
    pub fn insert(&mut self, phase: Phase, workspace: Workspace) -> Option<Workspace> {
        self.slots.insert(phase, workspace)
    }

    /// Workspace of a phase.
    ///
    /// # Errors
    /// Returns [`Error::MissingWorkspace`] if the phase is empty.
    pub fn get(&self, phase: Phase) -> Result<&Workspace> {
        self.slots
            .get(&phase)
            .ok_or_else(|| Error::MissingWorkspace(self.id(phase).to_string()))
    }

    /// Deletes and returns the workspace of a phase.
    pub fn remove(&mut self, phase: Phase) -> Option<Workspace> {
        self.slots.remove(&phase)
    }

    #[must_use]
    pub fn contains(&self, phase: Phase) -> bool {
        self.slots.contains_key(&phase)
    }

    /// Phases currently held, in processing order.
    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.slots.keys().copied()
    }
}

/// Named groups captured by [`SpectrumStore::group_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSnapshot(BTreeMap<String, Vec<WorkspaceId>>);

/// Explicit replacement for a global name-keyed workspace registry.
#[derive(Debug, Clone, Default)]
pub struct SpectrumStore {
    runs: BTreeMap<RunNumber, RunContext>,
    groups: BTreeMap<String, Vec<WorkspaceId>>,
}

impl SpectrumStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the context of a new run.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateRun`] if the run is already registered.
    pub fn open_run(&mut self, run: RunNumber) -> Result<&mut RunContext> {
        if self.runs.contains_key(&run) {
            return Err(Error::DuplicateRun(run.to_string()));
        }
        Ok(self.runs.entry(run).or_insert_with(|| RunContext::new(run)))
    }

    /// Context of a registered run.
    pub fn run(&self, run: RunNumber) -> Result<&RunContext> {
        self.runs
            .get(&run)
            .ok_or_else(|| Error::MissingWorkspace(format!("run {run}")))
    }

    /// Mutable context of a registered run.
    pub fn run_mut(&mut self, run: RunNumber) -> Result<&mut RunContext> {
        self.runs
            .get_mut(&run)
            .ok_or_else(|| Error::MissingWorkspace(format!("run {run}")))
    }

    /// Removes a run and every workspace it owns, including group references.
    pub fn close_run(&mut self, run: RunNumber) -> Option<RunContext> {
        for members in self.groups.values_mut() {
            members.retain(|id| id.run != run);
        }
        self.groups.retain(|_, members| !members.is_empty());
        self.runs.remove(&run)
    }

    /// Registered run numbers in ascending order.
    pub fn runs(&self) -> impl Iterator<Item = RunNumber> + '_ {
        self.runs.keys().copied()
    }

    /// Workspace by identifier.
    pub fn get(&self, id: &WorkspaceId) -> Result<&Workspace> {
        self.run(id.run)?.get(id.phase)
    }

    /// Returns true if the identified workspace exists.
    #[must_use]
    pub fn contains(&self, id: &WorkspaceId) -> bool {
        self.runs
            .get(&id.run)
            .is_some_and(|ctx| ctx.contains(id.phase))
    }

    /// Deletes a workspace; deleting an absent workspace is a no-op.
    pub fn delete(&mut self, id: &WorkspaceId) -> Option<Workspace> {
        self.runs.get_mut(&id.run)?.remove(id.phase)
    }

    /// Registers a named group of existing workspaces.
    ///
    /// # Errors
    /// Returns [`Error::MissingWorkspace`] if a member does not exist.
    pub fn group(&mut self, name: impl Into<String>, members: Vec<WorkspaceId>) -> Result<()> {
        if let Some(missing) = members.iter().find(|id| !self.contains(id)) {
            return Err(Error::MissingWorkspace(missing.to_string()));
        }
        let name = name.into();
        if let Some(previous) = self.groups.insert(name.clone(), members) {
            log::debug!("group {name} replaced ({} previous members)", previous.len());
        }
        Ok(())
    }

    /// Captures the named groups so they can be put back with
    /// [`SpectrumStore::restore_groups`].
    #[must_use]
    pub fn group_snapshot(&self) -> GroupSnapshot {
        GroupSnapshot(self.groups.clone())
    }

    /// Restores groups captured earlier. Members whose run has been closed
    /// since are dropped, as are groups left empty.
    pub fn restore_groups(&mut self, snapshot: GroupSnapshot) {
        let mut groups = snapshot.0;
        for members in groups.values_mut() {
            members.retain(|id| self.contains(id));
        }
        groups.retain(|_, members| !members.is_empty());
        self.groups = groups;
    }

    /// Members of a named group.
    #[must_use]
    pub fn group_members(&self, name: &str) -> Option<&[WorkspaceId]> {
        self.groups.get(name).map(Vec::as_slice)
    }
}
