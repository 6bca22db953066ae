//! # ComponentState: the supervisor's single source of truth.
//!
//! Every mutator returns whether the snapshot actually changed, so the
//! supervisor can collapse equal successive snapshots and never emit duplicate
//! observations.
//!
//! ## Rules
//! - [`ComponentState::comp_state`] and [`ComponentState::force_state`] are
//!   the only mutators of the component-level state.
//! - `sync_expected` is idempotent in the expected snapshot; `sync_checkin`
//!   is idempotent given the same observed payload.
//! - Units asked to stop are pruned by [`ComponentState::cleanup_stopped`]
//!   once the managed service confirms them stopped.

use std::collections::{BTreeMap, BTreeSet};

use crate::comms::{CheckinExpected, CheckinObserved, ExpectedUnit};
use crate::component::{Component, UnitKey};
use crate::state::UnitState;

const MSG_STARTING: &str = "Starting";
const MSG_STOPPED: &str = "Stopped";
const MSG_NOT_REPORTED: &str = "Failed: not reported in check-in";

/// Observed state of a single unit, as reported by the managed service.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedUnitState {
    /// Last reported state.
    pub state: UnitState,
    /// Last reported message.
    pub message: String,
    /// Configuration revision the service acknowledged.
    pub config_revision: u64,
}

/// Expected state of a single unit, as asked of the managed service.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedUnitState {
    /// State the unit should reach.
    pub state: UnitState,
    /// Configuration revision, bumped on every config change.
    pub config_revision: u64,
    /// Unit configuration to apply.
    pub config: serde_json::Value,
}

/// Authoritative observed state of a managed component.
///
/// Cloning produces a deep, immutable snapshot suitable for broadcast.
#[derive(Debug, Clone)]
pub struct ComponentState {
    /// Component-level state.
    pub state: UnitState,
    /// Human-readable explanation of the current state.
    pub message: String,
    /// State the supervisor has asked the managed service to reach.
    pub expected_state: UnitState,
    /// Per-unit observed state.
    pub units: BTreeMap<UnitKey, ObservedUnitState>,
    /// Per-unit expected state.
    pub expected_units: BTreeMap<UnitKey, ExpectedUnitState>,
}

impl ComponentState {
    /// Builds the initial state for a component.
    pub fn new(comp: &Component) -> Self {
        let mut state = Self {
            state: UnitState::Starting,
            message: MSG_STARTING.to_string(),
            expected_state: UnitState::Healthy,
            units: BTreeMap::new(),
            expected_units: BTreeMap::new(),
        };
        state.sync_expected(comp);
        state.sync_units(comp);
        state
    }

    /// True while the component has not been asked to stop and is not stopped.
    pub fn is_running(&self) -> bool {
        self.state != UnitState::Stopping && self.state != UnitState::Stopped
    }

    /// Sets the component-level state and message if either differs.
    ///
    /// Returns whether the snapshot changed.
    pub fn comp_state(&mut self, state: UnitState, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.state == state && self.message == message {
            return false;
        }
        self.state = state;
        self.message = message;
        true
    }

    /// Like [`ComponentState::comp_state`], but also overrides every tracked
    /// unit with the forced state, discarding in-flight unit progress.
    pub fn force_state(&mut self, state: UnitState, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut changed = self.comp_state(state, message.clone());
        for unit in self.units.values_mut() {
            if unit.state != state || unit.message != message {
                unit.state = state;
                unit.message = message.clone();
                changed = true;
            }
        }
        changed
    }

    /// Sets the expected component-level state unconditionally.
    pub fn force_expected_state(&mut self, state: UnitState) {
        self.expected_state = state;
    }

    /// Reconciles the expected side with a new component revision.
    ///
    /// Returns true if the expected snapshot materially changed and must be
    /// re-sent to the managed service. Idempotent for an unchanged revision.
    pub fn sync_expected(&mut self, comp: &Component) -> bool {
        let mut changed = false;

        for unit in &comp.units {
            match self.expected_units.get_mut(&unit.key()) {
                Some(expected) => {
                    if expected.config != unit.config {
                        expected.config_revision += 1;
                        expected.config = unit.config.clone();
                        changed = true;
                    }
                    // A unit previously marked for removal is back in the revision.
                    if expected.state == UnitState::Stopped {
                        expected.state = UnitState::Healthy;
                        changed = true;
                    }
                }
                None => {
                    self.expected_units.insert(
                        unit.key(),
                        ExpectedUnitState {
                            state: UnitState::Healthy,
                            config_revision: 1,
                            config: unit.config.clone(),
                        },
                    );
                    changed = true;
                }
            }
        }

        let keys: BTreeSet<UnitKey> = comp.units.iter().map(|unit| unit.key()).collect();
        for (key, expected) in self.expected_units.iter_mut() {
            if !keys.contains(key) && expected.state != UnitState::Stopped {
                expected.state = UnitState::Stopped;
                changed = true;
            }
        }

        changed
    }

    /// Reconciles the observed unit topology with a new component revision.
    ///
    /// Newly expected units appear as `Starting`; removal is deferred to the
    /// managed service confirming `Stopped` (see
    /// [`ComponentState::cleanup_stopped`]). Returns true if the observed
    /// snapshot changed.
    pub fn sync_units(&mut self, comp: &Component) -> bool {
        let mut changed = false;
        for unit in &comp.units {
            self.units.entry(unit.key()).or_insert_with(|| {
                changed = true;
                ObservedUnitState {
                    state: UnitState::Starting,
                    message: MSG_STARTING.to_string(),
                    config_revision: 0,
                }
            });
        }
        changed
    }

    /// Merges a check-in payload into the observed snapshot.
    ///
    /// Tracked units the service failed to report are marked `Failed`, unless
    /// they were asked to stop, in which case they are treated as `Stopped` so
    /// cleanup can prune them. Returns true if the observed snapshot changed.
    pub fn sync_checkin(&mut self, checkin: &CheckinObserved) -> bool {
        let mut changed = false;
        let mut reported: BTreeSet<&UnitKey> = BTreeSet::new();

        for unit in &checkin.units {
            reported.insert(&unit.key);
            match self.units.get_mut(&unit.key) {
                Some(observed) => {
                    if observed.state != unit.state
                        || observed.message != unit.message
                        || observed.config_revision != unit.config_revision
                    {
                        observed.state = unit.state;
                        observed.message = unit.message.clone();
                        observed.config_revision = unit.config_revision;
                        changed = true;
                    }
                }
                None => {
                    self.units.insert(
                        unit.key.clone(),
                        ObservedUnitState {
                            state: unit.state,
                            message: unit.message.clone(),
                            config_revision: unit.config_revision,
                        },
                    );
                    changed = true;
                }
            }
        }

        for (key, observed) in self.units.iter_mut() {
            if reported.contains(key) {
                continue;
            }
            let expected_stopped = self
                .expected_units
                .get(key)
                .map_or(true, |expected| expected.state == UnitState::Stopped);
            if expected_stopped {
                if observed.state != UnitState::Stopped {
                    observed.state = UnitState::Stopped;
                    observed.message = MSG_STOPPED.to_string();
                    changed = true;
                }
            } else if observed.state != UnitState::Failed || observed.message != MSG_NOT_REPORTED {
                observed.state = UnitState::Failed;
                observed.message = MSG_NOT_REPORTED.to_string();
                changed = true;
            }
        }

        changed
    }

    /// True iff any unit's expected and observed states differ.
    pub fn unsettled(&self) -> bool {
        self.expected_units.iter().any(|(key, expected)| {
            self.units
                .get(key)
                .map_or(true, |observed| observed.state != expected.state)
        })
    }

    /// Prunes units that were asked to stop and have reached `Stopped`.
    ///
    /// Returns true iff at least one tracked unit was pruned this call.
    pub fn cleanup_stopped(&mut self) -> bool {
        let mut removed = false;
        let expected_units = &self.expected_units;
        self.units.retain(|key, observed| {
            let prune = observed.state == UnitState::Stopped
                && expected_units
                    .get(key)
                    .map_or(true, |expected| expected.state == UnitState::Stopped);
            if prune {
                removed = true;
            }
            !prune
        });

        let units = &self.units;
        self.expected_units
            .retain(|key, expected| expected.state != UnitState::Stopped || units.contains_key(key));

        removed
    }

    /// Materializes the expected snapshot in the form sent to the service.
    pub fn to_checkin_expected(&self) -> CheckinExpected {
        CheckinExpected {
            state: self.expected_state,
            units: self
                .expected_units
                .iter()
                .map(|(key, expected)| ExpectedUnit {
                    key: key.clone(),
                    state: expected.state,
                    config_revision: expected.config_revision,
                    config: expected.config.clone(),
                })
                .collect(),
        }
    }
}
