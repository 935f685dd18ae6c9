/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-task operating-mode menus and derived resource requirements.
//!
//! A [`TaskDescriptor`] owns one task's menu of [`Mode`]s and everything the
//! optimizer derives from it:
//!
//! ```text
//! raw menu (work/span/period per mode)
//!         │ TaskDescriptor::new
//!         ▼
//! per-mode scalars (cpus, sms, utilization)  +  per-task aggregates
//!         │ scheduler::table
//!         ▼
//! mode-table rows consumed by the knapsack optimizer
//! ```
//!
//! # Ownership model
//! Descriptors are immutable after construction except for the current-mode
//! state, the changeable flag, and the reallocation bookkeeping. The mode
//! table copies the scalars it needs, so a descriptor is never borrowed
//! across an optimizer run.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::timespec::Timespec;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Which side of a mode a numeric failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Gpu,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Cpu => write!(f, "CPU"),
            ResourceKind::Gpu => write!(f, "GPU"),
        }
    }
}

/// Construction-time and mutation-time failures of a task descriptor.
///
/// Construction failures are fatal to the surrounding application (a partial
/// task set is never acceptable); [`TaskError::InvalidMode`] is the one
/// recoverable variant and is logged and ignored by the scheduler context.
#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    /// The menu exceeds the configured per-task mode cap.
    #[error("no task can have more than {max} modes (got {count})")]
    TooManyModes { count: usize, max: usize },

    /// The menu is empty.
    #[error("a task needs at least one operating mode")]
    NoModes,

    /// CPU and GPU menus must pair up one-to-one.
    #[error("CPU menu has {cpu} modes but GPU menu has {gpu}")]
    MismatchedMenus { cpu: usize, gpu: usize },

    /// Elasticity is the loss-weight denominator and must be positive.
    #[error("elasticity must be positive and finite (got {value})")]
    InvalidElasticity { value: f64 },

    /// `period ≤ span` leaves Graham's bound with a nonpositive denominator;
    /// no finite processor count can meet the deadline.
    #[error("{resource} side of mode {mode} is degenerate: period does not exceed span")]
    DegenerateMode { mode: usize, resource: ResourceKind },

    /// A caller asked for a mode index outside the menu.
    #[error("task {task} was told to go to invalid mode {mode} (menu has {num_modes})")]
    InvalidMode {
        task: usize,
        mode: usize,
        num_modes: usize,
    },
}

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Raw timing triple for one side (CPU or GPU) of one mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeTiming {
    /// Total computation across the DAG.
    pub work: Timespec,
    /// Critical-path length; minimum runtime on infinite resources.
    pub span: Timespec,
    /// Deadline / reactivation interval.
    pub period: Timespec,
}

impl ModeTiming {
    pub fn new(work: Timespec, span: Timespec, period: Timespec) -> Self {
        ModeTiming { work, span, period }
    }
}

/// One discrete operating point of a task, with its derived scalars.
#[derive(Debug, Clone, Copy)]
pub struct Mode {
    pub cpu: ModeTiming,
    pub gpu: ModeTiming,

    /// Graham's bound on cores: `⌈(work − span) / (period − span)⌉`, clamped
    /// to at least one (something has to run the task).
    pub cpus: u32,

    /// Graham's bound on SM partitions, same formula over the GPU triple.
    /// Zero is legal: a task may not touch the GPU at all in a given mode.
    pub sms: u32,

    /// `max(cpu_work/cpu_period, gpu_work/gpu_period)`.
    pub utilization: f64,
}

// ── TaskDescriptor ────────────────────────────────────────────────────────────

/// One task's menu plus the mutable state the control loop updates between
/// optimizer invocations.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    index: usize,
    elasticity: f64,
    modes: Vec<Mode>,

    // Aggregates over the menu, fixed at construction.
    max_utilization: f64,
    max_cpus: u32,
    min_cpus: u32,
    max_gpus: u32,
    min_gpus: u32,
    max_work: Timespec,

    // Current-mode state, rewritten by set_current_mode.
    changeable: bool,
    current_mode: usize,
    current_work: Timespec,
    current_span: Timespec,
    current_period: Timespec,
    current_utilization: f64,
    current_cpus: u32,
    current_gpus: u32,
    percentage_workload: f64,

    // Reallocation-layer bookkeeping. The optimizer never reads these; they
    // are carried for the resource-handoff pass between control windows.
    previous_cpus: u32,
    previous_gpus: u32,
    cpus_gained: i32,
    gpus_gained: i32,
    num_adaptations: u32,
    give_cpu: BTreeMap<usize, i32>,
    give_gpu: BTreeMap<usize, i32>,
    transfer_cpu: BTreeSet<(usize, u32)>,
    receive_cpu: BTreeSet<(usize, u32)>,
    transfer_gpu: BTreeSet<(usize, u32)>,
    receive_gpu: BTreeSet<(usize, u32)>,

    // Granted SM partitions, as a bitmask over partition indices.
    sm_mask: u128,
    granted_sms: u32,
}

/// Build an SM-partition bitmask from a list of partition indices.
///
/// Indices ≥ 128 are outside any partition set we can represent and are
/// skipped.
pub fn partition_mask(indices: &[u32]) -> u128 {
    indices
        .iter()
        .filter(|&&i| i < 128)
        .fold(0u128, |mask, &i| mask | (1u128 << i))
}

impl TaskDescriptor {
    /// Derive a descriptor from parallel CPU and GPU menus.
    ///
    /// For each mode `j`:
    /// * `cpus[j] = max(1, ⌈(work − span) / (period − span)⌉)` — the
    ///   numerator saturates at zero, so `work ≤ span` yields one core.
    /// * `sms[j]` is the same bound over the GPU triple, without the clamp.
    /// * `utilization[j] = max(cpu_work/cpu_period, gpu_work/gpu_period)`.
    ///
    /// # Errors
    /// * [`TaskError::NoModes`] / [`TaskError::TooManyModes`] /
    ///   [`TaskError::MismatchedMenus`] on a malformed menu.
    /// * [`TaskError::InvalidElasticity`] unless `elasticity` is positive and
    ///   finite.
    /// * [`TaskError::DegenerateMode`] when any side of any mode has
    ///   `period ≤ span`. Rejection happens here, at construction, so a
    ///   degenerate mode can never reach the optimizer.
    pub fn new(
        index: usize,
        elasticity: f64,
        cpu_menu: &[ModeTiming],
        gpu_menu: &[ModeTiming],
        max_modes: usize,
    ) -> Result<Self, TaskError> {
        if !(elasticity.is_finite() && elasticity > 0.0) {
            return Err(TaskError::InvalidElasticity { value: elasticity });
        }
        if cpu_menu.len() != gpu_menu.len() {
            return Err(TaskError::MismatchedMenus {
                cpu: cpu_menu.len(),
                gpu: gpu_menu.len(),
            });
        }
        if cpu_menu.is_empty() {
            return Err(TaskError::NoModes);
        }
        if cpu_menu.len() > max_modes {
            return Err(TaskError::TooManyModes {
                count: cpu_menu.len(),
                max: max_modes,
            });
        }

        let mut modes = Vec::with_capacity(cpu_menu.len());
        for (j, (cpu, gpu)) in cpu_menu.iter().zip(gpu_menu).enumerate() {
            modes.push(Self::derive_mode(index, j, *cpu, *gpu)?);
        }

        let max_utilization = modes.iter().map(|m| m.utilization).fold(0.0, f64::max);
        let max_cpus = modes.iter().map(|m| m.cpus).max().unwrap_or(0);
        let min_cpus = modes.iter().map(|m| m.cpus).min().unwrap_or(0);
        let max_gpus = modes.iter().map(|m| m.sms).max().unwrap_or(0);
        let min_gpus = modes.iter().map(|m| m.sms).min().unwrap_or(0);
        let max_work = modes
            .iter()
            .map(|m| m.cpu.work)
            .max()
            .unwrap_or(Timespec::ZERO);

        Ok(TaskDescriptor {
            index,
            elasticity,
            modes,
            max_utilization,
            max_cpus,
            min_cpus,
            max_gpus,
            min_gpus,
            max_work,
            changeable: true,
            current_mode: 0,
            current_work: Timespec::ZERO,
            current_span: Timespec::ZERO,
            current_period: Timespec::ZERO,
            current_utilization: 0.0,
            current_cpus: min_cpus,
            current_gpus: min_gpus,
            percentage_workload: 1.0,
            previous_cpus: 0,
            previous_gpus: 0,
            cpus_gained: 0,
            gpus_gained: 0,
            num_adaptations: 0,
            give_cpu: BTreeMap::new(),
            give_gpu: BTreeMap::new(),
            transfer_cpu: BTreeSet::new(),
            receive_cpu: BTreeSet::new(),
            transfer_gpu: BTreeSet::new(),
            receive_gpu: BTreeSet::new(),
            sm_mask: 0,
            granted_sms: 0,
        })
    }

    fn derive_mode(
        task: usize,
        mode: usize,
        cpu: ModeTiming,
        gpu: ModeTiming,
    ) -> Result<Mode, TaskError> {
        if cpu.period <= cpu.span {
            return Err(TaskError::DegenerateMode {
                mode,
                resource: ResourceKind::Cpu,
            });
        }
        if gpu.period <= gpu.span {
            return Err(TaskError::DegenerateMode {
                mode,
                resource: ResourceKind::Gpu,
            });
        }

        // period > span ≥ 0 on both sides, so every divisor below is nonzero.
        let cpus = cpu
            .work
            .saturating_sub(cpu.span)
            .ceil_ratio(cpu.period.saturating_sub(cpu.span))
            .expect("period > span")
            .max(1)
            .min(u64::from(u32::MAX)) as u32;
        let sms = gpu
            .work
            .saturating_sub(gpu.span)
            .ceil_ratio(gpu.period.saturating_sub(gpu.span))
            .expect("period > span")
            .min(u64::from(u32::MAX)) as u32;

        let cpu_util = cpu.work.ratio(cpu.period).expect("period > span");
        let gpu_util = gpu.work.ratio(gpu.period).expect("period > span");
        let utilization = cpu_util.max(gpu_util);

        debug!(task, mode, cpus, sms, utilization, "derived mode resources");

        Ok(Mode {
            cpu,
            gpu,
            cpus,
            sms,
            utilization,
        })
    }

    // ── Menu access ───────────────────────────────────────────────────────────

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    pub fn num_modes(&self) -> usize {
        self.modes.len()
    }

    pub fn mode(&self, j: usize) -> &Mode {
        &self.modes[j]
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    // ── Aggregates ────────────────────────────────────────────────────────────

    pub fn max_utilization(&self) -> f64 {
        self.max_utilization
    }

    pub fn max_cpus(&self) -> u32 {
        self.max_cpus
    }

    pub fn min_cpus(&self) -> u32 {
        self.min_cpus
    }

    pub fn max_gpus(&self) -> u32 {
        self.max_gpus
    }

    pub fn min_gpus(&self) -> u32 {
        self.min_gpus
    }

    /// Largest CPU work across the menu; denominator of
    /// [`percentage_workload`](Self::percentage_workload).
    pub fn max_work(&self) -> Timespec {
        self.max_work
    }

    // ── Current-mode state ────────────────────────────────────────────────────

    pub fn changeable(&self) -> bool {
        self.changeable
    }

    pub fn current_mode(&self) -> usize {
        self.current_mode
    }

    pub fn current_work(&self) -> Timespec {
        self.current_work
    }

    pub fn current_span(&self) -> Timespec {
        self.current_span
    }

    pub fn current_period(&self) -> Timespec {
        self.current_period
    }

    pub fn current_utilization(&self) -> f64 {
        self.current_utilization
    }

    pub fn current_cpus(&self) -> u32 {
        self.current_cpus
    }

    pub fn current_gpus(&self) -> u32 {
        self.current_gpus
    }

    /// `current_work / max_work`; 1.0 while no mode has been applied or when
    /// the whole menu carries zero CPU work.
    pub fn percentage_workload(&self) -> f64 {
        self.percentage_workload
    }

    /// Switch to mode `new_mode` and refresh every dependent scalar.
    ///
    /// `disable = true` freezes the task: the next optimizer pass must keep
    /// it at this mode. `disable = false` (re-)marks it changeable.
    ///
    /// # Errors
    /// [`TaskError::InvalidMode`] when `new_mode` is outside the menu; the
    /// descriptor state is untouched in that case.
    pub fn set_current_mode(&mut self, new_mode: usize, disable: bool) -> Result<(), TaskError> {
        if new_mode >= self.modes.len() {
            return Err(TaskError::InvalidMode {
                task: self.index,
                mode: new_mode,
                num_modes: self.modes.len(),
            });
        }

        let mode = self.modes[new_mode];
        self.current_mode = new_mode;
        self.current_work = mode.cpu.work;
        self.current_span = mode.cpu.span;
        self.current_period = mode.cpu.period;
        self.current_utilization = mode.cpu.work.ratio(mode.cpu.period).expect("period > span");
        self.percentage_workload = if self.max_work.is_zero() {
            1.0
        } else {
            mode.cpu.work.ratio(self.max_work).expect("max_work > 0")
        };
        self.previous_cpus = self.current_cpus;
        self.current_cpus = mode.cpus;
        self.previous_gpus = self.current_gpus;
        self.current_gpus = mode.sms;
        self.changeable = !disable;
        Ok(())
    }

    /// Unfreeze unconditionally; the next optimizer pass may move the task.
    pub fn reset_changeable(&mut self) {
        self.changeable = true;
    }

    // ── Reallocation bookkeeping ──────────────────────────────────────────────

    pub fn previous_cpus(&self) -> u32 {
        self.previous_cpus
    }

    pub fn set_previous_cpus(&mut self, previous: u32) {
        self.previous_cpus = previous;
    }

    pub fn previous_gpus(&self) -> u32 {
        self.previous_gpus
    }

    pub fn set_previous_gpus(&mut self, previous: u32) {
        self.previous_gpus = previous;
    }

    pub fn cpus_gained(&self) -> i32 {
        self.cpus_gained
    }

    pub fn set_cpus_gained(&mut self, gained: i32) {
        self.cpus_gained = gained;
    }

    pub fn gpus_gained(&self) -> i32 {
        self.gpus_gained
    }

    pub fn set_gpus_gained(&mut self, gained: i32) {
        self.gpus_gained = gained;
    }

    pub fn num_adaptations(&self) -> u32 {
        self.num_adaptations
    }

    pub fn set_num_adaptations(&mut self, n: u32) {
        self.num_adaptations = n;
    }

    /// How many CPUs this task owes to `peer` (zero when no handoff pends).
    pub fn gives_cpus(&self, peer: usize) -> i32 {
        self.give_cpu.get(&peer).copied().unwrap_or(0)
    }

    pub fn update_give_cpus(&mut self, peer: usize, value: i32) {
        if value == 0 {
            self.give_cpu.remove(&peer);
        } else {
            self.give_cpu.insert(peer, value);
        }
    }

    pub fn gives_gpus(&self, peer: usize) -> i32 {
        self.give_gpu.get(&peer).copied().unwrap_or(0)
    }

    pub fn update_give_gpus(&mut self, peer: usize, value: i32) {
        if value == 0 {
            self.give_gpu.remove(&peer);
        } else {
            self.give_gpu.insert(peer, value);
        }
    }

    pub fn transfers_cpu(&self, peer: usize, cpu: u32) -> bool {
        self.transfer_cpu.contains(&(peer, cpu))
    }

    pub fn set_transfer_cpu(&mut self, peer: usize, cpu: u32, value: bool) {
        if value {
            self.transfer_cpu.insert((peer, cpu));
        } else {
            self.transfer_cpu.remove(&(peer, cpu));
        }
    }

    pub fn receives_cpu(&self, peer: usize, cpu: u32) -> bool {
        self.receive_cpu.contains(&(peer, cpu))
    }

    pub fn set_receive_cpu(&mut self, peer: usize, cpu: u32, value: bool) {
        if value {
            self.receive_cpu.insert((peer, cpu));
        } else {
            self.receive_cpu.remove(&(peer, cpu));
        }
    }

    pub fn transfers_gpu(&self, peer: usize, sm: u32) -> bool {
        self.transfer_gpu.contains(&(peer, sm))
    }

    pub fn set_transfer_gpu(&mut self, peer: usize, sm: u32, value: bool) {
        if value {
            self.transfer_gpu.insert((peer, sm));
        } else {
            self.transfer_gpu.remove(&(peer, sm));
        }
    }

    pub fn receives_gpu(&self, peer: usize, sm: u32) -> bool {
        self.receive_gpu.contains(&(peer, sm))
    }

    pub fn set_receive_gpu(&mut self, peer: usize, sm: u32, value: bool) {
        if value {
            self.receive_gpu.insert((peer, sm));
        } else {
            self.receive_gpu.remove(&(peer, sm));
        }
    }

    // ── SM partition grant ────────────────────────────────────────────────────

    /// Record the granted SM partitions. Partition creation itself (driver
    /// handles) lives outside the core; only the mask arithmetic is here.
    pub fn set_sm_mask(&mut self, mask: u128) {
        self.sm_mask = mask;
        self.granted_sms = mask.count_ones();
    }

    pub fn sm_mask(&self) -> u128 {
        self.sm_mask
    }

    pub fn granted_sms(&self) -> u32 {
        self.granted_sms
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
