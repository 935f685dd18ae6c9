/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Mode-selection optimizer: a two-dimensional bounded knapsack with one item
//! class per task.
//!
//! Given the [`ModeTable`] projection of all tasks, [`solve`] picks exactly
//! one mode per task so that the selected modes' core demands sum to at most
//! `max_cpus`, their SM demands sum to at most `max_sms`, and the summed loss
//! `Σ (cpu_loss + gpu_loss)` is minimal. A frozen task contributes exactly
//! one candidate: its current mode.
//!
//! # Algorithm
//! Dynamic program over `dp[i][w][v]` = minimal loss over the first `i` tasks
//! using exactly `w` cores and `v` SMs, with unreachable states held at +∞.
//! The two resource layers roll (only the previous task's layer is kept); the
//! `choice` tensor stays full-sized so the winning selection can be walked
//! back from the final state in `O(N)`.
//!
//! Time is `O(N · max_cpus · max_sms · modes-per-task)`, space
//! `O(N · max_cpus · max_sms)` for `choice`. Both tensors live and die inside
//! one [`solve`] call.
//!
//! # Determinism
//! The answer state is the argmin over all `(w, v)`; loss ties prefer the
//! lower `w + v`, then the lower `w`, then the lower `v`. Within one dp cell,
//! a loss tie keeps the lower mode index. Identical inputs therefore always
//! produce identical selections.

pub mod error;
pub mod table;

pub use error::SchedulerError;
pub use table::{ModeEntry, ModeTable};

use tracing::{error, info};

use crate::config::SystemConfig;
use crate::task::{ModeTiming, TaskDescriptor};

/// Sentinel for dp states no selection can reach.
const UNREACHABLE: f64 = f64::INFINITY;

/// Sentinel for "no mode recorded" in the choice tensor.
const NO_CHOICE: u32 = u32::MAX;

// ── ModeSelection ─────────────────────────────────────────────────────────────

/// Result of one optimizer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSelection {
    /// Chosen mode index per task, aligned with task insertion order.
    pub selections: Vec<usize>,
    /// Summed loss of the chosen modes.
    pub total_loss: f64,
    /// Cores consumed by the chosen modes.
    pub cores_used: usize,
    /// SM partitions consumed by the chosen modes.
    pub sms_used: usize,
}

impl ModeSelection {
    fn empty() -> Self {
        ModeSelection {
            selections: Vec::new(),
            total_loss: 0.0,
            cores_used: 0,
            sms_used: 0,
        }
    }
}

// ── solve ─────────────────────────────────────────────────────────────────────

/// Run the knapsack over a table snapshot.
///
/// This is a pure function of its arguments: it never touches the descriptors
/// and holds no state across calls. Callers that want concurrent invocations
/// hand each one its own [`ModeTable`] clone.
///
/// # Errors
/// * [`SchedulerError::FrozenInfeasible`] — a frozen task's pinned mode does
///   not fit the bounds by itself.
/// * [`SchedulerError::TaskInfeasible`] — some unfrozen task has no mode that
///   fits the bounds by itself.
/// * [`SchedulerError::Infeasible`] — individually every task fits, but no
///   combination does.
pub fn solve(
    table: &ModeTable,
    max_cpus: usize,
    max_sms: usize,
) -> Result<ModeSelection, SchedulerError> {
    let n = table.num_tasks();
    if n == 0 {
        return Ok(ModeSelection::empty());
    }

    // Admissibility gate: a task whose every candidate overflows the bounds
    // on its own dooms the search before it starts.
    for task in 0..n {
        if table.is_frozen(task) {
            let mode = table.current_mode(task);
            let entry = table.entry(task, mode);
            if entry.cores > max_cpus || entry.sms > max_sms {
                return Err(SchedulerError::FrozenInfeasible {
                    task,
                    mode,
                    max_cpus,
                    max_sms,
                });
            }
        } else if !table
            .row(task)
            .iter()
            .any(|e| e.cores <= max_cpus && e.sms <= max_sms)
        {
            return Err(SchedulerError::TaskInfeasible {
                task,
                max_cpus,
                max_sms,
            });
        }
    }

    let width = (max_cpus + 1) * (max_sms + 1);
    let cell = |w: usize, v: usize| w * (max_sms + 1) + v;

    // Rolling two-layer dp; `below` is task i's predecessor layer.
    let mut below = vec![UNREACHABLE; width];
    let mut layer = vec![UNREACHABLE; width];
    below[cell(0, 0)] = 0.0;

    // Full-sized reconstruction tensor: choice[i][w][v] = chosen mode index.
    let mut choice = vec![NO_CHOICE; n * width];

    for i in 0..n {
        let (first, last) = if table.is_frozen(i) {
            let m = table.current_mode(i);
            (m, m + 1)
        } else {
            (0, table.row(i).len())
        };

        for w in 0..=max_cpus {
            for v in 0..=max_sms {
                let mut best = UNREACHABLE;
                let mut best_mode = NO_CHOICE;
                for j in first..last {
                    let entry = table.entry(i, j);
                    if entry.cores > w || entry.sms > v {
                        continue;
                    }
                    let prior = below[cell(w - entry.cores, v - entry.sms)];
                    if !prior.is_finite() {
                        continue;
                    }
                    let cand = prior + entry.loss();
                    if cand < best {
                        best = cand;
                        best_mode = j as u32;
                    }
                }
                layer[cell(w, v)] = best;
                choice[i * width + cell(w, v)] = best_mode;
            }
        }
        std::mem::swap(&mut below, &mut layer);
    }

    // `below` now holds the layer for all n tasks. Argmin with the tie-break:
    // lower w + v, then lower w, then lower v.
    let mut best: Option<(f64, usize, usize)> = None;
    for w in 0..=max_cpus {
        for v in 0..=max_sms {
            let loss = below[cell(w, v)];
            if !loss.is_finite() {
                continue;
            }
            let improves = match best {
                None => true,
                Some((b_loss, b_w, b_v)) => {
                    loss < b_loss || (loss == b_loss && (w + v, w, v) < (b_w + b_v, b_w, b_v))
                }
            };
            if improves {
                best = Some((loss, w, v));
            }
        }
    }
    let Some((total_loss, cores_used, sms_used)) = best else {
        return Err(SchedulerError::Infeasible);
    };

    // Walk the winning state back to (0, 0), emitting modes in reverse.
    let mut selections = vec![0usize; n];
    let (mut w, mut v) = (cores_used, sms_used);
    for i in (0..n).rev() {
        let mode = choice[i * width + cell(w, v)] as usize;
        selections[i] = mode;
        let entry = table.entry(i, mode);
        w -= entry.cores;
        v -= entry.sms;
    }
    debug_assert_eq!((w, v), (0, 0), "reconstruction must drain both sacks");

    Ok(ModeSelection {
        selections,
        total_loss,
        cores_used,
        sms_used,
    })
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// The scheduler context: the task set, its table projection, and the
/// capacity limits. Explicitly passed wherever it is needed; there is no
/// process-wide instance.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_tasks: usize,
    max_modes: usize,
    tasks: Vec<TaskDescriptor>,
    table: ModeTable,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Context with the default limits from [`SystemConfig`].
    pub fn new() -> Self {
        Self::from_config(&SystemConfig::default())
    }

    pub fn with_limits(max_tasks: usize, max_modes: usize) -> Self {
        Scheduler {
            max_tasks,
            max_modes,
            tasks: Vec::new(),
            table: ModeTable::new(),
        }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::with_limits(config.max_tasks, config.max_modes)
    }

    /// Register a task from its parallel CPU/GPU menus; returns its id.
    ///
    /// # Errors
    /// [`SchedulerError::TooManyTasks`] past the capacity limit, or any
    /// [`TaskError`](crate::task::TaskError) from the descriptor derivation.
    /// A failed add leaves the context unchanged.
    pub fn add_task(
        &mut self,
        elasticity: f64,
        cpu_menu: &[ModeTiming],
        gpu_menu: &[ModeTiming],
    ) -> Result<usize, SchedulerError> {
        let id = self.tasks.len();
        if id >= self.max_tasks {
            return Err(SchedulerError::TooManyTasks {
                count: id + 1,
                max: self.max_tasks,
            });
        }

        let task = TaskDescriptor::new(id, elasticity, cpu_menu, gpu_menu, self.max_modes)?;
        info!(
            task = id,
            modes = task.num_modes(),
            min_cpus = task.min_cpus(),
            max_cpus = task.max_cpus(),
            min_sms = task.min_gpus(),
            max_sms = task.max_gpus(),
            "task registered"
        );
        self.table.push_task(&task);
        self.tasks.push(task);
        Ok(id)
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, id: usize) -> &TaskDescriptor {
        &self.tasks[id]
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn table(&self) -> &ModeTable {
        &self.table
    }

    /// Pin (or release) a task at its current mode for subsequent passes.
    ///
    /// Unknown task ids are logged and ignored.
    pub fn set_frozen(&mut self, task: usize, frozen: bool) {
        let Some(descriptor) = self.tasks.get_mut(task) else {
            error!(task, "set_frozen for unknown task, ignoring");
            return;
        };
        if frozen {
            let mode = descriptor.current_mode();
            descriptor
                .set_current_mode(mode, true)
                .expect("current mode is always in range");
        } else {
            descriptor.reset_changeable();
        }
        self.table.set_frozen(task, frozen);
    }

    /// Move a task to `mode`, leaving it changeable.
    ///
    /// An out-of-range task or mode is recovered locally: logged and ignored,
    /// matching the control loop's tolerance for stale mode requests.
    pub fn set_current_mode(&mut self, task: usize, mode: usize) {
        let Some(descriptor) = self.tasks.get_mut(task) else {
            error!(task, mode, "set_current_mode for unknown task, ignoring");
            return;
        };
        match descriptor.set_current_mode(mode, false) {
            Ok(()) => self.table.set_current_mode(task, mode),
            Err(err) => error!(%err, "ignoring mode change"),
        }
    }

    /// Unfreeze every task; called at the start of a new control window.
    pub fn reset_changeable(&mut self) {
        for (id, descriptor) in self.tasks.iter_mut().enumerate() {
            descriptor.reset_changeable();
            self.table.set_frozen(id, false);
        }
    }

    /// Run the optimizer against a snapshot of the current task states.
    ///
    /// Pure with respect to the context: descriptors are not modified. Apply
    /// the result with [`apply_selection`](Self::apply_selection).
    pub fn optimize(
        &self,
        max_cpus: usize,
        max_sms: usize,
    ) -> Result<ModeSelection, SchedulerError> {
        let mut snapshot = self.table.clone();
        for (id, descriptor) in self.tasks.iter().enumerate() {
            snapshot.set_frozen(id, !descriptor.changeable());
            snapshot.set_current_mode(id, descriptor.current_mode());
        }

        let result = solve(&snapshot, max_cpus, max_sms);
        match &result {
            Ok(selection) => info!(
                max_cpus,
                max_sms,
                cores_used = selection.cores_used,
                sms_used = selection.sms_used,
                total_loss = selection.total_loss,
                "optimization complete"
            ),
            Err(err) => error!(max_cpus, max_sms, %err, "optimization failed"),
        }
        result
    }

    /// Write a selection back into the descriptors.
    ///
    /// Frozen tasks are skipped (the optimizer already pinned them to their
    /// current mode); a changeable task that actually switches modes gets its
    /// adaptation counter bumped.
    pub fn apply_selection(&mut self, selection: &ModeSelection) {
        for (id, &mode) in selection.selections.iter().enumerate() {
            let descriptor = &mut self.tasks[id];
            if !descriptor.changeable() {
                continue;
            }
            let switched = descriptor.current_mode() != mode;
            descriptor
                .set_current_mode(mode, false)
                .expect("selection indexes the menu");
            if switched {
                let adaptations = descriptor.num_adaptations() + 1;
                descriptor.set_num_adaptations(adaptations);
            }
            self.table.set_current_mode(id, mode);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
