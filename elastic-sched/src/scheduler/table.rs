/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cache-friendly projection of task descriptors for the optimizer.
//!
//! The optimizer never touches a [`TaskDescriptor`] directly. Each task is
//! flattened into one row of plain [`ModeEntry`] scalars, indexed by
//! `(task, mode)` in insertion order, next to two parallel per-task vectors:
//! the frozen flag and the current mode. The table is read-only during an
//! optimizer call and cheap to clone, so concurrent invocations can each work
//! on their own snapshot.

use crate::task::TaskDescriptor;

/// Loss function over `(descriptor, mode index)`, used for the GPU column.
///
/// The column is reserved: the shipped table builder stores zero for every
/// mode, but the optimizer accumulates it unconditionally, so populating it
/// later is a table-side change only.
pub type GpuLossFn = fn(&TaskDescriptor, usize) -> f64;

/// The production GPU loss: always zero.
pub fn zero_gpu_loss(_task: &TaskDescriptor, _mode: usize) -> f64 {
    0.0
}

/// GPU loss mirroring the CPU formula over the GPU triple:
/// `(max_utilization − gpu_work/gpu_period)² / elasticity`.
///
/// Not wired into the production path; provided so the column can be
/// populated without touching the optimizer.
pub fn utilization_gpu_loss(task: &TaskDescriptor, mode: usize) -> f64 {
    let m = task.mode(mode);
    let gpu_util = m.gpu.work.ratio(m.gpu.period).expect("period > span");
    let deviation = task.max_utilization() - gpu_util;
    deviation * deviation / task.elasticity()
}

// ── ModeEntry ─────────────────────────────────────────────────────────────────

/// One `(task, mode)` cell: the two loss terms and the two resource demands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeEntry {
    /// `(max_utilization − cpu_work/cpu_period)² / elasticity`.
    pub cpu_loss: f64,
    /// Reserved; zero in the current design.
    pub gpu_loss: f64,
    /// Cores demanded by this mode.
    pub cores: usize,
    /// SM partitions demanded by this mode.
    pub sms: usize,
}

impl ModeEntry {
    /// Combined loss contribution of selecting this entry.
    pub fn loss(&self) -> f64 {
        self.cpu_loss + self.gpu_loss
    }
}

// ── ModeTable ─────────────────────────────────────────────────────────────────

/// Two-level indexed projection: `rows[task][mode]` plus per-task flags.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    rows: Vec<Vec<ModeEntry>>,
    frozen: Vec<bool>,
    current_modes: Vec<usize>,
}

impl ModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row per the descriptor's menu, with the zero GPU loss.
    pub fn push_task(&mut self, task: &TaskDescriptor) {
        self.push_task_with(task, zero_gpu_loss);
    }

    /// Append one row, populating the GPU column with `gpu_loss`.
    pub fn push_task_with(&mut self, task: &TaskDescriptor, gpu_loss: GpuLossFn) {
        let row = (0..task.num_modes())
            .map(|j| {
                let mode = task.mode(j);
                let cpu_util = mode.cpu.work.ratio(mode.cpu.period).expect("period > span");
                let deviation = task.max_utilization() - cpu_util;
                ModeEntry {
                    cpu_loss: deviation * deviation / task.elasticity(),
                    gpu_loss: gpu_loss(task, j),
                    cores: mode.cpus as usize,
                    sms: mode.sms as usize,
                }
            })
            .collect();
        self.rows.push(row);
        self.frozen.push(!task.changeable());
        self.current_modes.push(task.current_mode());
    }

    pub fn num_tasks(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, task: usize) -> &[ModeEntry] {
        &self.rows[task]
    }

    pub fn entry(&self, task: usize, mode: usize) -> &ModeEntry {
        &self.rows[task][mode]
    }

    pub fn is_frozen(&self, task: usize) -> bool {
        self.frozen[task]
    }

    pub fn set_frozen(&mut self, task: usize, frozen: bool) {
        self.frozen[task] = frozen;
    }

    pub fn current_mode(&self, task: usize) -> usize {
        self.current_modes[task]
    }

    pub fn set_current_mode(&mut self, task: usize, mode: usize) {
        debug_assert!(mode < self.rows[task].len());
        self.current_modes[task] = mode;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ModeTiming, TaskDescriptor};
    use crate::timespec::Timespec;

    fn ms(v: f64) -> Timespec {
        Timespec::from_millis_f64(v)
    }

    fn triple(work: f64, span: f64, period: f64) -> ModeTiming {
        ModeTiming::new(ms(work), ms(span), ms(period))
    }

    fn idle_gpu() -> ModeTiming {
        triple(0.0, 0.0, 1.0)
    }

    fn two_mode_task(elasticity: f64) -> TaskDescriptor {
        TaskDescriptor::new(
            0,
            elasticity,
            &[triple(4.0, 1.0, 5.0), triple(10.0, 2.0, 5.0)],
            &[idle_gpu(), idle_gpu()],
            16,
        )
        .unwrap()
    }

    #[test]
    fn rows_align_with_the_menu() {
        let td = two_mode_task(1.0);
        let mut table = ModeTable::new();
        table.push_task(&td);

        assert_eq!(table.num_tasks(), 1);
        assert_eq!(table.row(0).len(), 2);
        assert_eq!(table.entry(0, 0).cores, 1);
        assert_eq!(table.entry(0, 1).cores, 3);
        assert_eq!(table.entry(0, 0).sms, 0);
    }

    #[test]
    fn cpu_loss_measures_squared_utilization_deviation() {
        // max_utilization = 2.0; mode 0 runs at 0.8 → (1.2)² / 2.0 = 0.72
        let td = two_mode_task(2.0);
        let mut table = ModeTable::new();
        table.push_task(&td);

        assert!((table.entry(0, 0).cpu_loss - 0.72).abs() < 1e-9);
        // the heaviest mode is the zero-loss reference point
        assert!(table.entry(0, 1).cpu_loss.abs() < 1e-12);
    }

    #[test]
    fn gpu_loss_defaults_to_zero() {
        let td = two_mode_task(1.0);
        let mut table = ModeTable::new();
        table.push_task(&td);
        assert_eq!(table.entry(0, 0).gpu_loss, 0.0);
        assert_eq!(table.entry(0, 1).gpu_loss, 0.0);
    }

    #[test]
    fn gpu_loss_column_is_pluggable() {
        let td = TaskDescriptor::new(
            0,
            1.0,
            &[triple(4.0, 1.0, 5.0)],
            &[triple(2.0, 1.0, 5.0)],
            16,
        )
        .unwrap();
        let mut table = ModeTable::new();
        table.push_task_with(&td, utilization_gpu_loss);

        // max_utilization = 0.8 (cpu); gpu runs at 0.4 → (0.4)² = 0.16
        assert!((table.entry(0, 0).gpu_loss - 0.16).abs() < 1e-9);
        assert!((table.entry(0, 0).loss() - (table.entry(0, 0).cpu_loss + 0.16)).abs() < 1e-12);
    }

    #[test]
    fn per_task_flags_track_descriptor_state() {
        let mut td = two_mode_task(1.0);
        td.set_current_mode(1, true).unwrap();

        let mut table = ModeTable::new();
        table.push_task(&td);
        assert!(table.is_frozen(0));
        assert_eq!(table.current_mode(0), 1);

        table.set_frozen(0, false);
        table.set_current_mode(0, 0);
        assert!(!table.is_frozen(0));
        assert_eq!(table.current_mode(0), 0);
    }
}
