/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the mode-selection scheduler.
//!
//! Two failure layers:
//!
//! * [`TaskError`](crate::task::TaskError) — a single descriptor could not be
//!   built or mutated; wrapped transparently here so `add_task` has one error
//!   type.
//! * [`SchedulerError`] — top-level failure of the scheduler context or of an
//!   optimizer invocation.
//!
//! Construction-time variants are fatal to the host process (the surrounding
//! application tolerates no partial task set); the infeasibility variants are
//! ordinary return values and never terminate anything.

use thiserror::Error;

use crate::task::TaskError;

/// Top-level error returned by the scheduler context and the optimizer.
#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    /// The context's bounds-checked task capacity is exhausted.
    #[error("cannot add task {count}: the table is capped at {max} tasks")]
    TooManyTasks { count: usize, max: usize },

    /// A descriptor rejected its menu or a mutation.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Some unfrozen task has no mode that fits the bounds even with every
    /// other task removed, so no assignment can exist.
    #[error("task {task} has no mode that fits within {max_cpus} cores / {max_sms} SMs")]
    TaskInfeasible {
        task: usize,
        max_cpus: usize,
        max_sms: usize,
    },

    /// A frozen task's pinned mode does not fit the bounds on its own.
    #[error(
        "task {task} is frozen at mode {mode}, which does not fit within \
         {max_cpus} cores / {max_sms} SMs"
    )]
    FrozenInfeasible {
        task: usize,
        mode: usize,
        max_cpus: usize,
        max_sms: usize,
    },

    /// Every task fits individually but no combination of modes does.
    #[error("no combination of modes fits within the resource bounds")]
    Infeasible,
}

impl SchedulerError {
    /// True for the variants that mean "the bounds cannot be met", as opposed
    /// to a malformed request.
    pub fn is_infeasibility(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskInfeasible { .. }
                | SchedulerError::FrozenInfeasible { .. }
                | SchedulerError::Infeasible
        )
    }
}
