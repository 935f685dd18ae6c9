/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! elastic-sched – mode-selection scheduler for elastic real-time tasks
//!
//! Chooses one operating mode per task so that the selected modes fit inside
//! a CPU-core pool and a GPU SM-partition pool while minimizing the
//! elasticity-weighted distance of each task from its most demanding
//! operating point.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── timespec    – exact (sec, nsec) duration arithmetic
//! ├── task        – per-task menus, derived resource counts, mode state
//! ├── scheduler/  – mode table projection + 2-D knapsack optimizer
//! ├── parser/     – plain-text task-menu files → raw menus
//! └── config/     – YAML system configuration (pools and limits)
//! ```

pub mod config;
pub mod parser;
pub mod scheduler;
pub mod task;
pub mod timespec;
