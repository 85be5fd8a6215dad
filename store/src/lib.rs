// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The single-file relational store backing the PrismQ task queue: schema
//! bootstrap, the atomic claim protocol, the task state machine, and the
//! monitoring/maintenance primitives that keep the store healthy under
//! concurrent access from many worker and API processes.

pub mod claim;
pub mod error;
pub mod maintenance;
pub mod models;
pub mod monitoring;
pub mod schema;
pub mod store;
pub mod transitions;

pub use error::StoreError;
pub use maintenance::{BackupReport, CheckpointMode, IntegrityReport};
pub use models::{
    LogLevel, NewTask, SchedulingStrategy, Task, TaskLog, TaskStatus, Worker,
};
pub use monitoring::{
    ProcessingTimePercentiles, QueueDepth, QueueDepthByType, RecentFailure, SuccessRate,
    WorkerActivity,
};
pub use store::Store;
pub use transitions::EnqueueOutcome;
