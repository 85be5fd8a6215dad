// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! The executor and worker engine (C5, C6): runs registered handlers
//! against leased tasks with lease renewal, retry/dead-letter commits, and
//! a bounded-concurrency run loop with heartbeat and graceful shutdown.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;

pub use config::Cli;
pub use engine::{WorkerEngine, WorkerEngineConfig};
pub use error::WorkerError;
pub use executor::Executor;
