//! pgscale-engine: drives a workload through a progression of
//! concurrency bands and assembles the analyzed result.
//!
//! # Run loop
//!
//! ```text
//! sequence::generate ──► ScalingEngine::run
//!                          for each band (strictly sequential):
//!                            BandExecutor::execute
//!                              Idle → Warming → Measuring → Completed
//!                                        └──────────┴──► Cancelled / Failed
//!                            EarlyTermination::evaluate
//!                            cooldown (interruptible)
//!                          analyze + select ──► ScalingResult
//! ```

pub mod engine;
pub mod executor;
pub mod sampler;
pub mod sequence;
pub mod termination;
pub mod workload;

pub use engine::{
    EngineConfig, Progress, ScalingEngine, ScalingResult, StopReason, MAX_RUN_DURATION,
};
pub use executor::{BandExecutor, BandPhase, ExecutorSettings};
pub use sequence::{generate, ScalingStrategy, SequenceParams};
pub use termination::EarlyTermination;
pub use workload::{Workload, WorkerContext};
