//! Worker-process side of the hydrator engine
//!
//! This crate provides the loop a worker process runs and the
//! [`Hydrater`] trait through which the user-supplied hydration logic is
//! invoked. A host binary embeds its `Hydrater` implementation and calls
//! [`run_if_worker`] early in `main`; when the dispatcher re-executes the
//! binary with the worker flag, the process turns into a worker.

pub mod hydrater;
pub mod runner;

pub use hydrater::{HydrateFailure, Hydrater, HydrationContext};
pub use runner::{run_if_worker, worker_main, Worker};
