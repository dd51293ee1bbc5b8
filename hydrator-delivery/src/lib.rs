//! Callback delivery for hydration results
//!
//! Sends the sanitized change-set of a finished task to the task's
//! callback endpoint as an HTTP partial-update, and best-effort failure
//! notifications for transiently failed tasks.

pub mod callback;
pub mod errors;

pub use callback::{CallbackClient, ACCEPTED_STATUS};
pub use errors::DeliveryError;
