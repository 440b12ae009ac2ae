//! Execution policies.
//!
//! ## Contents
//! - [`TimeoutBehavior`] what a manifest's `timeout_seconds` means (return / continue)
//!
//! ## Quick wiring
//! ```text
//! AppManifest { timeout_seconds, timeout_behavior }
//!      └─► core::runner::AppRunner arms behavior.deadline(timeout) per execution
//! ```

mod timeout;

pub use timeout::TimeoutBehavior;
