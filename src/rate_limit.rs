//! Rate limiting primitives.
//!
//! This module provides the building blocks for gating calls to a plugin:
//! - [`TokenBucket`]: per-minute throughput with a burst allowance.
//! - [`MonthlyQuotaTracker`]: hard ceiling per calendar month.
//! - [`DualLimiter`]: both of the above for one plugin, monthly first.
//! - [`PluginLimitLayer`]: Tower middleware that enforces a plugin's limits.
//!
//! # Architecture
//!
//! - **Logic**: the bucket and tracker each guard their own state with a single
//!   mutex; no operation ever holds both locks.
//! - **Composition**: `DualLimiter` checks the month before the bucket so a call
//!   that will be rejected for the month never waits on the bucket.
//! - **Middleware**: `PluginLimitLayer` asks a [`PluginLimiters`](crate::PluginLimiters)
//!   registry; it doesn't know how limiting works.

pub mod bucket;
pub mod dual;
pub mod middleware;
pub mod monthly;

pub use bucket::{TokenBucket, MAX_WAIT_SLICE};
pub use dual::{DualLimiter, LimiterSnapshot};
pub use middleware::{PluginLimitLayer, PluginLimitService};
pub use monthly::MonthlyQuotaTracker;
