//! appmap-core: onboarding milestones, status snapshots and the small
//! observer/diff utilities the project watcher is built from.
//! Pure library: no async runtime, no subprocesses.

pub mod event;
pub mod key_diff;
pub mod milestone;
pub mod status;
pub mod telemetry;

pub use event::{EventEmitter, Subscription};
pub use key_diff::{ObjectKeyDiff, resolve_key};
pub use milestone::{CompletionState, Milestone, MilestoneId, MilestoneMap, MilestoneSnapshot};
pub use status::{StatusCommand, StatusSnapshot};
pub use telemetry::{NoopTelemetry, RecordingTelemetry, Telemetry, TelemetryEvent};
