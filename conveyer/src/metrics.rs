//! Metrics definitions for conveyer monitoring.
//!
//! Values are emitted through the [`metrics`] facade; installing a recorder is left to the binary
//! embedding the conveyer.

/// Label for conveyer ID in metrics.
pub const CONVEYER_ID_LABEL: &str = "conveyer_id";

/// Label for channel name in metrics.
pub const CHANNEL_LABEL: &str = "channel";

/// Label for stage kind in metrics.
pub const STAGE_KIND_LABEL: &str = "stage_kind";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Channel metrics

/// Counter for values successfully enqueued on a channel.
pub const CONVEYER_CHANNEL_MESSAGES_SENT_TOTAL: &str = "conveyer_channel_messages_sent_total";

/// Counter for values dequeued from a channel.
pub const CONVEYER_CHANNEL_MESSAGES_RECEIVED_TOTAL: &str =
    "conveyer_channel_messages_received_total";

// Run metrics

/// Counter for started runs.
pub const CONVEYER_RUNS_TOTAL: &str = "conveyer_runs_total";

/// Gauge for stages currently executing.
pub const CONVEYER_ACTIVE_STAGES: &str = "conveyer_active_stages";

/// Counter for stages that finished with an error.
pub const CONVEYER_STAGE_FAILURES_TOTAL: &str = "conveyer_stage_failures_total";
