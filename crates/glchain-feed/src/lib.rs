//! Commit feed monitoring and chain processing
//!
//! [`FeedMonitor`] polls project branches for new commits and publishes
//! [`MonitorEvent`]s. [`CommitProcessor`] queues detected commits, traces
//! them with bounded concurrency and publishes [`ProcessorEvent`]s.
//! Both expose their events through an [`EventBus`].

pub mod event_bus;
pub mod events;
pub mod filter;
pub mod monitor;
pub mod monitor_state;
pub mod processor;

pub use event_bus::EventBus;
pub use events::{DetectedCommit, MonitorEvent, ProcessorEvent};
pub use filter::AuthorFilter;
pub use monitor::{FeedMonitor, MonitorError, PollOutcome};
pub use monitor_state::{MonitorState, MonitorStateTable};
pub use processor::{CommitProcessor, CommitStatus, ProcessorStats, QueuedCommit};
