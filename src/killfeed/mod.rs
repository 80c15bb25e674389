//! Kill feed: server log lines in, chat notifications out.
//!
//! ## Module Structure
//!
//! - [`tailer`]: Follows the newest log file across rotation
//! - [`classifier`]: Ordered templates turning lines into events
//! - [`event`]: The classified event model
//! - [`dispatch`]: Message rendering and webhook delivery
//! - [`monitor`]: The pipeline task and its start/stop lifecycle
//! - [`activation`]: Occupancy polling that drives the monitor

pub mod activation;
pub mod classifier;
pub mod dispatch;
pub mod event;
pub mod monitor;
pub mod tailer;

pub use activation::{ActivationController, HttpOccupancy, OccupancyError, OccupancySource, Transition};
pub use classifier::{EventClassifier, normalize_name};
pub use dispatch::{DispatchError, NotificationDispatcher, Notifier, WebhookNotifier, render_message};
pub use event::{ClassifiedEvent, DeathKind};
pub use monitor::{MonitorControl, MonitorLoop, MonitorSettings, MonitorState};
pub use tailer::{LogCursor, LogTailer, TailError, TailerConfig};
