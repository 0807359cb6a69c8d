//! # swarmkeeper-core
//!
//! Core library for SwarmKeeper: supervises long-running agents in tmux
//! sessions, decides whether each one is still working, and intervenes or
//! notifies when one stops.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. One loop, one thread, sessions polled in order.
//! - **Adapters behind traits**: tmux ([`PaneCapture`]), the classifier ([`Classifier`]),
//!   notification delivery ([`NotificationSink`]) and registry writes
//!   ([`RegistryPersistence`]) can all be faked in tests.
//! - **Graceful degradation**: A failing adapter degrades one session or one
//!   notification, never the loop. Missing files return empty/default values.
//! - **Explicit termination**: The loop returns a [`TerminationReason`] instead of exiting.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use swarmkeeper_core::*;
//!
//! let store = RegistryStore::open_default()?;
//! let tmux = TmuxCapture::new();
//! let strategy = PatternStrategy::new(
//!     PatternSet::new(vec!["Continue?".into()], MatchMode::Literal),
//!     100,
//! );
//! let notifier = Notifier::from_handler(None);
//! let config = LoopConfig { auto_type: Some("y\\n".into()), ..LoopConfig::default() };
//!
//! let outcome = MonitorLoop::new(&strategy, &tmux, &notifier, &store, config)
//!     .run(store.load(), &AtomicBool::new(false))?;
//! ```

// Public modules
pub mod config;
pub mod detect;
pub mod error;
pub mod keys;
pub mod monitor;
pub mod notify;
pub mod process;
pub mod registry;
pub mod sessions;
pub mod tmux;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{load_config, ClassifierConfig, LoopDefaults, SwarmConfig};
pub use detect::{
    Classification, ClassificationStrategy, Classifier, DetectionResult, DetectionStrategy,
    MatchMode, OpenAiClassifier, PatternSet, PatternStrategy, StrategyKind,
};
pub use error::{ClassifyError, MonitorError, Result, SwarmError};
pub use monitor::{
    ConfirmationTracker, InterventionController, LoopConfig, LoopOutcome, LoopState, MonitorLoop,
    PendingPolicy, Sleeper, TerminationReason, ThreadSleeper,
};
pub use notify::{build_payload, NotificationSink, Notifier, SessionSnapshot};
pub use registry::{RegistryPersistence, RegistryStore, SessionRegistry};
pub use sessions::*;
pub use tmux::{PaneCapture, TmuxCapture};
pub use types::*;

pub use swarmkeeper_protocol as protocol;
