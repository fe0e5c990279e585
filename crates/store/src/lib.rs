//! cloudrec store: per-kind caches, listener fan-out and the refresh cycle.
//!
//! Data flow per cycle: source → keyed snapshot → diff against the cache →
//! atomic cache swap → listeners. A `Recorder` owns one `KindSync` per
//! configured kind for a single tenant.

#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod cycle;
pub mod listener;
pub mod listeners;
pub mod recorder;

pub use cache::{Applied, Cache, CacheSnapshot};
pub use config::RecorderConfig;
pub use cycle::{CycleOutcome, CycleReport, CycleState, KindSync};
pub use listener::{Listener, ListenerFailure, ListenerRegistry, Stage};
pub use listeners::PodIngressRuleBackendListener;
pub use recorder::{CycleRunner, Recorder, RecorderHandle};
