pub mod accumulator;
pub mod estimator;
pub mod history_store;
pub mod session_manager;

pub use accumulator::EnergyAccumulator;
pub use estimator::PowerEstimator;
pub use history_store::{lock_store, shared, HistoryStore, HistoryStoreError, SharedStore};
pub use session_manager::{SessionError, SessionManager};

/// Current time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
