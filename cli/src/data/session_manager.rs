//! Session lifecycle: Open → Closed, with at most one Open session.

use std::sync::Mutex;

use tracing::{info, warn};
use uuid::Uuid;
use wattwise_protocol::Session;

use super::history_store::{lock_store, HistoryStoreError, SharedStore};
use super::now_ms;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} is already open")]
    Conflict(String),

    #[error("Session {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] HistoryStoreError),

    #[error("Session transition lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SessionError>;

pub struct SessionManager {
    store: SharedStore,
    electricity_rate: f64,
    /// Serializes start/end so the open-session check and the write are atomic.
    transition: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: SharedStore, electricity_rate: f64) -> Self {
        Self {
            store,
            electricity_rate,
            transition: Mutex::new(()),
        }
    }

    pub fn electricity_rate(&self) -> f64 {
        self.electricity_rate
    }

    /// Opens a new session. Fails with `Conflict` while another is open.
    pub fn start_new(&self) -> Result<Session> {
        let _transition = self.transition.lock().map_err(|_| SessionError::Poisoned)?;
        let store = lock_store(&self.store)?;

        if let Some(open) = store.get_open_session()? {
            return Err(SessionError::Conflict(open.id));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            start_time: now_ms(),
            end_time: None,
            total_kwh: 0.0,
            total_cost: 0.0,
        };

        match store.insert_session(&session) {
            Ok(()) => {}
            // Another process holding the same database won the race.
            Err(e) if e.is_constraint_violation() => {
                let open_id = store.get_open_session()?.map(|s| s.id).unwrap_or_default();
                return Err(SessionError::Conflict(open_id));
            }
            Err(e) => return Err(e.into()),
        }

        info!(session_id = %session.id, "Session started");
        Ok(session)
    }

    /// Closes a session, freezing its totals from its most recent sample.
    ///
    /// Ending an already closed session returns it unchanged.
    pub fn end(&self, id: &str) -> Result<Session> {
        let _transition = self.transition.lock().map_err(|_| SessionError::Poisoned)?;
        let store = lock_store(&self.store)?;

        let Some(mut session) = store.get_session(id)? else {
            warn!(session_id = %id, "Attempted to end unknown session");
            return Err(SessionError::NotFound(id.to_string()));
        };

        if !session.is_open() {
            warn!(session_id = %id, "Session already ended");
            return Ok(session);
        }

        let total_kwh = store
            .latest_session_sample(id)?
            .map(|s| s.accumulated_kwh)
            .unwrap_or(0.0);

        session.end_time = Some(now_ms().max(session.start_time));
        session.total_kwh = total_kwh;
        session.total_cost = total_kwh * self.electricity_rate;

        if !store.close_session(&session)? {
            // Closed by another process between the read and the update.
            return store
                .get_session(id)?
                .ok_or_else(|| SessionError::NotFound(id.to_string()));
        }

        info!(
            session_id = %id,
            total_kwh = session.total_kwh,
            total_cost = session.total_cost,
            "Session ended"
        );
        Ok(session)
    }

    /// The open session with the latest start time, if any.
    pub fn current(&self) -> Result<Option<Session>> {
        Ok(lock_store(&self.store)?.get_open_session()?)
    }

    pub fn all(&self) -> Result<Vec<Session>> {
        Ok(lock_store(&self.store)?.get_sessions()?)
    }

    pub fn get(&self, id: &str) -> Result<Session> {
        lock_store(&self.store)?
            .get_session(id)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use wattwise_protocol::PowerSample;

    use crate::data::history_store::{shared, HistoryStore};

    fn manager(rate: f64) -> (SessionManager, SharedStore) {
        let store = shared(HistoryStore::open_in_memory().unwrap());
        (SessionManager::new(store.clone(), rate), store)
    }

    fn add_sample(store: &SharedStore, session_id: &str, accumulated_kwh: f64) {
        lock_store(store)
            .unwrap()
            .insert_sample(&PowerSample {
                timestamp: now_ms(),
                power_watts: 200.0,
                accumulated_kwh,
                session_id: session_id.to_string(),
                cpu_util_pct: 10.0,
                gpu_util_pct: 0.0,
                mem_util_pct: 30.0,
            })
            .unwrap();
    }

    #[test]
    fn test_start_new_opens_session() {
        let (sessions, _) = manager(1445.0);
        let session = sessions.start_new().unwrap();
        assert!(session.is_open());
        assert_eq!(session.total_kwh, 0.0);
        assert_eq!(session.total_cost, 0.0);
        assert_eq!(sessions.current().unwrap(), Some(session));
    }

    #[test]
    fn test_start_while_open_conflicts() {
        let (sessions, _) = manager(1445.0);
        let first = sessions.start_new().unwrap();

        match sessions.start_new() {
            Err(SessionError::Conflict(id)) => assert_eq!(id, first.id),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(sessions.all().unwrap().len(), 1);
    }

    #[test]
    fn test_end_freezes_totals_from_last_sample() {
        let (sessions, store) = manager(1445.0);
        let session = sessions.start_new().unwrap();
        add_sample(&store, &session.id, 0.4);
        add_sample(&store, &session.id, 1.2);

        let ended = sessions.end(&session.id).unwrap();
        assert!(!ended.is_open());
        assert_eq!(ended.total_kwh, 1.2);
        assert_eq!(ended.total_cost, 1734.0);
        assert_eq!(ended.total_cost, ended.total_kwh * sessions.electricity_rate());
        assert_eq!(sessions.get(&session.id).unwrap(), ended);
        assert!(sessions.current().unwrap().is_none());
    }

    #[test]
    fn test_end_without_samples_is_zero() {
        let (sessions, _) = manager(0.25);
        let session = sessions.start_new().unwrap();
        let ended = sessions.end(&session.id).unwrap();
        assert_eq!(ended.total_kwh, 0.0);
        assert_eq!(ended.total_cost, 0.0);
    }

    #[test]
    fn test_end_is_idempotent() {
        let (sessions, store) = manager(1445.0);
        let session = sessions.start_new().unwrap();
        add_sample(&store, &session.id, 0.5);
        let ended = sessions.end(&session.id).unwrap();

        add_sample(&store, &session.id, 9.0);
        let again = sessions.end(&session.id).unwrap();
        assert_eq!(again, ended);
    }

    #[test]
    fn test_end_unknown_session() {
        let (sessions, _) = manager(1445.0);
        assert!(matches!(
            sessions.end("missing"),
            Err(SessionError::NotFound(id)) if id == "missing"
        ));
        assert!(matches!(
            sessions.get("missing"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_new_session_after_end() {
        let (sessions, _) = manager(1445.0);
        let first = sessions.start_new().unwrap();
        sessions.end(&first.id).unwrap();
        let second = sessions.start_new().unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(sessions.current().unwrap().unwrap().id, second.id);
        assert_eq!(sessions.all().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_transitions_keep_one_open() {
        let (sessions, store) = manager(1445.0);
        let sessions = Arc::new(sessions);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = Arc::clone(&sessions);
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        match sessions.start_new() {
                            Ok(session) => {
                                let _ = sessions.end(&session.id);
                            }
                            Err(SessionError::Conflict(id)) => {
                                let _ = sessions.end(&id);
                            }
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                        let open = lock_store(&store)
                            .unwrap()
                            .get_sessions()
                            .unwrap()
                            .into_iter()
                            .filter(|s| s.is_open())
                            .count();
                        assert!(open <= 1, "{open} sessions open at once");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
