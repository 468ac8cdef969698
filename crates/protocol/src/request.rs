use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonRequest {
    GetStatus,
    GetCurrentData,
    GetPowerHistory {
        hours: u32,
    },
    GetSamplesInRange {
        from: i64,
        to: i64,
    },
    GetSessionSamples {
        session_id: String,
    },
    GetSessions,
    GetSession {
        id: String,
    },
    GetCurrentSession,
    StartSession,
    EndSession {
        id: String,
    },
    GetTotals,
    Subscribe,
    Unsubscribe,
    Shutdown,
}

impl DaemonRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
