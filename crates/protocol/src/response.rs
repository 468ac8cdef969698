use serde::{Deserialize, Serialize};

use crate::types::{DaemonStatus, DataSnapshot, EnergyTotals, ErrorKind, PowerSample, Session};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonResponse {
    Status(DaemonStatus),
    CurrentData(DataSnapshot),
    Samples(Vec<PowerSample>),
    Sessions(Vec<Session>),
    Session(Session),
    NoSession,
    Totals(EnergyTotals),
    Ok,
    Error { kind: ErrorKind, message: String },
    Subscribed,
    Unsubscribed,
    SubscriptionRejected { reason: String },
    DataUpdate(DataSnapshot),
}

impl DaemonResponse {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        DaemonResponse::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
