use serde::{Deserialize, Serialize};

use resilio_core::domain::IncidentId;
use resilio_core::error::AppError;

pub const CASE_VANISHED_MESSAGE: &str = "This case no longer exists";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The record was deleted server-side and has left the view.
    CaseVanished,
    /// An action was rejected; the view shows the last confirmed value.
    ActionFailed,
    /// The session fell behind the feed and rebuilt its view.
    FeedLagged,
    /// The feed closed; no further updates will arrive.
    Disconnected,
}

/// User-facing signal queued by an agent for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub incident_id: Option<IncidentId>,
    pub message: String,
    pub code: Option<String>,
    pub retryable: bool,
}

impl Notice {
    pub fn case_vanished(id: IncidentId) -> Self {
        Self {
            kind: NoticeKind::CaseVanished,
            incident_id: Some(id),
            message: CASE_VANISHED_MESSAGE.to_string(),
            code: None,
            retryable: false,
        }
    }

    pub fn action_failed(id: IncidentId, err: &AppError) -> Self {
        Self {
            kind: NoticeKind::ActionFailed,
            incident_id: Some(id),
            message: err.message.clone(),
            code: Some(err.code.clone()),
            retryable: true,
        }
    }

    pub fn feed_lagged(missed: u64) -> Self {
        Self {
            kind: NoticeKind::FeedLagged,
            incident_id: None,
            message: format!("Missed {missed} live updates; view was refreshed"),
            code: None,
            retryable: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            kind: NoticeKind::Disconnected,
            incident_id: None,
            message: "Live updates disconnected".to_string(),
            code: None,
            retryable: true,
        }
    }
}
