//! Ticket workflow state.

use serde::{Deserialize, Serialize};

use crate::predicate::{FieldKind, FieldValue, Value};

/// The state of a ticket in its lifecycle.
///
/// State transitions:
/// ```text
/// Open ──► InProgress ──► Resolved ──► Closed
///   │          ▲  │           │
///   │          └──┼───────────┘ (reopen)
///   └─────────────┴──────────────► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Raised and waiting for someone to pick it up.
    #[default]
    Open,

    /// Being worked on.
    InProgress,

    /// A fix was delivered, awaiting the requester's evaluation.
    Resolved,

    /// Evaluated and closed (terminal state).
    Closed,
}

impl TicketStatus {
    /// Returns the stored spelling of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Returns true if the ticket can move to `next` through `change_status`.
    ///
    /// Closing goes through `Ticket::close`, which records the evaluation.
    pub fn can_move_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (InProgress, Resolved) | (InProgress, Open) | (Resolved, InProgress)
        )
    }

    /// Returns true if the ticket can be closed in this state.
    pub fn can_close(&self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FieldValue for TicketStatus {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(self.as_str().to_string())
    }
}
