//! Node-selection interaction state
//!
//! The mode is a plain value: every transition consumes the current mode and
//! returns the next one together with the [`Action`] the caller should run.

use crate::models::NodeType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Idle,
    AwaitingConnectionTarget {
        from: String,
    },
    AwaitingPodTarget {
        from: String,
    },
}

/// What the caller should do after a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    None,
    ShowDetails { node: String },
    InitiateConnection { from: String, to: String },
    OpenPodCreation { source: String, dest: String },
    Rejected { reason: String },
}

impl InteractionMode {
    /// Start picking a peer for `from`
    pub fn begin_connection(from: impl Into<String>) -> Self {
        InteractionMode::AwaitingConnectionTarget { from: from.into() }
    }

    /// Start picking a destination for a virtual pod sourced at `from`
    pub fn begin_pod(from: impl Into<String>) -> Self {
        InteractionMode::AwaitingPodTarget { from: from.into() }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionMode::Idle)
    }

    /// The node a pending gesture started from
    pub fn origin(&self) -> Option<&str> {
        match self {
            InteractionMode::Idle => None,
            InteractionMode::AwaitingConnectionTarget { from }
            | InteractionMode::AwaitingPodTarget { from } => Some(from),
        }
    }

    /// Apply a node selection.
    ///
    /// Selecting the origin node again cancels the gesture. Selecting a node
    /// that is not a k3s node is rejected and keeps the mode, so the user can
    /// pick another target.
    pub fn select(self, node: &str, node_type: NodeType) -> (InteractionMode, Action) {
        match self {
            InteractionMode::Idle => (
                InteractionMode::Idle,
                Action::ShowDetails {
                    node: node.to_string(),
                },
            ),
            InteractionMode::AwaitingConnectionTarget { ref from }
            | InteractionMode::AwaitingPodTarget { ref from }
                if from == node =>
            {
                (InteractionMode::Idle, Action::None)
            }
            mode if node_type != NodeType::K3sNode => (
                mode,
                Action::Rejected {
                    reason: format!("{} is not a k3s node", node),
                },
            ),
            InteractionMode::AwaitingConnectionTarget { from } => (
                InteractionMode::Idle,
                Action::InitiateConnection {
                    from,
                    to: node.to_string(),
                },
            ),
            InteractionMode::AwaitingPodTarget { from } => (
                InteractionMode::Idle,
                Action::OpenPodCreation {
                    source: from,
                    dest: node.to_string(),
                },
            ),
        }
    }

    /// Abandon any gesture in progress
    pub fn cancel(self) -> InteractionMode {
        InteractionMode::Idle
    }
}
