use async_trait::async_trait;
use serde::Serialize;

use crate::model::{ActingUser, Carnival};

/// Side effects announced after a mutation has committed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CarnivalEvent {
    /// A manual submission took over an imported carnival.
    Merged { carnival: Carnival, actor: ActingUser },
    Claimed { carnival: Carnival, actor: ActingUser },
    Released { carnival: Carnival, actor: ActingUser },
}

impl CarnivalEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CarnivalEvent::Merged { .. } => "merged",
            CarnivalEvent::Claimed { .. } => "claimed",
            CarnivalEvent::Released { .. } => "released",
        }
    }

    pub fn carnival(&self) -> &Carnival {
        match self {
            CarnivalEvent::Merged { carnival, .. }
            | CarnivalEvent::Claimed { carnival, .. }
            | CarnivalEvent::Released { carnival, .. } => carnival,
        }
    }

    pub fn actor(&self) -> &ActingUser {
        match self {
            CarnivalEvent::Merged { actor, .. }
            | CarnivalEvent::Claimed { actor, .. }
            | CarnivalEvent::Released { actor, .. } => actor,
        }
    }
}

pub type NotifyResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait CarnivalNotifier: Send + Sync {
    async fn notify(&self, event: &CarnivalEvent) -> NotifyResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl CarnivalNotifier for NoopNotifier {
    async fn notify(&self, _event: &CarnivalEvent) -> NotifyResult {
        Ok(())
    }
}
