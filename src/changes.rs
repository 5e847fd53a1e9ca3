//! Per-task change notifications.
//!
//! Subscribers register interest in a single task and receive only the changes
//! published for it. Delivery is over `std::sync::mpsc`, so a subscriber can
//! live on another thread and drain at its own pace.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use serde::Serialize;

use crate::model::ItemKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Subtask,
    Checklist,
    Status,
    Progress,
    /// Written by another process; detected by watching the database.
    External,
}

impl From<ItemKind> for ChangeKind {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Subtask => Self::Subtask,
            ItemKind::Checklist => Self::Checklist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub task: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(task: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            task: task.into(),
            kind,
        }
    }
}

#[derive(Default)]
pub struct ChangeBus {
    subscribers: Mutex<HashMap<String, Vec<Sender<Change>>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, task: &str) -> Receiver<Change> {
        let (tx, rx) = mpsc::channel();
        self.lock().entry(task.to_string()).or_default().push(tx);
        rx
    }

    /// Deliver `change` to every live subscriber of its task. Returns the
    /// number of subscribers reached.
    pub fn publish(&self, change: Change) -> usize {
        let mut subscribers = self.lock();
        let Some(senders) = subscribers.get_mut(&change.task) else {
            return 0;
        };
        senders.retain(|tx| tx.send(change.clone()).is_ok());
        let reached = senders.len();
        if senders.is_empty() {
            subscribers.remove(&change.task);
        }
        reached
    }

    pub fn subscriber_count(&self, task: &str) -> usize {
        self.lock().get(task).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Sender<Change>>>> {
        // A poisoned map is still structurally sound; keep delivering.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drains any pending changes from the receiver.
pub fn drain(rx: &Receiver<Change>) -> Vec<Change> {
    rx.try_iter().collect()
}
