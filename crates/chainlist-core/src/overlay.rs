//! Confirmed tasks plus the speculative edits layered on top of them.
//!
//! Each edit carries a client-generated correlation id. Resolving a mutation either
//! commits its edit into the confirmed list or discards it; the rendered list is always
//! the composition of the two.

use chainlist_shared::{Task, TaskId};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    /// Shown immediately, prepended to the list.
    AddTask(Task),
    /// Tracked but not rendered until committed.
    CompleteTask(TaskId),
}

#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub correlation_id: Uuid,
    pub kind: EditKind,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PendingOverlay {
    confirmed: Vec<Task>,
    edits: Vec<PendingEdit>,
}

impl PendingOverlay {
    pub fn new(confirmed: Vec<Task>) -> Self {
        Self {
            confirmed,
            edits: vec![],
        }
    }

    /// Authoritative replace; outstanding edits no longer apply.
    pub fn replace_confirmed(&mut self, tasks: Vec<Task>) {
        if !self.edits.is_empty() {
            debug!(dropped = self.edits.len(), "dropping speculative edits on replace");
        }
        self.confirmed = tasks;
        self.edits.clear();
    }

    pub fn push(&mut self, kind: EditKind) -> Uuid {
        let correlation_id = Uuid::new_v4();
        self.edits.push(PendingEdit {
            correlation_id,
            kind,
            applied_at: Utc::now(),
        });
        correlation_id
    }

    /// Folds the edit into the confirmed list. False when it is unknown.
    pub fn commit(&mut self, correlation_id: Uuid) -> bool {
        let Some(edit) = self.take(correlation_id) else {
            return false;
        };
        match edit.kind {
            EditKind::AddTask(task) => self.confirmed.insert(0, task),
            EditKind::CompleteTask(task_id) => {
                if let Some(task) = self.confirmed.iter_mut().find(|t| t.task_id == task_id) {
                    task.completed = true;
                }
            }
        }
        true
    }

    pub fn discard(&mut self, correlation_id: Uuid) -> bool {
        self.take(correlation_id).is_some()
    }

    pub fn pending(&self) -> &[PendingEdit] {
        &self.edits
    }

    pub fn confirmed(&self) -> &[Task] {
        &self.confirmed
    }

    pub fn view(&self) -> Vec<Task> {
        let mut tasks = self.confirmed.clone();
        for edit in &self.edits {
            if let EditKind::AddTask(task) = &edit.kind {
                tasks.insert(0, task.clone());
            }
        }
        tasks
    }

    /// Looks through confirmed tasks and speculative additions.
    pub fn find(&self, task_id: TaskId) -> Option<&Task> {
        self.confirmed.iter().find(|t| t.task_id == task_id).or_else(|| {
            self.edits.iter().find_map(|edit| match &edit.kind {
                EditKind::AddTask(task) if task.task_id == task_id => Some(task),
                _ => None,
            })
        })
    }

    pub fn is_completion_pending(&self, task_id: TaskId) -> bool {
        self.edits
            .iter()
            .any(|edit| edit.kind == EditKind::CompleteTask(task_id))
    }

    /// One past the highest id shown, counting speculative additions.
    pub fn next_task_id(&self) -> TaskId {
        self.view()
            .iter()
            .map(|t| t.task_id)
            .max()
            .map(TaskId::next)
            .unwrap_or(TaskId::FIRST)
    }

    fn take(&mut self, correlation_id: Uuid) -> Option<PendingEdit> {
        let idx = self
            .edits
            .iter()
            .position(|edit| edit.correlation_id == correlation_id)?;
        Some(self.edits.remove(idx))
    }
}
