use std::sync::Arc;

use dbtoria_rpc::RpcError;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::affordance::{AccessMode, Affordances};
use crate::editor::{Navigation, RecordEditor, SaveOutcome};
use crate::model::RemotePagedModel;
use crate::row::Row;
use crate::{RowId, TableError};

/// Record actions that need a server round trip before the grid is known to
/// be consistent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    New,
    Clone,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    EditorOpen,
    MutationPending(Mutation),
}

/// Result of a new/edit/clone request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The editor was pointed at the record; `reloaded` tells whether saving
    /// the previous edits forced a grid reload first.
    EditorOpened { reloaded: bool },
    /// Saving the previous edits was rejected; nothing changed.
    Aborted(SaveOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Sent on every selection update, including reselection of the same
    /// row, so listeners can resynchronize.
    SelectionChanged {
        index: Option<usize>,
        row_id: Option<RowId>,
    },
    AffordancesChanged(Affordances),
    Loading(bool),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("no record selected")]
    NoSelection,
    #[error("{action:?} is not permitted on row {row_id}")]
    NotPermitted { action: Mutation, row_id: RowId },
    #[error("records cannot be modified in {0:?} mode")]
    ReadOnly(AccessMode),
    #[error("a {0:?} action is still pending")]
    MutationPending(Mutation),
    #[error("Unsaved data. You must first close the record edit window.")]
    UnsavedEdits,
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// The grid's current record as the controller sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub index: Option<usize>,
    pub current_id: Option<RowId>,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl SelectionState {
    pub fn none() -> Self {
        Self::default()
    }

    /// Selection of row `index`. A missing row clears the selection; a row
    /// without row info stays selected but enables nothing.
    pub fn at(index: usize, row: Option<&Row>) -> Self {
        match row {
            None => Self::none(),
            Some(row) => match &row.info {
                Some(info) => Self {
                    index: Some(index),
                    current_id: Some(info.row_id.clone()),
                    can_edit: info.can_edit,
                    can_delete: info.can_delete,
                },
                None => Self {
                    index: Some(index),
                    ..Self::none()
                },
            },
        }
    }

    pub fn has_selection(&self) -> bool {
        self.current_id.is_some()
    }

    pub fn affordances(&self) -> Affordances {
        Affordances::derive(self.can_edit, self.can_delete, self.has_selection())
    }
}

struct ControllerInner {
    selection: SelectionState,
    pending: Option<Mutation>,
}

/// Clears the pending mutation when the action finishes, however it ends.
struct PendingGuard<'a> {
    inner: &'a Mutex<ControllerInner>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().pending = None;
    }
}

/// Keeps one "current record" consistent across the grid selection, the
/// toolbar affordances and the record editor.
pub struct RecordLifecycleController {
    model: Arc<RemotePagedModel>,
    editor: Arc<dyn RecordEditor>,
    mode: AccessMode,
    table_name: String,
    inner: Mutex<ControllerInner>,
    events: broadcast::Sender<ControllerEvent>,
}

impl RecordLifecycleController {
    pub fn new(
        model: Arc<RemotePagedModel>,
        editor: Arc<dyn RecordEditor>,
        mode: AccessMode,
        table_name: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            model,
            editor,
            mode,
            table_name: table_name.into(),
            inner: Mutex::new(ControllerInner {
                selection: SelectionState::none(),
                pending: None,
            }),
            events,
        }
    }

    pub fn model(&self) -> &Arc<RemotePagedModel> {
        &self.model
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn caption(&self) -> String {
        self.mode.caption(&self.table_name)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn selection(&self) -> SelectionState {
        self.inner.lock().selection.clone()
    }

    pub fn affordances(&self) -> Affordances {
        self.inner.lock().selection.affordances()
    }

    pub fn phase(&self) -> Phase {
        if let Some(mutation) = self.inner.lock().pending {
            return Phase::MutationPending(mutation);
        }
        if self.editor.is_open() {
            Phase::EditorOpen
        } else {
            Phase::Idle
        }
    }

    /// Grid selection changed. While the editor is open it follows the new
    /// row.
    pub async fn select(&self, index: Option<usize>) -> ControllerResult<()> {
        if !self.mode.tracks_selection() {
            debug!(target = "dbtoria.controller", ?index, "selection ignored in view mode");
            return Ok(());
        }
        let selection = match index {
            Some(index) => {
                let row = self.model.row_at(index).await?;
                SelectionState::at(index, row.as_ref())
            }
            None => SelectionState::none(),
        };
        self.apply_selection(selection);
        self.retarget_editor().await
    }

    pub fn clear_selection(&self) {
        self.apply_selection(SelectionState::none());
    }

    pub async fn new_record(&self) -> ControllerResult<ActionOutcome> {
        self.ensure_mutable()?;
        let _pending = self.begin(Mutation::New)?;
        let reloaded = match self.save_pending(Mutation::New).await? {
            Ok(reloaded) => reloaded,
            Err(outcome) => return Ok(ActionOutcome::Aborted(outcome)),
        };
        self.apply_selection(SelectionState::none());
        self.editor.new_record().await;
        info!(target = "dbtoria.controller", reloaded, "editor opened on a blank record");
        Ok(ActionOutcome::EditorOpened { reloaded })
    }

    pub async fn edit_record(&self) -> ControllerResult<ActionOutcome> {
        self.open_session(Mutation::Edit).await
    }

    pub async fn clone_record(&self) -> ControllerResult<ActionOutcome> {
        self.ensure_mutable()?;
        self.open_session(Mutation::Clone).await
    }

    /// Deletes the current record, then drops it from the local window
    /// instead of reloading: the rows below shift up and the row now at the
    /// same index becomes current.
    pub async fn delete_record(&self) -> ControllerResult<Option<RowId>> {
        self.ensure_mutable()?;
        let _pending = self.begin(Mutation::Delete)?;
        let (index, row_id) = {
            let inner = self.inner.lock();
            let selection = &inner.selection;
            match (selection.index, selection.current_id.clone()) {
                (Some(index), Some(row_id)) if selection.can_delete => (index, row_id),
                (Some(_), Some(row_id)) => {
                    return Err(ControllerError::NotPermitted {
                        action: Mutation::Delete,
                        row_id,
                    })
                }
                _ => return Err(ControllerError::NoSelection),
            }
        };

        let table_id = self.model.descriptor().table_id();
        self.model
            .client()
            .delete_table_data(table_id, &row_id)
            .await?;
        info!(target = "dbtoria.controller", table_id, %row_id, index, "record deleted");

        self.model.remove_row(index);
        let next = match self.model.row_at(index).await {
            Ok(row) => row,
            Err(err) => {
                warn!(
                    target = "dbtoria.controller",
                    index,
                    error = %err,
                    "could not load the row following a delete"
                );
                None
            }
        };
        let selection = SelectionState::at(index, next.as_ref());
        let current = selection.current_id.clone();
        self.apply_selection(selection);
        Ok(current)
    }

    /// Reloads the grid. The selection survives only if the same record is
    /// still at the selected index afterwards.
    pub async fn refresh(&self) -> ControllerResult<()> {
        let _ = self.events.send(ControllerEvent::Loading(true));
        let result = self.reload_preserving_selection().await;
        let _ = self.events.send(ControllerEvent::Loading(false));
        result
    }

    /// Moves the selection; returns the index that is now selected.
    pub async fn navigate(&self, target: Navigation) -> ControllerResult<Option<usize>> {
        if target == Navigation::New {
            self.new_record().await?;
            return Ok(None);
        }
        if !self.mode.tracks_selection() {
            return Ok(None);
        }
        let row_count = match self.model.row_count() {
            Some(count) => count,
            None => self.model.request_row_count().await?,
        };
        let current = self.inner.lock().selection.index.unwrap_or(0);
        let Some(index) = target_index(target, current, row_count) else {
            return Ok(None);
        };
        debug!(target = "dbtoria.controller", nav = %target, current, index, row_count, "navigating");
        self.select(Some(index)).await?;
        Ok(Some(index))
    }

    /// Closes the editor. Refused while an editable table still has the
    /// editor open, so pending edits are not silently dropped.
    pub fn close(&self) -> ControllerResult<()> {
        if self.mode.allows_mutation() && self.editor.is_open() {
            warn!(target = "dbtoria.controller", "close refused with open editor");
            return Err(ControllerError::UnsavedEdits);
        }
        self.editor.close();
        Ok(())
    }

    async fn open_session(&self, mutation: Mutation) -> ControllerResult<ActionOutcome> {
        let _pending = self.begin(mutation)?;
        let row_id = {
            let inner = self.inner.lock();
            let selection = &inner.selection;
            let row_id = selection
                .current_id
                .clone()
                .ok_or(ControllerError::NoSelection)?;
            if !selection.can_edit {
                return Err(ControllerError::NotPermitted {
                    action: mutation,
                    row_id,
                });
            }
            row_id
        };

        self.point_editor(mutation, row_id).await
    }

    /// Saves what the editor holds, then opens it on `row_id`.
    async fn point_editor(
        &self,
        mutation: Mutation,
        row_id: RowId,
    ) -> ControllerResult<ActionOutcome> {
        let reloaded = match self.save_pending(mutation).await? {
            Ok(reloaded) => reloaded,
            Err(outcome) => return Ok(ActionOutcome::Aborted(outcome)),
        };
        match mutation {
            Mutation::Clone => self.editor.clone_record(row_id.clone()).await,
            _ => self.editor.edit_record(row_id.clone()).await,
        }
        info!(target = "dbtoria.controller", action = ?mutation, %row_id, reloaded, "editor opened");
        Ok(ActionOutcome::EditorOpened { reloaded })
    }

    /// Asks the editor to persist what it holds. `Ok(reloaded)` to go on,
    /// `Err(outcome)` when the save was rejected.
    async fn save_pending(&self, mutation: Mutation) -> ControllerResult<Result<bool, SaveOutcome>> {
        let outcome = self.editor.save_record().await;
        match outcome {
            SaveOutcome::Failed | SaveOutcome::Invalid => {
                info!(target = "dbtoria.controller", action = ?mutation, ?outcome, "action aborted");
                Ok(Err(outcome))
            }
            SaveOutcome::Succeeded => {
                self.reload_preserving_selection().await?;
                Ok(Ok(true))
            }
            SaveOutcome::Unchanged => Ok(Ok(false)),
        }
    }

    async fn reload_preserving_selection(&self) -> ControllerResult<()> {
        let before = self.selection();
        self.model.reload().await?;

        if let (Some(index), Some(row_id)) = (before.index, before.current_id.as_ref()) {
            let row = self.model.row_at(index).await?;
            if row.as_ref().and_then(Row::id) == Some(row_id) {
                debug!(target = "dbtoria.controller", index, %row_id, "selection survived reload");
            } else {
                let cleared = {
                    let mut inner = self.inner.lock();
                    let unchanged = inner.selection == before;
                    if unchanged {
                        inner.selection = SelectionState::none();
                    }
                    unchanged
                };
                if cleared {
                    debug!(target = "dbtoria.controller", index, %row_id, "selected record moved; selection cleared");
                    let _ = self.events.send(ControllerEvent::SelectionChanged {
                        index: None,
                        row_id: None,
                    });
                }
            }
        }
        let _ = self
            .events
            .send(ControllerEvent::AffordancesChanged(self.affordances()));
        Ok(())
    }

    /// An open editor follows the selected record, whatever its edit flag.
    async fn retarget_editor(&self) -> ControllerResult<()> {
        let Some(row_id) = self.inner.lock().selection.current_id.clone() else {
            return Ok(());
        };
        if !self.editor.is_open() {
            return Ok(());
        }
        let Ok(_pending) = self.begin(Mutation::Edit) else {
            return Ok(());
        };
        self.point_editor(Mutation::Edit, row_id).await.map(|_| ())
    }

    fn apply_selection(&self, selection: SelectionState) {
        let event = ControllerEvent::SelectionChanged {
            index: selection.index,
            row_id: selection.current_id.clone(),
        };
        let affordances = selection.affordances();
        self.inner.lock().selection = selection;
        let _ = self.events.send(event);
        let _ = self
            .events
            .send(ControllerEvent::AffordancesChanged(affordances));
    }

    fn begin(&self, mutation: Mutation) -> ControllerResult<PendingGuard<'_>> {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.pending {
            return Err(ControllerError::MutationPending(pending));
        }
        inner.pending = Some(mutation);
        Ok(PendingGuard { inner: &self.inner })
    }

    fn ensure_mutable(&self) -> ControllerResult<()> {
        if self.mode.allows_mutation() {
            Ok(())
        } else {
            Err(ControllerError::ReadOnly(self.mode))
        }
    }
}

/// Index selected by `target` from `current`, clamped to `[0, row_count)`.
fn target_index(target: Navigation, current: usize, row_count: usize) -> Option<usize> {
    let last = row_count.checked_sub(1)?;
    let current = current.min(last);
    match target {
        Navigation::First => Some(0),
        Navigation::Back => Some(current.saturating_sub(1)),
        Navigation::Next => Some((current + 1).min(last)),
        Navigation::Last => Some(last),
        Navigation::New => None,
    }
}
