//! Table core for DbToRia clients.
//!
//! [`RemotePagedModel`] is the row source behind a virtualized grid: it owns
//! the cached row count and row windows of one server table and turns grid
//! viewport, sort and filter requests into RPC calls.
//! [`RecordLifecycleController`] keeps the "current record" consistent
//! between the grid selection, the toolbar affordances and an external
//! record editor across create/clone/edit/delete round trips.

use thiserror::Error;

pub mod affordance;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod editor;
pub mod model;
pub mod row;

pub use affordance::{AccessMode, Affordances, ToolbarAction};
pub use config::ModelConfig;
pub use controller::{
    ActionOutcome, ControllerError, ControllerEvent, ControllerResult, Mutation, Phase,
    RecordLifecycleController, SelectionState,
};
pub use descriptor::{TableDescriptor, ROWINFO_COLUMN};
pub use editor::{Navigation, RecordEditor, SaveOutcome};
pub use model::{ModelEvent, RemotePagedModel, RowWindow};
pub use row::{reshape_row, reshape_rows, Record, Row, RowInfo};

pub use dbtoria_rpc::{FilterSpec, RowId, SortSpec};

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Rpc(#[from] dbtoria_rpc::RpcError),
    #[error("invalid row window [{first}, {last})")]
    InvalidWindow { first: usize, last: usize },
}

pub type TableResult<T> = Result<T, TableError>;
