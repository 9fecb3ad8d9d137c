use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbtoria_rpc::client::{METHOD_DATA_CHUNK, METHOD_DELETE, METHOD_NUM_ROWS};
use dbtoria_rpc::{ColumnSpec, DbClient, FilterSpec, MemoryTable, MemoryTransport};
use dbtoria_table::{
    AccessMode, ModelConfig, Navigation, RecordEditor, RecordLifecycleController,
    RemotePagedModel, RowId, SaveOutcome, ROWINFO_COLUMN,
};
use serde_json::json;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Default)]
struct RecordingEditor {
    open: AtomicBool,
    opened: Mutex<Vec<RowId>>,
}

#[async_trait]
impl RecordEditor for RecordingEditor {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn save_record(&self) -> SaveOutcome {
        SaveOutcome::Unchanged
    }

    async fn edit_record(&self, row_id: RowId) {
        self.opened.lock().unwrap().push(row_id);
        self.open.store(true, Ordering::SeqCst);
    }

    async fn clone_record(&self, row_id: RowId) {
        self.opened.lock().unwrap().push(row_id);
        self.open.store(true, Ordering::SeqCst);
    }

    async fn new_record(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

async fn open_window(
    transport: Arc<MemoryTransport>,
    editor: Arc<RecordingEditor>,
) -> Result<RecordLifecycleController, Box<dyn std::error::Error>> {
    let client = DbClient::new(transport);
    let model = RemotePagedModel::open(client, "staff", ModelConfig::default()).await?;
    Ok(RecordLifecycleController::new(
        Arc::new(model),
        editor,
        AccessMode::Editable,
        "staff",
    ))
}

fn staff(ids: &[i64]) -> Arc<MemoryTransport> {
    let transport = MemoryTransport::new();
    let mut table = MemoryTable::new(
        "staff",
        vec![
            ColumnSpec::new(ROWINFO_COLUMN, ""),
            ColumnSpec::new("id", "Id"),
            ColumnSpec::new("name", "Name"),
        ],
    );
    for id in ids {
        table.push_row(vec![
            json!([id, true, true]),
            json!(id),
            json!(format!("person {id}")),
        ]);
    }
    transport.insert_table(table);
    transport
}

#[tokio::test]
async fn deleting_the_selected_row_advances_to_its_successor() -> TestResult {
    let transport = staff(&[10, 11, 12]);
    let controller = open_window(transport.clone(), Arc::new(RecordingEditor::default())).await?;
    let model = controller.model().clone();
    model.request_row_count().await?;
    model.request_row_window(0, 3).await?;

    controller.select(Some(1)).await?;
    assert_eq!(controller.selection().current_id, Some(RowId::Int(11)));

    let current = controller.delete_record().await?;

    assert_eq!(current, Some(RowId::Int(12)));
    assert_eq!(controller.selection().index, Some(1));
    let local: Vec<RowId> = (0..2)
        .filter_map(|i| model.row(i).and_then(|row| row.id().cloned()))
        .collect();
    assert_eq!(local, vec![RowId::Int(10), RowId::Int(12)]);
    assert_eq!(model.row_count(), Some(2));
    assert_eq!(transport.calls_to(METHOD_DELETE), 1);
    assert_eq!(transport.rows("staff").len(), 2);
    Ok(())
}

#[tokio::test]
async fn filtering_then_walking_the_editor_through_rows() -> TestResult {
    let transport = staff(&[1, 2, 3, 4, 5]);
    let editor = Arc::new(RecordingEditor::default());
    let controller = open_window(transport.clone(), editor.clone()).await?;
    let model = controller.model().clone();
    model.request_row_window(0, 5).await?;
    transport.clear_calls();

    model
        .set_filter(Some(FilterSpec::new(json!({ "name": "person 4" }))))
        .await?;
    assert_eq!(transport.calls_to(METHOD_NUM_ROWS), 1);
    assert_eq!(transport.calls_to(METHOD_DATA_CHUNK), 1);
    assert_eq!(model.row_count(), Some(1));

    controller.navigate(Navigation::First).await?;
    controller.edit_record().await?;
    controller.navigate(Navigation::Next).await?;

    let opened = editor.opened.lock().unwrap().clone();
    assert_eq!(opened, vec![RowId::Int(4), RowId::Int(4)]);
    assert!(controller.close().is_err());

    model.set_filter(None).await?;
    controller.refresh().await?;
    assert_eq!(model.row_count(), Some(5));
    assert_eq!(controller.selection().current_id, None);
    Ok(())
}
