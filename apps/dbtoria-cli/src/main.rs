mod cli;
mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dbtoria_rpc::{DbClient, FilterSpec, HttpTransport, RowId, SortSpec};
use dbtoria_table::{ModelConfig, RemotePagedModel, TableDescriptor};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::resolve(&cli)?;
    telemetry::init_tracing(&config.log_filter);
    debug!(endpoint = %config.endpoint, service = %config.service, "dbtoria client starting");

    let transport = match config.timeout {
        Some(timeout) => {
            HttpTransport::with_timeout(config.endpoint.clone(), &config.service, timeout)?
        }
        None => HttpTransport::new(config.endpoint.clone(), &config.service),
    };
    let client = DbClient::new(Arc::new(transport));

    match cli.command {
        Commands::Describe { table } => describe(&client, &table).await,
        Commands::Count { table, filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let count = client.get_num_rows(&table, filter.as_ref()).await?;
            println!("{count}");
            Ok(())
        }
        Commands::Rows {
            table,
            first,
            last,
            sort,
            desc,
            filter,
        } => {
            let sort = sort.map(|column| {
                if desc {
                    SortSpec::descending(column)
                } else {
                    SortSpec::ascending(column)
                }
            });
            let filter = parse_filter(filter.as_deref())?;
            rows(client, config.model, &table, first..last, sort, filter).await
        }
        Commands::Delete {
            table,
            row_id,
            text_id,
        } => {
            let row_id = parse_row_id(&row_id, text_id);
            let ack = client.delete_table_data(&table, &row_id).await?;
            info!(table = %table, row = %row_id, "row deleted");
            println!("{}", serde_json::to_string(&ack)?);
            Ok(())
        }
    }
}

async fn describe(client: &DbClient, table: &str) -> Result<()> {
    let descriptor = TableDescriptor::load(client, table).await?;
    let columns: Vec<Value> = descriptor
        .visible_columns()
        .map(|id| json!({ "id": id, "label": descriptor.label(id).unwrap_or(id) }))
        .collect();
    let out = json!({
        "tableId": descriptor.table_id(),
        "rowInfo": descriptor.has_row_info(),
        "columns": columns,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn rows(
    client: DbClient,
    model_config: ModelConfig,
    table: &str,
    window: std::ops::Range<usize>,
    sort: Option<SortSpec>,
    filter: Option<FilterSpec>,
) -> Result<()> {
    let model = RemotePagedModel::open(client, table, model_config).await?;
    model.set_sort(sort);
    model.set_viewport(window.start, window.end)?;
    let loaded = model.set_filter(filter).await?;

    debug!(
        total = model.row_count().unwrap_or(0),
        first = loaded.first,
        last = loaded.last(),
        "printing rows"
    );
    for row in loaded.rows {
        let mut record: serde_json::Map<String, Value> = model
            .descriptor()
            .visible_columns()
            .map(|id| (id.to_string(), row.get(id).cloned().unwrap_or(Value::Null)))
            .collect();
        if let Some(info) = row.info {
            record.insert("_rowId".into(), info.row_id.to_value());
            record.insert("_canEdit".into(), Value::Bool(info.can_edit));
            record.insert("_canDelete".into(), Value::Bool(info.can_delete));
        }
        println!("{}", serde_json::to_string(&Value::Object(record))?);
    }
    Ok(())
}

/// Integer-looking ids go out as numbers unless `as_text` is set.
fn parse_row_id(raw: &str, as_text: bool) -> RowId {
    match raw.parse::<i64>() {
        Ok(id) if !as_text => RowId::Int(id),
        _ => RowId::Text(raw.to_string()),
    }
}

fn parse_filter(raw: Option<&str>) -> Result<Option<FilterSpec>> {
    raw.map(|text| {
        serde_json::from_str::<Value>(text)
            .map(FilterSpec::new)
            .with_context(|| format!("filter is not valid JSON: {text}"))
    })
    .transpose()
}
