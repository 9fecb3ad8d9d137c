use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dbtoria")]
#[command(about = "Browse DbToRia tables over JSON-RPC")]
pub struct Cli {
    /// JSON-RPC endpoint of the DbToRia backend
    #[arg(long, env = "DBTORIA_URL", default_value = "http://localhost:8080/jsonrpc")]
    pub url: String,

    /// Service name placed in every request envelope
    #[arg(long, env = "DBTORIA_SERVICE", default_value = "DbToRia")]
    pub service: String,

    /// Per-request timeout in milliseconds (no timeout when unset)
    #[arg(long, env = "DBTORIA_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the column layout of a table
    Describe { table: String },

    /// Print the number of rows matching an optional filter
    Count {
        table: String,

        /// Filter object as JSON
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Print rows [first, last) as JSON lines
    Rows {
        table: String,

        #[arg(long, default_value_t = 0)]
        first: usize,

        #[arg(long, default_value_t = 50)]
        last: usize,

        /// Column to sort by
        #[arg(short, long)]
        sort: Option<String>,

        /// Sort descending (requires --sort)
        #[arg(long, requires = "sort")]
        desc: bool,

        /// Filter object as JSON
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Delete one row by id
    Delete {
        table: String,

        row_id: String,

        /// Send the id as a string even when it looks numeric
        #[arg(long)]
        text_id: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_arguments_parse() {
        let cli = Cli::try_parse_from([
            "dbtoria", "--url", "http://db:9000/rpc", "rows", "staff", "--first", "10", "--last",
            "20", "--sort", "name", "--desc",
        ])
        .unwrap();
        assert_eq!(cli.url, "http://db:9000/rpc");
        match cli.command {
            Commands::Rows {
                table,
                first,
                last,
                sort,
                desc,
                filter,
            } => {
                assert_eq!(table, "staff");
                assert_eq!((first, last), (10, 20));
                assert_eq!(sort.as_deref(), Some("name"));
                assert!(desc);
                assert!(filter.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn numeric_looking_ids_can_stay_text() {
        let cli = Cli::try_parse_from(["dbtoria", "delete", "staff", "0042", "--text-id"]).unwrap();
        match cli.command {
            Commands::Delete {
                row_id, text_id, ..
            } => {
                assert_eq!(row_id, "0042");
                assert!(text_id);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn desc_needs_a_sort_column() {
        assert!(Cli::try_parse_from(["dbtoria", "rows", "staff", "--desc"]).is_err());
    }
}
