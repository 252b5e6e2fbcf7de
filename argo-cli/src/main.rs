use std::path::PathBuf;

use anyhow::Context;
use argo_config::AppConfig;
use argo_core::bootstrap::{bootstrap, open_relational, seed};
use argo_history::{ConversationLog, JsonlConversationLog};
use argo_types::QueryRequest;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "argo", about = "Ask questions about Argo float telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one question and print the answer.
    Ask {
        message: String,
        #[arg(long = "float")]
        selected_float: Option<String>,
        /// Also print the SQL that was run.
        #[arg(long)]
        show_sql: bool,
    },
    /// Write the default context documents into the configured Qdrant collection.
    Seed,
    /// Print the table catalog and which tables were found on disk.
    Tables,
    History {
        #[command(subcommand)]
        action: HistoryCommand,
        /// Defaults to history.path from the config.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    Tail {
        #[arg(long, default_value_t = 10)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::load()?;
    argo_config::logging::init(&cfg.logging);

    match cli.command {
        Command::Ask {
            message,
            selected_float,
            show_sql,
        } => {
            let services = bootstrap(&cfg).await?;
            let resolution = services
                .resolver
                .resolve(&QueryRequest::new(message, selected_float))
                .await;
            if show_sql {
                if let Some(sql) = &resolution.sql {
                    println!("SQL: {sql}\n");
                }
            }
            println!("{}", resolution.response);
        }
        Command::Seed => {
            let written = seed(&cfg).await?;
            println!("seeded {written} documents into {}", cfg.context.collection);
        }
        Command::Tables => {
            println!("{}", argo_schema::schema_description());
            let store = open_relational(&cfg).await?;
            println!(
                "\nloaded from {}: {}",
                cfg.database.data_dir.display(),
                store.tables().join(", ")
            );
        }
        Command::History { action, path } => match action {
            HistoryCommand::Tail { lines } => {
                let path = path
                    .or_else(|| cfg.history.path.clone())
                    .context("no history file: pass --path or set history.path")?;
                let log = JsonlConversationLog::open(&path);
                for entry in log.tail(lines)? {
                    println!("[{}] User: {}", entry.timestamp, entry.user_message);
                    println!("Assistant: {}\n", entry.ai_response);
                }
            }
        },
    }

    Ok(())
}
