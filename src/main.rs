//! Read-only inspector over the persisted error log.
//!
//! Exit code 0 when the requested data was found, 1 when not.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mailguard::config::StoreConfig;
use mailguard::model::{ErrorCategory, ErrorRecord, ErrorSeverity};
use mailguard::store::{ErrorFilter, ErrorStore, LibSqlStore};

#[derive(Parser)]
#[command(name = "mailguard", about = "Inspect recorded errors", version)]
struct Cli {
    /// Path to the error database (defaults to MAILGUARD_DB_PATH or
    /// ./data/errors.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List recent errors, newest first.
    List {
        /// Filter by category (imap, ai, validation, ...).
        #[arg(long)]
        category: Option<ErrorCategory>,
        /// Filter by severity (low, medium, high, critical).
        #[arg(long)]
        severity: Option<ErrorSeverity>,
        /// Only resolved errors.
        #[arg(long, conflicts_with = "unresolved")]
        resolved: bool,
        /// Only unresolved errors.
        #[arg(long)]
        unresolved: bool,
        /// Maximum number of rows.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one error in full, including traceback and context.
    Show {
        /// Record ID or unique ID prefix.
        id: String,
    },
    /// Aggregate counts over the whole store.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| StoreConfig::from_env().db_path);
    let store = LibSqlStore::new_local(&db_path).await?;

    let found = match cli.command {
        Command::List {
            category,
            severity,
            resolved,
            unresolved,
            limit,
        } => {
            let mut filter = ErrorFilter::new();
            filter.category = category;
            filter.severity = severity;
            if resolved {
                filter.resolved = Some(true);
            } else if unresolved {
                filter.resolved = Some(false);
            }

            let records = store.get_recent_errors(limit, &filter).await?;
            for record in &records {
                print_row(record);
            }
            if records.is_empty() {
                eprintln!("No matching errors.");
            }
            !records.is_empty()
        }
        Command::Show { id } => match store.get_error_by_prefix(&id).await? {
            Some(record) => {
                print_full(&record);
                true
            }
            None => {
                eprintln!("No error matching '{id}'.");
                false
            }
        },
        Command::Stats => {
            let stats = store.get_error_stats().await?;
            println!("total:                {}", stats.total);
            println!("resolved:             {}", stats.resolved);
            println!("unresolved:           {}", stats.unresolved);
            println!("recovery attempted:   {}", stats.recovery_attempted);
            println!("recovery successful:  {}", stats.recovery_successful);

            let mut by_category: Vec<_> = stats.by_category.iter().collect();
            by_category.sort_by(|a, b| b.1.cmp(a.1));
            if !by_category.is_empty() {
                println!("\nby category:");
                for (category, count) in by_category {
                    println!("  {:<14} {}", category.as_str(), count);
                }
            }

            let mut by_severity: Vec<_> = stats.by_severity.iter().collect();
            by_severity.sort_by(|a, b| b.0.cmp(a.0));
            if !by_severity.is_empty() {
                println!("\nby severity:");
                for (severity, count) in by_severity {
                    println!("  {:<14} {}", severity.as_str(), count);
                }
            }
            stats.total > 0
        }
    };

    if !found {
        std::process::exit(1);
    }
    Ok(())
}

fn print_row(record: &ErrorRecord) {
    let resolution = if record.resolved {
        "resolved"
    } else if record.recovery_attempted {
        "recovering"
    } else {
        "open"
    };
    println!(
        "{}  {}  {:<8} {:<10} {}/{}  {}",
        record.id,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.severity.as_str(),
        resolution,
        record.component,
        record.operation,
        record.exception_message
    );
}

fn print_full(record: &ErrorRecord) {
    println!("id:              {}", record.id);
    println!("timestamp:       {}", record.timestamp.to_rfc3339());
    println!("category:        {}", record.category);
    println!("severity:        {}", record.severity);
    println!("component:       {}", record.component);
    println!("operation:       {}", record.operation);
    println!("exception type:  {}", record.exception_type);
    println!("message:         {}", record.exception_message);
    println!("strategy:        {}", record.recovery_strategy);
    println!(
        "recovery:        attempted={} successful={:?} attempts={}/{}",
        record.recovery_attempted,
        record.recovery_successful,
        record.recovery_attempts,
        record.max_recovery_attempts
    );
    println!("resolved:        {}", record.resolved);
    if let Some(resolved_at) = record.resolved_at {
        println!("resolved at:     {}", resolved_at.to_rfc3339());
    }
    if !record.notes.is_empty() {
        println!("notes:           {}", record.notes);
    }
    if !record.context.is_empty() {
        println!("\ncontext:");
        for (key, value) in record.context.iter() {
            println!("  {key}: {value}");
        }
    }
    if !record.traceback.is_empty() {
        println!("\ntraceback:\n{}", record.traceback);
    }
}
