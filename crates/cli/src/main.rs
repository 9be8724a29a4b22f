//! DataJob CLI - submit imports/exports and inspect jobs through the daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9600";

#[derive(Parser)]
#[command(name = "datajob")]
#[command(about = "DataJob import/export CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "DATAJOB_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderBy {
    Id,
    Name,
    Email,
    CreatedAt,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Asc,
    Desc,
}

#[derive(Subcommand)]
enum Commands {
    /// Import users from a spreadsheet (xlsx, xls or csv)
    Import {
        /// Spreadsheet to upload
        file: PathBuf,

        /// Requesting user
        #[arg(short, long)]
        user_id: i64,
    },

    /// Export users matching the filters to a spreadsheet
    Export {
        /// Requesting user
        #[arg(short, long)]
        user_id: i64,

        /// Substring of name, email or phone
        #[arg(short, long)]
        search: Option<String>,

        /// Only active (true) or inactive (false) users
        #[arg(long)]
        active: Option<bool>,

        /// Only users with this role
        #[arg(short, long)]
        role: Option<String>,

        #[arg(long, value_enum)]
        order_by: Option<OrderBy>,

        #[arg(long, value_enum)]
        direction: Option<Direction>,
    },

    /// Show one job
    Status {
        job_id: String,
    },

    /// List a user's jobs, newest first
    Jobs {
        #[arg(short, long)]
        user_id: i64,
    },

    /// Show daemon statistics
    Stats,

    /// Delete completed jobs older than the retention period
    Cleanup {
        /// Retention period in days
        #[arg(short, long, default_value = "30")]
        days: i64,

        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    #[tabled(rename = "type")]
    job_type: String,
    status: String,
    progress: String,
    success: String,
    errors: String,
}

fn count(value: &Value) -> String {
    value.as_i64().map_or_else(|| "-".to_string(), |n| n.to_string())
}

impl From<&Value> for JobRow {
    fn from(job: &Value) -> Self {
        Self {
            job_id: job["job_id"].as_str().unwrap_or_default().to_string(),
            job_type: job["type"].as_str().unwrap_or_default().to_string(),
            status: job["status"].as_str().unwrap_or_default().to_string(),
            progress: format!("{}%", job["progress_percentage"].as_i64().unwrap_or(0)),
            success: count(&job["success_count"]),
            errors: count(&job["error_count"]),
        }
    }
}

fn colored_status(status: &str) -> colored::ColoredString {
    match status {
        "completed" => status.green(),
        "failed" => status.red(),
        "processing" => status.yellow(),
        _ => status.normal(),
    }
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn export_params(
    user_id: i64,
    search: Option<String>,
    active: Option<bool>,
    role: Option<String>,
    order_by: Option<OrderBy>,
    direction: Option<Direction>,
) -> Value {
    let mut params = json!({ "user_id": user_id });
    if let Some(search) = search {
        params["search"] = json!(search);
    }
    if let Some(active) = active {
        params["is_active"] = json!(active);
    }
    if let Some(role) = role {
        params["role_name"] = json!(role);
    }
    if let Some(order_by) = order_by {
        params["order_by"] = json!(match order_by {
            OrderBy::Id => "id",
            OrderBy::Name => "name",
            OrderBy::Email => "email",
            OrderBy::CreatedAt => "created_at",
        });
    }
    if let Some(direction) = direction {
        params["order_direction"] = json!(match direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        });
    }
    params
}

fn print_submitted(what: &str, result: Value) -> Result<()> {
    let submitted: SubmitResult = serde_json::from_value(result)?;
    println!("{}", format!("✓ {} queued", what).green().bold());
    println!();
    println!("{}", Table::new(vec![submitted]));
    Ok(())
}

fn print_job(job: &Value) {
    let status = job["status"].as_str().unwrap_or_default();
    println!("  {} {}", "Job:".bold(), job["job_id"].as_str().unwrap_or_default());
    println!("  {} {}", "Type:".bold(), job["type"].as_str().unwrap_or_default());
    println!("  {} {}", "Status:".bold(), colored_status(status));
    println!("  {} {}%", "Progress:".bold(), job["progress_percentage"]);
    println!(
        "  {} {} ok / {} failed of {}",
        "Rows:".bold(),
        count(&job["success_count"]),
        count(&job["error_count"]),
        count(&job["total_rows"])
    );
    if let Some(url) = job["download_url"].as_str() {
        println!("  {} {}", "Download:".bold(), url.cyan());
    }
    if let Some(message) = job["error_message"].as_str() {
        println!("  {} {}", "Error:".bold(), message.red());
    }
    if let Some(errors) = job["errors"].as_array() {
        if !errors.is_empty() {
            println!();
            println!("  {}", "Errors:".bold());
            for entry in errors {
                println!("    {}", entry);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import { file, user_id } => {
            // The daemon reads the file itself, so send an absolute path
            let source = file
                .canonicalize()
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let params = json!({
                "user_id": user_id,
                "source_path": source.to_string_lossy(),
                "original_file_name": file.file_name().map(|n| n.to_string_lossy().into_owned()),
            });

            let result = call_rpc(&cli.rpc_url, "users.import.v1", params).await?;
            print_submitted("Import", result)?;
        }

        Commands::Export {
            user_id,
            search,
            active,
            role,
            order_by,
            direction,
        } => {
            let params = export_params(user_id, search, active, role, order_by, direction);
            let result = call_rpc(&cli.rpc_url, "users.export.v1", params).await?;
            print_submitted("Export", result)?;
        }

        Commands::Status { job_id } => {
            let job = call_rpc(&cli.rpc_url, "jobs.status.v1", json!({ "job_id": job_id })).await?;
            print_job(&job);
        }

        Commands::Jobs { user_id } => {
            let jobs = call_rpc(&cli.rpc_url, "jobs.list.v1", json!({ "user_id": user_id })).await?;
            let rows: Vec<JobRow> = jobs
                .as_array()
                .map(|jobs| jobs.iter().map(JobRow::from).collect())
                .unwrap_or_default();

            if rows.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Processing:".bold(), stats["processing_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!();
                    let db_mb =
                        stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Cleanup { days, dry_run } => {
            let params = json!({ "days": days, "dry_run": dry_run });
            let report = call_rpc(&cli.rpc_url, "admin.cleanup.v1", params).await?;

            if dry_run {
                println!(
                    "{}",
                    format!(
                        "Would delete {} completed jobs older than {} days",
                        report["matched"], days
                    )
                    .cyan()
                    .bold()
                );
                if let Some(samples) = report["samples"].as_array() {
                    for sample in samples {
                        println!(
                            "  • {} ({}) completed {}",
                            sample["job_id"].as_str().unwrap_or_default(),
                            sample["type"].as_str().unwrap_or_default(),
                            sample["completed_at"].as_str().unwrap_or_default()
                        );
                    }
                }
            } else {
                println!(
                    "{} {} jobs deleted, {} files removed",
                    "✓".green(),
                    report["deleted"],
                    report["files_deleted"]
                );
            }
        }
    }

    Ok(())
}
