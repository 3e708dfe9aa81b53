//! Waitlist CLI - Command-line interface for the Waitlist daemon

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9530";

#[derive(Parser)]
#[command(name = "waitlistctl")]
#[command(about = "Waitlist admission-control CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "WAITLIST_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a ticket for a queue key
    Create {
        /// Resource (e.g. node name)
        resource: String,

        /// Scope within the resource (e.g. vm-create)
        scope: String,

        /// Object id within the scope
        id: String,

        /// Seconds until the ticket expires
        #[arg(long, default_value = "300", conflicts_with = "expires_at")]
        ttl: i64,

        /// Absolute deadline (RFC 3339)
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,

        /// Label of the guarded operation
        #[arg(long)]
        action: Option<String>,

        /// Extra JSON object echoed back with the ticket
        #[arg(long)]
        extra: Option<String>,

        /// Block until the ticket is active
        #[arg(short, long)]
        wait: bool,
    },

    /// List tickets of a resource
    List {
        resource: String,
    },

    /// Show one ticket
    Get {
        uuid: String,
    },

    /// Block until a ticket is active
    Wait {
        uuid: String,

        /// Seconds to wait (server default if omitted)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Release an active ticket
    Release {
        uuid: String,
    },

    /// Delete all tickets of a resource
    Clear {
        resource: String,

        /// Also clear queued and active tickets
        #[arg(long)]
        force: bool,
    },

    /// Show daemon status
    Status,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Ticket as returned by the daemon
#[derive(Deserialize)]
struct TicketRecord {
    uuid: String,
    resource: String,
    scope: String,
    id: String,
    status: String,
    created_at: String,
    expires_at: String,
    activated_at: Option<String>,
    action: Option<String>,
}

#[derive(Tabled)]
struct TicketRow {
    uuid: String,
    key: String,
    status: String,
    action: String,
    created: String,
    activated: String,
    expires: String,
}

impl From<TicketRecord> for TicketRow {
    fn from(t: TicketRecord) -> Self {
        let status = match t.status.as_str() {
            "active" => t.status.green().bold().to_string(),
            "queued" => t.status.yellow().to_string(),
            "expired" => t.status.red().to_string(),
            _ => t.status.dimmed().to_string(),
        };
        Self {
            uuid: t.uuid,
            key: format!("{}/{}/{}", t.resource, t.scope, t.id),
            status,
            action: t.action.unwrap_or_else(|| "-".to_string()),
            created: t.created_at,
            activated: t.activated_at.unwrap_or_else(|| "-".to_string()),
            expires: t.expires_at,
        }
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
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

fn print_tickets(tickets: Vec<TicketRecord>) {
    let rows: Vec<TicketRow> = tickets.into_iter().map(TicketRow::from).collect();
    println!("{}", Table::new(rows));
}

async fn wait_for(url: &str, uuid: &str, timeout: Option<u64>) -> Result<()> {
    println!("{}", format!("Waiting for ticket {}...", uuid).cyan());

    let mut params = json!({ "uuid": uuid });
    if let Some(secs) = timeout {
        params["timeout_ms"] = json!(secs * 1000);
    }

    let result = call_rpc(url, "tickets.wait.v1", params).await?;
    let ticket: TicketRecord = serde_json::from_value(result)?;
    println!("{}", format!("✓ Ticket {} is active", ticket.uuid).green().bold());
    print_tickets(vec![ticket]);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            resource,
            scope,
            id,
            ttl,
            expires_at,
            action,
            extra,
            wait,
        } => {
            let expires_at =
                expires_at.unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(ttl));
            let extra: serde_json::Value = match extra {
                Some(raw) => serde_json::from_str(&raw).context("Invalid JSON for --extra")?,
                None => serde_json::Value::Null,
            };

            let params = json!({
                "resource": resource,
                "scope": scope,
                "id": id,
                "expires_at": expires_at.to_rfc3339(),
                "action": action,
                "extra": extra,
            });

            let result = call_rpc(&cli.rpc_url, "tickets.create.v1", params).await?;
            let ticket: TicketRecord = serde_json::from_value(result)?;
            let uuid = ticket.uuid.clone();
            let active = ticket.status == "active";

            println!("{}", "✓ Ticket created".green().bold());
            print_tickets(vec![ticket]);

            if wait && !active {
                wait_for(&cli.rpc_url, &uuid, None).await?;
            }
        }

        Commands::List { resource } => {
            let result = call_rpc(
                &cli.rpc_url,
                "tickets.list.v1",
                json!({ "resource": resource }),
            )
            .await?;
            let tickets: Vec<TicketRecord> = serde_json::from_value(result["tickets"].clone())?;

            if tickets.is_empty() {
                println!("{}", format!("No tickets for {}", resource).yellow());
            } else {
                print_tickets(tickets);
            }
        }

        Commands::Get { uuid } => {
            let result = call_rpc(&cli.rpc_url, "tickets.get.v1", json!({ "uuid": uuid })).await?;
            print_tickets(vec![serde_json::from_value(result)?]);
        }

        Commands::Wait { uuid, timeout } => {
            wait_for(&cli.rpc_url, &uuid, timeout).await?;
        }

        Commands::Release { uuid } => {
            call_rpc(&cli.rpc_url, "tickets.release.v1", json!({ "uuid": uuid })).await?;
            println!("{}", format!("✓ Ticket {} released", uuid).green().bold());
        }

        Commands::Clear { resource, force } => {
            let result = call_rpc(
                &cli.rpc_url,
                "tickets.delete_all.v1",
                json!({ "resource": resource, "force": force }),
            )
            .await?;
            println!(
                "{}",
                format!("✓ {} tickets deleted from {}", result["deleted"], resource)
                    .green()
                    .bold()
            );
        }

        Commands::Status => {
            println!("{}", "Waitlist Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Queue keys:".bold(), stats["queue_keys"]);
                    println!("  {} {}", "Active:".bold(), stats["active"]);
                    println!("  {} {}", "Queued:".bold(), stats["queued"]);
                    println!("  {} {}", "Expired:".bold(), stats["expired"]);
                    println!("  {} {}", "Finished:".bold(), stats["finished"]);
                    println!("  {} {}", "Deleted:".bold(), stats["deleted"]);
                    println!();
                    println!("  {} {}", "Armed timers:".bold(), stats["armed_timers"]);
                    println!("  {} {}", "Waited tickets:".bold(), stats["waited_tickets"]);
                    let deferred = stats["deferred_writes"].as_u64().unwrap_or(0);
                    if deferred > 0 {
                        println!("  {} {}", "Deferred writes:".bold(), deferred.to_string().red());
                    } else {
                        println!("  {} 0", "Deferred writes:".bold());
                    }
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
