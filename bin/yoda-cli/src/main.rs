//! Yoda CLI - operator tool for the storage coordination core
//!
//! Works directly on the local catalog: inspect and set ARB statuses,
//! preview write admission, seed resources and objects, schedule
//! replication and list stored revisions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yoda_common::config::DEFAULT_CONFIG_PATH;
use yoda_common::{ArbStatus, Config, HostContext, ObjectPath, ResourceName};
use yoda_host::{Catalog, LocalHost};
use yoda_jobs::schedule_replication;
use yoda_placement::{Admission, ArbEngine, WriteAdmissionPolicy, WriteRequest};

#[derive(Parser)]
#[command(name = "yoda-cli")]
#[command(about = "Yoda storage coordination admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Catalog database (overrides the configuration file)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Automatic resource balancing
    Arb {
        #[command(subcommand)]
        action: ArbCommands,
    },
    /// Storage resources
    Resource {
        #[command(subcommand)]
        action: ResourceCommands,
    },
    /// Data objects
    Object {
        #[command(subcommand)]
        action: ObjectCommands,
    },
    /// Replication queue
    Replication {
        #[command(subcommand)]
        action: ReplicationCommands,
    },
    /// Revision store
    Revisions {
        #[command(subcommand)]
        action: RevisionCommands,
    },
}

#[derive(Subcommand)]
enum ArbCommands {
    /// Show every resource with its ARB status and capacity
    Status,
    /// Set the ARB status of a resource
    Set {
        resource: ResourceName,
        /// IGNORE, READY_FOR_DATA, FULL or EXEMPT_FROM_ARB
        status: ArbStatus,
    },
    /// Show where a write requesting a resource would land
    Resolve {
        resource: ResourceName,
        /// Size of the write in bytes
        #[arg(long)]
        size: Option<u64>,
        /// Path of the object being written
        #[arg(long, default_value = "/tempZone/home/public/arb-check")]
        path: ObjectPath,
    },
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Register a resource or update its capacity
    Add {
        name: ResourceName,
        #[arg(long)]
        free: Option<u64>,
        #[arg(long)]
        total: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ObjectCommands {
    /// Create a data object with one replica
    Add {
        path: ObjectPath,
        #[arg(long)]
        resource: ResourceName,
        #[arg(long, default_value = "rods")]
        owner: String,
        #[arg(long, default_value = "")]
        group: String,
        #[arg(long, default_value_t = 0)]
        size: u64,
        /// Modify time (epoch seconds)
        #[arg(long, default_value_t = 0)]
        mtime: i64,
    },
    /// Show the replicas of a data object
    Show { path: ObjectPath },
}

#[derive(Subcommand)]
enum ReplicationCommands {
    /// Flag a data object for replication
    Schedule {
        path: ObjectPath,
        from: ResourceName,
        to: ResourceName,
    },
    /// List pending replication flags
    List,
}

#[derive(Subcommand)]
enum RevisionCommands {
    /// Store a revision of a data object
    Add {
        path: ObjectPath,
        /// Modify time of the revision (epoch seconds)
        #[arg(long)]
        mtime: i64,
    },
    /// List logical objects with their revisions
    List {
        /// Print the revisions-info list as JSON
        #[arg(long)]
        json: bool,
    },
}

fn format_bytes(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "-".to_string(), |b| b.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    yoda_placement::metrics::register_metrics();

    let config = Config::load(&args.config)?;
    let catalog = args
        .catalog
        .clone()
        .unwrap_or_else(|| config.host.catalog_path.clone());
    if let Some(parent) = catalog.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let host = Arc::new(
        LocalHost::open(&catalog, config.host.revision_store())
            .with_context(|| format!("opening catalog {}", catalog.display()))?,
    );
    let context = HostContext::new(&config.host.zone, &config.host.actor);

    match args.command {
        Commands::Arb { action } => {
            let engine = ArbEngine::new(Arc::clone(&host), context, &config.arb);
            match action {
                ArbCommands::Status => {
                    println!("ARB Status");
                    println!("==========");
                    println!(
                        "{:<24} {:<16} {:>16} {:>16}",
                        "RESOURCE", "STATUS", "FREE", "TOTAL"
                    );
                    println!("{}", "-".repeat(75));
                    for (info, status) in engine.statuses().await? {
                        println!(
                            "{:<24} {:<16} {:>16} {:>16}",
                            info.name.as_str(),
                            status.as_str(),
                            format_bytes(info.free_bytes),
                            format_bytes(info.total_bytes)
                        );
                    }
                }
                ArbCommands::Set { resource, status } => {
                    if host.resource_info(&resource).await?.is_none() {
                        anyhow::bail!("unknown resource {resource}");
                    }
                    engine.set_status(&resource, status).await?;
                    println!("{resource}: {status}");
                }
                ArbCommands::Resolve {
                    resource,
                    size,
                    path,
                } => {
                    let mut request = WriteRequest::new(config.host.actor.clone(), resource, path);
                    if let Some(size) = size {
                        request = request.with_size_hint(size);
                    }
                    match WriteAdmissionPolicy::new(engine).admit(&request).await {
                        Admission::Allow { resource } => println!("allow: {resource}"),
                        Admission::Deny { reason } => println!("deny: {reason}"),
                    }
                }
            }
        }
        Commands::Resource { action } => match action {
            ResourceCommands::Add { name, free, total } => {
                host.upsert_resource(&name, free, total)?;
                println!("Resource {name} registered");
            }
        },
        Commands::Object { action } => match action {
            ObjectCommands::Add {
                path,
                resource,
                owner,
                group,
                size,
                mtime,
            } => {
                let data_id =
                    host.create_data_object(&path, &owner, &group, size, &resource, mtime)?;
                println!("Created {path} (data id {data_id}) on {resource}");
            }
            ObjectCommands::Show { path } => {
                println!("Object: {path}");
                for replica in host.replicas(&path)? {
                    println!("  replica on {replica}");
                }
            }
        },
        Commands::Replication { action } => match action {
            ReplicationCommands::Schedule { path, from, to } => {
                schedule_replication(&*host, &path, &from, &to).await?;
                println!("Scheduled {path}: {from} -> {to}");
            }
            ReplicationCommands::List => {
                let flagged = host
                    .data_objects_with_attribute(yoda_common::attrs::REPLICATION_SCHEDULED)
                    .await?;
                if flagged.is_empty() {
                    println!("No replication scheduled");
                }
                for item in flagged {
                    println!("{:<60} {}", item.path().as_str(), item.value);
                }
            }
        },
        Commands::Revisions { action } => match action {
            RevisionCommands::Add { path, mtime } => {
                let revision = host.create_revision(&path, mtime)?;
                println!("Stored revision {revision}");
            }
            RevisionCommands::List { json } => {
                let infos = host.revisions_info().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&infos)?);
                } else if infos.is_empty() {
                    println!("No revisions stored");
                } else {
                    for info in infos {
                        println!("{} ({} revisions)", info.original_path, info.revisions.len());
                        for rev in info.revisions {
                            println!(
                                "  {:<12} {:<16} {}",
                                rev.revision_id, rev.original_modify_time, rev.path
                            );
                        }
                    }
                }
            }
        },
    }

    Ok(())
}
