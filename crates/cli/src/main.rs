use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cloudrec_core::models::{IpResource, Lb, NatGateway, PodIngressRuleBackend, RdsInstance, RedisInstance, Subnet, Vm, Vpc};
use cloudrec_core::{AttrRow, OrgId, Record, ResourceKind, RowSource, SyncError, TableRecord, TableSource};
use cloudrec_kvhub::{AssociationStore, IpResourceSource, MemoryKv, IP_RESOURCE_NAMESPACE};
use cloudrec_persist::{DimensionTableWriter, SqliteStore};
use cloudrec_store::{CycleOutcome, CycleReport, KindSync, PodIngressRuleBackendListener, Recorder, RecorderConfig};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "cloudrecctl", version, about = "Cloud resource recorder")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// SQLite database path (default: ~/.cloudrec/cloudrec.db)
    #[arg(long = "db", global = true, env = "CLOUDREC_DB_PATH")]
    db: Option<String>,

    /// Tenant id
    #[arg(long = "org", global = true, env = "CLOUDREC_ORG_ID", default_value_t = 1)]
    org: u32,

    /// Redis URL of the association store
    #[cfg(feature = "redis")]
    #[arg(long = "redis", global = true, env = "CLOUDREC_REDIS_URL")]
    redis: Option<String>,

    /// JSON object of association entries ("<subnetId>-<ip>" → blob) for the in-memory store
    #[arg(long = "assoc-file", global = true, env = "CLOUDREC_ASSOC_FILE")]
    assoc_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create every resource table
    Init,
    /// Insert a small demo resource set
    Seed,
    /// Run refresh cycles (periodic until Ctrl-C unless --once)
    Sync {
        /// Run a single cycle per kind and exit
        #[arg(long = "once", action = ArgAction::SetTrue)]
        once: bool,
        /// Restrict to one kind, e.g. "vm" or "ip_resource"
        #[arg(long = "kind")]
        kind: Option<ResourceKind>,
    },
    /// Run one cycle for a kind and print the cached items
    Dump {
        kind: ResourceKind,
    },
}

fn init_tracing() {
    let env = std::env::var("CLOUDREC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CLOUDREC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CLOUDREC_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_store(cli: &Cli) -> Result<Arc<SqliteStore>> {
    let store = match cli.db.as_deref() {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    };
    Ok(Arc::new(store))
}

fn association_store(cli: &Cli, org: OrgId) -> Result<Option<Arc<dyn AssociationStore>>> {
    #[cfg(feature = "redis")]
    if let Some(url) = cli.redis.as_deref() {
        return match cloudrec_kvhub::RedisKv::open(url) {
            Ok(kv) => Ok(Some(Arc::new(kv))),
            Err(e) => {
                warn!(error = %e, "association store unavailable; derived kinds will skip");
                Ok(None)
            }
        };
    }
    if let Some(path) = cli.assoc_file.as_deref() {
        let kv = MemoryKv::new();
        kv.load_file(org, IP_RESOURCE_NAMESPACE, path)?;
        return Ok(Some(Arc::new(kv)));
    }
    Ok(None)
}

fn register_table<R: TableRecord>(rec: &mut Recorder, rows: &Arc<dyn RowSource>) -> Arc<KindSync<R>> {
    rec.register::<R>(Arc::new(TableSource::<R>::new(Arc::clone(rows))))
}

/// Wire every kind (or just `only`) with its source and listeners.
fn build_recorder(
    store: &Arc<SqliteStore>,
    kv: Option<Arc<dyn AssociationStore>>,
    org: OrgId,
    only: Option<ResourceKind>,
) -> Recorder {
    let mut rec = Recorder::new(org, RecorderConfig::from_env());
    let rows: Arc<dyn RowSource> = store.clone();
    let want = |k: ResourceKind| only.map_or(true, |o| o == k);

    if want(Vm::KIND) {
        register_table::<Vm>(&mut rec, &rows);
    }
    if want(Vpc::KIND) {
        register_table::<Vpc>(&mut rec, &rows);
    }
    if want(Subnet::KIND) {
        register_table::<Subnet>(&mut rec, &rows);
    }
    if want(Lb::KIND) {
        register_table::<Lb>(&mut rec, &rows);
    }
    if want(NatGateway::KIND) {
        register_table::<NatGateway>(&mut rec, &rows);
    }
    if want(RdsInstance::KIND) {
        register_table::<RdsInstance>(&mut rec, &rows);
    }
    if want(RedisInstance::KIND) {
        register_table::<RedisInstance>(&mut rec, &rows);
    }
    if want(PodIngressRuleBackend::KIND) {
        let sync = register_table::<PodIngressRuleBackend>(&mut rec, &rows);
        sync.register_listener(Arc::new(PodIngressRuleBackendListener::new()));
    }
    if want(IpResource::KIND) {
        let sync = rec.register::<IpResource>(Arc::new(IpResourceSource::new(rows.clone(), kv)));
        sync.register_listener(Arc::new(DimensionTableWriter::new(store.clone(), org)));
    }
    rec
}

#[derive(Serialize)]
struct KindResult<'a> {
    kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a CycleReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_reports(output: Output, results: &[(ResourceKind, Result<CycleReport, SyncError>)]) -> Result<()> {
    match output {
        Output::Human => {
            for (kind, res) in results {
                match res {
                    Ok(r) => {
                        let outcome = match &r.outcome {
                            CycleOutcome::Applied => "applied".to_string(),
                            CycleOutcome::Unchanged => "unchanged".to_string(),
                            CycleOutcome::Skipped(reason) => format!("skipped ({})", reason),
                        };
                        println!(
                            "{:<26} {:<10} +{} ~{} -{}  epoch={} {}ms",
                            kind.as_str(),
                            outcome,
                            r.added,
                            r.updated,
                            r.deleted,
                            r.epoch,
                            r.elapsed_ms
                        );
                        for f in &r.listener_errors {
                            println!("  listener {} failed on {:?}: {}", f.listener, f.stage, f.error);
                        }
                    }
                    Err(e) => println!("{:<26} failed     {}", kind.as_str(), e),
                }
            }
        }
        Output::Json => {
            let out: Vec<KindResult<'_>> = results
                .iter()
                .map(|(kind, res)| match res {
                    Ok(r) => KindResult { kind: *kind, report: Some(r), error: None },
                    Err(e) => KindResult { kind: *kind, report: None, error: Some(e.to_string()) },
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn print_rows(output: Output, rows: &[AttrRow]) -> Result<()> {
    match output {
        Output::Human => {
            for row in rows {
                let line: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                println!("{}", line.join(" "));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(rows)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let org = OrgId(cli.org);

    match &cli.command {
        Commands::Init => {
            let store = open_store(&cli)?;
            store.init_schema()?;
            info!(org_id = %org, "schema ready");
            if cli.output == Output::Human {
                println!("schema initialized");
            }
        }
        Commands::Seed => {
            let store = open_store(&cli)?;
            store.init_schema()?;
            let summary = cloudrec_persist::seed_demo(&store, org)?;
            match cli.output {
                Output::Human => println!("{:#?}", summary),
                Output::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
        Commands::Sync { once, kind } => {
            let store = open_store(&cli)?;
            store.init_schema()?;
            let kv = association_store(&cli, org)?;
            let rec = build_recorder(&store, kv, org, *kind);
            if *once {
                let results = rec.run_all().await;
                print_reports(cli.output, &results)?;
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                if failed > 0 {
                    return Err(anyhow!("{} kind(s) failed", failed));
                }
            } else {
                let handle = rec.spawn_periodic(rec.config().interval);
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("shutting down");
                handle.shutdown().await;
            }
        }
        Commands::Dump { kind } => {
            let store = open_store(&cli)?;
            store.init_schema()?;
            let kv = association_store(&cli, org)?;
            let rec = build_recorder(&store, kv, org, Some(*kind));
            let runner = rec.runner(*kind).ok_or_else(|| anyhow!("kind {} is not registered", kind))?;
            let report = runner.run().await?;
            if let CycleOutcome::Skipped(reason) = &report.outcome {
                warn!(kind = %kind, %reason, "cycle skipped; nothing cached");
            }
            print_rows(cli.output, &runner.rows())?;
        }
    }
    Ok(())
}
