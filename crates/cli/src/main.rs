//! CLI for the Davis locking and PROPFIND engine.
//!
//! Runs queries and lock sequences against an in-memory tree, either the
//! built-in sample or one loaded from JSON.

use clap::{Parser, Subcommand};
use davis_core::{
    Depth, LockDepth, LockRequest, LockResult, LockScope, LockTimeout, PropertyName, ResourcePath,
};
use davis_engine::locking::discovery;
use davis_engine::sink::JsonStreamSink;
use davis_engine::{
    InMemoryLockManager, LockManager, LockManagerConfig, PropFindHandler, PropFindRequest,
};
use davis_store::{MemoryStore, StaticHost, TreeSpec};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "davis", version, about = "WebDAV locking and PROPFIND engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a PROPFIND against the tree.
    Propfind {
        /// Resource path, e.g. /docs.
        path: String,

        /// 0, 1, or infinity.
        #[arg(short, long, default_value = "1")]
        depth: Depth,

        /// Property to force into the allprop response, in `{ns}name` form.
        #[arg(short, long = "include")]
        include: Vec<String>,

        #[arg(long, env = "DAVIS_BASE_URL", default_value = "http://localhost/")]
        base_url: String,

        /// JSON tree description; the built-in sample tree otherwise.
        #[arg(long)]
        tree: Option<PathBuf>,

        /// Print the multi-status as pretty JSON instead of XML.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Print one NDJSON row per entry.
        #[arg(long, default_value_t = false, conflicts_with = "json")]
        ndjson: bool,
    },

    /// Apply lock requests in order and report each outcome.
    Lock {
        /// `path:scope:depth`, e.g. `/docs:exclusive:infinity`.
        #[arg(required = true)]
        targets: Vec<String>,

        #[arg(long)]
        owner: Option<String>,

        /// Requested timeout in seconds; the configured default otherwise.
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long, env = "DAVIS_DEFAULT_TIMEOUT", default_value_t = 600)]
        default_timeout: u64,

        #[arg(long, env = "DAVIS_MAX_TIMEOUT", default_value_t = 3600)]
        max_timeout: u64,

        /// Print one NDJSON row per outcome.
        #[arg(long, default_value_t = false)]
        ndjson: bool,
    },
}

/// `/docs` with a document and an empty sub-collection.
fn sample_tree() -> Result<MemoryStore, davis_core::DavError> {
    MemoryStore::builder()
        .collection("/docs")
        .document("/docs/a", "hello, davis")
        .collection("/docs/sub")
        .build()
}

fn load_tree(path: Option<&PathBuf>) -> Result<MemoryStore, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(sample_tree()?);
    };
    let spec: TreeSpec = serde_json::from_reader(std::fs::File::open(path)?)?;
    Ok(MemoryStore::from_spec(spec)?)
}

fn parse_target(target: &str) -> Result<LockRequest, Box<dyn std::error::Error>> {
    let mut parts = target.rsplitn(3, ':');
    let (Some(depth), Some(scope), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("lock target {target:?} is not path:scope:depth").into());
    };
    let scope: LockScope = scope.parse()?;
    let depth: LockDepth = depth.parse::<Depth>()?.to_lock_depth()?;
    Ok(LockRequest::new(ResourcePath::new(path), scope, depth))
}

fn describe(result: &LockResult) -> String {
    match result {
        LockResult::Granted(lock) => format!(
            "granted {} on {} ({:?}, {:?}, {}s)",
            lock.state_token, lock.path, lock.scope, lock.depth, lock.timeout_secs
        ),
        LockResult::Conflict(locks) => {
            let blockers: Vec<String> = locks
                .iter()
                .map(|l| format!("{} on {}", l.state_token, l.path))
                .collect();
            format!("conflict with {}", blockers.join(", "))
        }
    }
}

/// Each targeted path once, in path order.
fn distinct_paths(requests: &[LockRequest]) -> BTreeSet<ResourcePath> {
    requests.iter().map(|r| r.path.clone()).collect()
}

fn write_discovery<W: Write>(
    sink: &mut JsonStreamSink<W>,
    manager: &dyn LockManager,
    paths: &BTreeSet<ResourcePath>,
) -> std::io::Result<()> {
    paths
        .iter()
        .try_for_each(|path| sink.write_lock_discovery(path, &discovery::discover(manager, path)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Propfind {
            path,
            depth,
            include,
            base_url,
            tree,
            json,
            ndjson,
        } => {
            let t0 = Instant::now();
            let store = Arc::new(load_tree(tree.as_ref())?);
            let host = Arc::new(StaticHost::parse(&base_url)?);
            let handler = PropFindHandler::new(store, host);

            let request = if include.is_empty() {
                None
            } else {
                let names = include
                    .iter()
                    .map(|name| name.parse::<PropertyName>())
                    .collect::<Result<Vec<_>, _>>()?;
                Some(PropFindRequest::all_prop().with_include(names))
            };

            let path = ResourcePath::new(&path);
            let multistatus = match handler.handle(&path, request.as_ref(), depth).await {
                Ok(multistatus) => multistatus,
                Err(e) => {
                    tracing::error!(
                        path = %path,
                        status = e.status_code(),
                        error = %e,
                        "PROPFIND failed"
                    );
                    if let Some(body) = e.error_body() {
                        print!("{body}");
                    }
                    std::process::exit(1);
                }
            };

            tracing::info!(
                path = %path,
                entries = multistatus.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "PROPFIND done"
            );

            if ndjson {
                let mut sink = JsonStreamSink::stdout();
                sink.write_multistatus(&multistatus)?;
                let rows = sink.finish()?;
                tracing::debug!(rows, "ndjson sink: wrote to stdout");
            } else if json {
                println!("{}", serde_json::to_string_pretty(&multistatus)?);
            } else {
                print!("{}", multistatus.to_xml());
            }
        }

        Commands::Lock {
            targets,
            owner,
            timeout,
            default_timeout,
            max_timeout,
            ndjson,
        } => {
            let config = LockManagerConfig {
                default_timeout_secs: default_timeout,
                max_timeout_secs: max_timeout,
                ..Default::default()
            };
            let manager = InMemoryLockManager::new(config)?;

            let requests = targets
                .iter()
                .map(|t| parse_target(t))
                .collect::<Result<Vec<_>, _>>()?;

            let mut sink = ndjson.then(JsonStreamSink::stdout);
            let paths = distinct_paths(&requests);
            for mut request in requests {
                request.owner = owner.clone();
                request.timeout = timeout.map(LockTimeout::Seconds);

                let result = manager.lock(request);
                match sink.as_mut() {
                    Some(sink) => sink.write_lock_result(&result)?,
                    None => println!("{}", describe(&result)),
                }
            }

            match sink {
                Some(mut sink) => {
                    write_discovery(&mut sink, &manager, &paths)?;
                    let rows = sink.finish()?;
                    tracing::debug!(rows, "ndjson sink: wrote to stdout");
                }
                None => {
                    for path in &paths {
                        let element = discovery::discover(&manager, path);
                        println!("{path}: {}", serde_json::to_string_pretty(&element)?);
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_rows_follow_lock_outcomes_once_per_path() {
        let manager = InMemoryLockManager::new(LockManagerConfig::default()).unwrap();
        let requests = ["/docs:shared:0", "/other:exclusive:0", "/docs:shared:0"]
            .iter()
            .map(|t| parse_target(t).unwrap())
            .collect::<Vec<_>>();
        let paths = distinct_paths(&requests);
        assert_eq!(paths.len(), 2);

        let mut buf = Vec::new();
        let mut sink = JsonStreamSink::new(&mut buf);
        for request in requests {
            sink.write_lock_result(&manager.lock(request)).unwrap();
        }
        write_discovery(&mut sink, &manager, &paths).unwrap();
        assert_eq!(sink.finish().unwrap(), 5);

        let output = String::from_utf8(buf).unwrap();
        let rows: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows[3]["path"], "/docs");
        assert_eq!(rows[4]["path"], "/other");
        assert_eq!(rows[3]["lockdiscovery"]["children"].as_array().unwrap().len(), 2);
    }
}
