use anyhow::Context;
use async_trait::async_trait;
use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use walletsweep_core::{
    executor::{ClusterExecutor, LaunchOutcome, LaunchRequest, TaskDescription},
    invocation::AggregateScope,
    lease::DEFAULT_LEASE_TTL,
    lite::fs::FsObjectStore,
    ExitInfo, ObjectStore, Result, TaskHandle, TaskStatus,
};
use walletsweep_scheduler::{
    orchestrator::SessionLeasing, MonitorPolicy, Orchestrator, SessionRequest, SessionSettings,
};
use walletsweep_worker::{config::WorkerConfig, invoke, EXIT_CONFIG, EXIT_TASK_FAILED, EXIT_UNKNOWN_TASK};

const PARQUET_BUCKET: &str = "parquet";
const CSV_BUCKET: &str = "csv";

/// Two transactions per requested range: one at `from`, one at `to - 1`.
async fn assets(
    Path((chain_id, wallet, from, to)): Path<(String, String, i64, i64)>,
) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
    if chain_id == "500" {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let rows = [from, to - 1]
        .into_iter()
        .map(|block| {
            serde_json::json!({
                "id": format!("{wallet}-{block}"),
                "chain_id": chain_id,
                "category": "external",
                "transaction_type": "transfer",
                "transaction_hash": format!("0x{block:064x}"),
                "block_number": block,
                "date_time": "2024-01-01T00:00:00Z",
                "from_address": wallet,
                "to_address": "0xdef",
                "asset_contract_address": null,
                "asset_symbol_name": "ETH",
                "value_amount": 0.25,
                "gas_fee_eth": "0.000021",
                "token_id": null
            })
        })
        .collect::<Vec<_>>();
    Ok(Json(serde_json::Value::Array(rows)))
}

async fn start_upstream() -> anyhow::Result<String> {
    let app = Router::new().route("/assets/:chain_id/:wallet/:from/:to", get(assets));
    let listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>()?)
        .await
        .context("bind upstream stub")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    Ok(format!("http://{addr}/assets"))
}

/// Runs each launched task to completion inside `run_task`, in process.
struct InlineExecutor {
    store: Arc<FsObjectStore>,
    root: PathBuf,
    read_mode: &'static str,
    exits: Mutex<HashMap<TaskHandle, u8>>,
}

impl InlineExecutor {
    fn new(store: Arc<FsObjectStore>, read_mode: &'static str) -> Self {
        Self {
            root: store.root().to_path_buf(),
            store,
            read_mode,
            exits: Mutex::new(HashMap::new()),
        }
    }

    fn worker_args(&self, env: &[(String, String)]) -> Vec<String> {
        let mut args = vec![
            "walletsweep-worker".to_string(),
            "--storage-backend".to_string(),
            "fs".to_string(),
            "--storage-root".to_string(),
            self.root.to_string_lossy().into_owned(),
            "--parquet-bucket".to_string(),
            PARQUET_BUCKET.to_string(),
            "--csv-bucket".to_string(),
            CSV_BUCKET.to_string(),
            "--read-mode".to_string(),
            self.read_mode.to_string(),
        ];
        for (name, value) in env {
            args.push(format!("--{}", name.to_ascii_lowercase().replace('_', "-")));
            args.push(value.clone());
        }
        args
    }
}

#[async_trait]
impl ClusterExecutor for InlineExecutor {
    async fn run_task(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let code = match WorkerConfig::from_args(self.worker_args(&request.env)) {
            Ok(cfg) => invoke(&cfg, self.store.as_ref()).await,
            Err(_) => EXIT_CONFIG,
        };
        let mut exits = self.exits.lock().unwrap();
        let handle = TaskHandle::new(format!("inline:{}", exits.len() + 1));
        exits.insert(handle.clone(), code);
        Ok(LaunchOutcome {
            handles: vec![handle],
            failures: Vec::new(),
        })
    }

    async fn describe_tasks(&self, handles: &[TaskHandle]) -> Result<Vec<TaskDescription>> {
        let exits = self.exits.lock().unwrap();
        Ok(handles
            .iter()
            .filter_map(|h| {
                exits.get(h).map(|code| TaskDescription {
                    handle: h.clone(),
                    last_status: "STOPPED".to_string(),
                    status: TaskStatus::Stopped,
                    exit: ExitInfo {
                        exit_code: Some(i32::from(*code)),
                        ..ExitInfo::default()
                    },
                })
            })
            .collect())
    }
}

fn settings(
    target_url: &str,
    scope: AggregateScope,
    store: Arc<dyn ObjectStore>,
) -> SessionSettings {
    SessionSettings {
        target_url: target_url.to_string(),
        chunk_size: 1_000,
        aggregate_scope: scope,
        monitor: MonitorPolicy {
            poll_interval: Duration::from_millis(5),
            max_wait: Some(Duration::from_secs(30)),
        },
        leasing: Some(SessionLeasing {
            store,
            bucket: CSV_BUCKET.to_string(),
            ttl: DEFAULT_LEASE_TTL,
        }),
    }
}

fn request(from_block: u64, to_block: u64) -> SessionRequest {
    SessionRequest {
        wallet: "0xabc".to_string(),
        chain_id: "1".to_string(),
        from_block,
        to_block,
    }
}

async fn aggregate_lines(store: &FsObjectStore) -> anyhow::Result<Vec<String>> {
    let bytes = store.get_bytes(CSV_BUCKET, "1/0xabc.csv").await?;
    Ok(String::from_utf8(bytes)?
        .lines()
        .map(str::to_string)
        .collect())
}

#[tokio::test]
async fn session_writes_partitions_and_aggregate() -> anyhow::Result<()> {
    let upstream = start_upstream().await?;
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = Arc::new(InlineExecutor::new(store.clone(), "direct"));

    let report = Orchestrator::new(
        executor.clone(),
        settings(&upstream, AggregateScope::Cumulative, store.clone()),
    )
    .run(&request(0, 2_500), &CancellationToken::new())
    .await?;

    anyhow::ensure!(report.tally() == (4, 0, 0), "tally: {:?}", report.tally());

    let partitions = store.list_keys(PARQUET_BUCKET, "").await?;
    anyhow::ensure!(
        partitions
            == vec![
                "1/0xabc/0-1000.parquet",
                "1/0xabc/1000-2000.parquet",
                "1/0xabc/2000-2500.parquet",
            ],
        "unexpected partitions: {partitions:?}"
    );
    let csv_keys = store.list_keys(CSV_BUCKET, "").await?;
    anyhow::ensure!(csv_keys == vec!["1/0xabc.csv"], "unexpected csv keys: {csv_keys:?}");

    let lines = aggregate_lines(&store).await?;
    anyhow::ensure!(lines.len() == 7, "expected header + 6 rows, got {}", lines.len());
    anyhow::ensure!(lines[0].starts_with("id,chain_id,category,"), "header: {}", lines[0]);
    let first_ids = lines[1..]
        .iter()
        .map(|l| l.split(',').next().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    anyhow::ensure!(
        first_ids
            == vec![
                "0xabc-0",
                "0xabc-999",
                "0xabc-1000",
                "0xabc-1999",
                "0xabc-2000",
                "0xabc-2499",
            ],
        "rows not ordered by block: {first_ids:?}"
    );
    Ok(())
}

#[tokio::test]
async fn rerunning_aggregate_overwrites() -> anyhow::Result<()> {
    let upstream = start_upstream().await?;
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = Arc::new(InlineExecutor::new(store.clone(), "staged"));
    let orchestrator = Orchestrator::new(
        executor.clone(),
        settings(&upstream, AggregateScope::Cumulative, store.clone()),
    );

    orchestrator
        .run(&request(0, 2_000), &CancellationToken::new())
        .await?;
    let first = aggregate_lines(&store).await?;
    anyhow::ensure!(first.len() == 5);

    orchestrator
        .run(&request(0, 2_000), &CancellationToken::new())
        .await?;
    let second = aggregate_lines(&store).await?;
    anyhow::ensure!(second == first, "aggregate must be replaced, not appended");

    // Cumulative scope picks up partitions written by earlier sessions.
    orchestrator
        .run(&request(2_000, 3_000), &CancellationToken::new())
        .await?;
    let third = aggregate_lines(&store).await?;
    anyhow::ensure!(third.len() == 7, "expected header + 6 rows, got {}", third.len());
    Ok(())
}

#[tokio::test]
async fn session_scope_aggregates_only_its_range() -> anyhow::Result<()> {
    let upstream = start_upstream().await?;
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = Arc::new(InlineExecutor::new(store.clone(), "direct"));

    Orchestrator::new(
        executor.clone(),
        settings(&upstream, AggregateScope::Cumulative, store.clone()),
    )
    .run(&request(0, 2_000), &CancellationToken::new())
    .await?;

    let report = Orchestrator::new(
        executor.clone(),
        settings(&upstream, AggregateScope::Session, store.clone()),
    )
    .run(&request(2_000, 3_000), &CancellationToken::new())
    .await?;
    anyhow::ensure!(report.aggregate_task.succeeded());

    let lines = aggregate_lines(&store).await?;
    anyhow::ensure!(lines.len() == 3, "expected header + 2 rows, got {lines:?}");
    anyhow::ensure!(lines[1].starts_with("0xabc-2000,"));
    anyhow::ensure!(store.list_keys(PARQUET_BUCKET, "").await?.len() == 3);
    Ok(())
}

#[tokio::test]
async fn upstream_failure_fails_extract_but_session_completes() -> anyhow::Result<()> {
    let upstream = start_upstream().await?;
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = Arc::new(InlineExecutor::new(store.clone(), "direct"));

    let report = Orchestrator::new(
        executor.clone(),
        settings(&upstream, AggregateScope::Cumulative, store.clone()),
    )
    .run(
        &SessionRequest {
            wallet: "0xabc".to_string(),
            chain_id: "500".to_string(),
            from_block: 0,
            to_block: 1_000,
        },
        &CancellationToken::new(),
    )
    .await?;

    let extract_exit = report.extract_tasks[0].exit().exit_code;
    anyhow::ensure!(extract_exit == Some(i32::from(EXIT_TASK_FAILED)), "extract exit: {extract_exit:?}");
    // Nothing to union, so the aggregate fails too.
    let aggregate_exit = report.aggregate_task.exit().exit_code;
    anyhow::ensure!(aggregate_exit == Some(i32::from(EXIT_TASK_FAILED)), "aggregate exit: {aggregate_exit:?}");
    anyhow::ensure!(store.list_keys(PARQUET_BUCKET, "").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn aggregate_refuses_to_write_under_foreign_lease() -> anyhow::Result<()> {
    let upstream = start_upstream().await?;
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = InlineExecutor::new(store.clone(), "direct");

    let extract = WorkerConfig::from_args(executor.worker_args(&[
        ("TASK".to_string(), "extract".to_string()),
        ("WALLET".to_string(), "0xabc".to_string()),
        ("CHAIN_ID".to_string(), "1".to_string()),
        ("FROM_BLOCK".to_string(), "0".to_string()),
        ("TO_BLOCK".to_string(), "1000".to_string()),
        ("TARGET_URL".to_string(), upstream.clone()),
    ]))?;
    anyhow::ensure!(invoke(&extract, store.as_ref()).await == 0);

    // No lease exists for this session id.
    let save = WorkerConfig::from_args(executor.worker_args(&[
        ("TASK".to_string(), "save".to_string()),
        ("WALLET".to_string(), "0xabc".to_string()),
        ("CHAIN_ID".to_string(), "1".to_string()),
        ("SESSION_ID".to_string(), uuid::Uuid::new_v4().to_string()),
    ]))?;
    anyhow::ensure!(invoke(&save, store.as_ref()).await == EXIT_TASK_FAILED);
    anyhow::ensure!(store.list_keys(CSV_BUCKET, "").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn exit_codes_distinguish_unknown_task_and_bad_config() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FsObjectStore::new(tmp.path()));
    let executor = InlineExecutor::new(store.clone(), "direct");

    let unknown = WorkerConfig::from_args(executor.worker_args(&[
        ("TASK".to_string(), "load".to_string()),
        ("WALLET".to_string(), "0xabc".to_string()),
        ("CHAIN_ID".to_string(), "1".to_string()),
    ]))?;
    anyhow::ensure!(invoke(&unknown, store.as_ref()).await == EXIT_UNKNOWN_TASK);

    let no_range = WorkerConfig::from_args(executor.worker_args(&[
        ("TASK".to_string(), "extract".to_string()),
        ("WALLET".to_string(), "0xabc".to_string()),
        ("CHAIN_ID".to_string(), "1".to_string()),
    ]))?;
    anyhow::ensure!(invoke(&no_range, store.as_ref()).await == EXIT_CONFIG);

    anyhow::ensure!(
        WorkerConfig::from_args(executor.worker_args(&[(
            "FROM_BLOCK".to_string(),
            "not-a-number".to_string()
        )]))
        .is_err()
    );
    Ok(())
}
