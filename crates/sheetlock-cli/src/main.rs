use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sheetlock_core::app::LoopSummary;
use sheetlock_core::impls::FileTableStore;
use sheetlock_core::{
    ClaimProtocol, ClaimedTask, NodeConfig, NodeRole, RangeSpec, TableStore, TaskHandler, Token,
    WorkerLoop,
};

/// 共有テーブルからタスクを 1 行ずつ取って処理する demo
#[derive(Debug, Parser)]
#[command(name = "sheetlock", version)]
struct Cli {
    /// RUST_LOG が未設定のときのログレベル
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// サンプルのハイパーパラメータ表を作る（既存のテーブルは置き換え）
    Seed {
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value = "runs")]
        table: String,
    },
    /// claim → 処理 → report をタスクがなくなるまで繰り返す
    Run(RunArgs),
    /// テーブルを表示
    Show {
        #[arg(long)]
        store: PathBuf,
        #[arg(long, default_value = "runs")]
        table: String,
        /// `C3:D10` 形式。省略時はテーブル全体。
        #[arg(long)]
        range: Option<RangeSpec>,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// 共有テーブルの JSON ファイル
    #[arg(long)]
    store: PathBuf,

    /// node 設定（TOML）。以下のフラグで上書きできる。
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    table: Option<String>,

    #[arg(long)]
    role: Option<NodeRole>,

    /// worker では必須
    #[arg(long)]
    token: Option<Token>,

    /// 予約直後にセルを読み直して確認する
    #[arg(long)]
    verify_reservation: bool,

    /// 処理する最大行数（worker の既定は 1）
    #[arg(long)]
    max_tasks: Option<usize>,

    #[arg(long, default_value_t = 1)]
    min_sleep_secs: u64,

    #[arg(long, default_value_t = 3)]
    max_sleep_secs: u64,
}

/// ランダムに眠って、4 つの乱数を結果として返す
struct DemoHandler {
    min_sleep_secs: u64,
    max_sleep_secs: u64,
}

#[async_trait]
impl TaskHandler for DemoHandler {
    async fn execute(&self, task: &ClaimedTask) -> Result<Vec<String>, String> {
        let secs = rand::thread_rng().gen_range(self.min_sleep_secs..=self.max_sleep_secs);
        info!(config = %task.config, secs, "got task, let us sleep");
        sleep(Duration::from_secs(secs)).await;

        let result: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..4).map(|_| rng.r#gen::<f64>().to_string()).collect()
        };
        info!(config = %task.config, ?result, "task finished");
        Ok(result)
    }
}

fn sample_table() -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["sheetlock demo".to_string()],
        ["cfg.lr", "cfg.bs", "status", "result"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
    ];
    for lr in ["0.1", "0.01", "0.001"] {
        for bs in ["16", "32", "64"] {
            rows.push(vec![lr.to_string(), bs.to_string(), "-1".to_string()]);
        }
    }
    rows
}

async fn node_config(args: &RunArgs) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let Some(table) = &args.table else {
                bail!("--table is required when no --config is given");
            };
            NodeConfig::new(table.clone(), NodeRole::Coordinator)
        }
    };
    if let Some(table) = &args.table {
        config.table = table.clone();
    }
    if let Some(role) = args.role {
        config.role = role;
    }
    if args.token.is_some() {
        config.token = args.token;
    }
    config.verify_reservation |= args.verify_reservation;
    config.validate()?;
    Ok(config)
}

async fn run(args: RunArgs) -> Result<LoopSummary> {
    if args.min_sleep_secs > args.max_sleep_secs {
        bail!("--min-sleep-secs must not exceed --max-sleep-secs");
    }
    let config = node_config(&args).await?;

    // (A) shutdown シグナル（Ctrl-C で次のパスの先頭 / 処理中に止まる）
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, releasing held rows");
            let _ = shutdown_tx.send(true);
        }
    });

    // (B) ストアと ClaimProtocol を用意
    let store = FileTableStore::new(&args.store);
    let protocol = ClaimProtocol::from_config(store, &config).with_shutdown(shutdown_rx);
    info!(node = %protocol.node_id(), role = %config.role, table = %config.table, "starting");

    // (C) ループを回す（worker はステータスを書かないので既定で 1 行だけ）
    let max_tasks = match (args.max_tasks, config.role) {
        (Some(n), _) => Some(n),
        (None, NodeRole::Worker) => Some(1),
        (None, NodeRole::Coordinator) => None,
    };
    let handler = DemoHandler {
        min_sleep_secs: args.min_sleep_secs,
        max_sleep_secs: args.max_sleep_secs,
    };
    let mut worker = WorkerLoop::new(protocol, handler, config.table.clone())
        .token(config.token)
        .max_tasks(max_tasks);

    let summary = worker.run().await?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Command::Seed { store, table } => {
            let store = FileTableStore::new(store);
            store
                .put_table(&table, sample_table())
                .await
                .with_context(|| format!("seeding table '{table}'"))?;
            info!(path = %store.path().display(), %table, "seeded sample tasks");
        }
        Command::Run(args) => {
            let summary = run(args).await?;
            println!("{}", serde_json::to_string(&summary)?);
            if summary.cancelled {
                println!("Stopped by shutdown.");
            } else {
                println!("All tasks have been completed, exit.");
            }
        }
        Command::Show {
            store,
            table,
            range,
        } => {
            let store = FileTableStore::new(store);
            let range = range.unwrap_or_else(RangeSpec::whole_table);
            let rows = store
                .read(&table, range)
                .await
                .with_context(|| format!("reading {}", range.to_a1(&table)))?;
            for row in rows {
                println!("{}", row.join("\t"));
            }
        }
    }
    Ok(())
}
