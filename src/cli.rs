use crate::{
    chunk_plan::ChunkPlan,
    config::Config,
    pipeline::Broadcaster,
    progress::Estimate,
    session::PendingBroadcasts,
    sink::{LogProgressSink, LogReportSink},
    util::{ensure_dir, now_rfc3339},
    worker::{Roster, SimulatedWorker, WorkerPool},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const CLI_REQUESTER: &str = "cli";

#[derive(Parser, Debug)]
#[command(name = "broadcaster")]
#[command(about = "Multi-worker direct message fan-out engine (partitioning + pacing + reporting)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./broadcaster.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    Plan {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
    },
    Run {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long, conflicts_with = "message_file")]
        message: Option<String>,
        #[arg(long)]
        message_file: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = if cfg_path.exists() {
        Config::load(&cfg_path)?
    } else {
        Config::default()
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Plan { roster, workers } => plan(&cfg, roster, *workers),
        Command::Run {
            roster,
            message,
            message_file,
            workers,
            out_dir,
        } => {
            let message = read_message(message.as_deref(), message_file.as_deref())?;
            run(&cfg, roster, message, *workers, out_dir.as_deref()).await
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config does not exist: {}", p.display()));
        }
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("broadcaster.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("broadcaster.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.output.out_dir).join("broadcaster.log"))
}

fn read_message(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(m), _) => Ok(m.to_string()),
        (None, Some(p)) => std::fs::read_to_string(p)
            .map(|s| s.trim_end().to_string())
            .with_context(|| format!("reading message: {}", p.display())),
        (None, None) => Err(anyhow!("either --message or --message-file is required")),
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    let workers = cfg.simulation.workers;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "config": cfg,
            "simulation_workers": workers,
            "pacing_ms": cfg.broadcast.pacing_interval(workers).as_millis() as u64,
            "nominal_speed": cfg.broadcast.requests_per_second * workers as u64,
        }))?
    );
    Ok(())
}

fn plan(cfg: &Config, roster_path: &Path, workers: Option<usize>) -> Result<()> {
    let roster = Roster::load(roster_path)?;
    let workers = workers.unwrap_or(cfg.simulation.workers);
    let plan = ChunkPlan::round_robin(&roster.recipients, workers)?;
    let estimate = Estimate::new(&cfg.broadcast, workers, roster.recipients.len() as u64);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "roster": roster_path,
            "plan": plan,
            "estimate": estimate,
        }))?
    );
    Ok(())
}

async fn run(
    cfg: &Config,
    roster_path: &Path,
    message: String,
    workers: Option<usize>,
    out_override: Option<&Path>,
) -> Result<()> {
    let roster = Roster::load(roster_path)?;
    let workers = workers.unwrap_or(cfg.simulation.workers);
    let latency = Duration::from_millis(cfg.simulation.latency_ms);

    let pending = PendingBroadcasts::new(&cfg.broadcast);
    let preview = pending.stage(CLI_REQUESTER, &message)?;
    info!("message preview: {preview}");
    pending.select_targets(CLI_REQUESTER, roster.recipients.clone())?;
    let request = pending.confirm(CLI_REQUESTER)?;

    let pool = Arc::new(WorkerPool::new(SimulatedWorker::fleet(
        workers, &roster, latency,
    )));
    let broadcaster = Broadcaster::new(cfg, pool);

    let started = now_rfc3339();
    let report = broadcaster
        .start(request, Arc::new(LogProgressSink), &LogReportSink)
        .await?;

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.output.out_dir));
    let job_dir = out_root.join(&report.job_id);
    ensure_dir(&job_dir)?;
    info!("job_id={} out={}", report.job_id, job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    if cfg.output.write_report_json {
        std::fs::write(
            job_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&report)?,
        )?;
    }

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "job_id": report.job_id,
            "roster": roster_path,
            "started": started,
            "finished": now_rfc3339(),
            "report": cfg.output.report_filename,
        });
        std::fs::write(job_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    if cfg.output.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": report.job_id,
                "job_dir": job_dir,
                "total": report.total_members,
                "success": report.success_count,
                "failed": report.failure_count,
                "status": "ok"
            }))?
        );
    }

    Ok(())
}
