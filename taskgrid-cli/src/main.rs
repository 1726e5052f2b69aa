use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

use taskgrid_core::constraint::{OffsetOperator, RelativePosition};
use taskgrid_core::time;
use taskgrid_core::wire::{self, ApiTask};
use taskgrid_core::{
    CalendarService, LocalBackend, MutationReport, PlacementStatus, RebuildWindow, ScheduleBackend, Scheduler,
    TaskDraft, TaskId, UserId,
};

mod config;
mod http;
mod render;
mod state;

use config::{BackendKind, Config};
use http::{HttpBackend, HttpOptions};

#[derive(Parser, Debug)]
#[command(name = "taskgrid", version, about = "Constraint-driven weekly task calendar")]
struct Cli {
    /// Log filter (e.g. "info", "taskgrid_core=debug"); overrides TASKGRID_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Backend to talk to (default: from config)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendKind>,

    /// User whose calendar is addressed (default: from config)
    #[arg(long, global = true)]
    user: Option<u64>,

    /// JSON store for the local backend (default: from config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a task and rebuild the calendar
    Add(TaskArgs),

    /// Replace an existing task's constraints and rebuild
    Edit {
        #[arg(long)]
        id: String,

        #[command(flatten)]
        task: TaskArgs,
    },

    /// Placed tasks from the last rebuild
    List,

    /// Delete a task (every split part goes with it)
    Delete { id: String },

    /// Mark a task complete; its slot stops blocking others
    Complete { id: String },

    /// Rebuild without changing any task
    Rebuild {
        /// Window start (default: the configured weeks around now)
        #[arg(long, requires = "to")]
        from: Option<String>,

        #[arg(long, requires = "from")]
        to: Option<String>,
    },

    /// Tasks the last rebuild could not place, with reasons
    Penalties,

    /// Column layout of one day (default: today in the display timezone)
    Day { date: Option<NaiveDate> },

    /// Tasks that can be referenced by a dependency
    Targets,

    /// Place a JSON file of task records offline and print the result
    Plan {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        now: Option<String>,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write ~/.taskgrid/config.toml with defaults (no-op if present)
    Init,

    /// Print the effective configuration
    Show,
}

#[derive(Args, Debug, Clone)]
struct TaskArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    description: Option<String>,

    /// 1 (most urgent) to 10 (default: 5)
    #[arg(long)]
    priority: Option<i64>,

    /// Length in minutes (default: 60)
    #[arg(long)]
    duration: Option<i64>,

    /// Fixed start: 2026-10-14T09:00:00Z, or "2026-10-14 12:00" in the display timezone
    #[arg(long)]
    start: Option<String>,

    /// Flexible placement anywhere inside [window-start, window-end]
    #[arg(long, requires = "window_end")]
    window_start: Option<String>,

    #[arg(long, requires = "window_start")]
    window_end: Option<String>,

    /// Place relative to another task's placement
    #[arg(long)]
    after: Option<String>,

    #[arg(long, value_enum, default_value_t = Side::After)]
    side: Side,

    #[arg(long, value_enum, default_value_t = Relation::Gt)]
    relation: Relation,

    /// Offset from the referenced task in minutes
    #[arg(long, default_value_t = 0)]
    offset: i64,

    /// Repeat every N minutes
    #[arg(long)]
    repeat_every: Option<i64>,

    #[arg(long)]
    repeat_count: Option<i64>,

    #[arg(long)]
    repeat_until: Option<String>,

    /// Measure the repeat gap from the previous occurrence's end
    #[arg(long)]
    repeat_from_end: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Relation {
    Lt,
    Eq,
    Gt,
}

/// `2026-10-14T09:00:00Z` style values are absolute; `2026-10-14 09:00` is
/// read in the display timezone.
fn instant(value: &str, tz: Tz) -> Result<DateTime<Utc>> {
    if value.contains('T') {
        return wire::parse_instant(value).with_context(|| format!("parse instant '{value}'"));
    }
    time::parse_local_to_utc(value, tz.name()).with_context(|| format!("parse local time '{value}'"))
}

fn opt_instant(value: Option<&str>, tz: Tz) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| instant(v, tz)).transpose()
}

impl TaskArgs {
    fn draft(&self, id: Option<TaskId>, tz: Tz) -> Result<TaskDraft> {
        let mut draft = TaskDraft::new(self.title.clone());
        draft.id = id;
        draft.description = self.description.clone();
        draft.priority = self.priority;
        draft.duration_minutes = Some(self.duration.unwrap_or(i64::from(wire::DEFAULT_DURATION_MINUTES)));
        draft.start = opt_instant(self.start.as_deref(), tz)?;
        draft.window = self.window_start.is_some() || self.window_end.is_some();
        draft.window_start = opt_instant(self.window_start.as_deref(), tz)?;
        draft.window_end = opt_instant(self.window_end.as_deref(), tz)?;

        if let Some(target) = &self.after {
            draft.dependency = true;
            draft.dependency_target = Some(TaskId::new(target.clone()));
            draft.dependency_position = Some(match self.side {
                Side::Before => RelativePosition::Before,
                Side::After => RelativePosition::After,
            });
            draft.dependency_operator = Some(match self.relation {
                Relation::Lt => OffsetOperator::Less,
                Relation::Eq => OffsetOperator::Equal,
                Relation::Gt => OffsetOperator::Greater,
            });
            draft.dependency_offset_minutes = Some(self.offset);
        }

        if let Some(gap) = self.repeat_every {
            let until = opt_instant(self.repeat_until.as_deref(), tz)?;
            draft = draft.repeating(gap, self.repeat_count, until);
            if self.repeat_from_end {
                draft = draft.repeat_from_end();
            }
        }
        Ok(draft)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config()?;
    init_logging(cli.log_level.as_deref());

    if let Some(kind) = cli.backend {
        cfg.backend.kind = kind;
    }
    if let Some(user) = cli.user {
        cfg.backend.user_id = user;
    }
    if let Some(store) = cli.store.clone() {
        cfg.backend.store_path = Some(store);
    }

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?),
        },

        Command::Plan { input, now } => {
            let now = match now {
                Some(now) => instant(&now, cfg.timezone()?)?,
                None => Utc::now(),
            };
            plan(&cfg, &input, now)?;
        }

        command => match cfg.backend.kind {
            BackendKind::Local => {
                let path = cfg.store_path()?;
                let backend = LocalBackend::open(&path, cfg.scheduler())
                    .await
                    .with_context(|| format!("open store {}", path.display()))?;
                run(CalendarService::new(backend, cfg.service()), &cfg, command).await?;
            }
            BackendKind::Http => {
                let backend = HttpBackend::new(HttpOptions {
                    base_url: cfg.backend.base_url.clone(),
                    retries: cfg.backend.retries,
                    backoff_ms: cfg.backend.backoff_ms,
                    request_timeout: Duration::from_millis(cfg.schedule.rebuild_timeout_ms),
                })
                .context("build http client")?;
                run(CalendarService::new(backend, cfg.service()), &cfg, command).await?;
            }
        },
    }

    Ok(())
}

fn init_logging(level: Option<&str>) {
    let env_filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_env("TASKGRID_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}

async fn run<B: ScheduleBackend>(svc: CalendarService<B>, cfg: &Config, command: Command) -> Result<()> {
    let user = UserId(cfg.backend.user_id);
    let tz = cfg.timezone()?;

    match command {
        Command::Add(args) => {
            let report = svc.create(user, &args.draft(None, tz)?).await?;
            report_mutation("created", &report);
        }

        Command::Edit { id, task } => {
            let report = svc.update(user, &task.draft(Some(TaskId::new(id)), tz)?).await?;
            report_mutation("updated", &report);
        }

        Command::Delete { id } => {
            let report = svc.delete(user, &TaskId::new(id)).await?;
            report_mutation("deleted", &report);
        }

        Command::Complete { id } => {
            let report = svc.complete(user, &TaskId::new(id)).await?;
            report_mutation("completed", &report);
        }

        Command::Rebuild { from, to } => {
            let window = match (from, to) {
                (Some(from), Some(to)) => match RebuildWindow::new(instant(&from, tz)?, instant(&to, tz)?) {
                    Some(window) => Some(window),
                    None => bail!("rebuild window must end after it starts"),
                },
                _ => None,
            };
            match svc.rebuild(user, window).await {
                PlacementStatus::Fresh => println!("Calendar rebuilt"),
                PlacementStatus::Stale(e) => bail!("rebuild failed, previous placement kept: {e}"),
            }
        }

        Command::List => print!("{}", render::tasks(&svc.list(user).await?, tz)),

        Command::Penalties => print!("{}", render::penalties(&svc.penalties(user).await?)),

        Command::Day { date } => {
            let date = date.unwrap_or_else(|| today(tz));
            print!("{}", render::day(&svc.day(user, date).await?, date, tz));
        }

        Command::Targets => {
            print!("{}", render::targets(&svc.available_dependency_targets(user).await?));
        }

        Command::Plan { .. } | Command::Config { .. } => bail!("command does not need a backend"),
    }

    Ok(())
}

fn today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

fn report_mutation(verb: &str, report: &MutationReport) {
    match &report.placement {
        PlacementStatus::Fresh => println!("Task {} {verb}; calendar rebuilt", report.task_id),
        PlacementStatus::Stale(e) => {
            println!("Task {} {verb}; placement is stale: {e}", report.task_id);
            println!("Run `taskgrid rebuild` once the scheduler is reachable.");
        }
    }
}

fn plan(cfg: &Config, input: &Path, now: DateTime<Utc>) -> Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("read {}", input.display()))?;
    let records: Vec<ApiTask> = serde_json::from_str(&text).with_context(|| format!("parse {}", input.display()))?;

    let mut valid = Vec::with_capacity(records.len());
    for (i, api) in records.iter().enumerate() {
        let record = wire::classify(api).with_context(|| format!("record {i} ('{}')", api.name))?;
        valid.push(record.with_id(api.task_id().cloned().unwrap_or_else(|| TaskId::new((i + 1).to_string()))));
    }

    let window = RebuildWindow::around(now, cfg.schedule.weeks_before, cfg.schedule.weeks_after);
    let outcome = Scheduler::new(cfg.scheduler())
        .with_time_budget(Duration::from_millis(cfg.schedule.rebuild_timeout_ms))
        .rebuild(&valid, &window)?;

    let tz = cfg.timezone()?;
    println!("# Placed\n");
    print!("{}", render::tasks(&outcome.placed, tz));
    println!("\n# Not placed\n");
    let penalties: Vec<_> = outcome.penalties.iter().map(wire::api_from_penalty).collect();
    print!("{}", render::penalties(&penalties));
    Ok(())
}
