use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, Local, NaiveDate, Offset};
use clap::{Parser, Subcommand};
use habit_domain::{
    export,
    stats::{self, PeriodSummary},
    ConfirmationGate, HabitService, NonDuePolicy, PeriodSnapshot, PeriodType,
};
use habit_sync::{AccountId, FileStore, SyncSession};
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) account: String,
    pub(crate) utc_offset: FixedOffset,
    pub(crate) non_due_policy: NonDuePolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("HABIT_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(account) = std::env::var("HABIT_ACCOUNT") {
            if !account.trim().is_empty() {
                config.account = account.trim().to_string();
            }
        }
        if let Ok(minutes) = std::env::var("HABIT_UTC_OFFSET_MINUTES") {
            match parse_offset_minutes(&minutes) {
                Ok(offset) => config.utc_offset = offset,
                Err(err) => warn!(%err, "ignoring HABIT_UTC_OFFSET_MINUTES"),
            }
        }
        if let Ok(policy) = std::env::var("HABIT_NON_DUE_POLICY") {
            config.non_due_policy = parse_policy(&policy)?;
        }
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(account) = &cli.account {
            self.account = account.clone();
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("habitflow-data"),
            account: "local".to_string(),
            utc_offset: Local::now().offset().fix(),
            non_due_policy: NonDuePolicy::default(),
        }
    }
}

fn parse_offset_minutes(raw: &str) -> Result<FixedOffset> {
    let minutes: i32 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid UTC offset `{raw}`"))?;
    FixedOffset::east_opt(minutes * 60)
        .with_context(|| format!("UTC offset out of range: {minutes}"))
}

fn parse_policy(raw: &str) -> Result<NonDuePolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "reject" => Ok(NonDuePolicy::Reject),
        "permit" => Ok(NonDuePolicy::Permit),
        other => bail!("unknown non-due policy `{other}` (expected `reject` or `permit`)"),
    }
}

#[derive(Debug, Parser)]
#[command(name = "habitflow", about = "Track recurring and one-off habits per period")]
pub struct Cli {
    /// Directory holding one habit document per account.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub account: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PeriodArgs {
    /// Any date inside the period, defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long, default_value = "daily")]
    pub period: PeriodType,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what is due in a period.
    Show {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Limit to one granularity; all three when omitted.
        #[arg(long)]
        period: Option<PeriodType>,
        #[arg(long)]
        json: bool,
    },
    /// List task templates, including deleted ones.
    Templates,
    /// Add a recurring task template.
    Add {
        title: String,
        #[arg(long, default_value = "daily")]
        period: PeriodType,
    },
    /// Soft-delete a recurring task template.
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Flip completion of a recurring task in a period.
    Toggle {
        id: String,
        #[command(flatten)]
        at: PeriodArgs,
    },
    /// Manage one-off tasks of a period.
    #[command(subcommand)]
    OneOff(OneOffCommand),
    /// Completion trend for recent periods.
    Stats {
        #[arg(long, default_value = "daily")]
        period: PeriodType,
    },
    /// Write the history as CSV.
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete all habits and history.
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

impl Command {
    /// Whether running the command writes to the habit document.
    pub fn changes_state(&self) -> bool {
        !matches!(
            self,
            Command::Show { .. }
                | Command::Templates
                | Command::Stats { .. }
                | Command::Export { .. }
        )
    }
}

#[derive(Debug, Subcommand)]
pub enum OneOffCommand {
    Add {
        title: String,
        #[command(flatten)]
        at: PeriodArgs,
    },
    Toggle {
        id: String,
        #[command(flatten)]
        at: PeriodArgs,
    },
    Delete {
        id: String,
        #[command(flatten)]
        at: PeriodArgs,
    },
}

/// Asks on stdin; anything but an explicit yes declines.
struct StdinGate;

impl ConfirmationGate for StdinGate {
    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N] ");
        if io::stderr().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

struct AssumeYes;

impl ConfirmationGate for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

pub fn run(cli: Cli, mut config: AppConfig) -> Result<()> {
    config.apply_overrides(&cli);
    info!(data_dir = %config.data_dir.display(), account = %config.account, "starting habitflow");

    let store = Arc::new(
        FileStore::open(&config.data_dir).context("failed to open habit data directory")?,
    );
    let account = AccountId::new(&config.account).context("invalid account")?;
    let service = Arc::new(
        HabitService::builder()
            .with_utc_offset(config.utc_offset)
            .with_non_due_policy(config.non_due_policy)
            .build()
            .context("failed to initialize habit service")?,
    );

    let mut session = SyncSession::connect(store, account, service.clone());
    let load_error = session.status().error.clone();
    if let Some(error) = &load_error {
        eprintln!("sync error: {error}");
    }
    if !session.is_loaded() && cli.command.changes_state() {
        session.disconnect();
        bail!(
            "habit document for `{}` could not be loaded ({}); refusing to change it",
            config.account,
            load_error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(error) = &load_error {
        warn!(%error, "continuing with local state");
    }

    let gate: &dyn ConfirmationGate = match &cli.command {
        Command::Delete { yes: true, .. } | Command::Reset { yes: true } => &AssumeYes,
        _ => &StdinGate,
    };
    let stdout = io::stdout();
    execute(&service, cli.command, gate, &mut stdout.lock())?;

    session.flush();
    if let Some(error) = &session.status().error {
        eprintln!("sync error: {error}");
    }
    session.disconnect();
    Ok(())
}

/// Run one command against the service, writing the report to `out`.
pub fn execute(
    service: &HabitService,
    command: Command,
    gate: &dyn ConfirmationGate,
    out: &mut impl Write,
) -> Result<()> {
    let today = service.today();
    match command {
        Command::Show { date, period, json } => {
            let date = date.unwrap_or(today);
            let periods = match period {
                Some(period) => vec![period],
                None => PeriodType::ALL.to_vec(),
            };
            for period in periods {
                let snapshot = service.get_snapshot(date, period);
                if json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&snapshot)?)?;
                } else {
                    write_snapshot(service, &snapshot, out)?;
                }
            }
        }
        Command::Templates => {
            for template in service.templates() {
                let status = if template.active { "active" } else { "deleted" };
                writeln!(
                    out,
                    "{}  {:<8} {:<8} {}",
                    template.id, template.period, status, template.title
                )?;
            }
        }
        Command::Add { title, period } => {
            let template = service.add_task(&title, period)?;
            writeln!(out, "added {} ({})", template.id, template.period)?;
        }
        Command::Delete { id, .. } => {
            let Some(template) = service.template(&id) else {
                bail!("unknown task template `{id}`");
            };
            let prompt = format!(
                "Delete \"{}\"? Past periods keep it; new periods will not include it.",
                template.title
            );
            if !gate.confirm(&prompt) {
                writeln!(out, "cancelled")?;
                return Ok(());
            }
            service.delete_template(&id)?;
            writeln!(out, "deleted {id}")?;
        }
        Command::Toggle { id, at } => {
            let done = service.toggle_task(at.date.unwrap_or(today), at.period, &id)?;
            writeln!(out, "{id}: {}", status_word(done))?;
        }
        Command::OneOff(action) => match action {
            OneOffCommand::Add { title, at } => {
                let id = service.add_one_off_task(at.date.unwrap_or(today), at.period, &title)?;
                writeln!(out, "added one-off {id}")?;
            }
            OneOffCommand::Toggle { id, at } => {
                match service.toggle_one_off_task(at.date.unwrap_or(today), at.period, &id)? {
                    Some(done) => writeln!(out, "{id}: {}", status_word(done))?,
                    None => writeln!(out, "no one-off task `{id}` in that period")?,
                }
            }
            OneOffCommand::Delete { id, at } => {
                if service.delete_one_off_task(at.date.unwrap_or(today), at.period, &id)? {
                    writeln!(out, "deleted one-off {id}")?;
                } else {
                    writeln!(out, "no one-off task `{id}` in that period")?;
                }
            }
        },
        Command::Stats { period } => {
            let points = stats::completion_trend(service, today, period);
            for point in &points {
                writeln!(
                    out,
                    "{:<8} {:>3}%  {}/{}",
                    point.label, point.ratio, point.completed, point.total
                )?;
            }
            writeln!(out, "average: {}%", stats::average_ratio(&points))?;
            writeln!(
                out,
                "active {period} habits: {}",
                service.active_templates(period).len()
            )?;
        }
        Command::Export { output } => {
            let csv = export::export_csv(&service.state());
            let path = output.unwrap_or_else(|| PathBuf::from(export::export_file_name(today)));
            fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(out, "exported history to {}", path.display())?;
        }
        Command::Reset { .. } => {
            if service.reset_all_data(gate) {
                writeln!(out, "all habit data deleted")?;
            } else {
                writeln!(out, "cancelled")?;
            }
        }
    }
    Ok(())
}

fn write_snapshot(
    service: &HabitService,
    snapshot: &PeriodSnapshot,
    out: &mut impl Write,
) -> Result<()> {
    let summary = PeriodSummary::of(snapshot);
    writeln!(
        out,
        "{} {}  {}/{} ({}%)",
        snapshot.period_type,
        snapshot.period_key,
        summary.completed(),
        summary.total(),
        summary.ratio_percent()
    )?;
    for id in &snapshot.due_task_ids {
        let title = service
            .template(id)
            .map(|template| template.title)
            .unwrap_or_else(|| id.clone());
        writeln!(out, "  [{}] {title} ({id})", check_mark(snapshot.is_completed(id)))?;
    }
    for task in &snapshot.one_off_tasks {
        writeln!(out, "  [{}] {} (one-off {})", check_mark(task.completed), task.title, task.id)?;
    }
    Ok(())
}

fn check_mark(done: bool) -> char {
    if done {
        'x'
    } else {
        ' '
    }
}

fn status_word(done: bool) -> &'static str {
    if done {
        "done"
    } else {
        "pending"
    }
}
