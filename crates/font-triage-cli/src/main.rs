mod commands;
mod logging;
mod progress;

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use font_triage_core::family::index_results;
use font_triage_core::{
    group_by_family, summarize_families, AppConfig, CandidateId, FsPermissionBroker, ItemOutcome,
    MatchResult, Permission, PermissionBroker, SqliteStore, TriageEngine, TriageSession, Verdict,
};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match font_triage_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::BuildIndex { rebuild }) => run_build_index(&config, rebuild),
        Some(Commands::IndexInfo) => run_index_info(&config),
        Some(Commands::Triage { verdict, details }) => run_triage(&config, &verdict, details),
        Some(Commands::QueueRename { path, name }) => run_queue(&config, &path, Some(&name)),
        Some(Commands::QueueRemove { path }) => run_queue(&config, &path, None),
        Some(Commands::Cancel { path }) => run_cancel(&config, &path),
        Some(Commands::Pending) => run_pending(&config),
        Some(Commands::Apply { confirm }) => run_apply(&config, confirm),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => run_truncate_db(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run_build_index(config: &AppConfig, rebuild: bool) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let reporter = CliReporter::new();
    let report = if rebuild {
        engine.rebuild_index(&reporter)?
    } else {
        engine.build_index(&reporter)?
    };

    println!();
    info!(
        "Indexed {} reference fonts from {} in {}",
        format!("{}", report.indexed).green(),
        report.meta.root_label,
        format!("{:.2}s", report.duration.as_secs_f64()).green(),
    );
    if report.failed > 0 {
        warn!(
            "{} files could not be read and were left out",
            format!("{}", report.failed).red()
        );
    }
    Ok(())
}

fn run_index_info(config: &AppConfig) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    match engine.index_info()? {
        Some(meta) => {
            println!("Root:        {}", meta.root_label);
            println!("Records:     {}", meta.item_count.to_string().green());
            println!("Failed:      {}", meta.failed_count.to_string().red());
            println!("Last built:  {}", meta.last_built_at);
        }
        None => println!("No reference index has been built yet. Run `font-triage build-index`."),
    }
    Ok(())
}

fn open_session(engine: &TriageEngine) -> anyhow::Result<TriageSession> {
    let reporter = CliReporter::new();
    let (session, stats) = engine.open_session(&reporter)?;
    info!(
        "{} candidates scanned in {}, {} unreadable, {} pending intents restored",
        format!("{}", stats.candidates).cyan(),
        format!("{:.2}s", stats.scan_duration.as_secs_f64()).green(),
        format!("{}", stats.extraction_failures).red(),
        stats.restored_intents,
    );
    Ok(session)
}

fn run_triage(config: &AppConfig, filter: &[Verdict], details: bool) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let session = open_session(&engine)?;
    let reporter = CliReporter::new();

    let candidates = session.candidates()?;
    let results = session.classify_all(&reporter)?;
    let filter = (!filter.is_empty()).then_some(filter);
    let summaries = summarize_families(&candidates, &results, filter);

    let groups = group_by_family(&candidates);
    let by_id = index_results(&results);
    let pending = session.pending()?;

    println!();
    for summary in &summaries {
        if filter.is_some() && summary.filtered_count == 0 {
            continue;
        }
        let verdict = summary
            .verdict
            .map(paint)
            .unwrap_or_else(|| "-".dimmed());
        println!(
            "{:<10} {} ({} of {})",
            verdict,
            summary.key.bold(),
            summary.filtered_count,
            summary.member_count
        );

        if !details {
            continue;
        }
        for member in groups.get(&summary.key).into_iter().flatten() {
            let Some(result) = by_id.get(&member.id) else {
                continue;
            };
            if filter.map_or(false, |allowed| !allowed.contains(&result.verdict)) {
                continue;
            }
            let intent = match pending.planned_op(&member.id) {
                Some(op) => format!(" [{:?}]", op).yellow(),
                None => "".normal(),
            };
            println!(
                "    {:<10} {} {}{}",
                paint(result.verdict),
                result.level,
                member.file_name,
                intent
            );
            let line = describe(result);
            if !line.is_empty() {
                println!("               {}", line.dimmed());
            }
            if let Some(err) = &member.extraction_error {
                println!("               {}", err.red());
            }
        }
    }

    let mut counts: HashMap<Verdict, usize> = HashMap::new();
    for result in &results {
        *counts.entry(result.verdict).or_default() += 1;
    }
    println!();
    let totals: Vec<String> = Verdict::ALL
        .iter()
        .map(|v| format!("{} {}", paint(*v), counts.get(v).copied().unwrap_or(0)))
        .collect();
    println!("{}", totals.join("  "));
    Ok(())
}

fn paint(verdict: Verdict) -> ColoredString {
    let label = verdict.as_str();
    match verdict {
        Verdict::Conflict => label.red().bold(),
        Verdict::Problem => label.red(),
        Verdict::Review => label.yellow(),
        Verdict::Upgrade => label.cyan(),
        Verdict::New => label.green(),
        Verdict::Skip => label.dimmed(),
    }
}

fn describe(result: &MatchResult) -> String {
    let mut parts = Vec::new();
    if let Some(reference) = &result.reference_path {
        parts.push(format!("ref {}", reference));
    }
    if let Some(v) = result.version_delta {
        parts.push(format!("version {:+.3}", v));
    }
    if let Some(g) = result.glyph_delta {
        parts.push(format!("glyphs {:+}", g));
    }
    if let Some(s) = result.size_delta {
        parts.push(format!("bytes {:+}", s));
    }
    if !result.feature_delta.is_empty() {
        let tags: Vec<&str> = result.feature_delta.iter().map(String::as_str).collect();
        parts.push(format!("features ~{}", tags.join(",")));
    }
    if !result.table_delta.is_empty() {
        let tags: Vec<&str> = result.table_delta.iter().map(String::as_str).collect();
        parts.push(format!("tables ~{}", tags.join(",")));
    }
    if result.trial_keyword {
        parts.push("trial build".to_string());
    }
    parts.join(", ")
}

/// Match a user-supplied path against the live candidate set.
fn resolve_candidate(session: &TriageSession, path: &Path) -> anyhow::Result<CandidateId> {
    let wanted = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    for candidate in session.candidates()? {
        let candidate_path = candidate.path();
        if candidate_path == path
            || candidate_path
                .canonicalize()
                .map(|p| p == wanted)
                .unwrap_or(false)
        {
            return Ok(candidate.id);
        }
    }
    bail!("{} is not a candidate under the configured roots", path.display())
}

fn run_queue(config: &AppConfig, path: &Path, rename_to: Option<&str>) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let session = open_session(&engine)?;
    let id = resolve_candidate(&session, path)?;

    let changed = match rename_to {
        Some(name) => session.queue_rename(&id, name)?,
        None => session.queue_removal(&id)?,
    };
    engine.save_intents(&session)?;

    match (rename_to, changed) {
        (Some(name), true) => println!("Queued rename {} -> {}", id, name.green()),
        (None, true) => println!("Queued removal of {}", id),
        (_, false) => println!("Already queued: {}", id),
    }
    Ok(())
}

fn run_cancel(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let session = open_session(&engine)?;
    // A vanished file can still have a stale intent.
    let id = resolve_candidate(&session, path).unwrap_or_else(|_| CandidateId::from_path(path));

    if session.cancel(&id)? {
        engine.save_intents(&session)?;
        println!("Cancelled pending intents for {}", id);
    } else {
        println!("Nothing pending for {}", id);
    }
    Ok(())
}

fn run_pending(config: &AppConfig) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let queue = engine.load_intents()?;
    if queue.is_empty() {
        println!("No pending intents.");
        return Ok(());
    }
    for id in queue.removals() {
        println!("{} {}", "remove".red(), id);
    }
    for (id, name) in queue.renames() {
        if queue.is_removal_pending(id) {
            continue;
        }
        println!("{} {} -> {}", "rename".cyan(), id, name);
    }
    Ok(())
}

/// Checks the filesystem first, then asks the user once per directory.
struct PromptBroker;

impl PermissionBroker for PromptBroker {
    fn request_write(&self, dir: &Path) -> io::Result<Permission> {
        if FsPermissionBroker.request_write(dir)? == Permission::Denied {
            return Ok(Permission::Denied);
        }
        let allowed = prompt_confirm(
            &format!("Allow changes in {}?", dir.display()),
            Some(false),
        )?;
        Ok(if allowed {
            Permission::Granted
        } else {
            Permission::Denied
        })
    }
}

fn run_apply(config: &AppConfig, confirm: bool) -> anyhow::Result<()> {
    let engine = TriageEngine::open(config.clone())?;
    let session = open_session(&engine)?;
    let pending = session.pending()?;
    if pending.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }

    let reporter = CliReporter::new();
    let report = if confirm {
        engine.apply(&session, &PromptBroker, &reporter)
    } else {
        engine.apply(&session, &FsPermissionBroker, &reporter)
    }
    .context("apply failed")?;

    for (id, outcome) in &report.outcomes {
        match outcome {
            ItemOutcome::Renamed { to } => println!("{} {} -> {}", "renamed".green(), id, to.display()),
            ItemOutcome::Removed { staged_at } => {
                println!("{} {} (kept at {})", "removed".green(), id, staged_at.display())
            }
            ItemOutcome::NoOp => println!("{} {}", "unchanged".dimmed(), id),
            ItemOutcome::Skipped { reason } => println!("{} {}: {}", "skipped".yellow(), id, reason),
            ItemOutcome::Failed { error } => println!("{} {}: {}", "failed".red(), id, error),
            ItemOutcome::Missing => println!("{} {}", "gone".dimmed(), id),
        }
    }

    println!();
    info!(
        "{} renamed, {} removed, {} skipped, {} failed",
        format!("{}", report.renamed).green(),
        format!("{}", report.removed).green(),
        format!("{}", report.skipped).yellow(),
        format!("{}", report.failed()).red(),
    );
    if let Some(first) = &report.first_error {
        warn!("First error: {}", first);
    }
    Ok(())
}

fn run_truncate_db(config: &AppConfig) -> anyhow::Result<()> {
    let confirmed = prompt_confirm(
        "Are you SURE you want to COMPLETELY DELETE the Database?",
        Some(false),
    )?;
    if !confirmed {
        return Ok(());
    }
    let store = SqliteStore::open(&config.db_path)?;
    store.truncate_all()?;
    println!("All tables truncated");
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
