//! Hearth CLI
//!
//! Thin transport collaborator for the Hearth core: feeds normalized
//! events in, drives ticks and mining runs, and exposes the graph,
//! rule, and candidate contracts on the command line.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;

use hearth_core::{
    CandidateState, CoreConfig, Decision, Engine, Event, EntityState, GetStateFilters,
    IngressOutcome, MiningStatus, NodeSort, RawStateChange, RulesFilter, SortOrder,
    normalize_state_change,
};

/// Hearth - privacy-first smart-home co-pilot core CLI
#[derive(Parser)]
#[command(name = "hearth")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Hearth smart-home co-pilot core")]
#[command(
    long_about = "Hearth ingests home-automation state changes and produces live mood\nestimates, mined A→B behavior rules, and candidate automations.\n\nThis CLI is one of the thin transport collaborators around the core."
)]
struct Cli {
    /// Data directory (platform default when omitted)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest events from a JSONL file (one event per line)
    Ingest {
        /// Path to the JSONL file; `-` reads stdin
        file: PathBuf,
        /// Lines are raw state-changes to normalize, not events
        #[arg(long)]
        raw: bool,
    },

    /// Stream events from stdin: tick per event, mine when allowed
    Run {
        /// Mine with force, ignoring the throttle window
        #[arg(long)]
        force_mine: bool,
    },

    /// Run a mining pass over the cached events
    Mine {
        /// Ignore the throttle window
        #[arg(long)]
        force: bool,
        /// Restrict to one zone (e.g. zone:kitchen)
        #[arg(long)]
        zone: Option<String>,
        /// Mine every zone and print the top suggestions instead of
        /// creating candidates
        #[arg(long, conflicts_with = "zone")]
        all_zones: bool,
        /// Maximum suggestions printed with --all-zones
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List discovered rules
    Rules {
        /// Maximum rules to print
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Substring filter on the antecedent
        #[arg(long)]
        a: Option<String>,
        /// Substring filter on the consequent
        #[arg(long)]
        b: Option<String>,
        /// Domain filter on either side
        #[arg(long)]
        domain: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Explain the best rule matching a filter
    Explain {
        /// Substring filter on the antecedent
        #[arg(long)]
        a: Option<String>,
        /// Substring filter on the consequent
        #[arg(long)]
        b: Option<String>,
    },

    /// Summarize the current rule set
    Summary,

    /// Run one neural pipeline tick
    Tick {
        /// JSON file of entity states ({"light.kitchen": "on", ...})
        #[arg(long)]
        states: Option<PathBuf>,
    },

    /// Graph operations
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// Candidate operations
    Candidates {
        #[command(subcommand)]
        command: CandidateCommands,
    },

    /// Synapse network statistics
    Synapses,

    /// Per-zone Comfort/Joy/Frugality moods
    Zones,
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Show node/edge counts and capacity bounds
    Stats,
    /// Prune decayed and over-capacity rows
    Prune,
    /// Page through nodes
    Nodes {
        /// 1-based page
        #[arg(long, default_value = "1")]
        page: usize,
        /// Page size (max 100)
        #[arg(long, default_value = "20")]
        per_page: usize,
        /// Sort key: score, label, updated_at
        #[arg(long, default_value = "score")]
        sort: String,
        /// Sort order: asc, desc
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Dump a filtered snapshot, optionally centered on a node
    State {
        /// Center node for a neighborhood query
        #[arg(long)]
        center: Option<String>,
        /// Neighborhood radius (1-3)
        #[arg(long, default_value = "1")]
        hops: u8,
    },
    /// Top mined patterns
    Patterns {
        /// Maximum patterns (≤20)
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum CandidateCommands {
    /// List candidates
    List {
        /// Filter: pending, accepted, dismissed
        #[arg(long)]
        state: Option<String>,
    },
    /// Accept a candidate
    Accept {
        /// Candidate id
        candidate_id: String,
        /// Optional reason
        #[arg(long)]
        reason: Option<String>,
    },
    /// Dismiss a candidate
    Dismiss {
        /// Candidate id
        candidate_id: String,
        /// Optional reason
        #[arg(long)]
        reason: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CoreConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }

    let mut engine = Engine::open(config).context("opening engine")?;

    match cli.command {
        Commands::Ingest { file, raw } => run_ingest(&mut engine, &file, raw),
        Commands::Run { force_mine } => run_stream(&mut engine, force_mine),
        Commands::Mine {
            force,
            zone,
            all_zones,
            limit,
        } => {
            if all_zones {
                run_mine_all_zones(&mut engine, limit)
            } else {
                run_mine(&mut engine, force, zone.as_deref())
            }
        }
        Commands::Rules {
            limit,
            a,
            b,
            domain,
            json,
        } => run_rules(&engine, limit, a, b, domain, json),
        Commands::Explain { a, b } => run_explain(&engine, a, b),
        Commands::Summary => run_summary(&engine),
        Commands::Tick { states } => run_tick(&mut engine, states),
        Commands::Graph { command } => run_graph(&mut engine, command),
        Commands::Candidates { command } => run_candidates(&mut engine, command),
        Commands::Synapses => run_synapses(&engine),
        Commands::Zones => run_zones(&engine),
    }
}

// ----------------------------------------------------------------------
// Ingest
// ----------------------------------------------------------------------

fn parse_line(line: &str, raw: bool, utc_offset_hours: f64) -> anyhow::Result<Option<Event>> {
    if raw {
        let change: RawStateChange = serde_json::from_str(line)?;
        Ok(normalize_state_change(&change, Utc::now(), utc_offset_hours, false))
    } else {
        Ok(Some(serde_json::from_str::<Event>(line)?))
    }
}

fn run_ingest(engine: &mut Engine, file: &PathBuf, raw: bool) -> anyhow::Result<()> {
    let utc_offset_hours = engine.config().utc_offset_hours;
    let reader: Box<dyn BufRead> = if file.as_os_str() == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(std::io::BufReader::new(
            std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?,
        ))
    };

    let mut accepted = 0u64;
    let mut duplicates = 0u64;
    let mut rejected = 0u64;
    let mut skipped = 0u64;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(event) = parse_line(&line, raw, utc_offset_hours)? else {
            skipped += 1;
            continue;
        };
        match engine.ingest(event) {
            Ok(IngressOutcome::Accepted) => accepted += 1,
            Ok(IngressOutcome::Duplicate) => duplicates += 1,
            Err(e) => {
                rejected += 1;
                eprintln!("{} {}", "rejected:".yellow(), e);
            }
        }
    }

    engine.persist_replay()?;
    println!(
        "{} {} accepted, {} duplicates, {} rejected, {} non-transitions",
        "✓".green(),
        accepted,
        duplicates,
        rejected,
        skipped
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Streaming loop
// ----------------------------------------------------------------------

fn run_stream(engine: &mut Engine, force_mine: bool) -> anyhow::Result<()> {
    println!("{}", "reading events from stdin (JSONL), Ctrl-D to stop".dimmed());

    // Cooperative event loop plus a small worker pool; mining runs
    // blocking on a worker slot, not on the ingest path.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_io()
        .enable_time()
        .build()?;

    let utc_offset_hours = engine.config().utc_offset_hours;
    runtime.block_on(async {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut last_mood = String::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(event) = parse_line(&line, false, utc_offset_hours)? else {
                continue;
            };
            let now_ms = event.ts_ms;
            if let Err(e) = engine.ingest(event) {
                eprintln!("{} {}", "rejected:".yellow(), e);
                continue;
            }

            let tick = engine.tick(Utc::now());
            if tick.dominant_mood != last_mood {
                println!(
                    "{} {} ({:.0}%)",
                    "mood:".cyan(),
                    tick.dominant_mood.bold(),
                    tick.mood_confidence * 100.0
                );
                last_mood = tick.dominant_mood.clone();
            }
            for suggestion in &tick.suggestions {
                println!("{} {}", "suggestion:".magenta(), suggestion.reasoning);
            }

            let throttled = engine.miner().throttle_remaining(now_ms).is_some();
            if force_mine || !throttled {
                let outcome = tokio::task::block_in_place(|| {
                    engine.mine_and_create_candidates(now_ms, force_mine, None)
                })?;
                if outcome.report.status == MiningStatus::Completed
                    && outcome.candidates_created > 0
                {
                    println!(
                        "{} {} new candidate(s) from {} rule(s)",
                        "✓".green(),
                        outcome.candidates_created,
                        outcome.report.rules
                    );
                }
            }
        }
        anyhow::Ok(())
    })?;

    engine.persist_replay()?;
    engine.shutdown()?;
    Ok(())
}

// ----------------------------------------------------------------------
// Mining
// ----------------------------------------------------------------------

fn run_mine(engine: &mut Engine, force: bool, zone: Option<&str>) -> anyhow::Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    let outcome = engine.mine_and_create_candidates(now_ms, force, zone)?;
    match outcome.report.status {
        MiningStatus::Skipped => {
            println!(
                "{} inside throttle window, retry in {}s (use --force to override)",
                "skipped:".yellow(),
                outcome.report.retry_in_sec.unwrap_or(0)
            );
        }
        MiningStatus::Completed => {
            println!(
                "{} {} rules, {} new candidates, {} already decided, {} safety-blocked",
                "✓".green(),
                outcome.report.rules,
                outcome.candidates_created,
                outcome.already_decided,
                outcome.safety_blocked
            );
            if let Some(stats) = &outcome.report.stats {
                println!(
                    "  {} events → {} after debounce, {} sessions, {} pairs evaluated",
                    stats.events_in, stats.events_deduped, stats.sessions, stats.pairs_evaluated
                );
            }
        }
    }
    Ok(())
}

fn run_mine_all_zones(engine: &mut Engine, limit: usize) -> anyhow::Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    let suggestions = engine.top_zone_suggestions(now_ms, limit)?;
    if suggestions.is_empty() {
        println!("{}", "no zone suggestions yet".dimmed());
        return Ok(());
    }
    for suggestion in &suggestions {
        let rule = &suggestion.rule;
        println!(
            "{}  {} → {} within {}s  conf={:.2} lift={:.2}{}",
            rule.zone.as_deref().unwrap_or("?").bold(),
            rule.a,
            rule.b,
            rule.dt_sec,
            rule.confidence,
            rule.lift,
            if suggestion.requires_confirmation {
                " [confirmation required]".yellow().to_string()
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

fn rules_filter(
    limit: Option<usize>,
    a: Option<String>,
    b: Option<String>,
    domain: Option<String>,
) -> RulesFilter {
    RulesFilter {
        limit,
        min_score: None,
        a_contains: a,
        b_contains: b,
        domain,
    }
}

fn run_rules(
    engine: &Engine,
    limit: usize,
    a: Option<String>,
    b: Option<String>,
    domain: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let rules = engine.miner().rules(&rules_filter(Some(limit), a, b, domain));
    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }
    if rules.is_empty() {
        println!("{}", "no rules discovered yet".dimmed());
        return Ok(());
    }
    for rule in &rules {
        println!(
            "{} → {} within {}s  conf={:.2} lb={:.2} lift={:.2} ({}/{})",
            rule.a.bold(),
            rule.b.bold(),
            rule.dt_sec,
            rule.confidence,
            rule.confidence_lb,
            rule.lift,
            rule.n_ab,
            rule.n_a
        );
    }
    Ok(())
}

fn run_explain(engine: &Engine, a: Option<String>, b: Option<String>) -> anyhow::Result<()> {
    let rules = engine.miner().rules(&rules_filter(Some(1), a, b, None));
    let Some(rule) = rules.first() else {
        bail!("no rule matches the filter");
    };
    let explanation = hearth_core::HabitusMiner::explain(rule);
    println!("{}", explanation.summary.bold());
    println!(
        "  confidence: {} ({}), {}",
        explanation.confidence_pct.green(),
        explanation.confidence_detail,
        explanation.stability
    );
    println!("  lift: {}", explanation.lift);
    if let Some(timing) = &explanation.timing {
        println!(
            "  typical delay: {:.1}s (range {:.1}s - {:.1}s)",
            timing.typical_delay_sec, timing.delay_range_sec.0, timing.delay_range_sec.1
        );
    }
    for example in &explanation.examples {
        println!("  example: tA={} latency={:.1}s", example.t_a_ms, example.latency_sec);
    }
    Ok(())
}

fn run_summary(engine: &Engine) -> anyhow::Result<()> {
    let summary = engine.miner().summary();
    println!(
        "{} rules, avg confidence {:.2}, avg lift {:.2}",
        summary.total_rules.to_string().bold(),
        summary.avg_confidence,
        summary.avg_lift
    );
    for (pair, pattern) in &summary.domain_patterns {
        println!(
            "  {}: {} rule(s), avg confidence {:.2}",
            pair, pattern.count, pattern.avg_confidence
        );
    }
    if let Some(last_run) = summary.last_run_ms {
        println!("  last run: {last_run} ({} events)", summary.total_events_processed);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Ticks
// ----------------------------------------------------------------------

fn run_tick(engine: &mut Engine, states: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(path) = states {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let parsed: HashMap<String, String> = serde_json::from_str(&raw)?;
        engine.update_entity_states(
            parsed
                .into_iter()
                .map(|(id, state)| (id, EntityState::new(state)))
                .collect(),
        );
    }

    let result = engine.tick(Utc::now());
    println!(
        "{} {} ({:.0}%){}",
        "mood:".cyan(),
        result.dominant_mood.bold(),
        result.mood_confidence * 100.0,
        if result.mood_changed { " [changed]" } else { "" }
    );
    let mut moods: Vec<(&String, &f64)> = result.smoothed_moods.iter().collect();
    moods.sort_by(|x, y| y.1.partial_cmp(x.1).unwrap_or(std::cmp::Ordering::Equal));
    for (mood, value) in moods {
        println!("  {mood}: {value:.3}");
    }
    for suggestion in &result.suggestions {
        println!("{} {}", "suggestion:".magenta(), suggestion.reasoning);
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Graph
// ----------------------------------------------------------------------

fn run_graph(engine: &mut Engine, command: GraphCommands) -> anyhow::Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    match command {
        GraphCommands::Stats => {
            let stats = engine.graph_stats()?;
            println!(
                "{} nodes (max {}), {} edges (max {})",
                stats.nodes.to_string().bold(),
                stats.max_nodes,
                stats.edges.to_string().bold(),
                stats.max_edges
            );
        }
        GraphCommands::Prune => {
            let report = engine.prune_graph(now_ms)?;
            println!(
                "{} removed {} nodes, {} edges",
                "✓".green(),
                report.nodes_removed,
                report.edges_removed
            );
        }
        GraphCommands::Nodes {
            page,
            per_page,
            sort,
            order,
        } => {
            let sort = match sort.as_str() {
                "label" => NodeSort::Label,
                "updated_at" => NodeSort::UpdatedAt,
                _ => NodeSort::Score,
            };
            let order = match order.as_str() {
                "asc" => SortOrder::Asc,
                _ => SortOrder::Desc,
            };
            let result = engine.get_nodes_page(page, per_page, sort, order)?;
            println!(
                "page {}/{} ({} total)",
                result.page,
                result.total.div_ceil(result.per_page).max(1),
                result.total
            );
            for node in &result.nodes {
                println!(
                    "  {} [{}] score={:.2} {}",
                    node.id.bold(),
                    node.kind,
                    node.score,
                    node.domain.as_deref().unwrap_or("").dimmed()
                );
            }
        }
        GraphCommands::State { center, hops } => {
            let filters = GetStateFilters {
                center,
                hops: Some(hops),
                ..Default::default()
            };
            let state = engine.get_state(&filters, now_ms)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        GraphCommands::Patterns { limit } => {
            for pattern in engine.patterns(limit) {
                println!(
                    "{} → {} within {}s  conf={:.2} lift={:.2} score={:.3}",
                    pattern.a.bold(),
                    pattern.b.bold(),
                    pattern.dt_sec,
                    pattern.confidence,
                    pattern.lift,
                    pattern.score
                );
            }
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Candidates
// ----------------------------------------------------------------------

fn parse_state(state: &str) -> anyhow::Result<CandidateState> {
    match state {
        "pending" => Ok(CandidateState::Pending),
        "accepted" => Ok(CandidateState::Accepted),
        "dismissed" => Ok(CandidateState::Dismissed),
        other => bail!("unknown state '{other}' (pending|accepted|dismissed)"),
    }
}

fn run_candidates(engine: &mut Engine, command: CandidateCommands) -> anyhow::Result<()> {
    let now_ms = Utc::now().timestamp_millis();
    match command {
        CandidateCommands::List { state } => {
            let filter = state.as_deref().map(parse_state).transpose()?;
            let candidates = engine.list_candidates(filter);
            if candidates.is_empty() {
                println!("{}", "no candidates".dimmed());
            }
            for candidate in candidates {
                let state_label = match candidate.state {
                    CandidateState::Pending => candidate.state.to_string().yellow(),
                    CandidateState::Accepted => candidate.state.to_string().green(),
                    CandidateState::Dismissed => candidate.state.to_string().red(),
                };
                println!(
                    "{} [{}] {} → {} (conf {:.2}{})",
                    candidate.candidate_id.bold(),
                    state_label,
                    candidate.evidence.a,
                    candidate.evidence.b,
                    candidate.evidence.confidence,
                    candidate
                        .metadata
                        .zone_filter
                        .as_deref()
                        .map(|z| format!(", {z}"))
                        .unwrap_or_default()
                );
            }
        }
        CandidateCommands::Accept {
            candidate_id,
            reason,
        } => {
            let candidate =
                engine.decide_candidate(&candidate_id, Decision::Accepted, reason, now_ms)?;
            println!("{} {} accepted", "✓".green(), candidate.candidate_id);
        }
        CandidateCommands::Dismiss {
            candidate_id,
            reason,
        } => {
            let candidate =
                engine.decide_candidate(&candidate_id, Decision::Dismissed, reason, now_ms)?;
            println!("{} {} dismissed", "✓".green(), candidate.candidate_id);
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Synapses
// ----------------------------------------------------------------------

fn run_synapses(engine: &Engine) -> anyhow::Result<()> {
    let stats = engine.synapse_stats();
    println!(
        "{} synapses: {} active, {} dormant, {} learning, {} pruned, avg weight {:.3}",
        stats.total.to_string().bold(),
        stats.active,
        stats.dormant,
        stats.learning,
        stats.pruned,
        stats.avg_weight
    );
    Ok(())
}

// ----------------------------------------------------------------------
// Zone moods
// ----------------------------------------------------------------------

fn run_zones(engine: &Engine) -> anyhow::Result<()> {
    let moods = engine.zone_moods();
    if moods.is_empty() {
        println!("{}", "no zone moods computed yet".dimmed());
        return Ok(());
    }
    let mut sorted: Vec<_> = moods.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    for (zone_id, mood) in sorted {
        println!(
            "{}  comfort={:.2} joy={:.2} frugality={:.2}",
            zone_id.bold(),
            mood.comfort,
            mood.joy,
            mood.frugality
        );
    }
    let summary = engine.zone_mood_summary();
    println!(
        "{} {} zone(s): comfort {:.2}, joy {:.2}, frugality {:.2}",
        "avg".dimmed(),
        summary.zones_tracked,
        summary.average_comfort,
        summary.average_joy,
        summary.average_frugality
    );
    Ok(())
}
