//! Subcommand implementations. Each returns the process exit code.

use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

use swarmkeeper_core::{
    dump_sessions, list_sessions, load_config, run_manager_once, run_pattern_once, start_session,
    stop_session, ClassificationStrategy, LoopConfig, LoopOutcome, MatchMode, MonitorError,
    MonitorLoop, Notifier, OpenAiClassifier, PatternSet, PatternStrategy, PendingPolicy,
    RegistryStore, Result, SwarmConfig, TmuxCapture,
};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

const SEPARATOR_WIDTH: usize = 60;
const LIST_LOG_CHARS: usize = 97;

/// Flags shared by `pattern` and `pattern-loop`.
#[derive(Debug, Clone)]
pub struct PatternOptions {
    pub patterns: Vec<String>,
    pub regex: bool,
    pub fuzzy: bool,
    pub fuzzy_threshold: Option<f64>,
    pub lines: Option<usize>,
}

impl PatternOptions {
    fn strategy(&self, config: &SwarmConfig) -> PatternStrategy {
        let threshold = self
            .fuzzy_threshold
            .unwrap_or(config.loop_defaults.fuzzy_threshold);
        let set = PatternSet::new(
            self.patterns.clone(),
            MatchMode::from_flags(self.regex, self.fuzzy),
        )
        .with_threshold(threshold);
        PatternStrategy::new(set, self.lines.unwrap_or(config.loop_defaults.capture_lines))
    }
}

#[derive(Debug, Clone)]
pub struct PatternLoopOptions {
    pub pattern: PatternOptions,
    pub interval: Option<u64>,
    pub auto_type: Option<String>,
    pub auto_type_max: Option<u32>,
    pub confirm: bool,
    pub reset_on_miss: bool,
    pub notify_handler: Option<String>,
}

fn ready_tmux() -> Result<TmuxCapture> {
    let tmux = TmuxCapture::new();
    tmux.ensure_available()?;
    Ok(tmux)
}

pub fn start(name: &str, command: Option<&str>) -> Result<i32> {
    let tmux = ready_tmux()?;
    let store = RegistryStore::open_default()?;
    let mut registry = store.load();
    let cwd = std::env::current_dir().map_err(|err| swarmkeeper_core::SwarmError::Io {
        context: "Failed to resolve current directory".to_string(),
        source: err,
    })?;

    start_session(&mut registry, &tmux, name, command, &cwd)?;
    store.save(&registry)?;

    println!("Created session: {}", name);
    println!("Attach with: tmux attach -t {}", name);
    Ok(EXIT_OK)
}

pub fn stop(name: &str) -> Result<i32> {
    let tmux = ready_tmux()?;
    let store = RegistryStore::open_default()?;
    let mut registry = store.load();

    stop_session(&mut registry, &tmux, name)?;
    store.save(&registry)?;

    println!("Stopped session '{}'", name);
    Ok(EXIT_OK)
}

pub fn list() -> Result<i32> {
    let tmux = ready_tmux()?;
    let registry = RegistryStore::open_default()?.load();
    let listing = list_sessions(&registry, &tmux);

    if listing.is_empty() {
        println!("No tracked sessions");
        return Ok(EXIT_OK);
    }

    println!("Tracked Sessions:");
    println!("{}", "=".repeat(SEPARATOR_WIDTH));
    for entry in listing {
        let liveness = if entry.is_alive { "[alive]" } else { "[dead]" };
        let (status, log) = match &entry.last_check {
            Some(check) => (check.status.as_str(), check.log.as_str()),
            None => ("unknown", "No checks yet"),
        };
        println!("{}: {} {}", entry.name, liveness, status);
        if let Some(command) = &entry.command {
            println!("  command: {}", command);
        }
        println!("  {}", shorten(log, LIST_LOG_CHARS));
        println!("{}", "-".repeat(SEPARATOR_WIDTH));
    }
    Ok(EXIT_OK)
}

pub fn dump(lines: Option<usize>) -> Result<i32> {
    let config = load_config(None)?;
    let tmux = ready_tmux()?;
    let registry = RegistryStore::open_default()?.load();
    let lines = lines.unwrap_or(config.loop_defaults.capture_lines);

    let outputs = dump_sessions(&registry, &tmux, lines);
    if outputs.is_empty() {
        println!("No live sessions");
    }
    for (name, output) in outputs {
        println!("{}", "=".repeat(SEPARATOR_WIDTH));
        println!("Session: {}", name);
        println!("{}", "=".repeat(SEPARATOR_WIDTH));
        println!("{}", output.trim_end());
        println!();
    }
    Ok(EXIT_OK)
}

fn classification_strategy(config: &SwarmConfig) -> Result<ClassificationStrategy> {
    let classifier = OpenAiClassifier::from_config(&config.classifier)?;
    Ok(ClassificationStrategy::new(
        Box::new(classifier),
        config.loop_defaults.capture_lines,
    ))
}

pub fn manager() -> Result<i32> {
    let config = load_config(None)?;
    let strategy = classification_strategy(&config)?;
    let tmux = ready_tmux()?;
    let store = RegistryStore::open_default()?;
    let mut registry = store.load();

    let reports = run_manager_once(&mut registry, &strategy, &tmux)?;
    store.save(&registry)?;

    if reports.is_empty() {
        println!("No tracked sessions");
    }
    for report in reports {
        let liveness = if report.is_alive { "" } else { " (removed)" };
        println!("{}: {}{}", report.name, report.status, liveness);
        println!("  {}", report.log);
    }
    Ok(EXIT_OK)
}

pub fn pattern(options: &PatternOptions) -> Result<i32> {
    let config = load_config(None)?;
    let strategy = options.strategy(&config);
    let tmux = ready_tmux()?;
    let registry = RegistryStore::open_default()?.load();

    let results = run_pattern_once(&registry, &strategy, &tmux)?;
    let mut any_matched = false;
    for result in &results {
        if !result.is_alive {
            println!("[DEAD]  {}", result.session);
        } else if result.matched {
            any_matched = true;
            println!(
                "[MATCH] {}: '{}'",
                result.session,
                result.matched_pattern.as_deref().unwrap_or("unknown")
            );
            println!("        {}", result.matched_text.as_deref().unwrap_or(""));
        } else {
            println!("[--]    {} ({} lines checked)", result.session, result.line_count);
        }
    }

    Ok(if any_matched { EXIT_OK } else { EXIT_FAILURE })
}

pub fn manager_loop(
    interval: Option<u64>,
    confirm: bool,
    notify_handler: Option<&str>,
    cancel: &AtomicBool,
) -> Result<i32> {
    let config = load_config(None)?;
    let strategy = classification_strategy(&config)?;
    let tmux = ready_tmux()?;
    let store = RegistryStore::open_default()?;
    let notifier = Notifier::from_handler(notify_handler);
    let loop_config = LoopConfig {
        interval: Duration::from_secs(interval.unwrap_or(config.loop_defaults.manager_interval_secs)),
        auto_type: None,
        confirm,
        ..LoopConfig::default()
    };

    info!(
        interval_secs = loop_config.interval.as_secs(),
        confirm,
        notifier = ?notifier,
        "Starting manager loop"
    );
    let monitor = MonitorLoop::new(&strategy, &tmux, &notifier, &store, loop_config);
    finish(monitor.run(store.load(), cancel))
}

pub fn pattern_loop(options: &PatternLoopOptions, cancel: &AtomicBool) -> Result<i32> {
    let config = load_config(None)?;
    let strategy = options.pattern.strategy(&config);
    let tmux = ready_tmux()?;
    let store = RegistryStore::open_default()?;
    let notifier = Notifier::from_handler(options.notify_handler.as_deref());
    let loop_config = LoopConfig {
        interval: Duration::from_secs(
            options
                .interval
                .unwrap_or(config.loop_defaults.pattern_interval_secs),
        ),
        auto_type: options.auto_type.clone(),
        auto_type_max: options
            .auto_type_max
            .unwrap_or(config.loop_defaults.auto_type_max),
        confirm: options.confirm,
        pending_policy: if options.reset_on_miss {
            PendingPolicy::ResetOnMiss
        } else {
            PendingPolicy::Retain
        },
    };

    info!(
        patterns = ?options.pattern.patterns,
        mode = ?strategy.set.mode,
        interval_secs = loop_config.interval.as_secs(),
        auto_type = ?loop_config.auto_type,
        auto_type_max = loop_config.auto_type_max,
        confirm = loop_config.confirm,
        "Starting pattern loop"
    );
    let monitor = MonitorLoop::new(&strategy, &tmux, &notifier, &store, loop_config);
    finish(monitor.run(store.load(), cancel))
}

fn finish(result: std::result::Result<LoopOutcome, MonitorError>) -> Result<i32> {
    match result {
        Ok(outcome) => {
            println!(
                "Stopped after {} check(s): {}",
                outcome.iterations, outcome.reason
            );
            Ok(EXIT_OK)
        }
        Err(MonitorError::Interrupted) => {
            println!("Interrupted, registry saved");
            Ok(EXIT_INTERRUPTED)
        }
        Err(MonitorError::Failed(err)) => Err(err),
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars + 3 {
        format!("{}...", swarmkeeper_core::truncate_chars(text, max_chars))
    } else {
        text.to_string()
    }
}
