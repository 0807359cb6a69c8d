//! swarmkeeper: supervise coding agents running in tmux sessions.
//!
//! ## Subcommands
//!
//! - `start` / `stop` / `list` / `dump`: manage tracked sessions
//! - `manager`, `manager-loop`: classify session output with an LLM backend
//! - `pattern`, `pattern-loop`: match session output against text patterns,
//!   optionally typing a reply when a pattern is confirmed
//!
//! Exit codes: 0 success, 1 error (or no match for `pattern`), 130 interrupted.

mod commands;
mod logging;

use clap::{Args, Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use commands::{PatternLoopOptions, PatternOptions, EXIT_FAILURE};

#[derive(Parser)]
#[command(name = "swarmkeeper")]
#[command(about = "Monitor and nudge coding agents running in tmux")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new agent session
    Start {
        /// Name for the session (letters, numbers, '-' and '_')
        #[arg(long)]
        name: String,

        /// Command to run in the session
        #[arg(value_name = "CMD")]
        command: Option<String>,
    },

    /// Show tracked sessions
    List,

    /// Print captured output of every live session
    Dump {
        /// Number of lines to capture
        #[arg(long)]
        lines: Option<usize>,
    },

    /// Stop a tmux session and stop tracking it
    Stop {
        /// Name of the session to stop
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Classify every session once
    Manager,

    /// Classify sessions repeatedly until one stops
    ManagerLoop {
        /// Check interval in seconds (default: 180)
        #[arg(long)]
        interval: Option<u64>,

        /// Require 2 consecutive checks before stopping
        #[arg(long)]
        confirm: bool,

        /// Handler command, empty string to disable, omit for OS notifications
        #[arg(long)]
        notify_handler: Option<String>,
    },

    /// Pattern check on all sessions (exit code 1 when nothing matched)
    Pattern(PatternArgs),

    /// Watch sessions for patterns, optionally auto-typing a reply
    PatternLoop {
        #[command(flatten)]
        pattern: PatternArgs,

        /// Check interval in seconds (default: 60)
        #[arg(long)]
        interval: Option<u64>,

        /// Keys to send when a pattern is detected (e.g. 'y\n' for y + Enter)
        #[arg(long)]
        auto_type: Option<String>,

        /// Max auto-type interventions per session (default: 2)
        #[arg(long)]
        auto_type_max: Option<u32>,

        /// Require 2 consecutive detections before acting
        #[arg(long)]
        confirm: bool,

        /// With --confirm, a non-matching check clears the pending detection
        #[arg(long, requires = "confirm")]
        reset_on_miss: bool,

        /// Handler command, empty string to disable, omit for OS notifications
        #[arg(long)]
        notify_handler: Option<String>,
    },
}

#[derive(Args, Clone)]
struct PatternArgs {
    /// Pattern to search for (repeatable)
    #[arg(long = "string", short = 's', value_name = "PATTERN", required = true)]
    patterns: Vec<String>,

    /// Treat patterns as regular expressions
    #[arg(long)]
    regex: bool,

    /// Fuzzy matching (ignores case and extra whitespace)
    #[arg(long)]
    fuzzy: bool,

    /// Fuzzy match threshold 0-100 (default: 80)
    #[arg(long, value_parser = parse_threshold)]
    fuzzy_threshold: Option<f64>,

    /// Number of lines to check (default: 100)
    #[arg(long)]
    lines: Option<usize>,
}

impl From<PatternArgs> for PatternOptions {
    fn from(args: PatternArgs) -> Self {
        Self {
            patterns: args.patterns,
            regex: args.regex,
            fuzzy: args.fuzzy,
            fuzzy_threshold: args.fuzzy_threshold,
            lines: args.lines,
        }
    }
}

fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err("threshold must be between 0 and 100".to_string())
    }
}

/// Flag flipped by SIGINT/SIGTERM; the loop checks it between iterations
/// and while sleeping.
fn cancellation_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&flag)) {
            tracing::warn!(signal, error = %err, "Failed to register signal handler");
        }
    }
    flag
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { name, command } => commands::start(&name, command.as_deref()),
        Commands::List => commands::list(),
        Commands::Dump { lines } => commands::dump(lines),
        Commands::Stop { name } => commands::stop(&name),
        Commands::Manager => commands::manager(),
        Commands::ManagerLoop {
            interval,
            confirm,
            notify_handler,
        } => {
            let cancel = cancellation_flag();
            commands::manager_loop(interval, confirm, notify_handler.as_deref(), &cancel)
        }
        Commands::Pattern(args) => commands::pattern(&args.into()),
        Commands::PatternLoop {
            pattern,
            interval,
            auto_type,
            auto_type_max,
            confirm,
            reset_on_miss,
            notify_handler,
        } => {
            let cancel = cancellation_flag();
            let options = PatternLoopOptions {
                pattern: pattern.into(),
                interval,
                auto_type,
                auto_type_max,
                confirm,
                reset_on_miss,
                notify_handler,
            };
            commands::pattern_loop(&options, &cancel)
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "swarmkeeper command failed");
            eprintln!("Error: {}", err);
            EXIT_FAILURE
        }
    };

    // Flush the file writer before exiting; process::exit skips destructors.
    drop(_logging_guard);
    std::process::exit(code);
}
