//! Per-session detection strategies.
//!
//! A [`DetectionStrategy`] looks at one session and reports whether it hit
//! the condition the loop is watching for. Two strategies exist:
//!
//! - [`PatternStrategy`]: literal, regex or fuzzy patterns against captured output
//! - [`ClassificationStrategy`]: asks a [`Classifier`] whether the agent stopped
//!
//! The strategy also decides how the loop treats the result (see [`StrategyKind`]).

pub mod classify;
pub mod pattern;

pub use classify::{parse_analysis, Classification, Classifier, OpenAiClassifier};
pub use pattern::{MatchMode, PatternMatch, PatternSet};

use tracing::{debug, warn};

use crate::error::Result;
use crate::tmux::{count_lines, PaneCapture};
use crate::types::CheckStatus;

const CAPTURE_ERROR_PREFIX: &str = "[Error capturing session:";

/// Outcome of one detection pass over one session.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub session: String,
    pub matched: bool,
    pub matched_pattern: Option<String>,
    pub matched_text: Option<String>,
    pub line_count: usize,
    pub is_alive: bool,
    pub classification: Option<Classification>,
}

impl DetectionResult {
    pub fn unmatched(session: &str, line_count: usize) -> Self {
        Self {
            session: session.to_string(),
            matched: false,
            matched_pattern: None,
            matched_text: None,
            line_count,
            is_alive: true,
            classification: None,
        }
    }

    /// The session's terminal is gone. Nothing was captured or matched.
    pub fn dead(session: &str) -> Self {
        Self {
            is_alive: false,
            ..Self::unmatched(session, 0)
        }
    }
}

/// Which rule set the monitoring loop applies to a strategy's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Dead sessions are dropped at once; matches may be auto-typed.
    Pattern,
    /// Every result is recorded as a check; dead sessions are confirmed too.
    Classification,
}

pub trait DetectionStrategy {
    fn kind(&self) -> StrategyKind;

    fn detect(&self, capture: &dyn PaneCapture, session: &str) -> Result<DetectionResult>;
}

#[derive(Debug, Clone)]
pub struct PatternStrategy {
    pub set: PatternSet,
    pub lines: usize,
}

impl PatternStrategy {
    pub fn new(set: PatternSet, lines: usize) -> Self {
        Self { set, lines }
    }
}

impl DetectionStrategy for PatternStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pattern
    }

    fn detect(&self, capture: &dyn PaneCapture, session: &str) -> Result<DetectionResult> {
        if !capture.exists(session) {
            debug!(session = %session, "Session not alive, skipping patterns");
            return Ok(DetectionResult::dead(session));
        }
        let text = capture.capture(session, self.lines);
        Ok(pattern::detect(session, &text, &self.set))
    }
}

pub struct ClassificationStrategy {
    classifier: Box<dyn Classifier>,
    lines: usize,
}

impl ClassificationStrategy {
    pub fn new(classifier: Box<dyn Classifier>, lines: usize) -> Self {
        Self { classifier, lines }
    }

    fn classify_text(&self, session: &str, text: &str) -> Classification {
        if text.starts_with(CAPTURE_ERROR_PREFIX) {
            return Classification::new(CheckStatus::Error, text);
        }
        match self.classifier.classify(text) {
            Ok(classification) => classification,
            Err(err) => {
                warn!(session = %session, error = %err, "Classification failed");
                Classification::failed(&err)
            }
        }
    }
}

impl DetectionStrategy for ClassificationStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Classification
    }

    fn detect(&self, capture: &dyn PaneCapture, session: &str) -> Result<DetectionResult> {
        if !capture.exists(session) {
            return Ok(DetectionResult {
                matched: true,
                classification: Some(Classification::new(
                    CheckStatus::Stopped,
                    "Session no longer exists",
                )),
                ..DetectionResult::dead(session)
            });
        }

        let text = capture.capture(session, self.lines);
        let classification = self.classify_text(session, &text);
        Ok(DetectionResult {
            matched: classification.status == CheckStatus::Stopped,
            classification: Some(classification),
            ..DetectionResult::unmatched(session, count_lines(&text))
        })
    }
}
