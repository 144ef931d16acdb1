//! Progress reporting for multi-table runs.

use serde::Serialize;

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Export,
    Delete,
    Load,
}

/// Progress update sent after each table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub phase: Phase,
    pub table: String,
    pub tables_done: usize,
    pub tables_total: usize,
    /// Overall completion, 0 to 100. Never decreases within a run.
    pub percent: f64,
}

/// Callback receiving progress updates.
pub type ProgressFn<'a> = Box<dyn FnMut(&Progress) + Send + 'a>;

/// Maps per-phase table counts onto one percentage.
///
/// The delete phase, when it runs, owns the leading `delete_fraction` of
/// the scale and the other phases share the rest.
pub(crate) struct Tracker<'r, 'a> {
    reporter: Option<&'r mut ProgressFn<'a>>,
    delete_fraction: f64,
    last: f64,
}

impl<'r, 'a> Tracker<'r, 'a> {
    pub(crate) fn new(reporter: Option<&'r mut ProgressFn<'a>>, delete_fraction: f64) -> Self {
        Self {
            reporter,
            delete_fraction: delete_fraction.clamp(0.0, 1.0),
            last: 0.0,
        }
    }

    pub(crate) fn report(&mut self, phase: Phase, table: &str, done: usize, total: usize) {
        let share = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        let fraction = match phase {
            Phase::Delete => self.delete_fraction * share,
            Phase::Export | Phase::Load => {
                self.delete_fraction + (1.0 - self.delete_fraction) * share
            }
        };
        self.last = self.last.max(fraction * 100.0);

        if let Some(reporter) = self.reporter.as_mut() {
            reporter(&Progress {
                phase,
                table: table.to_string(),
                tables_done: done,
                tables_total: total,
                percent: self.last,
            });
        }
    }
}
