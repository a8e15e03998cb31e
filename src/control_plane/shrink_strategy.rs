//! Victim-selection strategies for autoscale shrink (spec §4.4.4): FIFO,
//! FILO, LCC (the default), with an unknown strategy name falling back to
//! LCC rather than failing the shrink pass (spec §7, §9 open question).
use std::sync::Arc;

use tracing::warn;

use crate::config::ShrinkStrategy;
use crate::worker::Worker;

/// Select up to `count` victim credentials from `workers`, ordered
/// least-disruptive-first per `strategy_name` (case-insensitive `"FIFO"`,
/// `"FILO"`, `"LCC"`; anything else — including `None` — resolves to
/// [`ShrinkStrategy::Lcc`]). Ties within a strategy break on credential so
/// victim selection is deterministic across repeated passes over the same
/// worker set.
#[must_use]
pub fn select_victims(strategy_name: Option<&str>, workers: &[(String, Arc<Worker>)], count: u32) -> Vec<String> {
    let strategy = resolve_strategy(strategy_name);
    let mut ordered: Vec<&(String, Arc<Worker>)> = workers.iter().collect();

    match strategy {
        ShrinkStrategy::Fifo => {
            ordered.sort_by(|left, right| left.1.register_time.cmp(&right.1.register_time).then_with(|| left.0.cmp(&right.0)));
        }
        ShrinkStrategy::Filo => {
            ordered.sort_by(|left, right| right.1.register_time.cmp(&left.1.register_time).then_with(|| left.0.cmp(&right.0)));
        }
        ShrinkStrategy::Lcc => {
            ordered.sort_by(|left, right| {
                left.1
                    .active_request_count()
                    .cmp(&right.1.active_request_count())
                    .then_with(|| left.0.cmp(&right.0))
            });
        }
    }

    ordered.into_iter().take(count as usize).map(|(credential, _)| credential.clone()).collect()
}

fn resolve_strategy(strategy_name: Option<&str>) -> ShrinkStrategy {
    let Some(raw) = strategy_name else {
        return ShrinkStrategy::default();
    };
    match raw.to_uppercase().as_str() {
        "FIFO" => ShrinkStrategy::Fifo,
        "FILO" => ShrinkStrategy::Filo,
        "LCC" => ShrinkStrategy::Lcc,
        other => {
            warn!("unknown shrink strategy {other:?}, falling back to LCC");
            ShrinkStrategy::Lcc
        }
    }
}
