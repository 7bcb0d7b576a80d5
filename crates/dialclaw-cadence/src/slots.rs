//! Slot allocator — split a day's attempt budget across its windows
//! and pick the single currently-open slot with spare capacity.

use chrono::DateTime;
use chrono_tz::Tz;

use dialclaw_core::error::Result;

use crate::window;

/// Per-window attempt quotas for a day.
///
/// `base = attempts / n`, remainder front-loaded onto the earliest
/// windows — a deterministic tie-break that preserves the day's total
/// exactly: the quotas always sum to `attempts`.
pub fn attempt_quotas(attempts: u32, n_windows: usize) -> Vec<u32> {
    if n_windows == 0 {
        return Vec::new();
    }
    let n = n_windows as u32;
    let base = attempts / n;
    let remainder = attempts % n;
    (0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Pick the active slot: the first window, in declared order, that is
/// open right now and has spare quota per the progress ledger.
///
/// `recorded` reports how many attempts the ledger already holds for a
/// given window on the current day. Unparsable window strings are
/// logged and skipped rather than failing the pass.
pub fn pick_slot<'a>(
    windows: &'a [String],
    quotas: &[u32],
    now: DateTime<Tz>,
    mut recorded: impl FnMut(&str) -> Result<u32>,
) -> Result<Option<&'a str>> {
    for (i, win) in windows.iter().enumerate() {
        match window::is_open_at(win, now) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Window {win} not open at minute {}", window::minute_of_day(now));
                continue;
            }
            Err(e) => {
                tracing::warn!("⚠️ Skipping unparsable time window '{win}': {e}");
                continue;
            }
        }
        let done = recorded(win)?;
        if done >= quotas[i] {
            tracing::debug!("Window {win} quota reached ({done}/{})", quotas[i]);
            continue;
        }
        return Ok(Some(win));
    }
    Ok(None)
}
