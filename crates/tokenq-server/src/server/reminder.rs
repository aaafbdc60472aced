//! Periodic "your turn is coming up" reminders.
//!
//! Each sweep looks two tokens past the number of completed works. If that
//! record exists and has not been reminded yet, the notifier is called and
//! the record is flagged. The flag is set with a conditional update, so two
//! instances sharing one database never both claim it.

use crate::server::{notify::Notifier, telemetry};
use core::time::Duration;
use std::sync::Arc;
use tokenq::SqliteStore;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Distance between the last completed work and the token being reminded.
const LOOKAHEAD: u64 = 2;

/// Runs one sweep and returns the reminded token, if any.
///
/// # Errors
///
/// Returns the store error if the sequence or the record could not be read.
/// Notifier failures are logged and leave the record unflagged so the next
/// sweep retries.
pub async fn run_once(
    store: &SqliteStore,
    notifier: &dyn Notifier,
) -> tokenq::Result<Option<u64>> {
    let completed = store.completed_works().await?;
    if completed == 0 {
        return Ok(None);
    }

    let target = completed + LOOKAHEAD;
    let Some(request) = store.find_by_token(target).await? else {
        return Ok(None);
    };
    if request.reminder_sent {
        return Ok(None);
    }

    if let Err(e) = notifier.remind(&request).await {
        tracing::warn!(token = target, error = %e, "reminder delivery failed");
        return Ok(None);
    }

    if store.mark_reminder_sent(request.id).await? {
        telemetry::increment_reminders_sent();
        tracing::info!(token = target, "reminder sent");
        Ok(Some(target))
    } else {
        // Another instance got there first.
        Ok(None)
    }
}

/// Sweeps every `every` until `shutdown` is cancelled.
pub async fn reminder_loop(
    store: SqliteStore,
    notifier: Arc<dyn Notifier>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = run_once(&store, notifier.as_ref()).await {
                    tracing::warn!(error = %e, "reminder sweep failed");
                }
            }
        }
    }

    tracing::debug!("reminder task stopped");
}
