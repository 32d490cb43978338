//! Relay placement.
//!
//! Given the healthy relay candidates from the registry, probes every
//! candidate's live statistics concurrently and picks the one with the
//! least sessions in progress. Probe failures are recovered locally:
//! a candidate that cannot be probed is treated as maximally loaded but
//! remains a valid last resort, so a flaky relay never blocks session
//! creation.

use crate::errors::SmError;
use crate::models::Relay;
use crate::observability::metrics;
use crate::services::relay_client::RelayClient;
use futures::future::join_all;
use std::time::Instant;
use tracing::{instrument, warn};

/// Builds the RPC base URL for a relay registry entry.
pub fn relay_rpc_url(protocol: &str, relay: &Relay) -> String {
    format!("{}://{}:{}", protocol, relay.location, relay.port)
}

/// Select the least-loaded relay among the candidates.
///
/// All candidates are probed concurrently; total wall time is bounded by
/// the slowest probe. Ties break on the first candidate in input order.
/// If every probe fails the first candidate is returned (degraded
/// placement).
///
/// # Errors
///
/// - `SmError::Internal` - The candidate list is empty
#[instrument(skip_all, name = "sm.relay_selection", fields(candidate_count = candidates.len()))]
pub async fn select_least_loaded(
    relay_client: &dyn RelayClient,
    rpc_protocol: &str,
    candidates: &[Relay],
) -> Result<Relay, SmError> {
    if candidates.is_empty() {
        return Err(SmError::Internal("no relay found".to_string()));
    }

    let probes = candidates.iter().map(|candidate| {
        let url = relay_rpc_url(rpc_protocol, candidate);
        async move {
            let start = Instant::now();
            let result = relay_client.get_statistics(&url).await;
            let duration = start.elapsed();

            match result {
                Ok(stats) => {
                    metrics::record_relay_probe("success", duration);
                    stats.in_progress()
                }
                Err(e) => {
                    metrics::record_relay_probe("error", duration);
                    warn!(
                        target: "sm.relay_selection",
                        url = %url,
                        error = %e,
                        "Failed to gather statistics from relay candidate"
                    );
                    u64::MAX
                }
            }
        }
    });

    let loads = join_all(probes).await;
    let best_idx = least_loaded_index(&loads);

    tracing::debug!(
        target: "sm.relay_selection",
        relay_id = %candidates[best_idx].id,
        load = loads[best_idx],
        "Selected relay"
    );

    Ok(candidates[best_idx].clone())
}

/// Index of the strictly smallest load; ties resolve to the first
/// occurrence (stable left-to-right scan). Callers guarantee `loads` is
/// non-empty.
fn least_loaded_index(loads: &[u64]) -> usize {
    let mut best_idx = 0;
    let mut least = loads[0];

    for (idx, &load) in loads.iter().enumerate().skip(1) {
        if load < least {
            least = load;
            best_idx = idx;
        }
    }

    best_idx
}
