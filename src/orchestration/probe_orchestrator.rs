//! # Probe Orchestrator
//!
//! Drives one full cycle for a worker role.
//!
//! ## Security cycle
//!
//! 1. Dashboard: TLS probe, header probe, score, upsert the singleton row
//! 2. Every active server: TLS probe of its management API, upsert its row
//!
//! ## Usage cycle
//!
//! 1. Every active server not in backoff: fetch counters, compute deltas for
//!    its known access keys, bulk-insert the snapshots
//! 2. Every dynamic key whose members were all collected: aggregate snapshot
//! 3. Retention cleanup when due
//!
//! Servers are processed with bounded concurrency. A failing server is logged
//! and counted; it never aborts the cycle.
//!
//! Once the cancellation token fires no further server is started. Servers
//! already in flight run to their own timeout, and the dynamic key and
//! retention steps are skipped.

use crate::config::GatewatchConfig;
use crate::constants::WorkerRole;
use crate::error::GatewatchResult;
use crate::gateway::GatewayMetricsClient;
use crate::models::{AccessKey, DashboardSecurityProbe, KeyType, SecurityProbe, Server};
use crate::probe::{security_score, TargetProber};
use crate::resilience::BackoffTracker;
use crate::store::{ServerDirectory, TelemetryStore};
use crate::usage::{DeltaCalculator, RetentionSchedule};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Aggregate outcome of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub role: WorkerRole,
    pub servers_total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub snapshots_written: u64,
    pub duration: Duration,
}

impl CycleReport {
    fn new(role: WorkerRole) -> Self {
        Self {
            role,
            servers_total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            snapshots_written: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Knobs the orchestrator takes from configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub dashboard_url: String,
    pub connect_timeout: Duration,
    pub max_concurrency: usize,
    pub cycle_interval: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &GatewatchConfig, role: WorkerRole) -> Self {
        let cycle = config.cycle_for(role);
        Self {
            dashboard_url: config.dashboard.url.clone(),
            connect_timeout: config.probe.connect_timeout(),
            max_concurrency: cycle.max_concurrency,
            cycle_interval: cycle.cycle_interval(),
        }
    }
}

/// Collaborators the cycles talk to
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub directory: Arc<dyn ServerDirectory>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub prober: Arc<dyn TargetProber>,
    pub metrics: Arc<dyn GatewayMetricsClient>,
}

#[derive(Debug)]
enum ServerOutcome {
    Succeeded {
        written: u64,
        collected: HashMap<String, i64>,
    },
    Failed,
    Skipped,
}

pub struct ProbeOrchestrator {
    role: WorkerRole,
    settings: OrchestratorSettings,
    deps: OrchestratorDeps,
    deltas: DeltaCalculator,
    backoff: Arc<BackoffTracker>,
    retention: RetentionSchedule,
}

impl std::fmt::Debug for ProbeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeOrchestrator")
            .field("role", &self.role)
            .field("settings", &self.settings)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ProbeOrchestrator {
    pub fn new(
        role: WorkerRole,
        settings: OrchestratorSettings,
        deps: OrchestratorDeps,
        backoff: Arc<BackoffTracker>,
        retention: RetentionSchedule,
    ) -> Self {
        let deltas = DeltaCalculator::new(deps.telemetry.clone());
        Self {
            role,
            settings,
            deps,
            deltas,
            backoff,
            retention,
        }
    }

    pub fn role(&self) -> WorkerRole {
        self.role
    }

    pub fn backoff(&self) -> &BackoffTracker {
        &self.backoff
    }

    /// Run one uninterrupted cycle
    pub async fn run_cycle(&self) -> GatewatchResult<CycleReport> {
        self.run_cycle_until(&CancellationToken::new()).await
    }

    /// Run one cycle, starting no new server once `cancel` fires. Errors only
    /// when the server list cannot be read.
    #[instrument(skip(self, cancel), fields(role = %self.role))]
    pub async fn run_cycle_until(
        &self,
        cancel: &CancellationToken,
    ) -> GatewatchResult<CycleReport> {
        let started = Instant::now();
        let mut report = match self.role {
            WorkerRole::SecurityProbe => self.run_security_cycle(cancel).await?,
            WorkerRole::UsageSnapshot => self.run_usage_cycle(cancel).await?,
        };
        report.duration = started.elapsed();

        let attempted = report.succeeded + report.failed + report.skipped;
        if attempted < report.servers_total {
            warn!(
                servers_total = report.servers_total,
                not_started = report.servers_total - attempted,
                "Cycle interrupted by shutdown"
            );
        }

        info!(
            servers_total = report.servers_total,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            snapshots_written = report.snapshots_written,
            duration_ms = report.duration.as_millis() as u64,
            "Cycle complete"
        );
        Ok(report)
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrency.max(1)
    }

    fn next_check_delay(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.cycle_interval)
            .unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn tally(report: &mut CycleReport, outcomes: &[ServerOutcome]) {
        for outcome in outcomes {
            match outcome {
                ServerOutcome::Succeeded { written, .. } => {
                    report.succeeded += 1;
                    report.snapshots_written += written;
                }
                ServerOutcome::Failed => report.failed += 1,
                ServerOutcome::Skipped => report.skipped += 1,
            }
        }
    }

    // ---------------------------------------------------------------------
    // Security cycle
    // ---------------------------------------------------------------------

    async fn run_security_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> GatewatchResult<CycleReport> {
        let mut report = CycleReport::new(self.role);

        self.probe_dashboard().await;

        let servers = self.deps.directory.list_active_servers().await?;
        report.servers_total = servers.len();
        let outcomes: Vec<ServerOutcome> = stream::iter(servers)
            .take_until(cancel.clone().cancelled_owned())
            .map(|server| self.probe_server(server))
            .buffer_unordered(self.concurrency())
            .collect()
            .await;

        Self::tally(&mut report, &outcomes);
        Ok(report)
    }

    async fn probe_dashboard(&self) {
        let url = &self.settings.dashboard_url;
        let timeout = self.settings.connect_timeout;

        let tls = self.deps.prober.probe_tls(url, timeout).await;
        let headers = self.deps.prober.probe_headers(url, timeout).await;
        let score = security_score(tls.scheme, &headers);

        let checked_at = Utc::now();
        let row = DashboardSecurityProbe::from_findings(
            url.as_str(),
            tls,
            headers,
            score,
            checked_at,
            checked_at + self.next_check_delay(),
        );

        info!(
            url = %url,
            result = %row.result,
            security_score = score,
            "Dashboard probed"
        );
        if let Err(e) = self.deps.telemetry.upsert_dashboard_probe(&row).await {
            error!(error = %e, "Failed to store dashboard probe");
        }
    }

    async fn probe_server(&self, server: Server) -> ServerOutcome {
        let report = self
            .deps
            .prober
            .probe_tls(&server.api_url, self.settings.connect_timeout)
            .await;
        let reachable = report.result.is_reachable();

        let checked_at = Utc::now();
        let row = SecurityProbe::from_report(
            server.id.as_str(),
            report,
            checked_at,
            checked_at + self.next_check_delay(),
        );

        if let Err(e) = self.deps.telemetry.upsert_security_probe(&row).await {
            error!(server_id = %server.id, error = %e, "Failed to store security probe");
            return ServerOutcome::Failed;
        }

        if reachable {
            debug!(
                server_id = %server.id,
                result = %row.result,
                days_left = ?row.cert_days_left,
                "Server probed"
            );
            ServerOutcome::Succeeded {
                written: 0,
                collected: HashMap::new(),
            }
        } else {
            warn!(
                server_id = %server.id,
                result = %row.result,
                error = row.error_message.as_deref().unwrap_or(""),
                "Server probe failed"
            );
            ServerOutcome::Failed
        }
    }

    // ---------------------------------------------------------------------
    // Usage cycle
    // ---------------------------------------------------------------------

    async fn run_usage_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> GatewatchResult<CycleReport> {
        let mut report = CycleReport::new(self.role);

        let servers = self.deps.directory.list_active_servers().await?;
        report.servers_total = servers.len();
        let outcomes: Vec<ServerOutcome> = stream::iter(servers)
            .take_until(cancel.clone().cancelled_owned())
            .map(|server| self.collect_server(server))
            .buffer_unordered(self.concurrency())
            .collect()
            .await;
        Self::tally(&mut report, &outcomes);

        if cancel.is_cancelled() {
            debug!("Skipping dynamic keys and retention after cancellation");
            return Ok(report);
        }

        let collected: HashMap<String, i64> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                ServerOutcome::Succeeded { collected, .. } => Some(collected),
                _ => None,
            })
            .flatten()
            .collect();
        report.snapshots_written += self.aggregate_dynamic_keys(&collected).await;

        if let Err(e) = self
            .retention
            .run_if_due(self.deps.telemetry.as_ref(), Instant::now(), Utc::now())
            .await
        {
            error!(error = %e, "Usage snapshot retention cleanup failed");
        }

        Ok(report)
    }

    async fn collect_server(&self, server: Server) -> ServerOutcome {
        if self.backoff.should_skip(&server.id) {
            debug!(server_id = %server.id, "Server in backoff, skipping");
            return ServerOutcome::Skipped;
        }

        let counters = match self.deps.metrics.fetch_transfer_metrics(&server).await {
            Ok(counters) => counters,
            Err(e) => {
                let delay = self.backoff.record_failure(&server.id);
                warn!(
                    server_id = %server.id,
                    error = %e,
                    transient = e.is_transient(),
                    retry_in_seconds = delay.as_secs(),
                    "Metrics collection failed"
                );
                return ServerOutcome::Failed;
            }
        };
        self.backoff.record_success(&server.id);

        let keys = match self.deps.directory.list_access_keys(&server.id).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(server_id = %server.id, error = %e, "Failed to list access keys");
                return ServerOutcome::Failed;
            }
        };

        let readings = match_access_keys(&keys, &counters);
        let rows = match self
            .deltas
            .build_snapshots(KeyType::AccessKey, Some(&server.id), &readings)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(server_id = %server.id, error = %e, "Failed to compute usage deltas");
                return ServerOutcome::Failed;
            }
        };

        let collected: HashMap<String, i64> = readings.into_iter().collect();
        match self.deps.telemetry.insert_usage_snapshots(&rows).await {
            Ok(written) => {
                debug!(server_id = %server.id, written, "Usage snapshots stored");
                ServerOutcome::Succeeded { written, collected }
            }
            Err(e) => {
                error!(server_id = %server.id, error = %e, "Failed to store usage snapshots");
                ServerOutcome::Failed
            }
        }
    }

    /// Write one aggregate per dynamic key whose members were all collected
    async fn aggregate_dynamic_keys(&self, collected: &HashMap<String, i64>) -> u64 {
        let members = match self.deps.directory.list_dynamic_key_members().await {
            Ok(members) => members,
            Err(e) => {
                error!(error = %e, "Failed to list dynamic key members");
                return 0;
            }
        };

        let readings = aggregate_dynamic_usage(&members, collected);
        if readings.is_empty() {
            return 0;
        }

        let rows = match self
            .deltas
            .build_snapshots(KeyType::DynamicKey, None, &readings)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to compute dynamic key deltas");
                return 0;
            }
        };

        match self.deps.telemetry.insert_usage_snapshots(&rows).await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "Failed to store dynamic key snapshots");
                0
            }
        }
    }
}

/// `(access_key_id, used_bytes)` for every known key the gateway reported
pub fn match_access_keys(
    keys: &[AccessKey],
    counters: &HashMap<String, i64>,
) -> Vec<(String, i64)> {
    keys.iter()
        .filter_map(|key| {
            counters
                .get(&key.remote_key_id)
                .map(|used| (key.id.clone(), *used))
        })
        .collect()
}

/// `(dynamic_key_id, summed used_bytes)` for dynamic keys with every member present in `collected`
pub fn aggregate_dynamic_usage(
    members: &[AccessKey],
    collected: &HashMap<String, i64>,
) -> Vec<(String, i64)> {
    let mut groups: BTreeMap<&str, Vec<&AccessKey>> = BTreeMap::new();
    for member in members {
        if let Some(dynamic_key_id) = member.dynamic_key_id.as_deref() {
            groups.entry(dynamic_key_id).or_default().push(member);
        }
    }

    groups
        .into_iter()
        .filter_map(|(dynamic_key_id, keys)| {
            let mut total: i64 = 0;
            for key in keys {
                let Some(used) = collected.get(&key.id) else {
                    debug!(
                        dynamic_key_id,
                        missing_access_key = %key.id,
                        "Dynamic key incomplete this cycle, skipping"
                    );
                    return None;
                };
                total = total.saturating_add(*used);
            }
            Some((dynamic_key_id.to_string(), total))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, server: &str, remote: &str, dynamic: Option<&str>) -> AccessKey {
        AccessKey {
            id: id.to_string(),
            server_id: server.to_string(),
            remote_key_id: remote.to_string(),
            dynamic_key_id: dynamic.map(str::to_string),
        }
    }

    #[test]
    fn test_match_access_keys_ignores_unknown_and_missing() {
        let keys = vec![key("ak-1", "s1", "0", None), key("ak-2", "s1", "1", None)];
        let counters: HashMap<String, i64> =
            [("0".to_string(), 100), ("99".to_string(), 5)].into_iter().collect();

        assert_eq!(
            match_access_keys(&keys, &counters),
            vec![("ak-1".to_string(), 100)]
        );
    }

    #[test]
    fn test_dynamic_usage_sums_complete_groups_only() {
        let members = vec![
            key("ak-1", "s1", "0", Some("dk-a")),
            key("ak-2", "s2", "0", Some("dk-a")),
            key("ak-3", "s1", "1", Some("dk-b")),
            key("ak-4", "s3", "0", Some("dk-b")),
        ];
        let collected: HashMap<String, i64> = [
            ("ak-1".to_string(), 100),
            ("ak-2".to_string(), 50),
            ("ak-3".to_string(), 7),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            aggregate_dynamic_usage(&members, &collected),
            vec![("dk-a".to_string(), 150)]
        );
    }
}
