//! Fixture builders for servers, access keys and fully wired workers over
//! [`MemoryStore`].

use super::fakes::{ScriptedMetricsClient, ScriptedProber};
use gatewatch_core::constants::WorkerRole;
use gatewatch_core::coordination::LockManager;
use gatewatch_core::models::{AccessKey, Server};
use gatewatch_core::orchestration::{OrchestratorDeps, OrchestratorSettings, ProbeOrchestrator};
use gatewatch_core::resilience::BackoffTracker;
use gatewatch_core::store::MemoryStore;
use gatewatch_core::usage::RetentionSchedule;
use gatewatch_core::worker::{RuntimeSettings, WorkerRuntime};
use std::sync::Arc;
use std::time::Duration;

pub const DASHBOARD_URL: &str = "https://dashboard.test";

/// Hex fingerprint that parses but matches no real certificate
pub const TEST_FINGERPRINT: &str =
    "AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33:44:55:66:77:88:99";

pub struct ServerBuilder {
    id: String,
    name: Option<String>,
    api_url: Option<String>,
    is_active: bool,
}

impl ServerBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            api_url: None,
            is_active: true,
        }
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = Some(url.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn build(self) -> Server {
        Server {
            name: self.name.unwrap_or_else(|| format!("gateway {}", self.id)),
            api_url: self
                .api_url
                .unwrap_or_else(|| format!("https://{}.gateways.test:8443/api", self.id)),
            api_cert_sha256: TEST_FINGERPRINT.to_string(),
            is_active: self.is_active,
            id: self.id,
        }
    }
}

pub fn access_key(id: &str, server_id: &str, remote_key_id: &str) -> AccessKey {
    AccessKey {
        id: id.to_string(),
        server_id: server_id.to_string(),
        remote_key_id: remote_key_id.to_string(),
        dynamic_key_id: None,
    }
}

pub fn dynamic_member(
    id: &str,
    server_id: &str,
    remote_key_id: &str,
    dynamic_key_id: &str,
) -> AccessKey {
    AccessKey {
        dynamic_key_id: Some(dynamic_key_id.to_string()),
        ..access_key(id, server_id, remote_key_id)
    }
}

pub fn runtime_settings() -> RuntimeSettings {
    RuntimeSettings {
        heartbeat_interval: Duration::from_secs(10),
        cycle_interval: Duration::from_secs(60),
        lock_ttl: Duration::from_secs(30),
        drain_timeout: Duration::from_secs(5),
    }
}

/// One store, one scripted gateway fleet and the workers wired against them
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub metrics: Arc<ScriptedMetricsClient>,
    pub prober: Arc<ScriptedProber>,
    pub backoff: Arc<BackoffTracker>,
    pub retention_days: i64,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            metrics: Arc::new(ScriptedMetricsClient::new()),
            prober: Arc::new(ScriptedProber::new()),
            backoff: Arc::new(BackoffTracker::new(
                Duration::from_secs(30),
                Duration::from_secs(1800),
            )),
            retention_days: 30,
        }
    }

    pub fn add_server(&self, id: &str) -> Server {
        let server = ServerBuilder::new(id).build();
        self.store.add_server(server.clone());
        server
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            dashboard_url: DASHBOARD_URL.to_string(),
            connect_timeout: Duration::from_secs(2),
            max_concurrency: 4,
            cycle_interval: Duration::from_secs(300),
        }
    }

    pub fn orchestrator(&self, role: WorkerRole) -> ProbeOrchestrator {
        let deps = OrchestratorDeps {
            directory: self.store.clone(),
            telemetry: self.store.clone(),
            prober: self.prober.clone(),
            metrics: self.metrics.clone(),
        };
        ProbeOrchestrator::new(
            role,
            self.settings(),
            deps,
            self.backoff.clone(),
            RetentionSchedule::new(self.retention_days, Duration::from_secs(24 * 3600)),
        )
    }

    pub fn lock_manager(&self, role: WorkerRole, worker_id: &str, ttl: Duration) -> LockManager {
        LockManager::new(self.store.clone(), role.lock_id(), worker_id, ttl)
            .expect("valid lock ttl")
    }

    pub fn runtime(
        &self,
        role: WorkerRole,
        worker_id: &str,
        settings: RuntimeSettings,
    ) -> WorkerRuntime {
        WorkerRuntime::new(
            Arc::new(self.lock_manager(role, worker_id, settings.lock_ttl)),
            Arc::new(self.orchestrator(role)),
            settings,
        )
    }
}
