//! Application bootstrap and dependency wiring.
//!
//! The composition root: the single place where the shared state,
//! background supervisors, and the broadcast loop are instantiated and
//! wired together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthStore;
use crate::error::{VjError, VjResult};
use crate::metrics_http::{Metrics, MetricsState};
use crate::runtime::TokioSpawner;
use crate::state::{AppState, ServerConfig};
use crate::supervisors::BrowserHeartbeats;

/// Container for all bootstrapped services, ready to be handed to the
/// socket handlers and HTTP routers.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub app: Arc<AppState>,
    pub metrics: Arc<Metrics>,
    pub metrics_state: MetricsState,
    pub browser_heartbeats: Arc<BrowserHeartbeats>,
    pub spawner: TokioSpawner,
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts every background task: the broadcast loop, the renderer
    /// reconnect supervisor, the browser heartbeat supervisor, and the
    /// connect-code GC sweep. Intended to be called once after bootstrap.
    pub fn spawn_background_tasks(&self) {
        let app = Arc::clone(&self.app);
        let metrics = Arc::clone(&self.metrics);
        self.spawner.spawn(async move {
            crate::broadcast_loop::run(app, metrics).await;
        });

        let app = Arc::clone(&self.app);
        self.spawner.spawn(async move {
            crate::supervisors::run_renderer_reconnect(app).await;
        });

        let app = Arc::clone(&self.app);
        let heartbeats = Arc::clone(&self.browser_heartbeats);
        self.spawner.spawn(async move {
            crate::supervisors::run_browser_heartbeat(app, heartbeats).await;
        });

        let app = Arc::clone(&self.app);
        self.spawner.spawn(async move {
            crate::supervisors::run_connect_code_gc(
                app,
                crate::protocol_constants::RENDERER_POLL_INTERVAL_SECS,
            )
            .await;
        });
    }

    /// Signals every background task to stop via `cancel_token`.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning shutdown...");
        self.cancel_token.cancel();
    }
}

/// Loads the auth store per `config.require_auth`, tolerating a missing
/// file when auth is not required.
fn load_auth_store(config: &ServerConfig) -> VjResult<AuthStore> {
    match AuthStore::load(&config.dj_auth_file, config.require_auth) {
        Ok(store) => Ok(store),
        Err(VjError::AuthConfig(_)) if !config.require_auth => {
            log::warn!(
                "[Bootstrap] No auth file at {}, starting with an empty store (require_auth=false)",
                config.dj_auth_file.display()
            );
            Ok(AuthStore::empty())
        }
        Err(e) => Err(e),
    }
}

/// Bootstraps all application services with their dependencies. The
/// composition root for the `vj-server` binary.
pub fn bootstrap_services(config: ServerConfig) -> VjResult<BootstrappedServices> {
    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let auth = load_auth_store(&config)?;
    let app = AppState::new(config, auth);

    let metrics = Arc::new(Metrics::default());
    let metrics_state = MetricsState {
        app: Arc::clone(&app),
        metrics: Arc::clone(&metrics),
        started_at: std::time::Instant::now(),
    };

    let browser_heartbeats = Arc::new(BrowserHeartbeats::new());

    Ok(BootstrappedServices {
        app,
        metrics,
        metrics_state,
        browser_heartbeats,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_with_auth_not_required_and_missing_file_succeeds() {
        let mut config = ServerConfig::default();
        config.require_auth = false;
        config.dj_auth_file = "/nonexistent/path/does-not-exist.json".into();

        let services = bootstrap_services(config).expect("bootstrap should tolerate missing auth file");
        assert_eq!(services.app.config.dj_port, 9000);
    }
}
