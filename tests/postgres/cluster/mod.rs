//! Embedded `PostgreSQL` cluster for integration tests.
//!
//! The cluster runs in-process through `postgresql_embedded`, bootstrapped by
//! `pg-embed-setup-unpriv`. It is started once per test binary and shared.
//! Runs as root are not supported here; point `QUAY_TEST_DATABASE_URL` at a
//! server instead. A cluster that cannot start fails every database test.

mod scoped_env;

use self::fs_utils::{sync_password_from_file, sync_port_from_pid};
use self::scoped_env::ScopedEnv;
use super::helpers::{DATABASE_URL_ENV, test_runtime};
use pg_embedded_setup_unpriv::{
    ExecutionPrivileges, TestBootstrapSettings, bootstrap_for_tests, detect_execution_privileges,
};
use postgresql_embedded::{PostgreSQL, Status};
use std::net::TcpListener;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

static SHARED_CLUSTER: OnceLock<ManagedCluster> = OnceLock::new();

/// Managed embedded `PostgreSQL` cluster.
pub struct ManagedCluster {
    bootstrap: TestBootstrapSettings,
    env_vars: Vec<(String, Option<String>)>,
    runtime: Option<Runtime>,
    postgres: Option<PostgreSQL>,
}

impl ManagedCluster {
    fn new() -> Result<Self, BoxError> {
        let port_env = port_env_changes()?;
        let port_guard = ScopedEnv::apply(&port_env);
        let mut bootstrap = bootstrap_for_tests().map_err(|err| Box::new(err) as BoxError)?;
        drop(port_guard);
        sync_password_from_file(&mut bootstrap.settings)?;
        let env_vars = bootstrap.environment.to_env();
        let mut cluster = Self {
            bootstrap,
            env_vars,
            runtime: None,
            postgres: None,
        };
        cluster.start_in_process()?;
        Ok(cluster)
    }

    /// Returns a URL for `database` on this cluster.
    #[must_use]
    pub fn database_url(&self, database: &str) -> String {
        self.bootstrap.settings.url(database)
    }

    fn start_in_process(&mut self) -> Result<(), BoxError> {
        let runtime = test_runtime()?;
        let env_guard = ScopedEnv::apply(&self.env_vars);
        let mut postgres = PostgreSQL::new(self.bootstrap.settings.clone());
        runtime.block_on(async {
            postgres
                .setup()
                .await
                .map_err(|err| Box::new(err) as BoxError)?;
            if !matches!(postgres.status(), Status::Started) {
                postgres
                    .start()
                    .await
                    .map_err(|err| Box::new(err) as BoxError)?;
            }
            Ok::<(), BoxError>(())
        })?;
        drop(env_guard);
        self.bootstrap.settings = postgres.settings().clone();
        sync_port_from_pid(&mut self.bootstrap.settings)?;
        self.runtime = Some(runtime);
        self.postgres = Some(postgres);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        let (Some(postgres), Some(runtime)) = (self.postgres.take(), &self.runtime) else {
            return Ok(());
        };
        runtime.block_on(async {
            postgres
                .stop()
                .await
                .map_err(|err| Box::new(err) as BoxError)
        })
    }
}

impl Drop for ManagedCluster {
    fn drop(&mut self) {
        drop(self.stop());
    }
}

/// Returns the shared cluster, starting it on first use.
///
/// # Panics
///
/// Panics when running as root, where the embedded cluster cannot run, or
/// when the cluster fails to start.
pub fn shared_cluster() -> &'static ManagedCluster {
    SHARED_CLUSTER.get_or_init(|| {
        assert!(
            !matches!(detect_execution_privileges(), ExecutionPrivileges::Root),
            "embedded PostgreSQL cannot run as root; set {DATABASE_URL_ENV} to a server instead"
        );
        match ManagedCluster::new() {
            Ok(cluster) => cluster,
            Err(err) => panic!("failed to start embedded PostgreSQL: {err}"),
        }
    })
}

fn port_env_changes() -> Result<Vec<(String, Option<String>)>, BoxError> {
    if std::env::var_os("PG_PORT").is_some() {
        return Ok(Vec::new());
    }

    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|err| Box::new(err) as BoxError)?;
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|err| Box::new(err) as BoxError)?;
    drop(listener);

    Ok(vec![("PG_PORT".to_owned(), Some(port.to_string()))])
}
