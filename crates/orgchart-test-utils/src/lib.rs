//! Scratch tabular stores for integration tests.
//!
//! Every [`ScratchDb`] is a freshly created and migrated database on one
//! PostgreSQL server shared by the whole test binary. The server is the one
//! named by `ORGCHART_TEST_PG_URL` (no database path) when set, otherwise a
//! testcontainers instance started on first use.

use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use orgchart_db::config::DbConfig;
use orgchart_db::pool;

pub const SERVER_URL_ENV: &str = "ORGCHART_TEST_PG_URL";

struct Server {
    url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn server() -> &'static Server {
    SERVER
        .get_or_init(|| async {
            if let Ok(url) = std::env::var(SERVER_URL_ENV) {
                return Server {
                    url: url.trim_end_matches('/').to_string(),
                    _container: None,
                };
            }
            let container = Postgres::default()
                .with_tag("17")
                .start()
                .await
                .expect("failed to start PostgreSQL container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            Server {
                url: format!("postgresql://postgres:postgres@{host}:{port}"),
                _container: Some(container),
            }
        })
        .await
}

/// A migrated database that exists for the duration of one test.
pub struct ScratchDb {
    pub pool: PgPool,
    pub config: DbConfig,
}

impl ScratchDb {
    /// Create and migrate a uniquely named database.
    pub async fn create() -> Self {
        let name = format!("orgchart_test_{}", Uuid::new_v4().simple());
        let config = DbConfig::new(format!("{}/{name}", server().await.url)).with_max_connections(5);

        pool::ensure_database_exists(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e:#}"));
        let pool = pool::create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {name}: {e:#}"));
        pool::run_migrations(&pool)
            .await
            .unwrap_or_else(|e| panic!("failed to migrate {name}: {e:#}"));

        Self { pool, config }
    }

    /// Close the pool and drop the database, disconnecting stragglers.
    pub async fn destroy(self) {
        self.pool.close().await;
        let Ok(name) = self.config.database_name() else {
            return;
        };
        let Ok(options) = self.config.maintenance_options() else {
            return;
        };
        let Ok(maint) = self
            .config
            .pool_options()
            .max_connections(1)
            .connect_with(options)
            .await
        else {
            return;
        };
        let stmt = format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", pool::quote_ident(&name));
        let _ = maint.execute(stmt.as_str()).await;
        maint.close().await;
    }
}
