//! Forward-only numbered SQL migrations, run once at process start. Each
//! file under `src/migrations/` is embedded at compile time and applied in
//! order inside `schema_migrations`, mirroring the original deployment's
//! Alembic-style revisions but as plain idempotent SQL.

use tokio_postgres::Client;

struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "001_init", sql: include_str!("migrations/001_init.sql") },
    Migration {
        version: 2,
        name: "002_traffic_table",
        sql: include_str!("migrations/002_traffic_table.sql"),
    },
    Migration {
        version: 3,
        name: "003_quota_columns",
        sql: include_str!("migrations/003_quota_columns.sql"),
    },
];

pub async fn run(client: &Client) -> anyhow::Result<()> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .await?;

    for migration in MIGRATIONS {
        let applied: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = $1)",
                &[&migration.version],
            )
            .await?
            .get(0);
        if applied {
            continue;
        }
        tracing::info!(version = migration.version, name = migration.name, "applying migration");
        client.batch_execute(migration.sql).await?;
        client
            .execute(
                "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
                &[&migration.version, &migration.name],
            )
            .await?;
    }
    Ok(())
}
