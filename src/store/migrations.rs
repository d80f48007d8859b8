//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "master_data",
        sql: r#"
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                cpf TEXT,
                address TEXT,
                city TEXT,
                state TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pets (
                id INTEGER PRIMARY KEY,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                name TEXT NOT NULL,
                species TEXT,
                breed TEXT,
                gender TEXT,
                birth_date TEXT,
                weight REAL,
                color TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pets_customer ON pets(customer_id);

            CREATE TABLE IF NOT EXISTS vaccines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pet_id INTEGER NOT NULL REFERENCES pets(id),
                vaccine_name TEXT NOT NULL,
                application_date TEXT NOT NULL,
                next_dose_date TEXT,
                is_annual INTEGER NOT NULL DEFAULT 0,
                batch_number TEXT,
                veterinarian TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (pet_id, vaccine_name, application_date)
            );

            CREATE TABLE IF NOT EXISTS appointments (
                id INTEGER PRIMARY KEY,
                pet_id INTEGER NOT NULL REFERENCES pets(id),
                appointment_date TEXT NOT NULL,
                appointment_type TEXT NOT NULL DEFAULT 'consulta',
                status TEXT NOT NULL DEFAULT 'agendado',
                notes TEXT,
                amount TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(appointment_date);
            CREATE INDEX IF NOT EXISTS idx_appointments_pet ON appointments(pet_id);
        "#,
    },
    Migration {
        version: 2,
        name: "services_and_debts",
        sql: r#"
            CREATE TABLE IF NOT EXISTS financial_debts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                service_date TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                paid INTEGER NOT NULL DEFAULT 0,
                last_charge_date TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_debts_unpaid ON financial_debts(paid, service_date);

            CREATE TABLE IF NOT EXISTS grooming_services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pet_id INTEGER NOT NULL REFERENCES pets(id),
                service_date TEXT NOT NULL,
                service_type TEXT NOT NULL DEFAULT 'banho',
                has_plan INTEGER NOT NULL DEFAULT 0,
                plan_type TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (pet_id, service_date)
            );

            CREATE TABLE IF NOT EXISTS grooming_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                monthly_price TEXT NOT NULL,
                services_included TEXT,
                breed_specific INTEGER NOT NULL DEFAULT 0,
                breeds TEXT
            );

            CREATE TABLE IF NOT EXISTS completed_services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pet_id INTEGER NOT NULL REFERENCES pets(id),
                service_date TEXT NOT NULL,
                service_type TEXT,
                has_grooming INTEGER NOT NULL DEFAULT 0,
                has_tosa INTEGER NOT NULL DEFAULT 0,
                has_taxidog INTEGER NOT NULL DEFAULT 0,
                satisfaction_sent INTEGER NOT NULL DEFAULT 0,
                satisfaction_sent_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_completed_pending
                ON completed_services(satisfaction_sent, service_date);
        "#,
    },
    Migration {
        version: 3,
        name: "reactivation_log",
        sql: r#"
            CREATE TABLE IF NOT EXISTS reactivation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL,
                pet_id INTEGER,
                category TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_logs_source
                ON reactivation_logs(customer_id, category, source_id, sent_at);
            CREATE INDEX IF NOT EXISTS idx_logs_sent_at ON reactivation_logs(sent_at);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
