use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
    Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{category, product};

/// Name of the deferred sibling-uniqueness constraint on `cad_category`
pub const SIBLING_NAME_CONSTRAINT: &str = "uq_cad_category_parent_name";

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Create the category and product tables plus the constraints the entity
/// derive cannot express
async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for category tables...");

    // cad_product references cad_category
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(category::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(product::Entity)).await?;

    execute(
        db,
        backend,
        "CREATE INDEX IF NOT EXISTS idx_cad_category_parent_id ON cad_category (parent_id)",
    )
    .await?;
    execute(
        db,
        backend,
        "CREATE INDEX IF NOT EXISTS idx_cad_product_category_id ON cad_product (category_id)",
    )
    .await?;
    add_constraint_if_not_exists(
        db,
        backend,
        "cad_category",
        SIBLING_NAME_CONSTRAINT,
        "UNIQUE NULLS NOT DISTINCT (parent_id, name) DEFERRABLE INITIALLY DEFERRED",
    )
    .await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

async fn execute(db: &DatabaseConnection, backend: DbBackend, sql: &str) -> Result<(), DbErr> {
    db.execute(Statement::from_string(backend, sql.to_string())).await?;
    Ok(())
}

/// Add a table constraint if one with that name does not exist yet
async fn add_constraint_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    table: &str,
    constraint: &str,
    definition: &str,
) -> Result<(), DbErr> {
    let check_sql = format!(
        "SELECT conname FROM pg_constraint WHERE conname = '{}'",
        constraint
    );
    let result = db.query_one(Statement::from_string(backend, check_sql)).await?;

    if result.is_none() {
        info!("Adding constraint {}.{}", table, constraint);
        execute(
            db,
            backend,
            &alter_table_add_constraint(table, constraint, definition),
        )
        .await?;
    }

    Ok(())
}

fn alter_table_add_constraint(table: &str, constraint: &str, definition: &str) -> String {
    format!("ALTER TABLE {} ADD CONSTRAINT {} {}", table, constraint, definition)
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}
