//! Command line entry point for applying the pricing schema migrations.
//! The target database comes from DATABASE_URL.

use migration::Migrator;
use sea_orm_migration::cli;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
