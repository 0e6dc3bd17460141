use std::env;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use switchboard::{assignments, config::AppConfig, db};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("expire-assignments") => expire_assignments()?,
        Some("expiring") => {
            let mut days = None;
            let mut exact = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--days" => {
                        days = Some(
                            args.next()
                                .context("--days requires a value")?
                                .parse::<i64>()
                                .context("--days must be an integer")?,
                        );
                    }
                    "--exact" => exact = true,
                    other => anyhow::bail!("unknown argument: {other}"),
                }
            }
            let days = days.context("expiring requires --days")?;
            list_expiring(days, exact)?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\nUsage: sweeper expire-assignments | expiring --days N [--exact]");
            std::process::exit(1);
        }
        None => {
            eprintln!("Usage: sweeper expire-assignments | expiring --days N [--exact]");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "sweeper",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded configuration"
    );
    db::init_pool(&config.database_url, config.database_max_pool_size)
}

fn expire_assignments() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let affected = assignments::expire_assignments(&mut conn)?;
    println!("Expired {affected} assignments.");
    Ok(())
}

fn list_expiring(days: i64, exact: bool) -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let expiring = assignments::expiring_assignments(&mut conn, days, exact)?;
    if expiring.is_empty() {
        println!("No assignments expiring in {days} days.");
        return Ok(());
    }
    println!("{} assignments expiring in {days} days:", expiring.len());
    for assignment in expiring {
        println!(
            "{}\tleader={}\tprospect={}\tcreated={}",
            assignment.id, assignment.leader_id, assignment.prospect_id, assignment.created_at
        );
    }
    Ok(())
}
