//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `unitofwork_core` linkage and run one commit end to end.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `unitofwork_cli [config.json]`

use std::process::ExitCode;
use unitofwork_core::{
    init_logging, CoreConfig, Customer, DbConfig, ListQuery, Order, SqliteSession, UnitOfWork,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("unitofwork_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("unitofwork_core ping={}", unitofwork_core::ping());
    println!("unitofwork_core version={}", unitofwork_core::core_version());

    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(log) = &config.log {
        init_logging(log)?;
    }

    let (affected, orders) = smoke_commit(&config.db).await?;
    println!("unitofwork_core affected_rows={affected} orders={orders}");
    Ok(())
}

/// Commits one customer with two orders and lists them back.
async fn smoke_commit(db: &DbConfig) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let mut uow = UnitOfWork::new(SqliteSession::open(db)?);
    let customers = uow.get_repository::<Customer>()?;
    let orders = uow.get_repository::<Order>()?;

    let customer = smoke_customer();
    customers.add(&customer)?;
    orders.add(&Order::new(customer.id, 1_250))?;
    orders.add(&Order::new(customer.id, 990))?;

    let affected = uow.save_changes().await?;
    let listed = orders.list(&ListQuery::new().filter("customer_id", customer.id.to_string()))?;

    uow.dispose()?;
    Ok((affected, listed.len()))
}

/// Email is derived from the id so repeated runs on one file stay unique.
fn smoke_customer() -> Customer {
    let mut customer = Customer::new("Smoke Test", "");
    customer.email = format!("smoke-{}@example.com", customer.id.simple());
    customer
}
