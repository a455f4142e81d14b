use std::io::{self, BufRead, Write};

use clap::Parser;
use sqld::config::Config;
use sqld::database::LibSqlDb;
use sqld::query_analysis::Statement;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    tracing::info!(vfs = %config.vfs_name, db = %config.db_name, "starting up");

    let vfs = sqld_libsql_bindings::register(&config.vfs_name, config.vfs_as_default)?;
    let db = LibSqlDb::new(vfs, config.db_name.clone(), config.write_timeout(), None)?;

    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }

        let statements: Vec<Statement> = Statement::parse(&line).collect::<anyhow::Result<Vec<_>>>()?;

        let (results, _state) = db.execute_batch(statements).await?;
        for result in results {
            match result {
                Ok(outcome) => println!("{} row(s), {} affected", outcome.rows.len(), outcome.affected_rows),
                Err(e) => println!("error: {e}"),
            }
        }
        print!("> ");
        io::stdout().flush()?;
    }

    Ok(())
}
