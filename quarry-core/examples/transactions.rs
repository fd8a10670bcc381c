//! Runs against an in-memory SQLite database:
//! `cargo run --example transactions --features sqlite`

use futures::FutureExt;
use quarry_core::{
    from, insert, transaction, update, ConnectionManager, Connection, Executable, Filterable,
    Pool, PoolConfig, Value,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Account {
    id: i64,
    owner: String,
    balance: i64,
}

#[tokio::main]
async fn main() -> quarry_core::Result<()> {
    let config = PoolConfig::new("sqlite::memory:").max_connections(1);
    let pool = Pool::connect_lazy(&config)?;

    let mut conn = pool.get_connection().await?;
    conn.query(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL CHECK (balance >= 0))",
        &[],
    )
    .await?;
    pool.release_connection(conn).await;

    insert("accounts")
        .values_many([
            [("id", Value::from(1)), ("owner", Value::from("alice")), ("balance", Value::from(100))],
            [("id", Value::from(2)), ("owner", Value::from("bob")), ("balance", Value::from(50))],
        ])
        .execute(&pool)
        .await?;

    // execute_on renders for the held connection, so these run as SQLite
    let transfer = |from_id: i32, to_id: i32, amount: i32| {
        transaction(&pool, move |conn| {
            async move {
                update("accounts")
                    .decrement("balance", amount)
                    .where_(("id", from_id))
                    .execute_on(conn)
                    .await?;
                update("accounts")
                    .increment("balance", amount)
                    .where_(("id", to_id))
                    .execute_on(conn)
                    .await?;
                Ok::<_, quarry_core::Error>(())
            }
            .boxed()
        })
    };

    transfer(1, 2, 30).await?;
    println!("transfer of 30 committed");

    // violates the CHECK constraint, so the whole transfer rolls back
    if let Err(e) = transfer(2, 1, 500).await {
        println!("transfer of 500 rolled back: {e}");
    }

    let accounts: Vec<Account> = from("accounts").order_by_asc("id").fetch_all(&pool).await?;
    for account in accounts {
        println!("{} #{}: {}", account.owner, account.id, account.balance);
    }

    pool.close().await;
    Ok(())
}
