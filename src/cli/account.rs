use anyhow::{Result, anyhow};
use std::io::{self, Write};

use crate::auth::{AuthProvider, Credential, SqliteAccounts};
use crate::chat::Identity;
use crate::core::db::async_db;

/// Print `label` and read one trimmed line from stdin.
pub fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

/// Ask for the password of `handle` and log in.
pub async fn login(accounts: &SqliteAccounts, handle: &str) -> Result<Identity> {
    let password = prompt(&format!("Password for {}: ", handle))?;
    let identity = accounts
        .authenticate(&Credential::new(handle, &password))
        .await?;
    Ok(identity)
}

pub async fn run(handle: &str, db_path: &str) -> Result<()> {
    let password = prompt(&format!("Enter a password for {}: ", handle))?;
    let confirm = prompt("Confirm password: ")?;
    if password != confirm {
        return Err(anyhow!("Passwords do not match"));
    }

    let db = async_db(db_path).await?;
    let accounts = SqliteAccounts::new(&db);
    let identity = accounts.register(handle, &password).await?;
    if let Some(handle) = identity.handle() {
        println!("Account {} saved to DB.", handle);
    }

    Ok(())
}
