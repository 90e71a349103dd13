//! Interactive prompts mirror `create_broker_user/main.py` exactly:
//! confirm, username, hidden password, admin y/N.

use std::io::{self, Write};
use std::sync::Arc;

use auth::Auth;
use common::config::AppConfig;
use store::{Db, SqliteStore, Store};

pub async fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let path = AppConfig::resolve_path(config_path);
    let config = AppConfig::load(&path)?;

    println!("You are in the process of creating a user account.");
    println!("ATTENTION: an already existing user with the exact same username will be updated with new settings!");
    prompt("Hit [ENTER] to proceed...")?;

    let username = prompt("Username: ")?;
    if username.is_empty() {
        anyhow::bail!("username must not be empty");
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    let admin_answer = prompt("Grant admin rights [y/N]: ")?.to_lowercase();
    let is_admin = admin_answer == "y" || admin_answer == "yes";
    println!("Admin privileges {}!", if is_admin { "GRANTED" } else { "NOT granted" });

    let db = Db::connect(&config.store.database_url).await?;
    db.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new((*db.pool).clone()));

    let session_secret = vec![0u8; 32];
    let auth_service = Auth::new(store, session_secret);
    auth_service.create_user(&username, &password, is_admin).await?;

    println!("Done!");
    Ok(())
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
