//! Hash every plain-text password in a local user spreadsheet, in place.
//!
//! Usage: `hash-passwords <usuarios.xlsx> [bcrypt cost]`

use anyhow::{bail, Context};
use tracing::info;

use resource_portal::auth::UserTable;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: hash-passwords <users.xlsx> [bcrypt cost]");
    };
    let cost = match args.next() {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("'{raw}' is not a valid bcrypt cost"))?,
        None => bcrypt::DEFAULT_COST,
    };

    let data = std::fs::read(&path).with_context(|| format!("Failed to read {path}"))?;
    let mut table = UserTable::from_xlsx(&data)?;

    let changed = table.hash_plaintext_passwords(cost)?;
    if changed == 0 {
        info!(path = %path, "All passwords are already hashed");
        return Ok(());
    }

    std::fs::write(&path, table.to_xlsx()?).with_context(|| format!("Failed to write {path}"))?;
    info!(path = %path, changed, cost, "Hashed plain-text passwords");
    Ok(())
}
