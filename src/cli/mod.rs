pub mod full;
pub mod inspect;
pub mod plan;
pub mod purge;
pub mod selective;

use anyhow::{bail, Result};
use rusqlite::types::Value;
use std::io::Write;

use db_reset::config::ResetConfig;

/// Ask for a typed `YES` before a destructive command, unless `--yes` was
/// passed or confirmation is switched off in config.
pub fn confirm(config: &ResetConfig, yes: bool, warning: &str) -> Result<()> {
    if yes || !config.reset.require_confirmation {
        return Ok(());
    }

    println!("WARNING: {warning}");
    println!("Database: {}", config.resolved_db_path().display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("cancelled");
    }
    Ok(())
}

/// Integers bind as integers, anything else as text.
pub fn parse_value(raw: &str) -> Value {
    match raw.trim().parse::<i64>() {
        Ok(n) => Value::Integer(n),
        Err(_) => Value::Text(raw.to_string()),
    }
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_bind_as_integers() {
        assert_eq!(parse_value("42"), Value::Integer(42));
        assert_eq!(parse_value("APP/Q9999/W/21/1234567"), Value::Text("APP/Q9999/W/21/1234567".into()));
    }

    #[test]
    fn confirmation_can_be_skipped() {
        let mut config = ResetConfig::default();
        assert!(confirm(&config, true, "x").is_ok());
        config.reset.require_confirmation = false;
        assert!(confirm(&config, false, "x").is_ok());
    }
}
