//! Configuration validation.

use super::{Config, ConnectionConfig, MirrorPolicy};
use crate::core::identifier::parse_qualified;
use crate::error::{MirrorError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("target", &config.target)?;

    match &config.source {
        Some(source) => {
            validate_connection("source", source)?;

            // Cannot mirror a database onto itself
            if source.host == config.target.host
                && source.port == config.target.port
                && source.database == config.target.database
            {
                return Err(MirrorError::Config(
                    "source and target cannot be the same database".into(),
                ));
            }
        }
        None if config.output.path.is_none() => {
            return Err(MirrorError::Config(
                "no source connection or snapshot path configured".into(),
            ));
        }
        None => {}
    }

    validate_policy("model", config.model.as_ref())?;
    validate_policy("data", config.data.as_ref())?;

    Ok(())
}

fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(MirrorError::Config(format!("{}.host is required", side)));
    }
    if conn.database.is_empty() {
        return Err(MirrorError::Config(format!("{}.database is required", side)));
    }
    if conn.user.is_empty() {
        return Err(MirrorError::Config(format!("{}.user is required", side)));
    }
    Ok(())
}

fn validate_policy(name: &str, policy: Option<&MirrorPolicy>) -> Result<()> {
    let Some(tables) = policy.and_then(|p| p.tables.as_ref()) else {
        return Ok(());
    };

    let listed = tables
        .include
        .iter()
        .chain(tables.exclude.iter())
        .flatten();
    for table in listed {
        parse_qualified(table).map_err(|_| {
            MirrorError::Config(format!(
                "{}.tables entries must be schema.table, got '{}'",
                name, table
            ))
        })?;
    }
    Ok(())
}
