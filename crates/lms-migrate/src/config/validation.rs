//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::schema::find_table;
use crate::target::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let migration = &config.migration;

    if migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if migration.max_connections == 0 {
        return Err(MigrateError::Config(
            "migration.max_connections must be at least 1".into(),
        ));
    }
    if migration.request_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.request_timeout_secs must be at least 1".into(),
        ));
    }

    for name in migration
        .include_tables
        .iter()
        .chain(migration.exclude_tables.iter())
    {
        if find_table(name).is_none() {
            return Err(MigrateError::Config(format!("unknown table '{}'", name)));
        }
    }

    if let Some(storage) = &config.storage {
        if !storage.upload_url.starts_with("http://") && !storage.upload_url.starts_with("https://")
        {
            return Err(MigrateError::Config(format!(
                "storage upload URL must be http(s), got '{}'",
                storage.upload_url
            )));
        }
    }

    for db in [&config.source, &config.target].into_iter().flatten() {
        SslMode::parse(&db.ssl_mode)?;
    }

    if let (Some(source), Some(target)) = (&config.source, &config.target) {
        if source.url == target.url {
            return Err(MigrateError::Config(
                "source and target cannot be the same database".into(),
            ));
        }
    }

    Ok(())
}
