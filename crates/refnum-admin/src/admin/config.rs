use std::{path::PathBuf, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use refnum::{EntityType, OrganizationId, SqliteOptions};

/// Upper bound on `allocate --count`, so a typo cannot burn through a
/// counter.
pub const MAX_ALLOCATE_COUNT: u32 = 10_000;

/// Command line arguments for the `refnum-admin` binary.
///
/// Global settings can also be supplied through environment variables or a
/// `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "refnum-admin",
    version,
    about = "Allocate, inspect and backfill per-organization reference numbers"
)]
pub struct CliArgs {
    /// Path to the SQLite database holding `reference_counters` and the
    /// entity tables.
    ///
    /// Environment variable: `REFNUM_DATABASE`
    #[arg(long, env = "REFNUM_DATABASE", global = true, default_value = "refnum.db")]
    pub database: PathBuf,

    /// How long to wait for a competing writer before giving up, in
    /// milliseconds.
    ///
    /// Environment variable: `REFNUM_BUSY_TIMEOUT_MS`
    #[arg(long, env = "REFNUM_BUSY_TIMEOUT_MS", global = true, default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Log output format. Logs go to stderr; command output goes to stdout.
    ///
    /// Environment variable: `REFNUM_LOG_FORMAT`
    #[arg(
        long,
        env = "REFNUM_LOG_FORMAT",
        global = true,
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: CommandArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CommandArgs {
    /// Allocate one or more references and print them.
    Allocate {
        /// Organization to allocate for.
        #[arg(long)]
        org: String,
        /// Entity type: work-item, feature, key-result or objective.
        #[arg(long)]
        entity_type: String,
        /// Number of references to allocate.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the last issued reference of every entity type.
    Show {
        #[arg(long)]
        org: String,
    },
    /// Number pre-existing entities that have no reference yet.
    Backfill {
        #[arg(long)]
        org: String,
        #[arg(long)]
        entity_type: String,
        /// Entity table holding `id`, `organization_id`, `created_at` and
        /// `reference` columns.
        #[arg(long)]
        table: String,
        /// Install the `(organization_id, reference)` unique index once the
        /// backfill completes.
        #[arg(long, default_value_t = false)]
        enforce_unique: bool,
    },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Validated form of [`CliArgs`].
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database: PathBuf,
    pub sqlite: SqliteOptions,
    pub log_format: LogFormat,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Allocate {
        organization: OrganizationId,
        entity_type: EntityType,
        count: u32,
    },
    Show {
        organization: OrganizationId,
    },
    Backfill {
        organization: OrganizationId,
        entity_type: EntityType,
        table: String,
        enforce_unique: bool,
    },
}

impl TryFrom<CliArgs> for AdminConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.busy_timeout_ms == 0 {
            bail!("REFNUM_BUSY_TIMEOUT_MS must be greater than 0");
        }

        let command = match args.command {
            CommandArgs::Allocate {
                org,
                entity_type,
                count,
            } => {
                if count == 0 {
                    bail!("--count must be greater than 0");
                }
                if count > MAX_ALLOCATE_COUNT {
                    bail!("--count ({count}) exceeds the maximum of {MAX_ALLOCATE_COUNT}");
                }
                Command::Allocate {
                    organization: parse_org(org)?,
                    entity_type: parse_entity_type(&entity_type)?,
                    count,
                }
            }
            CommandArgs::Show { org } => Command::Show {
                organization: parse_org(org)?,
            },
            CommandArgs::Backfill {
                org,
                entity_type,
                table,
                enforce_unique,
            } => Command::Backfill {
                organization: parse_org(org)?,
                entity_type: parse_entity_type(&entity_type)?,
                table,
                enforce_unique,
            },
        };

        Ok(Self {
            database: args.database,
            sqlite: SqliteOptions {
                busy_timeout: Duration::from_millis(args.busy_timeout_ms),
                ..SqliteOptions::default()
            },
            log_format: args.log_format,
            command,
        })
    }
}

fn parse_org(raw: String) -> anyhow::Result<OrganizationId> {
    OrganizationId::try_from(raw).context("invalid --org")
}

fn parse_entity_type(raw: &str) -> anyhow::Result<EntityType> {
    raw.parse().with_context(|| {
        let allowed: Vec<_> = EntityType::ALL.iter().map(|t| t.as_str()).collect();
        format!("invalid --entity-type, expected one of: {}", allowed.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<AdminConfig> {
        let args = CliArgs::try_parse_from(args)?;
        AdminConfig::try_from(args)
    }

    #[test]
    fn parses_allocate_with_defaults() {
        let config = parse(&[
            "refnum-admin",
            "allocate",
            "--org",
            "acme",
            "--entity-type",
            "work-item",
        ])
        .unwrap();

        assert_eq!(
            config.command,
            Command::Allocate {
                organization: OrganizationId::new("acme").unwrap(),
                entity_type: EntityType::WorkItem,
                count: 1,
            }
        );
        assert_eq!(config.sqlite.busy_timeout, Duration::from_secs(5));
        assert!(config.sqlite.wal);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let config = parse(&[
            "refnum-admin",
            "show",
            "--org",
            "acme",
            "--database",
            "/tmp/other.db",
            "--busy-timeout-ms",
            "250",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.database, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.sqlite.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn parses_backfill() {
        let config = parse(&[
            "refnum-admin",
            "backfill",
            "--org",
            "acme",
            "--entity-type",
            "objective",
            "--table",
            "objectives",
            "--enforce-unique",
        ])
        .unwrap();

        assert_eq!(
            config.command,
            Command::Backfill {
                organization: OrganizationId::new("acme").unwrap(),
                entity_type: EntityType::Objective,
                table: "objectives".to_owned(),
                enforce_unique: true,
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let allocate = |extra: &[&str]| {
            let mut args = vec!["refnum-admin", "allocate", "--org", "acme", "--entity-type"];
            args.extend_from_slice(extra);
            parse(&args)
        };

        let err = allocate(&["epic"]).unwrap_err();
        assert!(format!("{err:#}").contains("work-item, feature, key-result, objective"));

        assert!(allocate(&["work-item", "--count", "0"]).is_err());
        assert!(allocate(&["work-item", "--count", "10001"]).is_err());
        assert!(allocate(&["work-item", "--busy-timeout-ms", "0"]).is_err());
        assert!(parse(&["refnum-admin", "show", "--org", "   "]).is_err());
    }
}
