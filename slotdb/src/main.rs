#![cfg_attr(test, allow(clippy::expect_used))]

//! `slotdb` command-line front end.
//!
//! ```text
//! slotdb get <key>
//! slotdb put <key> <value>
//! slotdb delete <key>
//! ```
//!
//! The database file and engine options come from the environment; see
//! [`slotdb::config`].

use slotdb::config::Config;
use slotdb::db::{Db, DbError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: slotdb get <key> | put <key> <value> | delete <key>";

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        match args {
            [cmd, key] if cmd == "get" => Some(Self::Get { key: key.clone() }),
            [cmd, key, value] if cmd == "put" => Some(Self::Put {
                key: key.clone(),
                value: value.clone(),
            }),
            [cmd, key] if cmd == "delete" => Some(Self::Delete { key: key.clone() }),
            _ => None,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotdb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let db = match Db::open(&config.path, config.options) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open {}: {e}", config.path.display());
            std::process::exit(1);
        }
    };

    let result = run(&db, command);
    if let Err(e) = db.close() {
        tracing::error!("Failed to close database: {e}");
        std::process::exit(1);
    }
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(db: &Db, command: Command) -> Result<(), DbError> {
    match command {
        Command::Get { key } => {
            let tx = db.read_tx()?;
            match tx.get(key.as_bytes())? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => tracing::info!(key, "key not found"),
            }
        }
        Command::Put { key, value } => {
            let mut tx = db.write_tx()?;
            tx.put(key.as_bytes(), value.as_bytes())?;
            tx.commit()?;
        }
        Command::Delete { key } => {
            let mut tx = db.write_tx()?;
            match tx.delete(key.as_bytes())? {
                Some(_) => tx.commit()?,
                None => tracing::info!(key, "key not found"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(&args(&["get", "a"])),
            Some(Command::Get { key: "a".into() })
        );
        assert_eq!(
            Command::parse(&args(&["put", "a", "1"])),
            Some(Command::Put {
                key: "a".into(),
                value: "1".into()
            })
        );
        assert_eq!(
            Command::parse(&args(&["delete", "a"])),
            Some(Command::Delete { key: "a".into() })
        );
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        assert_eq!(Command::parse(&args(&[])), None);
        assert_eq!(Command::parse(&args(&["get"])), None);
        assert_eq!(Command::parse(&args(&["put", "a"])), None);
        assert_eq!(Command::parse(&args(&["scan", "a"])), None);
    }

    #[test]
    fn test_run_against_temp_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db = Db::open(&dir.path().join("cli.db"), slotdb::config::Options::default())
            .expect("open");

        run(
            &db,
            Command::Put {
                key: "k".into(),
                value: "v".into(),
            },
        )
        .expect("put");
        run(&db, Command::Get { key: "k".into() }).expect("get");
        run(&db, Command::Delete { key: "k".into() }).expect("delete");

        let tx = db.read_tx().expect("read tx");
        assert_eq!(tx.get(b"k").expect("get"), None);
    }
}
