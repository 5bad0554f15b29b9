//! # Command Line
//!
//! Hand-rolled parsing in the same style as the seed tool: global options
//! first, then one subcommand and its arguments.
//!
//! ```text
//! kicks-till [--db PATH] [--config PATH] <command>
//!
//!   run                               sync daemon until ctrl-c (default)
//!   status                            pending uploads and remote store
//!   sync                              one push-then-recent-pull cycle
//!   force-push                        re-upload everything local
//!   bootstrap-admin <NAME> <PIN>      first admin on a fresh till
//!   set-remote <URL> <KEY> --pin PIN  store remote settings (admin)
//!   clear-remote --pin PIN            go local-only (admin)
//!   dashboard [--days N]              period summary (default 1 day)
//!   kardex <PRODUCT_ID>               movement history and audit
//! ```

use std::path::PathBuf;

use crate::error::{TillError, TillResult};

pub const USAGE: &str = "\
Kicks POS till

Usage: kicks-till [OPTIONS] [COMMAND]

Options:
  -d, --db <PATH>        Database file (default: app data dir, or KICKS_DB_PATH)
  -c, --config <PATH>    Sync config file (default: platform config dir)
  -h, --help             Show this help message

Commands:
  run                                 Run the sync daemon until ctrl-c (default)
  status                              Show pending uploads and the remote store
  sync                                Run one sync cycle now
  force-push                          Re-upload every local record
  bootstrap-admin <NAME> <PIN>        Create the first admin on a fresh till
  set-remote <URL> <KEY> --pin <PIN>  Store remote store settings (admin)
  clear-remote --pin <PIN>            Forget the remote store (admin)
  dashboard [--days <N>]              Sales summary for the last N days
  kardex <PRODUCT_ID>                 Stock movement history of a product";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Status,
    Sync,
    ForcePush,
    BootstrapAdmin { name: String, pin: String },
    SetRemote { url: String, key: String, pin: String },
    ClearRemote { pin: String },
    Dashboard { days: i64 },
    Kardex { product_id: i64 },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub db_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

impl Cli {
    /// Parses arguments without the program name.
    pub fn parse<I, S>(args: I) -> TillResult<Cli>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut db_path = None;
        let mut config_path = None;

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--db" | "-d" => {
                    db_path = Some(PathBuf::from(value_of(&args, i)?));
                    i += 2;
                }
                "--config" | "-c" => {
                    config_path = Some(PathBuf::from(value_of(&args, i)?));
                    i += 2;
                }
                "--help" | "-h" => {
                    return Ok(Cli {
                        db_path,
                        config_path,
                        command: Command::Help,
                    })
                }
                _ => break,
            }
        }

        let command = parse_command(&args[i..])?;
        Ok(Cli {
            db_path,
            config_path,
            command,
        })
    }
}

fn parse_command(args: &[String]) -> TillResult<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Run);
    };

    let command = match name.as_str() {
        "run" => Command::Run,
        "status" => Command::Status,
        "sync" => Command::Sync,
        "force-push" => Command::ForcePush,
        "help" => Command::Help,
        "bootstrap-admin" => {
            let [name, pin] = positionals::<2>(name, rest)?;
            Command::BootstrapAdmin { name, pin }
        }
        "set-remote" => {
            let (pin, rest) = take_flag(rest, "--pin")?;
            let [url, key] = positionals::<2>(name, &rest)?;
            Command::SetRemote {
                url,
                key,
                pin: pin.ok_or_else(|| TillError::usage("set-remote needs --pin"))?,
            }
        }
        "clear-remote" => {
            let (pin, rest) = take_flag(rest, "--pin")?;
            positionals::<0>(name, &rest)?;
            Command::ClearRemote {
                pin: pin.ok_or_else(|| TillError::usage("clear-remote needs --pin"))?,
            }
        }
        "dashboard" => {
            let (days, rest) = take_flag(rest, "--days")?;
            positionals::<0>(name, &rest)?;
            let days = match days {
                Some(raw) => parse_number(&raw, "--days")?,
                None => 1,
            };
            if days < 1 {
                return Err(TillError::usage("--days must be at least 1"));
            }
            Command::Dashboard { days }
        }
        "kardex" => {
            let [id] = positionals::<1>(name, rest)?;
            Command::Kardex {
                product_id: parse_number(&id, "PRODUCT_ID")?,
            }
        }
        other => return Err(TillError::usage(format!("unknown command '{other}'"))),
    };

    if matches!(
        command,
        Command::Run | Command::Status | Command::Sync | Command::ForcePush | Command::Help
    ) && !rest.is_empty()
    {
        return Err(TillError::usage(format!("{name} takes no arguments")));
    }
    Ok(command)
}

fn value_of(args: &[String], i: usize) -> TillResult<String> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| TillError::usage(format!("{} needs a value", args[i])))
}

/// Removes `flag VALUE` from `args`.
fn take_flag(args: &[String], flag: &str) -> TillResult<(Option<String>, Vec<String>)> {
    let mut value = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            value = Some(value_of(args, i)?);
            i += 2;
        } else {
            rest.push(args[i].clone());
            i += 1;
        }
    }
    Ok((value, rest))
}

fn positionals<const N: usize>(command: &str, args: &[String]) -> TillResult<[String; N]> {
    <[String; N]>::try_from(args.to_vec()).map_err(|got| {
        TillError::usage(format!(
            "{command} takes {N} argument(s), got {}",
            got.len()
        ))
    })
}

fn parse_number(raw: &str, what: &str) -> TillResult<i64> {
    raw.parse()
        .map_err(|_| TillError::usage(format!("{what} must be a number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TillResult<Cli> {
        Cli::parse(args.iter().copied())
    }

    #[test]
    fn test_defaults_to_run() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.command, Command::Run);
        assert_eq!(cli.db_path, None);

        let cli = parse(&["--db", "/tmp/k.db", "-c", "sync.toml"]).unwrap();
        assert_eq!(cli.command, Command::Run);
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/k.db")));
        assert_eq!(cli.config_path, Some(PathBuf::from("sync.toml")));
    }

    #[test]
    fn test_set_remote_pin_anywhere() {
        let expected = Command::SetRemote {
            url: "https://shop.example.co".into(),
            key: "anon".into(),
            pin: "1234".into(),
        };
        let cli = parse(&["set-remote", "--pin", "1234", "https://shop.example.co", "anon"]).unwrap();
        assert_eq!(cli.command, expected);
        let cli = parse(&["set-remote", "https://shop.example.co", "anon", "--pin", "1234"]).unwrap();
        assert_eq!(cli.command, expected);

        assert!(matches!(
            parse(&["set-remote", "https://shop.example.co", "anon"]),
            Err(TillError::Usage(_))
        ));
    }

    #[test]
    fn test_dashboard_days() {
        assert_eq!(parse(&["dashboard"]).unwrap().command, Command::Dashboard { days: 1 });
        assert_eq!(
            parse(&["dashboard", "--days", "7"]).unwrap().command,
            Command::Dashboard { days: 7 }
        );
        assert!(parse(&["dashboard", "--days", "0"]).is_err());
        assert!(parse(&["dashboard", "--days", "week"]).is_err());
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(parse(&["refund"]), Err(TillError::Usage(_))));
        assert!(matches!(parse(&["kardex"]), Err(TillError::Usage(_))));
        assert!(matches!(parse(&["kardex", "abc"]), Err(TillError::Usage(_))));
        assert!(matches!(parse(&["status", "now"]), Err(TillError::Usage(_))));
        assert!(matches!(parse(&["--db"]), Err(TillError::Usage(_))));
        assert_eq!(
            parse(&["kardex", "42"]).unwrap().command,
            Command::Kardex { product_id: 42 }
        );
        assert_eq!(
            parse(&["bootstrap-admin", "Marta", "1234"]).unwrap().command,
            Command::BootstrapAdmin {
                name: "Marta".into(),
                pin: "1234".into()
            }
        );
    }
}
