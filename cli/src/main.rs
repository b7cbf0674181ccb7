// Copyright 2017-2023 Peter Williams <peter@newton.cx> and collaborators
// Licensed under the MIT License.

/*! The main rubbl driver command

This provides swiss-army-knife access to commands installed by other Rubbl
modules, plus a few built-in commands for poking at ASDM tables and NRO
datasets.

Heavily modeled on Cargo's implementation of the same sort of functionality.

*/

use anyhow::{anyhow, Context, Error, Result};
use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};
use rubbl_asdm::{schemas, Table};
use rubbl_core::io::Endianness;
use rubbl_core::notify::{ClapNotificationArgsExt, NotificationBackend};
use rubbl_nro::{NroDataset, NroVariant};
use std::collections::BTreeSet;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error as ThisError;

// Some error help.

#[derive(ThisError, Debug)]
#[error("no such sub-command `{0}`")]
pub struct NoSuchSubcommandError(String);

fn main() {
    let matches = make_app().get_matches();

    process::exit(rubbl_core::notify::run_with_notifications(
        matches,
        |matches, nbe| -> Result<i32> {
            match matches.subcommand() {
                Some(("help", m)) => do_help(m, nbe),
                Some(("list", m)) => do_list(m, nbe),
                Some(("sdm-table", m)) => do_sdm_table(m, nbe),
                Some(("nro-header", m)) => do_nro_header(m, nbe),
                Some((external, m)) => do_external(external, m, nbe),
                None => {
                    // No sub-command provided; can't use do_help() since it wants sub-matches.
                    make_app().print_long_help()?;
                    Ok(0)
                }
            }
        },
    ));
}

/// It seems that the best way to re-print the help in the "help" subcommand
/// is to be able to make multiple Command objects.
fn make_app() -> Command {
    Command::new("rubbl")
        .version(crate_version!())
        .allow_external_subcommands(true)
        .disable_help_subcommand(true)
        .rubbl_notify_args()
        .subcommand(
            Command::new("help")
                .about("Get help information for sub-commands")
                .arg(Arg::new("command").help("The name of a sub-command to get help for")),
        )
        .subcommand(Command::new("list").about("List the available sub-commands"))
        .subcommand(
            Command::new("sdm-table")
                .about("Inspect and convert ASDM tables")
                .subcommand_required(true)
                .subcommand(
                    Command::new("info")
                        .about("Summarize a table")
                        .arg(dir_arg())
                        .arg(table_arg()),
                )
                .subcommand(
                    Command::new("convert")
                        .about("Rewrite a table into another dataset directory")
                        .arg(dir_arg())
                        .arg(table_arg())
                        .arg(
                            Arg::new("OUTDIR")
                                .help("The directory to write the table into")
                                .value_parser(clap::value_parser!(PathBuf))
                                .required(true),
                        )
                        .arg(
                            Arg::new("binary")
                                .long("binary")
                                .help("Write the MIME-wrapped binary form")
                                .action(ArgAction::SetTrue),
                        )
                        .arg(
                            Arg::new("little_endian")
                                .long("little-endian")
                                .help("Write binary data little-endian rather than big-endian")
                                .action(ArgAction::SetTrue),
                        ),
                ),
        )
        .subcommand(
            Command::new("nro-header")
                .about("Summarize the header of an NRO 45 m or ASTE dataset")
                .arg(
                    Arg::new("PATH")
                        .help("The path to the dataset file")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true),
                )
                .arg(
                    Arg::new("aste")
                        .long("aste")
                        .help("Read the file as an ASTE dataset")
                        .action(ArgAction::SetTrue),
                ),
        )
        .override_help(
            r#"rubbl -- dispatcher for command-line access to Rubbl tools

USAGE:
    rubbl [GLOBAL-OPTIONS] [SUBCOMMAND] [SUBCOMMAND arguments ...]

GLOBAL OPTIONS:
    -h, --help     Print help information
    -V, --version  Print version information

SUBCOMMANDS:
    Available sub-commands depend on which Rubbl tools you have installed.
    Use "rubbl list" to see what is available and "rubbl help" to get help
    on their usage. Built-in sub-commands are:

    help        Get help on sub-command usage
    list        List the available sub-commands
    sdm-table   Inspect and convert ASDM tables
    nro-header  Summarize the header of an NRO 45 m or ASTE dataset
"#,
        )
}

fn dir_arg() -> Arg {
    Arg::new("DIR")
        .help("The ASDM dataset directory")
        .value_parser(clap::value_parser!(PathBuf))
        .required(true)
}

fn table_arg() -> Arg {
    Arg::new("TABLE")
        .help("The name of the table, e.g. CorrelatorMode")
        .required(true)
}

/// Get help on a subcommand, or on the main program.
fn do_help(matches: &ArgMatches, _nbe: &mut dyn NotificationBackend) -> Result<i32> {
    match matches.get_one::<String>("command").map(|s| s.as_str()) {
        None | Some("help") | Some("list") => {
            make_app().print_long_help()?;
            Ok(0)
        }

        Some(cmd @ "sdm-table") | Some(cmd @ "nro-header") => {
            let mut app = make_app();

            if let Some(sub) = app.find_subcommand_mut(cmd) {
                sub.print_long_help()?;
            }

            Ok(0)
        }

        Some(cmd) => {
            // If the function returns, something went wrong by definition.
            Err(try_exec_subcommand(cmd, &[OsString::from("--help")]))
        }
    }
}

/// Print out a list of the available sub-commands.
fn do_list(_matches: &ArgMatches, _nbe: &mut dyn NotificationBackend) -> Result<i32> {
    println!("Currently available \"rubbl\" sub-commands:");

    for command in list_commands() {
        println!("    {}", command);
    }

    Ok(0)
}

fn load_table(dir: &Path, name: &str, nbe: &mut dyn NotificationBackend) -> Result<Table> {
    let schema = schemas::by_name(name)
        .ok_or_else(|| anyhow!("there is no built-in definition of a table named `{}`", name))?;

    let mut table = Table::new(schema);
    table
        .set_from_file(dir, nbe)
        .with_context(|| format!("failed to load the {} table from `{}`", name, dir.display()))?;
    Ok(table)
}

fn do_sdm_table(matches: &ArgMatches, nbe: &mut dyn NotificationBackend) -> Result<i32> {
    let (cmd, m) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("a table operation must be specified"))?;

    let dir = m
        .get_one::<PathBuf>("DIR")
        .ok_or_else(|| anyhow!("a dataset directory must be specified"))?;
    let name = m
        .get_one::<String>("TABLE")
        .ok_or_else(|| anyhow!("a table name must be specified"))?;
    let mut table = load_table(dir, name, nbe)?;

    match cmd {
        "info" => {
            println!("table: {} (version {})", table.name(), table.version());
            println!("entity: {}", table.entity().entity_id);
            println!("container: {}", table.container_entity().entity_id);
            println!("rows: {}", table.size());
            println!("key: {}", table.key_fields().join(", "));

            if table.prefers_binary() {
                println!("stored as: binary, {}", table.byte_order().asdm_name());
            } else {
                println!("stored as: XML");
            }

            Ok(0)
        }

        "convert" => {
            let outdir = m
                .get_one::<PathBuf>("OUTDIR")
                .ok_or_else(|| anyhow!("an output directory must be specified"))?;

            table.set_prefer_binary(m.get_flag("binary"));
            table.set_byte_order(if m.get_flag("little_endian") {
                Endianness::Little
            } else {
                Endianness::Big
            });

            table.to_file(outdir, nbe).with_context(|| {
                format!(
                    "failed to write the {} table into `{}`",
                    name,
                    outdir.display()
                )
            })?;
            Ok(0)
        }

        other => Err(NoSuchSubcommandError(format!("sdm-table {}", other)).into()),
    }
}

fn do_nro_header(matches: &ArgMatches, nbe: &mut dyn NotificationBackend) -> Result<i32> {
    let path = matches
        .get_one::<PathBuf>("PATH")
        .ok_or_else(|| anyhow!("a dataset path must be specified"))?;

    let variant = if matches.get_flag("aste") {
        NroVariant::Aste
    } else {
        NroVariant::Nro45
    };

    let ds = NroDataset::open_path(path, variant, nbe)
        .with_context(|| format!("failed to open `{}`", path.display()))?;
    let h = ds.header();
    let layout = ds.layout()?;

    println!("byte order: {}", ds.byte_order());
    println!("observer: {}", h.obsvr);
    println!("project: {}", h.proj);
    println!("object: {} ({})", h.obj, h.epoch);
    println!("site: {}", h.site);
    println!("time range: {} -- {}", h.lostm, h.loetm);
    println!("arrays in use: {} of {}", h.arynm, h.array_max());

    for (i, rx) in h.rx.iter().take(h.arynm.max(0) as usize).enumerate() {
        println!("    A{}: {}", i + 1, rx);
    }

    println!("polarizations: {}", h.polarization_count());
    println!("scans: {}", layout.scan_count);
    println!("data records: {}", layout.row_count);
    println!("record length: {} bytes", layout.scan_length);
    println!("sample data length: {} bytes", layout.data_record_length);
    println!("max channels: {}", layout.max_channels);
    println!(
        "output channels: {} (bound by {} from {})",
        h.numch, h.chbind, h.chmin
    );
    Ok(0)
}

/// Run an external command by executing a subprocess
fn do_external(cmd: &str, matches: &ArgMatches, _nbe: &mut dyn NotificationBackend) -> Result<i32> {
    let args: Vec<OsString> = match matches.get_many::<OsString>("") {
        Some(v) => v.cloned().collect(),
        None => Vec::new(),
    };

    Err(try_exec_subcommand(cmd, &args))
}

/// Try to re-execute the process using the executable corresponding to the
/// named sub-command. If this function returns, something went wrong.
fn try_exec_subcommand(cmd: &str, args: &[OsString]) -> Error {
    let command_exe = format!("rubbl-{}{}", cmd, env::consts::EXE_SUFFIX);
    let path = search_directories()
        .iter()
        .map(|dir| dir.join(&command_exe))
        .find(|file| is_executable(file));

    let command = match path {
        Some(command) => command,
        None => {
            return NoSuchSubcommandError(cmd.to_owned()).into();
        }
    };

    process::Command::new(command).args(args).exec().into()
}

// Lots of copy/paste from cargo:

fn list_commands() -> BTreeSet<String> {
    let prefix = "rubbl-";
    let suffix = env::consts::EXE_SUFFIX;
    let mut commands = BTreeSet::new();

    for dir in search_directories() {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            _ => continue,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let filename = match path.file_name().and_then(|s| s.to_str()) {
                Some(filename) => filename,
                _ => continue,
            };
            if !filename.starts_with(prefix) || !filename.ends_with(suffix) {
                continue;
            }
            if is_executable(entry.path()) {
                let end = filename.len() - suffix.len();
                commands.insert(filename[prefix.len()..end].to_string());
            }
        }
    }

    commands.insert("help".to_owned());
    commands.insert("list".to_owned());
    commands.insert("sdm-table".to_owned());
    commands.insert("nro-header".to_owned());

    commands
}

#[cfg(unix)]
fn is_executable<P: AsRef<Path>>(path: P) -> bool {
    use std::os::unix::prelude::*;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable<P: AsRef<Path>>(path: P) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn search_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(val) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&val));
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_is_consistent() {
        make_app().debug_assert();
    }

    #[test]
    fn parses_builtins() {
        let m = make_app()
            .try_get_matches_from(vec!["rubbl", "nro-header", "--aste", "obs.nro"])
            .unwrap();
        let (cmd, sub) = m.subcommand().unwrap();
        assert_eq!(cmd, "nro-header");
        assert!(sub.get_flag("aste"));

        let m = make_app()
            .try_get_matches_from(vec![
                "rubbl",
                "sdm-table",
                "convert",
                "in",
                "CorrelatorMode",
                "out",
                "--binary",
            ])
            .unwrap();
        let (_, sub) = m.subcommand().unwrap();
        let (cmd, conv) = sub.subcommand().unwrap();
        assert_eq!(cmd, "convert");
        assert!(conv.get_flag("binary"));
        assert!(!conv.get_flag("little_endian"));
    }

    #[test]
    fn external_args() {
        let m = make_app()
            .try_get_matches_from(vec!["rubbl", "frob", "--x", "y"])
            .unwrap();
        let (cmd, sub) = m.subcommand().unwrap();
        assert_eq!(cmd, "frob");
        let args: Vec<_> = sub.get_many::<OsString>("").unwrap().collect();
        assert_eq!(args.len(), 2);
    }
}
