use std::fs::File;
use std::io::{self, Read, Write};

use anyhow::{bail, Context};
use catalog_store::{CatalogError, CatalogStore, Layout, MetaRecord, UserMeta};
use catalog_types::ObjectKey;
use colored::Colorize;
use serde_json::{json, Value};

use crate::cli::*;

pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let store = open_store(cli)?;
    let format = cli.format;
    match &cli.command {
        Command::Init(args) => cmd_init(&store, cli, args),
        Command::Clear(args) => {
            store.clear(&args.token)?;
            done(format, "Catalog marker removed.")
        }
        Command::Cleanup(args) => cmd_cleanup(&store, cli, args),
        Command::Status => cmd_status(&store, cli),
        Command::Put(args) => cmd_put(&store, format, args),
        Command::Get(args) => cmd_get(&store, args),
        Command::Meta(args) => {
            let record = store.read_metadata(&parse_key(&args.key)?)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Command::Ls(args) => cmd_ls(&store, format, args),
        Command::Rollback(args) => {
            store.rollback(&parse_key(&args.key)?)?;
            done(format, &format!("Rolled back {}.", args.key))
        }
        Command::Locks => cmd_locks(&store, format),
        Command::BreakLock(args) => cmd_break_lock(&store, format, args),
    }
}

/// Print a catalog failure as problem details; anything else as a message.
pub fn report_error(err: &anyhow::Error, format: OutputFormat) {
    let Some(catalog_err) = err.downcast_ref::<CatalogError>() else {
        eprintln!("{} {err:#}", "error:".red().bold());
        return;
    };
    let problem = catalog_err.to_problem();
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&problem) {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("{catalog_err}"),
        },
        OutputFormat::Text => {
            eprintln!(
                "{} {} ({})",
                "error:".red().bold(),
                problem.title,
                problem.status.to_string().yellow()
            );
            eprintln!("  {catalog_err}");
            eprintln!("  type: {}", problem.type_uri.dimmed());
        }
    }
}

/// Only `init` may create the root directory; every other command needs an
/// existing one.
fn open_store(cli: &Cli) -> anyhow::Result<CatalogStore> {
    let layout = match &cli.layout {
        Some(file) => Layout::load(file)?,
        None => Layout::default(),
    };
    let store = match cli.command {
        Command::Init(_) => CatalogStore::open_local(&cli.root, layout)?,
        _ => CatalogStore::open_existing_local(&cli.root, layout)?,
    };
    Ok(store)
}

fn parse_key(raw: &str) -> Result<ObjectKey, CatalogError> {
    Ok(ObjectKey::new(raw)?)
}

fn done(format: OutputFormat, message: &str) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", json!({ "ok": true, "message": message })),
        OutputFormat::Text => println!("{} {message}", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_init(store: &CatalogStore, cli: &Cli, args: &TokenArgs) -> anyhow::Result<()> {
    store.init(&args.token)?;
    done(
        cli.format,
        &format!("Initialized catalog in {}", cli.root.display()),
    )
}

fn cmd_cleanup(store: &CatalogStore, cli: &Cli, args: &CleanupArgs) -> anyhow::Result<()> {
    if !args.yes {
        bail!(
            "refusing to delete everything under {} without --yes",
            cli.root.display()
        );
    }
    store.cleanup()?;
    done(cli.format, &format!("Wiped {}", cli.root.display()))
}

fn cmd_status(store: &CatalogStore, cli: &Cli) -> anyhow::Result<()> {
    let initialized = store.is_initialized()?;
    let locked = store.locked_keys()?;
    let entries = match store.list("") {
        Ok(entries) => entries.len(),
        Err(CatalogError::NotFound(_)) => 0,
        Err(e) => return Err(e.into()),
    };
    let layout = store.layout();
    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "root": cli.root.display().to_string(),
                "initialized": initialized,
                "entries": entries,
                "locked": locked,
                "block_size": layout.block_size(),
                "hash_algorithm": layout.hash_algorithm(),
            }))?
        ),
        OutputFormat::Text => {
            let state = if initialized {
                "initialized".green()
            } else {
                "not initialized".red()
            };
            println!("Catalog {} ({})", cli.root.display().to_string().bold(), state);
            println!("  Entries: {}", entries.to_string().bold());
            println!("  Locked: {}", locked.len().to_string().yellow());
            println!(
                "  Defaults: {} blocks, {}",
                layout.block_size(),
                layout.hash_algorithm().to_string().cyan()
            );
        }
    }
    Ok(())
}

fn cmd_put(store: &CatalogStore, format: OutputFormat, args: &PutArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let user = build_user_meta(args)?;
    let source: Box<dyn Read> = if args.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(&args.input).with_context(|| format!("cannot open {}", args.input))?)
    };
    let record = store.write_object_with_block_size(&key, source, user, args.block_size)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => print_record(&key, &record),
    }
    Ok(())
}

fn print_record(key: &ObjectKey, record: &MetaRecord) {
    println!("{} Stored {}", "✓".green().bold(), key.as_str().bold());
    if let Some(size) = record.system.size {
        println!("  Size: {size} bytes");
    }
    if let Some(hash) = &record.system.hash {
        println!("  Hash: {}", hash.cyan());
    }
    println!(
        "  Blocks: {} x {} bytes",
        record.system.chunks.block_hashes.len(),
        record.system.chunks.block_size
    );
}

/// Assemble user metadata: `--meta-json` first, then `--meta` pairs, then
/// the `--hash` and `--size` hints.
pub fn build_user_meta(args: &PutArgs) -> anyhow::Result<UserMeta> {
    let mut user = match &args.meta_json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("invalid --meta-json")? {
            Value::Object(map) => map,
            other => bail!("--meta-json must be a JSON object, got {other}"),
        },
        None => UserMeta::new(),
    };
    for pair in &args.meta {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("--meta expects KEY=VALUE, got {pair:?}");
        };
        if name.is_empty() {
            bail!("--meta key must not be empty");
        }
        user.insert(name.to_string(), Value::String(value.to_string()));
    }
    if let Some(hash) = &args.hash {
        user.insert("hash".into(), Value::String(hash.clone()));
    }
    if let Some(size) = args.size {
        user.insert("size".into(), Value::from(size));
    }
    Ok(user)
}

fn cmd_get(store: &CatalogStore, args: &GetArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    let mut reader = store.open_for_read(&key)?;
    match &args.output {
        Some(path) => {
            let mut file =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            io::copy(&mut reader, &mut file)?;
            file.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_ls(store: &CatalogStore, format: OutputFormat, args: &LsArgs) -> anyhow::Result<()> {
    let entries = store.list(&args.prefix)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            for entry in entries {
                println!("{entry}");
            }
        }
    }
    Ok(())
}

fn cmd_locks(store: &CatalogStore, format: OutputFormat) -> anyhow::Result<()> {
    let mut locks = Vec::new();
    for key in store.locked_keys()? {
        if let Some(status) = store.lock_info(&key)? {
            locks.push(status);
        }
    }
    match format {
        OutputFormat::Json => {
            let rows: Vec<Value> = locks
                .iter()
                .map(|s| json!({ "key": s.key, "owner": s.owner }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text if locks.is_empty() => println!("No locked keys."),
        OutputFormat::Text => {
            for status in &locks {
                match &status.owner {
                    Some(owner) => println!(
                        "{}  owner {} pid {} since {}",
                        status.key.as_str().yellow(),
                        owner.owner,
                        owner.pid,
                        owner.acquired_at.to_rfc3339().dimmed()
                    ),
                    None => println!("{}  owner unknown", status.key.as_str().yellow()),
                }
            }
        }
    }
    Ok(())
}

fn cmd_break_lock(store: &CatalogStore, format: OutputFormat, args: &KeyArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key)?;
    match store.break_lock(&key)? {
        Some(_) => done(format, &format!("Broke lock on {key}.")),
        None => done(format, &format!("{key} is not locked.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn put_args(extra: &[&str]) -> PutArgs {
        let mut argv = vec!["catalog", "put", "k", "-"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Put(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn run(root: &std::path::Path, argv: &[&str]) -> anyhow::Result<()> {
        let mut full = vec!["catalog", "--root"];
        let root = root.to_str().unwrap();
        full.push(root);
        full.extend_from_slice(argv);
        run_command(&Cli::try_parse_from(full).unwrap())
    }

    #[test]
    fn user_meta_layers() {
        let args = put_args(&[
            "--meta-json",
            r#"{"owner": "a", "tags": [1, 2]}"#,
            "--meta",
            "owner=b",
            "--hash",
            "sha256:",
            "--size",
            "3",
        ]);
        let user = build_user_meta(&args).unwrap();
        assert_eq!(user["owner"], "b");
        assert_eq!(user["tags"], json!([1, 2]));
        assert_eq!(user["hash"], "sha256:");
        assert_eq!(user["size"], 3);
    }

    #[test]
    fn user_meta_rejects_bad_input() {
        assert!(build_user_meta(&put_args(&["--meta", "novalue"])).is_err());
        assert!(build_user_meta(&put_args(&["--meta", "=x"])).is_err());
        assert!(build_user_meta(&put_args(&["--meta-json", "[1]"])).is_err());
        assert!(build_user_meta(&put_args(&["--meta-json", "{"])).is_err());
    }

    #[test]
    fn put_get_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("catalog");
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, b"hello catalog").unwrap();

        run(&root, &["init", "tok"]).unwrap();
        run(&root, &["put", "docs/hello.txt", input.to_str().unwrap(), "--block-size", "4"]).unwrap();
        run(&root, &["get", "docs/hello.txt", "-o", output.to_str().unwrap()]).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"hello catalog");

        run(&root, &["rollback", "docs/hello.txt"]).unwrap();
        let err = run(&root, &["get", "docs/hello.txt"]).unwrap_err();
        let catalog_err = err.downcast_ref::<CatalogError>().unwrap();
        assert_eq!(catalog_err.to_problem().status, 404);
    }

    #[test]
    fn integrity_failure_surfaces_as_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("catalog");
        let input = dir.path().join("in.bin");
        std::fs::write(&input, b"abc").unwrap();
        run(&root, &["init", "tok"]).unwrap();
        let err = run(&root, &["put", "k", input.to_str().unwrap(), "--size", "4"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::FileIntegrity(_))
        ));
    }

    #[test]
    fn only_init_creates_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("typo");
        let commands: [&[&str]; 4] = [&["status"], &["ls"], &["locks"], &["cleanup", "--yes"]];
        for argv in commands {
            let err = run(&root, argv).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<CatalogError>(), Some(CatalogError::NotCatalog(_))),
                "{argv:?}: {err:#}"
            );
            assert!(!root.exists(), "{argv:?} created the root");
        }
        run(&root, &["init", "tok"]).unwrap();
        run(&root, &["status"]).unwrap();
    }

    #[test]
    fn cleanup_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("catalog");
        run(&root, &["init", "tok"]).unwrap();
        assert!(run(&root, &["cleanup"]).is_err());
        assert!(root.join("token.json").exists());
        run(&root, &["cleanup", "--yes"]).unwrap();
        assert!(!root.join("token.json").exists());
    }
}
