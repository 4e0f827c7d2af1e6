use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

/// Generate Wayland protocol binding modules from XML schemas.
#[derive(Parser)]
#[command(name = "wl-scan", version)]
struct Cli {
    /// Directory to write generated protocol modules to
    #[arg(short, long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Input XML files, or directories to scan recursively for *.xml
    #[arg(value_name = "XML", required = true)]
    inputs: Vec<PathBuf>,
}

/// Explicit file arguments are taken as-is; directories are walked
/// recursively for `.xml` files. Entries are sorted so the compilation
/// order never depends on filesystem listing order.
fn collect_inputs(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .with_context(|| format!("read directory {}", path.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .with_context(|| format!("read directory {}", path.display()))?;
        entries.sort();
        for entry in entries {
            if entry.is_dir() || entry.extension().is_some_and(|ext| ext == "xml") {
                collect_inputs(&entry, files)?;
            }
        }
    } else {
        files.push(path.to_path_buf());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut files = Vec::new();
    for input in &cli.inputs {
        collect_inputs(input, &mut files)?;
    }
    if files.is_empty() {
        bail!("no input XML files found");
    }

    // Parse everything before emitting anything: a protocol may reference
    // interfaces that a later input defines.
    let mut protocols = Vec::with_capacity(files.len());
    for path in &files {
        let src = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let protocol =
            wl_protogen::parse(&src).with_context(|| format!("parse {}", path.display()))?;
        log::info!("parsed {} ({})", path.display(), protocol.name);
        protocols.push(protocol);
    }
    log::info!("parsed {} input xml file(s)", protocols.len());

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("create {}", cli.output_dir.display()))?;
    wl_protogen::generate(protocols, &cli.output_dir)
        .context("generate protocol modules")?;
    Ok(())
}
