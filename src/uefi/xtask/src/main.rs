//! A build and test assist program. To show the usage, run
//!
//! ```shell
//! cargo xtask
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use cargo::{Action, Package, Profile, cargo_run};
use clap::{Parser, Subcommand};
use vmtest::vmware::Vmware;

mod cargo;
mod vmtest;

#[derive(Parser)]
#[command(author, about, long_about = None)]
struct Cli {
    /// Build the shim with the release profile
    #[arg(short, long)]
    release: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the UEFI shim
    Build,
    /// Run clippy for the entire workspace
    Clippy,
    /// Run the unit and integration tests of the shim core
    Test,
    /// Start a VMware VM and follow the messages the shim sends to the host
    Vmware {
        /// The .vmx file of the VM to start
        #[arg(long)]
        vmx: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Build => build(cli.release),
        Commands::Clippy => clippy(),
        Commands::Test => cargo_run(Action::Test, Package::Core, Profile::Debug),
        Commands::Vmware { vmx } => vmtest::run(&Vmware::new(vmx), cli.release),
    }
}

fn build(release: bool) -> Result<()> {
    let profile = if release {
        Profile::Release
    } else {
        Profile::Debug
    };
    cargo_run(Action::Build, Package::Shim, profile)
}

fn clippy() -> Result<()> {
    cargo_run(Action::Clippy, Package::Core, Profile::Debug)?;
    cargo_run(Action::Clippy, Package::Shim, Profile::Debug)?;
    cargo_run(Action::Clippy, Package::Xtask, Profile::Debug)
}

fn output_dir(release: bool) -> Result<PathBuf> {
    let mut out_dir = workspace_root_dir()?;
    out_dir.extend(&["target", "x86_64-unknown-uefi"]);
    out_dir.extend(if release { &["release"] } else { &["debug"] });
    fs::canonicalize(&out_dir).with_context(|| format!("{} not found", out_dir.display()))
}

// The UEFI workspace, ie, the parent of the xtask directory.
fn workspace_root_dir() -> Result<PathBuf> {
    nth_ancestor(1)
}

// The repository root that holds the shim core workspace.
fn repository_root_dir() -> Result<PathBuf> {
    nth_ancestor(3)
}

fn nth_ancestor(n: usize) -> Result<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(n)
        .context("xtask is not located in the repository")?;
    Ok(fs::canonicalize(dir)?)
}
