use std::{env, path::PathBuf, process::Command};

use anyhow::{Result, ensure};

use crate::{repository_root_dir, workspace_root_dir};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Action {
    Build,
    Clippy,
    Test,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Package {
    Core,
    Shim,
    Xtask,
}

impl Package {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Package::Core => "escape_shim",
            Package::Shim => "uefi_shim",
            Package::Xtask => "xtask",
        }
    }

    // The shim core lives in its own workspace at the repository root.
    fn workspace_dir(self) -> Result<PathBuf> {
        match self {
            Package::Core => repository_root_dir(),
            Package::Shim | Package::Xtask => workspace_root_dir(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Profile {
    Debug,
    Release,
}

pub(crate) fn cargo_run(action: Action, package: Package, profile: Profile) -> Result<()> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let mut command = Command::new(cargo);
    let _ = command.arg(match action {
        Action::Build => "build",
        Action::Clippy => "clippy",
        Action::Test => "test",
    });
    if package == Package::Shim {
        let _ = command.args(["--target", "x86_64-unknown-uefi"]);
    }
    let _ = command.args(["--package", package.name()]);
    if profile == Profile::Release {
        let _ = command.arg("--release");
    }
    let ok = command
        .current_dir(package.workspace_dir()?)
        .status()?
        .success();
    ensure!(ok, "cargo {action:?} failed for {}", package.name());
    Ok(())
}
