use std::{path::Path, process::Command};

use anyhow::{Context, Result, ensure};

use crate::{build, cargo::Package, output_dir, workspace_root_dir};

pub(crate) mod vmware;

pub(crate) trait TestVm {
    fn deploy(&self, release: bool) -> Result<()>;
    fn run(&self) -> Result<()>;
}

pub(crate) fn run<T: TestVm>(vm: &T, release: bool) -> Result<()> {
    build(release)?;
    vm.deploy(release)?;
    vm.run()
}

fn copy_artifacts_to(image: &str, release: bool) -> Result<()> {
    let files = [
        unix_path(&output_dir(release)?)? + "/" + Package::Shim.name() + ".efi",
        unix_path(&workspace_root_dir()?)? + "/tests/startup.nsh",
    ];
    for file in &files {
        let output = UnixCommand::new("mcopy")
            .args(["-o", "-i", image, file, "::/"])
            .output()?;
        ensure!(
            output.status.success(),
            format!("mcopy failed: {output:#?}")
        );
    }
    Ok(())
}

fn unix_path(path: &Path) -> Result<String> {
    let path_str = path.to_str().context("non UTF-8 path")?;
    if cfg!(target_os = "windows") {
        let output = UnixCommand::new("wslpath")
            .args(["-a", &path_str.replace('\\', "\\\\")])
            .output()?;
        ensure!(output.status.success(), "wslpath failed: {output:#?}");
        Ok(std::str::from_utf8(&output.stdout)?.trim().to_string())
    } else {
        Ok(path_str.to_string())
    }
}

// Defines [`UnixCommand`] that wraps [`Command`] with `wsl` command on Windows.
// On non-Windows platforms, it is an alias of [`Command`].
cfg_if::cfg_if! {
    if #[cfg(windows)] {
        struct UnixCommand {
            wsl: Command,
            program: String,
        }

        impl UnixCommand {
            fn new(program: &str) -> Self {
                Self {
                    wsl: Command::new("wsl"),
                    program: program.to_string(),
                }
            }

            pub(crate) fn args<I, S>(&mut self, args: I) -> &mut Command
            where
                I: IntoIterator<Item = S>,
                S: AsRef<std::ffi::OsStr>,
            {
                self.wsl.arg(self.program.clone()).args(args)
            }
        }
    } else {
        type UnixCommand = Command;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_unix_path() {
        if cfg!(target_os = "windows") {
            assert_eq!(unix_path(Path::new(r"C:\")).unwrap(), "/mnt/c/");
        } else {
            assert_eq!(unix_path(Path::new(r"C:\")).unwrap(), r"C:\");
            assert_eq!(unix_path(Path::new("/tmp")).unwrap(), "/tmp");
        }
    }
}
