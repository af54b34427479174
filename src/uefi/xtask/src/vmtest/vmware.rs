use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc::channel,
    thread,
    time::SystemTime,
};

use anyhow::{Context, Result, ensure};

use super::{TestVm, UnixCommand, copy_artifacts_to, unix_path};

// The prefix VMware puts in front of the messages received over the `log` RPC.
const GUEST_LOG_PREFIX: &str = "Guest: ";

pub(crate) struct Vmware {
    vmx: PathBuf,
}

impl Vmware {
    pub(crate) fn new(vmx: PathBuf) -> Self {
        Self { vmx }
    }

    // VMware writes the log of a VM next to its .vmx file.
    fn log_file(&self) -> Result<PathBuf> {
        let dir = self.vmx.parent().context("the .vmx path has no parent")?;
        Ok(dir.join("vmware.log"))
    }
}

impl TestVm for Vmware {
    fn deploy(&self, release: bool) -> Result<()> {
        let output = UnixCommand::new("dd")
            .args([
                "if=/dev/zero",
                "of=/tmp/vmware_cd.img",
                "bs=1k",
                "count=2880",
            ])
            .output()?;
        ensure!(output.status.success(), format!("dd failed: {output:#?}"));

        let output = UnixCommand::new("mformat")
            .args(["-i", "/tmp/vmware_cd.img", "-f", "2880", "::"])
            .output()?;
        ensure!(
            output.status.success(),
            format!("mformat failed: {output:#?}")
        );

        copy_artifacts_to("/tmp/vmware_cd.img", release)?;

        let output = UnixCommand::new("mkisofs")
            .args([
                "-eltorito-boot",
                "vmware_cd.img",
                "-no-emul-boot",
                "-o",
                "/tmp/vmware_cd.iso",
                "/tmp/vmware_cd.img",
            ])
            .output()?;
        ensure!(
            output.status.success(),
            format!("mkisofs failed: {output:#?}")
        );

        Ok(())
    }

    fn run(&self) -> Result<()> {
        let vmrun = if cfg!(target_os = "windows") {
            r"C:\Program Files (x86)\VMware\VMware Workstation\vmrun.exe"
        } else if wsl::is_wsl() {
            "/mnt/c/Program Files (x86)/VMware/VMware Workstation/vmrun.exe"
        } else {
            "vmrun"
        };

        let vmx_path = windows_path(&self.vmx)?;

        // Best effort. Fails when the VM is not running.
        let _unused = Command::new(vmrun)
            .args(["stop", vmx_path.as_str(), "nogui"])
            .output()?;

        // If the "forceSetupOnce" entry is not in the .vmx file already, append
        // it to boot into the BIOS menu automatically. VMware deletes this entry
        // after each boot.
        let entry_name = "bios.forceSetupOnce";
        let entry_exists = BufReader::new(fs::File::open(&self.vmx)?)
            .lines()
            .map_while(Result::ok)
            .any(|line| line.starts_with(entry_name));
        if !entry_exists {
            let mut file = fs::OpenOptions::new().append(true).open(&self.vmx)?;
            writeln!(file, "{entry_name} = \"TRUE\"")?;
        }

        println!("🕒 Starting the VMware VM");
        let product_type = if cfg!(target_os = "macos") {
            "fusion"
        } else {
            "ws"
        };
        let output = Command::new(vmrun)
            .args(["-T", product_type, "start", vmx_path.as_str()])
            .spawn()?
            .wait()?;
        ensure!(output.success(), format!("vmrun failed: {output:#?}"));

        // VMware recreates the log on each start, so only the new lines are
        // followed.
        let log_file = unix_path(&self.log_file()?)?;
        let tail = UnixCommand::new("tail")
            .args(["-F", "-n", "0", log_file.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = tail.stdout.context("tail has no stdout")?;
        let _unused = thread::spawn(move || {
            let now = SystemTime::now();
            BufReader::new(stdout)
                .lines()
                .map_while(Result::ok)
                .filter_map(|line| guest_message(&line).map(str::to_owned))
                .for_each(|message| {
                    println!(
                        "{:>4}: {message}\r",
                        now.elapsed().unwrap_or_default().as_secs()
                    );
                });
        });

        println!("🕒 Please select 'EFI Internal Shell (Unsupported option)' on VMware...");
        let (tx, rx) = channel();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })?;
        rx.recv()?;

        // Best effort.
        println!("🕒 Shutting down the VM\r");
        let _unused = Command::new(vmrun)
            .args(["stop", vmx_path.as_str(), "nogui"])
            .output()?;

        Ok(())
    }
}

// Extracts the message the guest sent from a line of vmware.log.
fn guest_message(line: &str) -> Option<&str> {
    line.find(GUEST_LOG_PREFIX)
        .map(|start| line[start + GUEST_LOG_PREFIX.len()..].trim_end())
}

// vmrun on the Windows host needs a Windows path even when run from WSL.
fn windows_path(path: &Path) -> Result<String> {
    let path_str = path.to_str().context("non UTF-8 path")?;
    if wsl::is_wsl() {
        let output = UnixCommand::new("wslpath")
            .args(["-a", "-w", path_str])
            .output()?;
        ensure!(output.status.success(), "wslpath failed: {output:#?}");
        Ok(std::str::from_utf8(&output.stdout)?.trim().to_string())
    } else {
        Ok(path_str.to_string())
    }
}
