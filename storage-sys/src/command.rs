// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

use crate::{Result, SysError};

pub(crate) fn run_command(command: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(command).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SysError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub(crate) fn tools_available(tools: &[&str]) -> bool {
    tools.iter().all(|tool| which::which(tool).is_ok())
}
