//! Runner for the standard netfilter/iproute2 userspace tools

use crate::{PlatformError, Result};
use std::process::{Command, Output};
use tracing::trace;

/// One external program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    program: &'static str,
}

impl Tool {
    /// `conntrack` from conntrack-tools
    pub const CONNTRACK: Tool = Tool::new("conntrack");
    /// `ip` from iproute2
    pub const IP: Tool = Tool::new("ip");
    /// `ipset`
    pub const IPSET: Tool = Tool::new("ipset");

    /// Tool running `program` from `PATH`
    pub const fn new(program: &'static str) -> Self {
        Self { program }
    }

    /// Program name
    pub fn program(&self) -> &'static str {
        self.program
    }

    /// Run with `args` and capture the output, whatever the exit status
    pub fn output(&self, args: &[String]) -> Result<Output> {
        trace!(tool = self.program, args = %args.join(" "), "Running");
        Command::new(self.program)
            .args(args)
            .output()
            .map_err(|source| PlatformError::ToolSpawn {
                tool: self.program,
                source,
            })
    }

    /// Run with `args`, failing on a non-zero exit status
    pub fn run(&self, args: &[String]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(PlatformError::ToolFailed {
                tool: self.program,
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Build an owned argument vector
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($arg.to_string()),*]
    };
}

pub(crate) use args;
