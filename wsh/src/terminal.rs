//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::os::signals::IgnoreGuard;
use crate::os::{getpgrp, getpid, setpgid, OsError, OsResult};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::io;
use std::os::fd::AsFd;

/// The controlling terminal of an interactive interpreter. Exactly one
/// process group owns it at a time: the interpreter's own, or the group of
/// the job running in the foreground.
#[derive(Clone, Copy, Debug)]
pub struct Terminal {
    shell_pgid: Pid,
}

impl Terminal {
    /// Puts the interpreter in its own process group and makes that group
    /// the terminal's foreground group.
    pub fn claim() -> OsResult<Self> {
        let pid = getpid();
        if getpgrp() != pid {
            setpgid(pid, pid)?;
        }
        let terminal = Self { shell_pgid: pid };
        terminal.set_foreground(pid)?;
        Ok(terminal)
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    fn set_foreground(&self, pgid: Pid) -> OsResult<()> {
        nix::unistd::tcsetpgrp(io::stdin().as_fd(), pgid)
            .map_err(|errno| OsError::new("tcsetpgrp", errno))
    }

    /// Hands the terminal to the process group of a foreground job.
    pub fn give_to(&self, pgid: Pid) {
        log::debug!("terminal handed to process group {pgid}");
        if let Err(err) = self.set_foreground(pgid) {
            log::debug!("{err}");
        }
    }

    /// Takes the terminal back once the foreground job finished or stopped.
    /// The interpreter is a background process until this completes, so
    /// SIGTTOU is ignored meanwhile to keep it from being stopped.
    pub fn reclaim(&self) {
        let _guard = IgnoreGuard::new(Signal::SIGTTOU);
        if let Err(err) = self.set_foreground(self.shell_pgid) {
            log::debug!("{err}");
        }
        log::debug!("terminal reclaimed");
    }
}
