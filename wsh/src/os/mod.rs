//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::{ForkResult, Pid};
use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::fmt::{Display, Formatter};
use std::io::IsTerminal;
use std::os::fd::{OwnedFd, RawFd};

pub mod signals;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OsError {
    pub call: &'static str,
    pub errno: Errno,
}

impl OsError {
    pub fn new(call: &'static str, errno: Errno) -> Self {
        Self { call, errno }
    }
}

impl Display for OsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "internal call to {} failed ({})", self.call, self.errno)
    }
}

impl std::error::Error for OsError {}

pub type OsResult<T> = Result<T, OsError>;

pub fn fork() -> OsResult<ForkResult> {
    // fork in general is not safe for multithreaded programs, but the
    // interpreter never spawns threads, so this is safe
    unsafe { nix::unistd::fork().map_err(|errno| OsError::new("fork", errno)) }
}

/// Both ends are close-on-exec; `dup2` clears the flag on the copies a
/// child installs as its standard streams.
pub fn pipe() -> OsResult<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|errno| OsError::new("pipe", errno))
}

pub fn dup2(old_fd: RawFd, new_fd: RawFd) -> OsResult<RawFd> {
    nix::unistd::dup2(old_fd, new_fd).map_err(|errno| OsError::new("dup2", errno))
}

pub fn setpgid(pid: Pid, pgid: Pid) -> OsResult<()> {
    nix::unistd::setpgid(pid, pgid).map_err(|errno| OsError::new("setpgid", errno))
}

pub fn getpid() -> Pid {
    nix::unistd::getpid()
}

pub fn getpgrp() -> Pid {
    nix::unistd::getpgrp()
}

pub fn waitpid(pid: Pid, options: WaitPidFlag) -> OsResult<WaitStatus> {
    nix::sys::wait::waitpid(pid, Some(options)).map_err(|errno| OsError::new("waitpid", errno))
}

/// Sends `signal` to every process in the group `pgid`.
pub fn killpg(pgid: Pid, signal: Signal) -> OsResult<()> {
    nix::sys::signal::killpg(pgid, signal).map_err(|errno| OsError::new("killpg", errno))
}

/// Replaces the current process image, searching `PATH` for `argv[0]`.
/// Only returns on failure.
pub fn execvp(argv: &[CString]) -> OsResult<Infallible> {
    let program: &CStr = match argv.first() {
        Some(program) => program.as_c_str(),
        None => return Err(OsError::new("execvp", Errno::ENOENT)),
    };
    nix::unistd::execvp(program, argv).map_err(|errno| OsError::new("execvp", errno))
}

pub fn is_attached_to_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// Exit status reported for a process killed by `signal`.
pub fn signal_to_exit_status(signal: Signal) -> i32 {
    128 + signal as i32
}
