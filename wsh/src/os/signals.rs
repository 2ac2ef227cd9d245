//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::os::{OsError, OsResult};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Signals the interpreter ignores while it owns the terminal. Only the
/// foreground job should react to them.
pub const SHELL_IGNORED_SIGNALS: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
];

/// Dispositions a spawned child resets before `exec`.
pub const CHILD_DEFAULT_SIGNALS: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

/// Installs `handler` and returns the disposition that was in place before.
///
/// # Safety
/// `handler` must be `SigDfl` or `SigIgn`; the interpreter never installs
/// a function handler.
unsafe fn handle_signal(signal: Signal, handler: SigHandler) -> OsResult<SigHandler> {
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(signal, &action) }
        .map(|previous| previous.handler())
        .map_err(|errno| OsError::new("sigaction", errno))
}

pub fn handle_signal_ignore(signal: Signal) -> OsResult<SigHandler> {
    unsafe { handle_signal(signal, SigHandler::SigIgn) }
}

pub fn handle_signal_default(signal: Signal) -> OsResult<SigHandler> {
    unsafe { handle_signal(signal, SigHandler::SigDfl) }
}

pub fn ignore_job_control_signals() -> OsResult<()> {
    for &signal in SHELL_IGNORED_SIGNALS {
        handle_signal_ignore(signal)?;
    }
    Ok(())
}

/// Called in a freshly forked child. Errors are ignored: the child is about
/// to `exec` and has nowhere to report them.
pub fn restore_default_dispositions() {
    for &signal in CHILD_DEFAULT_SIGNALS {
        let _ = handle_signal_default(signal);
    }
}

/// Keeps `signal` ignored for the lifetime of the guard, then restores the
/// previous disposition.
pub struct IgnoreGuard {
    signal: Signal,
    previous: Option<SigHandler>,
}

impl IgnoreGuard {
    pub fn new(signal: Signal) -> Self {
        let previous = match handle_signal_ignore(signal) {
            Ok(previous) => Some(previous),
            Err(err) => {
                log::debug!("could not ignore {signal}: {err}");
                None
            }
        };
        Self { signal, previous }
    }
}

impl Drop for IgnoreGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            // the previous handler was obtained from sigaction, reinstalling it is safe
            if let Err(err) = unsafe { handle_signal(self.signal, previous) } {
                log::debug!("could not restore {}: {err}", self.signal);
            }
        }
    }
}
