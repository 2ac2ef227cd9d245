//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Collection of child state changes.
//!
//! Nothing is reaped asynchronously. Children are collected before a job is
//! launched, when the user enters a blank line, and while a foreground job
//! is waited for.

use crate::jobs::{Job, JobTable, ProcessStatus};
use crate::os::{waitpid, OsError, OsResult};
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// How a foreground wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// No process of the job is left running.
    Completed(i32),
    /// At least one process was stopped by a signal.
    Stopped,
}

/// Translates a wait event into the new status of the process it names.
pub fn process_transition(status: WaitStatus) -> Option<(Pid, ProcessStatus)> {
    match status {
        WaitStatus::Exited(pid, code) => Some((pid, ProcessStatus::Done(code))),
        WaitStatus::Signaled(pid, signal, _) => Some((pid, ProcessStatus::Terminated(signal))),
        WaitStatus::Stopped(pid, _) => Some((pid, ProcessStatus::Suspended)),
        WaitStatus::Continued(pid) => Some((pid, ProcessStatus::Continued)),
        _ => None,
    }
}

/// Collects every child whose state changed without blocking. Jobs whose
/// processes have all finished are removed from the table.
///
/// Returns the number of events collected.
pub fn sweep(table: &mut JobTable) -> usize {
    let options = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    let mut events = 0;
    loop {
        let status = match waitpid(Pid::from_raw(-1), options) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => status,
            Err(OsError {
                errno: Errno::EINTR,
                ..
            }) => continue,
            Err(OsError {
                errno: Errno::ECHILD,
                ..
            }) => break,
            Err(err) => {
                log::debug!("sweep stopped early: {err}");
                break;
            }
        };
        let Some((pid, new_status)) = process_transition(status) else {
            continue;
        };
        events += 1;
        log::debug!("reaped {pid}: {new_status}");
        match table.set_process_status(pid, new_status) {
            Some(id) if table.is_completed(id) => {
                log::debug!("job {id} finished");
                table.remove(id);
            }
            Some(_) => {}
            None => log::debug!("{pid} does not belong to a tracked job"),
        }
    }
    events
}

/// Blocks until no process of `job` is pending any more, that is until each
/// one has exited, been killed or been stopped.
///
/// Progress is tracked per process, so children that were already collected
/// by a sweep are never waited for twice.
pub fn wait_for_job(job: &mut Job) -> OsResult<WaitOutcome> {
    if let Some(pgid) = job.pgid {
        let group = Pid::from_raw(-pgid.as_raw());
        while job.has_pending() {
            let status = match waitpid(group, WaitPidFlag::WUNTRACED) {
                Ok(status) => status,
                Err(OsError {
                    errno: Errno::EINTR,
                    ..
                }) => continue,
                Err(OsError {
                    errno: Errno::ECHILD,
                    ..
                }) => {
                    log::debug!("process group {pgid} has no children left");
                    break;
                }
                Err(err) => return Err(err),
            };
            if let Some((pid, new_status)) = process_transition(status) {
                log::debug!("reaped {pid}: {new_status}");
                if !job.set_status_by_pid(pid, new_status) {
                    log::debug!("{pid} is not part of job '{}'", job.command);
                }
            }
        }
    }

    if job.is_stopped() {
        Ok(WaitOutcome::Stopped)
    } else {
        Ok(WaitOutcome::Completed(job.exit_status()))
    }
}
