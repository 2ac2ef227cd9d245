//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::builtin::{resolve_job, BuiltinError, BuiltinResult, BuiltinUtility};
use crate::jobs::ProcessStatus;
use crate::os::killpg;
use crate::shell::Shell;
use nix::sys::signal::Signal;
use std::io::Write;

pub struct Bg;

impl BuiltinUtility for Bg {
    fn exec(&self, args: &[String], shell: &mut Shell, out: &mut dyn Write) -> BuiltinResult {
        let id = resolve_job(&shell.jobs, args)?;
        let Some(job) = shell.jobs.get_mut(id) else {
            return Err(BuiltinError::NoSuchJob(id.to_string()));
        };
        let Some(pgid) = job.pgid else {
            return Err(BuiltinError::NoSuchJob(id.to_string()));
        };

        killpg(pgid, Signal::SIGCONT)?;
        job.set_status(ProcessStatus::Continued);
        writeln!(out, "[{id}] {}", job.command)?;
        Ok(0)
    }
}
