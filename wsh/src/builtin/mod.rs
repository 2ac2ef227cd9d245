//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::builtin::bg::Bg;
use crate::builtin::cd::Cd;
use crate::builtin::exit::Exit;
use crate::builtin::fg::Fg;
use crate::builtin::jobs::Jobs;
use crate::jobs::{CommandKind, JobId, JobTable};
use crate::os::OsError;
use crate::shell::Shell;
use std::io;

mod bg;
mod cd;
mod exit;
mod fg;
mod jobs;

#[derive(thiserror::Error, Debug)]
pub enum BuiltinError {
    #[error("{0}")]
    CustomError(String),
    #[error("{0}: no such job")]
    NoSuchJob(String),
    #[error("{0}")]
    OsError(#[from] OsError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl From<String> for BuiltinError {
    fn from(value: String) -> Self {
        Self::CustomError(value)
    }
}

impl From<&str> for BuiltinError {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

pub type BuiltinResult = Result<i32, BuiltinError>;

pub trait BuiltinUtility {
    /// `args` excludes the utility name. Output goes to `out`, which is the
    /// stage's pipe, redirection file or the interpreter's stdout.
    fn exec(&self, args: &[String], shell: &mut Shell, out: &mut dyn io::Write) -> BuiltinResult;
}

pub fn get_builtin_utility(kind: CommandKind) -> Option<&'static dyn BuiltinUtility> {
    match kind {
        CommandKind::Exit => Some(&Exit),
        CommandKind::Cd => Some(&Cd),
        CommandKind::Jobs => Some(&Jobs),
        CommandKind::Fg => Some(&Fg),
        CommandKind::Bg => Some(&Bg),
        CommandKind::External => None,
    }
}

/// Parses `%n` or `n`.
pub fn parse_job_id(text: &str) -> Option<JobId> {
    let digits = text.strip_prefix('%').unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Resolves the job a `fg`/`bg` invocation refers to: the explicit operand,
/// or the most recently inserted job. The job must exist.
pub(crate) fn resolve_job(table: &JobTable, args: &[String]) -> Result<JobId, BuiltinError> {
    match args {
        [] => table
            .latest_id()
            .ok_or_else(|| BuiltinError::NoSuchJob("current".to_string())),
        [arg] => parse_job_id(arg)
            .filter(|&id| table.get(id).is_some())
            .ok_or_else(|| BuiltinError::NoSuchJob(arg.clone())),
        _ => Err("too many arguments".into()),
    }
}
