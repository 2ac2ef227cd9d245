//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::os::is_attached_to_terminal;
use crate::shell::{Shell, PROMPT};
use gettextrs::gettext;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

pub mod builtin;
pub mod error;
pub mod jobs;
pub mod launcher;
pub mod os;
pub mod parse;
pub mod reaper;
pub mod shell;
pub mod terminal;
#[cfg(test)]
mod test_utils;

/// wsh - command interpreter with job control
#[derive(Debug, clap::Parser, Clone, Default)]
#[command(version, about)]
pub struct Args {
    /// Read commands from this file instead of standard input.
    pub script: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Standard input is a terminal: job control is enabled and a prompt
    /// is shown before every line.
    Interactive,
    ReadCommandsFromStdin,
    ReadFromFile(PathBuf),
}

impl ExecutionMode {
    pub fn detect(args: &Args, stdin_is_terminal: bool) -> Self {
        match &args.script {
            Some(script) => ExecutionMode::ReadFromFile(script.clone()),
            None if stdin_is_terminal => ExecutionMode::Interactive,
            None => ExecutionMode::ReadCommandsFromStdin,
        }
    }
}

/// A shell owning the terminal, or a plain one if job control cannot be
/// set up.
fn job_control_shell() -> Shell {
    match Shell::initialize_job_control() {
        Ok(shell) => shell,
        Err(err) => {
            log::debug!("job control unavailable: {err}");
            eprintln!("wsh: {}", gettext("cannot enable job control"));
            Shell::default()
        }
    }
}

/// Runs the interpreter to completion and returns its exit status.
///
/// Job control is enabled whenever standard input is a terminal, so that
/// foreground jobs of a script get the terminal the same way interactive
/// ones do.
pub fn run(args: Args) -> i32 {
    let stdin_is_terminal = is_attached_to_terminal();
    match ExecutionMode::detect(&args, stdin_is_terminal) {
        ExecutionMode::Interactive => {
            job_control_shell().execute_lines(io::stdin().lock(), Some(PROMPT))
        }
        ExecutionMode::ReadCommandsFromStdin => {
            Shell::default().execute_lines(io::stdin().lock(), None)
        }
        ExecutionMode::ReadFromFile(path) => match File::open(&path) {
            Ok(file) => {
                let mut shell = if stdin_is_terminal {
                    job_control_shell()
                } else {
                    Shell::default()
                };
                shell.execute_lines(BufReader::new(file), None)
            }
            Err(err) => {
                eprintln!("wsh: {}: {err}", path.display());
                1
            }
        },
    }
}
