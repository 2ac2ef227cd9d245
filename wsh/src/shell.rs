//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::jobs::{JobId, JobTable};
use crate::launcher::JobOutcome;
use crate::os::signals::ignore_job_control_signals;
use crate::os::OsResult;
use crate::parse::{parse_command_line, PathnameExpander, SystemGlob};
use crate::reaper;
use crate::terminal::Terminal;
use gettextrs::gettext;
use std::io::{self, BufRead, Write};

pub const PROMPT: &str = "wsh> ";

pub struct Shell {
    pub jobs: JobTable,
    /// Only set when standard input is a terminal and the interpreter owns
    /// it.
    pub terminal: Option<Terminal>,
    pub expander: Box<dyn PathnameExpander>,
    pub last_status: i32,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(Box::new(SystemGlob))
    }
}

impl Shell {
    pub fn new(expander: Box<dyn PathnameExpander>) -> Self {
        Self {
            jobs: JobTable::default(),
            terminal: None,
            expander,
            last_status: 0,
        }
    }

    /// Sets up job control: the interpreter ignores the keyboard signals,
    /// moves into its own process group and takes the terminal.
    pub fn initialize_job_control() -> OsResult<Self> {
        ignore_job_control_signals()?;
        let terminal = Terminal::claim()?;
        log::debug!("job control enabled, process group {}", terminal.shell_pgid());
        Ok(Self {
            terminal: Some(terminal),
            ..Self::default()
        })
    }

    pub fn has_job_control(&self) -> bool {
        self.terminal.is_some()
    }

    /// Parses and runs one command line. A blank line only collects
    /// finished background jobs.
    pub fn execute_line(&mut self, line: &str) {
        let Some(job) = parse_command_line(line, self.expander.as_ref()) else {
            reaper::sweep(&mut self.jobs);
            return;
        };
        match self.launch_job(job) {
            Ok(outcome) => {
                if let JobOutcome::Background(Some(id)) = outcome {
                    log::debug!("job {id} running in the background");
                }
                self.last_status = outcome.exit_status();
            }
            Err(err) => {
                eprintln!("wsh: {err}");
                self.last_status = 1;
            }
        }
    }

    /// Runs every line of `reader` until end of input. `prompt` is written
    /// to stderr before each line is read.
    pub fn execute_lines<R: BufRead>(&mut self, mut reader: R, prompt: Option<&str>) -> i32 {
        let mut line = String::new();
        loop {
            if let Some(prompt) = prompt {
                eprint!("{prompt}");
                let _ = io::stderr().flush();
            }
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => self.execute_line(&line),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    eprintln!("wsh: {err}");
                    return 1;
                }
            }
        }
        if prompt.is_some() {
            eprintln!();
        }
        0
    }

    /// Prints the notice for a job that was stopped while in the foreground
    /// and returns the status reported for it.
    pub fn report_stopped(&self, id: JobId) -> i32 {
        if let Some(job) = self.jobs.get(id) {
            eprintln!("[{id}] {}    {}", gettext("Stopped"), job.command);
        }
        JobOutcome::Stopped(id).exit_status()
    }

    pub fn exit(&self, code: i32) -> ! {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ExecutionMode, Job, Process};
    use crate::test_utils::serial;
    use test_log::test;

    struct Literal;

    impl PathnameExpander for Literal {
        fn expand(&self, _: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn shell() -> Shell {
        Shell::new(Box::new(Literal))
    }

    #[test]
    fn blank_lines_run_nothing() {
        let _serial = serial();
        let mut shell = shell();
        assert!(!shell.has_job_control());
        let status = shell.execute_lines("\n   \n\t\n".as_bytes(), None);
        assert_eq!(status, 0);
        assert!(shell.jobs.is_empty());
        assert_eq!(shell.last_status, 0);
    }

    #[test]
    fn builtin_failure_sets_status() {
        let _serial = serial();
        let mut shell = shell();
        shell.execute_line("fg");
        assert_eq!(shell.last_status, 1);
        shell.execute_line("bg %7");
        assert_eq!(shell.last_status, 1);
        assert!(shell.jobs.is_empty());
    }

    #[test]
    fn stopped_report_uses_job_status() {
        let mut shell = shell();
        let process = Process::new("vi".into(), vec!["vi".into()], None, None);
        let id = shell
            .jobs
            .insert(Job::new("vi".into(), vec![process], ExecutionMode::Foreground))
            .unwrap();
        assert_eq!(shell.report_stopped(id), 148);
    }

    #[test]
    fn missing_input_file_leaves_no_job_behind() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let mut shell = shell();
        shell.execute_line(&format!("cat < {}", missing.display()));
        assert_eq!(shell.last_status, 1);
        assert!(shell.jobs.is_empty());
    }
}
