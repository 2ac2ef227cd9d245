//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::builtin::get_builtin_utility;
use crate::error::{Error, Result};
use crate::jobs::{CommandKind, ExecutionMode, Job, JobId, JobTable, ProcessStatus};
use crate::os::signals::restore_default_dispositions;
use crate::os::{dup2, execvp, fork, getpid, pipe, setpgid, OsResult};
use crate::reaper::{self, WaitOutcome};
use crate::shell::Shell;
use crate::terminal::Terminal;
use gettextrs::gettext;
use nix::unistd::{ForkResult, Pid};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

/// Exit status of a child whose program could not be executed.
const COMMAND_NOT_FOUND_STATUS: i32 = 127;

/// Reported when a foreground job is stopped, as for SIGTSTP.
const STOPPED_STATUS: i32 = 148;

/// What happened to a launched job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran in the foreground until every process finished.
    Completed(i32),
    /// The foreground job was stopped and stays in the table.
    Stopped(JobId),
    /// The job keeps running in the background. Builtin rooted jobs are
    /// never tracked and carry no id.
    Background(Option<JobId>),
}

impl JobOutcome {
    pub fn exit_status(self) -> i32 {
        match self {
            JobOutcome::Completed(status) => status,
            JobOutcome::Stopped(_) => STOPPED_STATUS,
            JobOutcome::Background(_) => 0,
        }
    }
}

/// Where the job being launched lives: in the table for external rooted
/// jobs, or owned by the launcher for builtin rooted ones.
enum LaunchTarget {
    Registered(JobId),
    Detached(Box<Job>),
}

impl LaunchTarget {
    /// `None` if a builtin stage removed the job from the table.
    fn job<'a>(&'a mut self, table: &'a mut JobTable) -> Option<&'a mut Job> {
        match self {
            LaunchTarget::Registered(id) => table.get_mut(*id),
            LaunchTarget::Detached(job) => Some(job),
        }
    }

    fn id(&self) -> Option<JobId> {
        match self {
            LaunchTarget::Registered(id) => Some(*id),
            LaunchTarget::Detached(_) => None,
        }
    }
}

/// Hands the terminal to the job, waits for it and takes the terminal back.
pub fn wait_in_foreground(terminal: Option<Terminal>, job: &mut Job) -> OsResult<WaitOutcome> {
    let Some(pgid) = job.pgid else {
        return reaper::wait_for_job(job);
    };
    if let Some(terminal) = terminal {
        terminal.give_to(pgid);
    }
    let outcome = reaper::wait_for_job(job);
    if let Some(terminal) = terminal {
        terminal.reclaim();
    }
    outcome
}

fn open_input(path: &str) -> Result<OwnedFd> {
    match File::open(path) {
        Ok(file) => Ok(file.into()),
        Err(err) => {
            log::debug!("cannot open {path}: {err}");
            Err(Error::NoSuchFile(path.to_string()))
        }
    }
}

/// Falls back to the inherited stdout when the file cannot be opened.
fn open_output(path: &str) -> Option<OwnedFd> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path);
    match file {
        Ok(file) => Some(file.into()),
        Err(err) => {
            eprintln!("wsh: {path}: {err}");
            None
        }
    }
}

fn flush_standard_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Runs in the forked child. Never returns.
fn exec_child(
    argv: &[CString],
    pgid: Option<Pid>,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
) -> ! {
    restore_default_dispositions();

    let pid = getpid();
    let _ = setpgid(pid, pgid.unwrap_or(pid));

    for (fd, target) in [(input, libc::STDIN_FILENO), (output, libc::STDOUT_FILENO)] {
        if let Some(fd) = fd {
            if let Err(err) = dup2(fd.as_raw_fd(), target) {
                eprintln!("wsh: {err}");
                std::process::exit(1);
            }
        }
    }

    let err = match execvp(argv) {
        Ok(never) => match never {},
        Err(err) => err,
    };
    log::debug!("{err}");
    let program = argv
        .first()
        .map(|program| program.to_string_lossy().into_owned())
        .unwrap_or_default();
    eprintln!("wsh: {program}: {}", gettext("command not found"));
    std::process::exit(COMMAND_NOT_FOUND_STATUS);
}

/// Forks and execs one external stage. The parent's copies of `input` and
/// `output` are closed on return.
fn spawn_external(
    argv: &[String],
    pgid: Option<Pid>,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
) -> Result<Pid> {
    // arguments cannot hold NUL bytes, they come from whitespace split text
    let argv = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, err)))?;

    flush_standard_streams();
    match fork()? {
        ForkResult::Child => exec_child(&argv, pgid, input, output),
        ForkResult::Parent { child } => {
            // both sides set the group, whichever runs first wins the race
            let pgid = pgid.unwrap_or(child);
            if let Err(err) = setpgid(child, pgid) {
                log::debug!("{err} for {child}");
            }
            Ok(child)
        }
    }
}

impl Shell {
    fn run_builtin(&mut self, kind: CommandKind, argv: &[String], output: Option<OwnedFd>) -> i32 {
        let Some(utility) = get_builtin_utility(kind) else {
            return 0;
        };
        let args = argv.get(1..).unwrap_or_default();
        let result = match output {
            Some(fd) => utility.exec(args, self, &mut File::from(fd)),
            None => {
                let mut stdout = io::stdout();
                let result = utility.exec(args, self, &mut stdout);
                let _ = stdout.flush();
                result
            }
        };
        match result {
            Ok(status) => status,
            Err(err) => {
                let name = argv.first().map(String::as_str).unwrap_or_default();
                eprintln!("wsh: {name}: {err}");
                1
            }
        }
    }

    /// Spawns every stage of the job, wiring pipes and redirections.
    fn spawn_stages(&mut self, target: &mut LaunchTarget, mode: ExecutionMode) -> Result<()> {
        let Some(job) = target.job(&mut self.jobs) else {
            return Ok(());
        };
        let stage_count = job.processes.len();
        let mut input = match &job.processes.first().and_then(|p| p.input_path.clone()) {
            Some(path) => Some(open_input(path)?),
            None => None,
        };

        for index in 0..stage_count {
            let Some(job) = target.job(&mut self.jobs) else {
                log::debug!("job removed while it was being launched");
                return Ok(());
            };
            let process = &job.processes[index];
            let kind = process.kind;
            let argv = process.argv.clone();
            let is_last = index + 1 == stage_count;

            let (output, next_input) = if is_last {
                (process.output_path.as_deref().and_then(open_output), None)
            } else {
                let (read_end, write_end) = pipe()?;
                (Some(write_end), Some(read_end))
            };

            if kind.is_builtin() {
                drop(input.take());
                let status = self.run_builtin(kind, &argv, output);
                if let Some(job) = target.job(&mut self.jobs) {
                    job.processes[index].status = ProcessStatus::Done(status);
                }
            } else {
                let new_group = job.pgid.is_none();
                let pid = spawn_external(&argv, job.pgid, input.take(), output)?;
                let pgid = job.assign_pgid(pid);
                job.processes[index].status = ProcessStatus::Running;
                log::debug!("spawned {pid} in group {pgid}: {}", job.processes[index].command);
                match target {
                    LaunchTarget::Registered(id) => {
                        self.jobs.bind_pid(*id, index, pid);
                    }
                    LaunchTarget::Detached(job) => job.processes[index].pid = Some(pid),
                }
                if new_group && mode == ExecutionMode::Foreground {
                    if let Some(terminal) = self.terminal {
                        terminal.give_to(pgid);
                    }
                }
            }
            input = next_input;
        }
        Ok(())
    }

    /// Executes a parsed job and reports how it ended.
    ///
    /// Finished background jobs are collected first. An external rooted
    /// job is registered in the table before anything is spawned, and
    /// removed again once it completes in the foreground.
    pub fn launch_job(&mut self, job: Job) -> Result<JobOutcome> {
        reaper::sweep(&mut self.jobs);

        let mode = job.mode;
        let mut target = if job.is_external_rooted() {
            let id = self.jobs.insert(job)?;
            log::debug!("registered job {id}");
            LaunchTarget::Registered(id)
        } else {
            LaunchTarget::Detached(Box::new(job))
        };

        if let Err(err) = self.spawn_stages(&mut target, mode) {
            self.abandon_launch(&mut target, mode);
            return Err(err);
        }

        if mode == ExecutionMode::Background {
            return Ok(JobOutcome::Background(target.id()));
        }

        let terminal = self.terminal;
        let Some(job) = target.job(&mut self.jobs) else {
            return Ok(JobOutcome::Completed(self.last_status));
        };
        let outcome = wait_in_foreground(terminal, job)?;

        match (outcome, target) {
            (WaitOutcome::Completed(status), LaunchTarget::Registered(id)) => {
                self.jobs.remove(id);
                Ok(JobOutcome::Completed(status))
            }
            (WaitOutcome::Completed(status), LaunchTarget::Detached(_)) => {
                Ok(JobOutcome::Completed(status))
            }
            (WaitOutcome::Stopped, LaunchTarget::Registered(id)) => {
                self.report_stopped(id);
                Ok(JobOutcome::Stopped(id))
            }
            (WaitOutcome::Stopped, LaunchTarget::Detached(job)) => {
                // stopped processes must stay reachable through fg and bg
                let id = self.jobs.insert(*job)?;
                self.report_stopped(id);
                Ok(JobOutcome::Stopped(id))
            }
        }
    }

    /// Leaves the table and the terminal consistent after a failed launch.
    /// A foreground job may already own the terminal, so it is taken back. A
    /// job with nothing spawned is removed, otherwise the stages that never
    /// started are marked finished so the running ones can still be reaped
    /// and removed.
    fn abandon_launch(&mut self, target: &mut LaunchTarget, mode: ExecutionMode) {
        if mode == ExecutionMode::Foreground {
            if let Some(terminal) = self.terminal {
                terminal.reclaim();
            }
        }
        let id = target.id();
        let Some(job) = target.job(&mut self.jobs) else {
            return;
        };
        if job.pgid.is_none() {
            if let Some(id) = id {
                self.jobs.remove(id);
            }
            return;
        }
        for process in &mut job.processes {
            if process.pid.is_none() && !process.status.is_terminal() {
                process.status = ProcessStatus::Done(1);
            }
        }
        if let Some(id) = id {
            if self.jobs.is_completed(id) {
                self.jobs.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Process;
    use crate::os::killpg;
    use crate::parse::{parse_command_line, PathnameExpander};
    use crate::test_utils::serial;
    use nix::sys::signal::Signal;
    use std::time::{Duration, Instant};
    use test_log::test;

    struct Literal;

    impl PathnameExpander for Literal {
        fn expand(&self, _: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn background_job(command: &str) -> Job {
        let argv = command.split_whitespace().map(String::from).collect();
        let process = Process::new(command.to_string(), argv, None, None);
        Job::new(command.to_string(), vec![process], ExecutionMode::Background)
    }

    fn launch(shell: &mut Shell, line: &str) -> JobOutcome {
        let job = parse_command_line(line, &Literal).unwrap();
        shell.launch_job(job).unwrap()
    }

    /// Sweeps until `done` holds, giving up after a few seconds.
    fn sweep_until(shell: &mut Shell, mut done: impl FnMut(&JobTable) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            reaper::sweep(&mut shell.jobs);
            if done(&shell.jobs) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn outcome_statuses() {
        assert_eq!(JobOutcome::Completed(3).exit_status(), 3);
        assert_eq!(JobOutcome::Stopped(1).exit_status(), 148);
        assert_eq!(JobOutcome::Background(Some(2)).exit_status(), 0);
        assert_eq!(JobOutcome::Background(None).exit_status(), 0);
    }

    #[test]
    fn unwritable_output_falls_back_to_stdout() {
        assert!(open_output("/nonexistent/dir/out.txt").is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents").unwrap();
        let fd = open_output(path.to_str().unwrap()).unwrap();
        drop(fd);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn builtin_output_follows_redirection() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.txt");
        let mut shell = Shell::new(Box::new(Literal));
        shell.jobs.insert(background_job("sleep 30")).unwrap();
        shell.jobs.insert(background_job("make all")).unwrap();

        let line = format!("jobs > {}", path.display());
        let outcome = launch(&mut shell, &line);

        assert_eq!(outcome, JobOutcome::Completed(0));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[1] sleep 30\n[2] make all\n"
        );
        // builtin rooted jobs are never registered
        assert_eq!(shell.jobs.len(), 2);
    }

    #[test]
    fn missing_input_is_reported_before_anything_runs() {
        let _serial = serial();
        let mut shell = Shell::new(Box::new(Literal));
        let job = parse_command_line("wc -l < /nonexistent/in.txt", &Literal).unwrap();
        match shell.launch_job(job) {
            Err(Error::NoSuchFile(path)) => assert_eq!(path, "/nonexistent/in.txt"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(shell.jobs.is_empty());
    }

    #[test]
    fn background_builtin_has_no_job_id() {
        let _serial = serial();
        let mut shell = Shell::new(Box::new(Literal));
        assert_eq!(launch(&mut shell, "jobs &"), JobOutcome::Background(None));
    }

    #[test]
    fn pipeline_stages_share_one_process_group() {
        let _serial = serial();
        let mut shell = Shell::new(Box::new(Literal));
        let JobOutcome::Background(Some(id)) =
            launch(&mut shell, "sleep 0.5 | sleep 0.5 | sleep 0.5 &")
        else {
            panic!("pipeline should be tracked in the background");
        };

        let job = shell.jobs.get(id).unwrap();
        let pgid = job.pgid.unwrap();
        assert_eq!(job.processes[0].pid, Some(pgid));
        for process in &job.processes {
            let pid = process.pid.unwrap();
            assert_eq!(nix::unistd::getpgid(Some(pid)).unwrap(), pgid);
            assert_eq!(shell.jobs.job_id_by_pid(pid), Some(id));
        }
        assert_ne!(pgid, nix::unistd::getpgrp());

        assert!(sweep_until(&mut shell, JobTable::is_empty));
    }

    #[test]
    fn stopped_background_job_resumes_with_bg() {
        let _serial = serial();
        let mut shell = Shell::new(Box::new(Literal));
        let JobOutcome::Background(Some(id)) = launch(&mut shell, "sleep 5 &") else {
            panic!("sleep should be tracked in the background");
        };
        let pgid = shell.jobs.pgid(id).unwrap();

        killpg(pgid, Signal::SIGSTOP).unwrap();
        let stopped = |jobs: &JobTable| jobs.get(id).is_some_and(Job::is_stopped);
        assert!(sweep_until(&mut shell, stopped));
        assert_eq!(
            shell.jobs.get(id).unwrap().processes[0].status,
            ProcessStatus::Suspended
        );

        shell.execute_line("bg");
        assert_eq!(shell.last_status, 0);
        assert_eq!(
            shell.jobs.get(id).unwrap().processes[0].status,
            ProcessStatus::Continued
        );

        killpg(pgid, Signal::SIGKILL).unwrap();
        assert!(sweep_until(&mut shell, |jobs| jobs.get(id).is_none()));
    }

    #[test]
    fn stopped_foreground_job_stays_registered_until_fg() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stop.sh");
        std::fs::write(&script, "kill -STOP $$\nexit 7\n").unwrap();

        let mut shell = Shell::new(Box::new(Literal));
        let outcome = launch(&mut shell, &format!("sh {}", script.display()));
        let JobOutcome::Stopped(id) = outcome else {
            panic!("job should have stopped, got {outcome:?}");
        };
        assert_eq!(outcome.exit_status(), 148);
        let job = shell.jobs.get(id).unwrap();
        assert!(job.is_stopped());
        assert_eq!(job.processes[0].status, ProcessStatus::Suspended);

        shell.execute_line(&format!("fg %{id}"));
        assert_eq!(shell.last_status, 7);
        assert!(shell.jobs.is_empty());
    }
}
