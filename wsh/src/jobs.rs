//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::error::{Error, Result};
use crate::os::signal_to_exit_status;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::io;

pub const MAX_JOBS: usize = 256;

/// Slot index in the [`JobTable`], always in `1..=MAX_JOBS`.
pub type JobId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    External,
    Exit,
    Cd,
    Jobs,
    Fg,
    Bg,
}

impl CommandKind {
    /// A stage without a program name is classified as external; it fails
    /// at exec time like any unknown command.
    pub fn classify(program: Option<&str>) -> Self {
        match program {
            Some("exit") => CommandKind::Exit,
            Some("cd") => CommandKind::Cd,
            Some("jobs") => CommandKind::Jobs,
            Some("fg") => CommandKind::Fg,
            Some("bg") => CommandKind::Bg,
            _ => CommandKind::External,
        }
    }

    pub fn is_builtin(self) -> bool {
        self != CommandKind::External
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Done(i32),
    Suspended,
    Continued,
    Terminated(Signal),
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Done(_) | ProcessStatus::Terminated(_))
    }

    /// The process is expected to produce another wait event before its
    /// job can be considered settled.
    pub fn is_pending(self) -> bool {
        matches!(self, ProcessStatus::Running | ProcessStatus::Continued)
    }
}

impl Display for ProcessStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("Running"),
            ProcessStatus::Done(0) => f.write_str("Done"),
            ProcessStatus::Done(code) => write!(f, "Done({code})"),
            ProcessStatus::Suspended => f.write_str("Stopped"),
            ProcessStatus::Continued => f.write_str("Continued"),
            ProcessStatus::Terminated(signal) => write!(f, "Terminated({signal})"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Foreground,
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessFilter {
    All,
    /// Processes that exited or were killed by a signal.
    Done,
    Remaining,
}

/// One pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Process {
    pub command: String,
    pub argv: Vec<String>,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub pid: Option<Pid>,
    pub kind: CommandKind,
    pub status: ProcessStatus,
}

impl Process {
    pub fn new(
        command: String,
        argv: Vec<String>,
        input_path: Option<String>,
        output_path: Option<String>,
    ) -> Self {
        let kind = CommandKind::classify(argv.first().map(String::as_str));
        Self {
            command,
            argv,
            input_path,
            output_path,
            pid: None,
            kind,
            status: ProcessStatus::Running,
        }
    }

    pub fn argc(&self) -> usize {
        self.argv.len()
    }

    pub fn exit_status(&self) -> i32 {
        match self.status {
            ProcessStatus::Done(code) => code,
            ProcessStatus::Terminated(signal) => signal_to_exit_status(signal),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Job {
    pub id: Option<JobId>,
    pub pgid: Option<Pid>,
    pub processes: Vec<Process>,
    pub command: String,
    pub mode: ExecutionMode,
}

impl Job {
    pub fn new(command: String, processes: Vec<Process>, mode: ExecutionMode) -> Self {
        Self {
            id: None,
            pgid: None,
            processes,
            command,
            mode,
        }
    }

    pub fn is_external_rooted(&self) -> bool {
        self.processes
            .first()
            .is_some_and(|process| process.kind == CommandKind::External)
    }

    /// Returns the job's process group, creating it from `pid` if this is the
    /// first process spawned in the job.
    pub fn assign_pgid(&mut self, pid: Pid) -> Pid {
        *self.pgid.get_or_insert(pid)
    }

    pub fn count(&self, filter: ProcessFilter) -> usize {
        self.processes
            .iter()
            .filter(|process| match filter {
                ProcessFilter::All => true,
                ProcessFilter::Done => process.status.is_terminal(),
                ProcessFilter::Remaining => !process.status.is_terminal(),
            })
            .count()
    }

    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.status.is_terminal())
    }

    pub fn is_stopped(&self) -> bool {
        self.processes
            .iter()
            .any(|p| p.status == ProcessStatus::Suspended)
    }

    pub fn has_pending(&self) -> bool {
        self.processes.iter().any(|p| p.status.is_pending())
    }

    pub fn set_status_by_pid(&mut self, pid: Pid, status: ProcessStatus) -> bool {
        match self.processes.iter_mut().find(|p| p.pid == Some(pid)) {
            Some(process) => {
                process.status = status;
                true
            }
            None => false,
        }
    }

    /// Updates every process that has not finished yet.
    pub fn set_status(&mut self, status: ProcessStatus) {
        for process in &mut self.processes {
            if !process.status.is_terminal() {
                process.status = status;
            }
        }
    }

    /// Status of the last stage, as a shell reports it for a pipeline.
    pub fn exit_status(&self) -> i32 {
        self.processes.last().map(Process::exit_status).unwrap_or(0)
    }

    /// Command text of every stage, pipe separated.
    pub fn describe(&self) -> String {
        self.processes
            .iter()
            .map(|p| p.command.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Fixed capacity registry of the jobs the interpreter is tracking.
///
/// Slot `0` is never used so that a job's id is its slot index. A pid index
/// is kept next to the slots so reaped children are found without scanning
/// every job.
pub struct JobTable {
    slots: Vec<Option<Job>>,
    pids: HashMap<Pid, (JobId, usize)>,
}

impl JobTable {
    fn slot(&self, id: JobId) -> Option<&Job> {
        if (1..=MAX_JOBS).contains(&id) {
            self.slots[id].as_ref()
        } else {
            None
        }
    }

    fn slot_mut(&mut self, id: JobId) -> Option<&mut Job> {
        if (1..=MAX_JOBS).contains(&id) {
            self.slots[id].as_mut()
        } else {
            None
        }
    }

    /// Lowest unused id.
    pub fn next_id(&self) -> Result<JobId> {
        (1..=MAX_JOBS)
            .find(|&id| self.slots[id].is_none())
            .ok_or(Error::JobTableFull)
    }

    pub fn insert(&mut self, mut job: Job) -> Result<JobId> {
        let id = self.next_id()?;
        job.id = Some(id);
        for (index, process) in job.processes.iter().enumerate() {
            if let Some(pid) = process.pid {
                self.pids.insert(pid, (id, index));
            }
        }
        self.slots[id] = Some(job);
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.slot(id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.slot_mut(id)
    }

    pub fn pgid(&self, id: JobId) -> Option<Pid> {
        self.slot(id).and_then(|job| job.pgid)
    }

    pub fn count(&self, id: JobId, filter: ProcessFilter) -> Option<usize> {
        self.slot(id).map(|job| job.count(filter))
    }

    pub fn is_completed(&self, id: JobId) -> bool {
        self.slot(id).is_some_and(Job::is_completed)
    }

    /// Records the pid of a freshly spawned process of job `id`.
    pub fn bind_pid(&mut self, id: JobId, index: usize, pid: Pid) -> bool {
        let Some(process) = self
            .slot_mut(id)
            .and_then(|job| job.processes.get_mut(index))
        else {
            return false;
        };
        process.pid = Some(pid);
        self.pids.insert(pid, (id, index));
        true
    }

    pub fn job_id_by_pid(&self, pid: Pid) -> Option<JobId> {
        self.pids.get(&pid).map(|&(id, _)| id)
    }

    /// Returns the id of the job owning `pid`, if it is tracked.
    pub fn set_process_status(&mut self, pid: Pid, status: ProcessStatus) -> Option<JobId> {
        let (id, index) = *self.pids.get(&pid)?;
        let process = self.slots[id].as_mut()?.processes.get_mut(index)?;
        process.status = status;
        Some(id)
    }

    pub fn set_job_status(&mut self, id: JobId, status: ProcessStatus) -> bool {
        match self.slot_mut(id) {
            Some(job) => {
                job.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Frees the slot, dropping the job together with all of its processes.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        if !(1..=MAX_JOBS).contains(&id) {
            return None;
        }
        let job = self.slots[id].take()?;
        for process in &job.processes {
            if let Some(pid) = process.pid {
                self.pids.remove(&pid);
            }
        }
        Some(job)
    }

    /// Highest occupied slot, the most recently inserted job.
    pub fn latest_id(&self) -> Option<JobId> {
        (1..=MAX_JOBS).rev().find(|&id| self.slots[id].is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn write_listing<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for (id, job) in self.slots.iter().enumerate() {
            if let Some(job) = job {
                writeln!(out, "[{id}] {}", job.describe())?;
            }
        }
        Ok(())
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self {
            slots: (0..=MAX_JOBS).map(|_| None).collect(),
            pids: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn process(command: &str) -> Process {
        let argv = command.split_whitespace().map(String::from).collect();
        Process::new(command.to_string(), argv, None, None)
    }

    fn job(commands: &[&str]) -> Job {
        let processes = commands.iter().map(|c| process(c)).collect();
        Job::new(commands.join(" | "), processes, ExecutionMode::Background)
    }

    #[test]
    fn classify_builtins() {
        assert_eq!(CommandKind::classify(Some("fg")), CommandKind::Fg);
        assert_eq!(CommandKind::classify(Some("bg")), CommandKind::Bg);
        assert_eq!(CommandKind::classify(Some("jobs")), CommandKind::Jobs);
        assert_eq!(CommandKind::classify(Some("cd")), CommandKind::Cd);
        assert_eq!(CommandKind::classify(Some("exit")), CommandKind::Exit);
        assert_eq!(CommandKind::classify(Some("ls")), CommandKind::External);
        assert_eq!(CommandKind::classify(None), CommandKind::External);
    }

    #[test]
    fn ids_are_lowest_free_slot_and_reused_after_removal() {
        let mut table = JobTable::default();
        assert_eq!(table.insert(job(&["sleep 1"])).unwrap(), 1);
        assert_eq!(table.insert(job(&["sleep 2"])).unwrap(), 2);
        assert_eq!(table.insert(job(&["sleep 3"])).unwrap(), 3);
        assert!(table.remove(2).is_some());
        assert_eq!(table.next_id().unwrap(), 2);
        assert_eq!(table.insert(job(&["sleep 4"])).unwrap(), 2);
        assert_eq!(table.get(2).unwrap().id, Some(2));
        assert_eq!(table.latest_id(), Some(3));
    }

    #[test]
    fn full_table_rejects_insert() {
        let mut table = JobTable::default();
        for _ in 0..MAX_JOBS {
            table.insert(job(&["true"])).unwrap();
        }
        assert_eq!(table.len(), MAX_JOBS);
        assert!(matches!(
            table.insert(job(&["true"])),
            Err(Error::JobTableFull)
        ));
    }

    #[test]
    fn out_of_range_ids_are_absent() {
        let mut table = JobTable::default();
        assert!(table.get(0).is_none());
        assert!(table.get(MAX_JOBS + 1).is_none());
        assert!(table.remove(MAX_JOBS + 1).is_none());
        assert_eq!(table.pgid(7), None);
        assert_eq!(table.count(7, ProcessFilter::All), None);
        assert!(!table.is_completed(7));
        assert_eq!(table.latest_id(), None);
    }

    #[test]
    fn status_updates_through_pid_index() {
        let mut table = JobTable::default();
        let id = table.insert(job(&["cat", "grep foo", "wc -l"])).unwrap();
        for index in 0..3 {
            assert!(table.bind_pid(id, index, Pid::from_raw(1000 + index as i32)));
        }
        assert_eq!(table.count(id, ProcessFilter::All), Some(3));
        assert_eq!(table.count(id, ProcessFilter::Remaining), Some(3));

        let owner = table.set_process_status(Pid::from_raw(1001), ProcessStatus::Done(0));
        assert_eq!(owner, Some(id));
        assert_eq!(table.count(id, ProcessFilter::Done), Some(1));
        assert!(!table.is_completed(id));

        table.set_process_status(Pid::from_raw(1000), ProcessStatus::Done(0));
        table.set_process_status(Pid::from_raw(1002), ProcessStatus::Terminated(Signal::SIGINT));
        assert!(table.is_completed(id));
        assert_eq!(table.get(id).unwrap().exit_status(), 130);

        assert_eq!(table.set_process_status(Pid::from_raw(42), ProcessStatus::Done(0)), None);
    }

    #[test]
    fn removal_forgets_pids() {
        let mut table = JobTable::default();
        let id = table.insert(job(&["sleep 5"])).unwrap();
        table.bind_pid(id, 0, Pid::from_raw(77));
        assert_eq!(table.job_id_by_pid(Pid::from_raw(77)), Some(id));
        let removed = table.remove(id).unwrap();
        assert_eq!(removed.processes.len(), 1);
        assert_eq!(table.job_id_by_pid(Pid::from_raw(77)), None);
        assert_eq!(
            table.set_process_status(Pid::from_raw(77), ProcessStatus::Done(0)),
            None
        );
        assert!(table.is_empty());
    }

    #[test]
    fn job_status_skips_finished_processes() {
        let mut table = JobTable::default();
        let id = table.insert(job(&["yes", "head"])).unwrap();
        table.bind_pid(id, 0, Pid::from_raw(10));
        table.bind_pid(id, 1, Pid::from_raw(11));
        table.set_process_status(Pid::from_raw(11), ProcessStatus::Done(0));
        table.set_process_status(Pid::from_raw(10), ProcessStatus::Suspended);
        assert!(table.get(id).unwrap().is_stopped());

        assert!(table.set_job_status(id, ProcessStatus::Continued));
        let job = table.get(id).unwrap();
        assert_eq!(job.processes[0].status, ProcessStatus::Continued);
        assert_eq!(job.processes[1].status, ProcessStatus::Done(0));
        assert!(job.has_pending());
        assert!(!table.set_job_status(9, ProcessStatus::Continued));
    }

    #[test]
    fn pgid_is_assigned_once() {
        let mut job = job(&["a", "b"]);
        assert_eq!(job.assign_pgid(Pid::from_raw(300)), Pid::from_raw(300));
        assert_eq!(job.assign_pgid(Pid::from_raw(301)), Pid::from_raw(300));
        assert_eq!(job.pgid, Some(Pid::from_raw(300)));
    }

    #[test]
    fn listing_shows_every_stage_in_order() {
        let mut table = JobTable::default();
        table.insert(job(&["sleep 10"])).unwrap();
        table
            .insert(job(&["cat notes.txt", "grep todo", "sort"]))
            .unwrap();
        let mut out = Vec::new();
        table.write_listing(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[1] sleep 10\n[2] cat notes.txt | grep todo | sort\n"
        );
    }
}
