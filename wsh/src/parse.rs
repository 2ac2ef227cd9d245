//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Command line parsing.
//!
//! A line is a pipeline of `|` separated stages, optionally followed by `&`.
//! There is no quoting: a `|` is always a stage separator and tokens are
//! split on whitespace. Inside a stage, the first token that starts with `<`
//! or `>` ends the argument list, and every token after it is treated as a
//! redirection.

use crate::jobs::{ExecutionMode, Job, Process};
use std::ffi::{CStr, CString};

const WILDCARD_CHARACTERS: &[char] = &['*', '?', '['];

/// Pathname expansion collaborator.
pub trait PathnameExpander {
    /// Pathnames matching `pattern`, in a stable order. Empty if nothing
    /// matches.
    fn expand(&self, pattern: &str) -> Vec<String>;
}

/// Expands patterns with the C library's `glob(3)`.
#[derive(Default, Clone, Copy)]
pub struct SystemGlob;

impl PathnameExpander for SystemGlob {
    fn expand(&self, pattern: &str) -> Vec<String> {
        let Ok(pattern) = CString::new(pattern) else {
            return Vec::new();
        };
        // glob_t is plain data, a zeroed value is a valid initial state
        let mut buffer: libc::glob_t = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::glob(pattern.as_ptr(), 0, None, &mut buffer) };
        let mut matches = Vec::new();
        if result == 0 {
            for i in 0..buffer.gl_pathc as usize {
                // gl_pathv holds gl_pathc valid, NUL terminated strings
                let path = unsafe { CStr::from_ptr(*buffer.gl_pathv.add(i)) };
                matches.push(path.to_string_lossy().into_owned());
            }
        }
        unsafe { libc::globfree(&mut buffer) };
        matches
    }
}

fn has_wildcard(token: &str) -> bool {
    token.contains(WILDCARD_CHARACTERS)
}

fn is_redirection(token: &str) -> bool {
    token.starts_with('<') || token.starts_with('>')
}

fn tokenize(segment: &str, expander: &dyn PathnameExpander) -> Vec<String> {
    let mut tokens = Vec::new();
    for token in segment.split_whitespace() {
        if has_wildcard(token) {
            let matches = expander.expand(token);
            if !matches.is_empty() {
                log::trace!("expanded '{token}' to {matches:?}");
                tokens.extend(matches);
                continue;
            }
        }
        tokens.push(token.to_string());
    }
    tokens
}

/// Builds one pipeline stage from its text.
pub fn parse_segment(segment: &str, expander: &dyn PathnameExpander) -> Process {
    let mut tokens = tokenize(segment, expander);
    let argc = tokens
        .iter()
        .position(|token| is_redirection(token))
        .unwrap_or(tokens.len());

    let mut input_path = None;
    let mut output_path = None;
    let mut redirections = tokens.split_off(argc).into_iter();
    while let Some(token) = redirections.next() {
        let target = if token.starts_with('<') {
            &mut input_path
        } else if token.starts_with('>') {
            &mut output_path
        } else {
            log::trace!("ignoring '{token}' and the rest of the redirections");
            break;
        };
        if token.len() == 1 {
            match redirections.next() {
                Some(path) => *target = Some(path),
                None => log::trace!("'{token}' is missing a path"),
            }
        } else {
            *target = Some(token[1..].to_string());
        }
    }

    Process::new(segment.trim().to_string(), tokens, input_path, output_path)
}

/// Parses a command line into a job. Returns `None` for a blank line.
pub fn parse_command_line(line: &str, expander: &dyn PathnameExpander) -> Option<Job> {
    let mut line = line.trim();
    let mut mode = ExecutionMode::Foreground;
    if let Some(stripped) = line.strip_suffix('&') {
        line = stripped.trim_end();
        mode = ExecutionMode::Background;
    }
    if line.is_empty() {
        return None;
    }

    let processes = line
        .split('|')
        .map(|segment| parse_segment(segment, expander))
        .collect();
    Some(Job::new(line.to_string(), processes, mode))
}
