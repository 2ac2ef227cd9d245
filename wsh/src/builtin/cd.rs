//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::builtin::{BuiltinResult, BuiltinUtility};
use crate::shell::Shell;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

pub struct Cd;

impl BuiltinUtility for Cd {
    fn exec(&self, args: &[String], _: &mut Shell, _: &mut dyn Write) -> BuiltinResult {
        let directory = match args {
            [] => match std::env::var_os("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Ok(0),
            },
            [directory] => PathBuf::from(OsString::from(directory)),
            _ => return Err("too many arguments".into()),
        };
        nix::unistd::chdir(&directory)
            .map_err(|errno| format!("{}: {}", directory.display(), errno.desc()))?;
        Ok(0)
    }
}
