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
use std::io::Write;

/// Status used when the operand of `exit` cannot be used.
const USAGE_STATUS: i32 = 2;

/// Reads the status operand. `Err` carries the diagnostic for an unusable
/// operand list.
fn exit_status(args: &[String]) -> Result<i32, String> {
    match args {
        [] => Ok(0),
        [arg] => arg
            .parse::<i32>()
            .map_err(|_| format!("'{arg}' is not a valid number")),
        _ => Err("too many arguments".to_string()),
    }
}

/// Terminates the interpreter right away, even when the operand is invalid.
/// Tracked jobs are left running.
pub struct Exit;

impl BuiltinUtility for Exit {
    fn exec(&self, args: &[String], shell: &mut Shell, out: &mut dyn Write) -> BuiltinResult {
        let code = exit_status(args).unwrap_or_else(|message| {
            eprintln!("wsh: exit: {message}");
            USAGE_STATUS
        });
        out.flush()?;
        shell.exit(code)
    }
}
