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

pub struct Jobs;

impl BuiltinUtility for Jobs {
    fn exec(&self, _: &[String], shell: &mut Shell, out: &mut dyn Write) -> BuiltinResult {
        shell.jobs.write_listing(out)?;
        Ok(0)
    }
}
