//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use std::sync::{Mutex, MutexGuard};

static CHILDREN: Mutex<()> = Mutex::new(());

/// Held by every test that forks or collects children. A sweep waits for
/// any child of the test process, so it must not run while another test
/// is waiting for its own.
pub fn serial() -> MutexGuard<'static, ()> {
    CHILDREN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
