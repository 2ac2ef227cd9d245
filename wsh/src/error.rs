//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use crate::os::OsError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Os(#[from] OsError),
    #[error("no such file or directory: {0}")]
    NoSuchFile(String),
    #[error("job table is full")]
    JobTableFull,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
