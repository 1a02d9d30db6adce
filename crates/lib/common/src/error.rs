// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use thiserror::Error;

/// Status shared by the asset and rendering cores. Composite operations
/// short-circuit on the first non-success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no such asset")]
    NoAsset,
    #[error("no such artifact")]
    NoArtifact,
    #[error("invalid state")]
    InvalidState,
    #[error("invalid data")]
    InvalidData,
    #[error("failed to open file")]
    FailedOpenFile,
    #[error("failed to find file")]
    FailedFindFile,
    #[error("failed to read")]
    FailedRead,
    #[error("failed to write")]
    FailedWrite,
    #[error("failed to parse")]
    FailedParse,
    #[error("failed to remove file")]
    FailedRemoveFile,
    #[error("not implemented")]
    NotImplemented,
    #[error("internal error")]
    Internal,
}
