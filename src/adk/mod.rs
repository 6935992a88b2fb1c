// SPDX-License-Identifier: MIT

//! Agent development kit: the pieces every collaborator call relies on.

pub mod error;
pub mod model;
pub mod retry;
