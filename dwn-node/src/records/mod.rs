// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record messages: writes, lineage resolution and queries.

pub mod lineage;
pub mod query;
pub mod write;
