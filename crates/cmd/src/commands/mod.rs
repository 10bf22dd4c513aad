// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod ingest;
pub mod merge;
pub mod query;
pub mod status;

pub use ingest::ingest_command;
pub use merge::merge_command;
pub use query::query_command;
pub use status::status_command;
