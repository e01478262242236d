// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Stream Parser (C3): turns a backend's raw, possibly-chunked byte stream
//! into the normalized [`switchyard_types::Event`] vocabulary.

mod parser;

pub use parser::{ActiveToolCall, StreamParser};
