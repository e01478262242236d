// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
mod engine;

pub use engine::{
    HangingEngine, HangingSession, MockEngine, RepeatingScriptedEngine, ScriptedEngine,
};
