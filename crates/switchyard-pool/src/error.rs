// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no pooled session found with id `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] switchyard_engine::EngineError),
}
