// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no task found with id `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] switchyard_engine::EngineError),

    #[error(transparent)]
    Pool(#[from] switchyard_pool::PoolError),
}
