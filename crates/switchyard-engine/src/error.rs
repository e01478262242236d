// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no engine registered with id `{0}`")]
    NotFound(String),

    #[error("engine `{0}` is not available")]
    Unavailable(String),

    #[error("session `{0}` is busy with another task")]
    Busy(String),

    #[error("session `{0}` has been disposed")]
    Disposed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
