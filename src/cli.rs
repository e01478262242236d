// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// switchyard: a local broker between a submitter and pooled AI backend sessions.
#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to an explicit config file, merged on top of the layered
    /// system/XDG/workspace config (highest priority).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Respects `RUST_LOG` if set.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a single task to a registered engine and print its events as
    /// they arrive, then exit once the session ends.
    Run {
        /// The prompt sent as the task's input.
        prompt: String,
        /// Task kind (chat, refactor, analyze, generate, or any other string).
        #[arg(long, default_value = "chat")]
        kind: String,
        /// Engine id to run on. Defaults to the registry's default engine.
        #[arg(long)]
        engine: Option<String>,
        /// Task priority.
        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
        /// Emit each event as a JSON line instead of a human-readable summary.
        #[arg(long)]
        json: bool,
    },

    /// Print the fully merged, layered configuration and exit.
    ShowConfig,

    /// List engines registered with the demo registry (built-in mock/script
    /// engines, since this binary has no real backend wired in).
    ListEngines,

    /// Feed stdin, line by line, through the stream parser and print the
    /// normalized events it produces. Lets a raw backend transcript be
    /// replayed without running a real engine.
    Parse,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum PriorityArg {
    Low,
    #[default]
    Normal,
    High,
}

impl From<PriorityArg> for switchyard_types::Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Low => switchyard_types::Priority::Low,
            PriorityArg::Normal => switchyard_types::Priority::Normal,
            PriorityArg::High => switchyard_types::Priority::High,
        }
    }
}
