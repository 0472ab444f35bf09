//! Command line interface built on clap.
//!
//! [`Cli`] carries the global flags (`--config`, `--verbose`) and one
//! [`Command`] per flow: `images`, `videos` and `fetch`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Submit, poll and download generative-media jobs.
#[derive(Debug, Parser)]
#[command(name = "genjob", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file. Defaults to ./genjob.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging and a JSON record per unit.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Which profile's model settings and timings to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Image,
    Video,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate one portrait per persona.
    Images {
        /// Persona manifest (TOML).
        #[arg(long, default_value = genjob::manifest::DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Only process these persona ids. Repeatable.
        #[arg(long)]
        only: Vec<String>,

        /// Output directory. Defaults to <output_root>/<date>/artifacts/personas.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Animate persona portraits into short videos.
    Videos {
        /// Persona manifest (TOML). Optional when --images-dir is given.
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Directory of source portraits. Numbered PNGs without a manifest
        /// entry are animated with the default motion prompt.
        #[arg(long)]
        images_dir: Option<PathBuf>,

        /// Only process these ids. Repeatable.
        #[arg(long)]
        only: Vec<String>,

        /// Output directory. Defaults to <output_root>/<date>/artifacts/videos.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Wait for an already submitted task and download its result.
    Fetch {
        /// Task id returned by a previous submission.
        task_id: String,

        /// File to write the artifact to.
        #[arg(long)]
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = ProfileArg::Image)]
        profile: ProfileArg,
    },
}
