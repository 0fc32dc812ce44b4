//! IoTDM CLI
//!
//! Command-line tools for exercising the cached resource tree.
//!
//! # Commands
//!
//! - `demo-tree` - Build a sample tree and print its hierarchy
//! - `reap` - Relocate containers under the delete root and reclaim them
//! - `stats` - Report cache counters after repeated reads
//! - `verify` - Delete instances and check the tree's structural invariants

mod commands;

use clap::{Args, Parser, Subcommand};
use commands::{OutputFormat, TreeShape};
use tracing_subscriber::EnvFilter;

/// IoTDM resource tree tools.
#[derive(Parser)]
#[command(name = "iotdm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Size of the generated tree.
#[derive(Args)]
struct ShapeArgs {
    /// Number of CSE bases
    #[arg(long, default_value = "1")]
    cses: usize,

    /// Containers per CSE
    #[arg(long, default_value = "3")]
    containers: usize,

    /// Content instances per container
    #[arg(long, default_value = "5")]
    instances: usize,
}

impl From<&ShapeArgs> for TreeShape {
    fn from(args: &ShapeArgs) -> Self {
        Self {
            cses: args.cses,
            containers: args.containers,
            instances: args.instances,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sample tree and print its hierarchy
    DemoTree {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Relocate every container under the delete root and reclaim them
    Reap {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Maximum resources removed per epoch
        #[arg(short, long, default_value = "50")]
        max_per_epoch: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Report cache counters after repeated reads
    Stats {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Read passes over every resource
        #[arg(short, long, default_value = "3")]
        passes: usize,

        /// Resource cache capacity
        #[arg(short, long, default_value = "100000")]
        capacity: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Delete content instances and check the tree's invariants
    Verify {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Delete every n-th content instance (0 deletes nothing)
        #[arg(short, long, default_value = "2")]
        delete_every: usize,

        /// Splice neighbours together instead of detaching them
        #[arg(short, long)]
        splice: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::DemoTree { shape, format } => {
            commands::demo_tree::run(&TreeShape::from(&shape), format)?;
        }
        Commands::Reap {
            shape,
            max_per_epoch,
            format,
        } => {
            commands::reap::run(&TreeShape::from(&shape), max_per_epoch, format)?;
        }
        Commands::Stats {
            shape,
            passes,
            capacity,
            format,
        } => {
            commands::stats::run(&TreeShape::from(&shape), passes, capacity, format)?;
        }
        Commands::Verify {
            shape,
            delete_every,
            splice,
        } => {
            commands::verify::run(&TreeShape::from(&shape), delete_every, splice)?;
        }
        Commands::Version => {
            println!("IoTDM CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("IoTDM Core v{}", iotdm_core::VERSION);
        }
    }

    Ok(())
}
