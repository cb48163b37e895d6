use clap::{Parser, Subcommand};
use fwheader::{
    cli::{self, config::Config, CreateArgs, EditArgs, ImageArgs},
    logging::initialize_logger,
};
use log::{debug, LevelFilter};
use miette::Result;

#[derive(Debug, Parser)]
#[command(about, max_term_width = 100, version)]
struct Cli {
    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Display the header fields of a firmware image
    Info(ImageArgs),
    /// Check the integrity digest of a firmware image
    Verify(ImageArgs),
    /// Change editable header fields and re-seal the image in place
    ///
    /// Only the first 1024 bytes of the file are rewritten.
    Edit(EditArgs),
    /// Prepend a sealed header to a raw firmware payload
    ///
    /// Fields not given on the command line are taken from the `[defaults]`
    /// section of fwheader.toml.
    Create(CreateArgs),
}

fn main() -> Result<()> {
    miette::set_panic_hook();

    // Attempt to parse any provided command-line arguments, or print the help
    // message and terminate if the invocation is not correct.
    let opts = Cli::parse();
    initialize_logger(if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    debug!("{:#?}", opts.subcommand);

    // Load any user configuration, if present.
    let config = Config::load()?;

    // Execute the correct action based on the provided subcommand and its
    // associated arguments.
    match opts.subcommand {
        Commands::Info(args) => cli::info(args),
        Commands::Verify(args) => cli::verify(args),
        Commands::Edit(args) => cli::edit(args, &config),
        Commands::Create(args) => cli::create(args, &config),
    }
}
