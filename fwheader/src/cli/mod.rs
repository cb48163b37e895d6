//! Command-line interface
//!
//! No stability guaranties apply

use std::{fs, path::PathBuf};

use clap::Args;
use comfy_table::{modifiers, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use miette::{IntoDiagnostic, Result, WrapErr};

use self::config::Config;
use crate::{
    file::{create_file, read_header_file, update_file, verify_file},
    header::{HeaderFields, TextOverflow, LAYOUT},
    image::parse_edits,
    progress::ProgressCallbacks,
    Error,
};

pub mod config;

/// Path to an existing firmware image
#[derive(Debug, Args)]
pub struct ImageArgs {
    /// Firmware image (.bin)
    pub image: PathBuf,
}

/// Values for the editable header fields
#[derive(Debug, Default, Args)]
pub struct FieldArgs {
    /// Model name, up to 64 bytes of UTF-8
    #[arg(long)]
    pub model_name: Option<String>,
    /// CPO identifier, up to 32 bytes of UTF-8
    #[arg(long)]
    pub cpo_id: Option<String>,
    /// Version as 3 bytes of hex, e.g. 010203
    #[arg(long)]
    pub version: Option<String>,
    /// Image type as 1 byte of hex, e.g. 0x01
    #[arg(long)]
    pub image_type: Option<String>,
    /// Debug level as 1 byte of hex, e.g. 0x00
    #[arg(long)]
    pub debug_level: Option<String>,
    /// What to do with text too long for its field [possible values: truncate, reject]
    #[arg(long, value_name = "POLICY")]
    pub text_overflow: Option<TextOverflow>,
}

impl FieldArgs {
    /// The fields given on the command line
    pub fn to_edits(&self) -> Result<HeaderFields, Error> {
        parse_edits(
            [
                ("model_name", &self.model_name),
                ("cpo_id", &self.cpo_id),
                ("version", &self.version),
                ("image_type", &self.image_type),
                ("debug_level", &self.debug_level),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|value| (name, value))),
        )
    }

    fn overflow(&self, config: &Config) -> TextOverflow {
        self.text_overflow.unwrap_or(config.text_overflow)
    }
}

/// Arguments for re-sealing an existing image
#[derive(Debug, Args)]
pub struct EditArgs {
    #[command(flatten)]
    pub image_args: ImageArgs,
    #[command(flatten)]
    pub fields: FieldArgs,
    /// Additional edits as NAME=VALUE
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub assignments: Vec<(String, String)>,
}

/// Arguments for creating a new image from a raw payload
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Raw firmware payload to place after the header
    pub payload: PathBuf,
    /// Where to write the sealed image
    #[arg(short, long)]
    pub output: PathBuf,
    #[command(flatten)]
    pub fields: FieldArgs,
}

fn parse_assignment(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(name, value)| (name.trim().to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{input}'"))
}

/// Progress bar shown while hashing payloads
#[derive(Default)]
pub struct HashProgress {
    pb: Option<ProgressBar>,
}

impl ProgressCallbacks for HashProgress {
    fn init(&mut self, total: usize) {
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {bytes:>9}/{total_bytes:9} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let pb = ProgressBar::new(total as u64)
            .with_message("hashing payload")
            .with_style(style);
        self.pb = Some(pb);
    }

    fn update(&mut self, current: usize) {
        if let Some(ref pb) = self.pb {
            pb.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }
    }
}

/// Print the header of an image, and whether its digest is valid
pub fn info(args: ImageArgs) -> Result<()> {
    let fields = read_header_file(&args.image)
        .wrap_err_with(|| format!("Failed to read header of {}", args.image.display()))?;
    print_fields(&fields);

    match verify_file(&args.image, Some(&mut HashProgress::default())) {
        Ok(_) => println!("Integrity digest: valid"),
        Err(err) => println!("Integrity digest: INVALID ({err})"),
    }

    Ok(())
}

/// Fail unless the image's digest matches its contents
pub fn verify(args: ImageArgs) -> Result<()> {
    let digest = verify_file(&args.image, Some(&mut HashProgress::default()))
        .wrap_err_with(|| format!("Failed to verify {}", args.image.display()))?;

    println!("{}: OK ({})", args.image.display(), hex::encode(digest));
    Ok(())
}

/// Apply edits to an existing image and re-seal it
pub fn edit(args: EditArgs, config: &Config) -> Result<()> {
    let mut edits = args.fields.to_edits()?;
    edits.overlay(&parse_edits(
        args.assignments
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    )?);

    if edits.is_empty() {
        info!("No fields to change, nothing to do");
        return Ok(());
    }

    let image = &args.image_args.image;
    let fields = update_file(
        image,
        &edits,
        args.fields.overflow(config),
        Some(&mut HashProgress::default()),
    )
    .wrap_err_with(|| format!("Failed to update {}", image.display()))?;

    print_fields(&fields);
    println!("\nHeader updated and re-sealed");

    Ok(())
}

/// Create a new sealed image from a raw payload
pub fn create(args: CreateArgs, config: &Config) -> Result<()> {
    let payload = fs::read(&args.payload)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to open payload {}", args.payload.display()))?;

    let mut fields = config.defaults.to_fields()?;
    fields.overlay(&args.fields.to_edits()?);

    let fields = create_file(
        &args.output,
        &fields,
        &payload,
        args.fields.overflow(config),
    )?;

    print_fields(&fields);
    println!("\nImage written to {}", args.output.display());

    Ok(())
}

/// Print header fields as a table
pub fn print_fields(fields: &HeaderFields) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Field")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
            Cell::new("Offset")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold),
            Cell::new("Size")
                .fg(Color::Yellow)
                .add_attribute(Attribute::Bold),
            Cell::new("Editable")
                .fg(Color::Magenta)
                .add_attribute(Attribute::Bold),
            Cell::new("Value")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
        ]);

    for spec in LAYOUT.iter() {
        let value = fields
            .get(spec.name)
            .map(ToString::to_string)
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(spec.name).fg(Color::Green),
            Cell::new(format!("{:#05x}", spec.offset())).fg(Color::Red),
            Cell::new(spec.size).fg(Color::Yellow),
            Cell::new(if spec.editable { "yes" } else { "no" }).fg(Color::Magenta),
            Cell::new(value).fg(Color::Cyan),
        ]);
    }

    println!("{table}");
}
