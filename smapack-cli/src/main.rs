use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use smapack_core::{BinImage, decode_image};
use smapack_core::data::DataPack;
use smapack_core::sprite::SpritePack;
use smapack_core::text::CharTable;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show header and pack summary of a card/firmware image
    Info(InputArgs),
    /// List the dialog strings of an image
    Strings(InputArgs),
    /// Export the decoded model as JSON
    Export(ExportCommand),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Input .bin image path
    input: PathBuf,
}

#[derive(Debug, Args)]
struct ExportCommand {
    /// Input .bin image path
    input: PathBuf,
    /// Output JSON path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn open(path: &PathBuf) -> anyhow::Result<smapack_core::Snapshot> {
    let buffer = std::fs::read(path).context(format!("failed to read `{}`", path.display()))?;
    let snapshot = decode_image(buffer, &CharTable::japanese())
        .context(format!("failed to decode `{}`", path.display()))?;
    Ok(snapshot)
}

fn info(cmd: &InputArgs) -> anyhow::Result<()> {
    let snapshot = open(&cmd.input)?;
    match &snapshot.image {
        BinImage::Card(card) => {
            println!("shape:    card");
            println!("vendor:   {}", card.header.vendor());
            println!("product:  {}", card.header.product());
            println!("card id:  {}", card.header.card_id);
            println!(
                "built:    {:04}-{:02}-{:02} rev {}",
                card.header.year, card.header.month, card.header.day, card.header.revision
            );
            println!("md5:      {}", card.header.md5_hex());
            println!("archive:  base {:#x}, {} packages", card.archive.base, card.archive.entries.len());
            print_packs(card.data_pack.as_ref(), card.sprite_pack.as_ref());
            for fault in &card.faults {
                println!("fault:    {fault}");
            }
            for (package, error) in &card.pack_errors {
                println!("error:    package {package}: {error}");
            }
        }
        BinImage::Firmware(fw) => {
            println!("shape:    firmware");
            print_packs(fw.data_pack.as_ref(), fw.sprite_pack.as_ref());
            for fault in &fw.faults {
                println!("fault:    {fault}");
            }
            for (package, error) in &fw.pack_errors {
                println!("error:    package {package}: {error}");
            }
        }
    }
    Ok(())
}

fn print_packs(data: Option<&DataPack>, sprite: Option<&SpritePack>) {
    if let Some(pack) = data {
        println!(
            "data:     id {} | {} items, {} characters, {} strings, {} scenes",
            pack.card_id,
            pack.items.len(),
            pack.characters.len(),
            pack.strings.len(),
            pack.scenes.len()
        );
    }
    if let Some(pack) = sprite {
        println!(
            "sprites:  {} images, {} subimages, {} palettes",
            pack.image_defs.len(),
            pack.subimages.len(),
            pack.palettes.len()
        );
    }
}

fn strings(cmd: &InputArgs) -> anyhow::Result<()> {
    let snapshot = open(&cmd.input)?;
    let pack = snapshot
        .image
        .data_pack()
        .context("image has no decodable data pack")?;
    for string in &pack.strings {
        println!("{}\t{}", string.id, string.value.text.replace('\n', "\\n"));
    }
    Ok(())
}

#[derive(Serialize)]
struct Export<'a> {
    data_pack: Option<&'a DataPack>,
    sprite_pack: Option<&'a SpritePack>,
}

fn export(cmd: &ExportCommand) -> anyhow::Result<()> {
    let snapshot = open(&cmd.input)?;
    let export = Export {
        data_pack: snapshot.image.data_pack(),
        sprite_pack: snapshot.image.sprite_pack(),
    };
    let json = serde_json::to_string_pretty(&export)?;
    match &cmd.output {
        Some(path) => std::fs::write(path, json)
            .context(format!("failed to write `{}`", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Info(cmd) => info(cmd),
        Command::Strings(cmd) => strings(cmd),
        Command::Export(cmd) => export(cmd),
    }
}
