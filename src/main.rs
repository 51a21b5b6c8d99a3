use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gridiron::{
    compression::{Family, Step},
    AssetMap, DecodeOptions, DecodeSession, ExtendedFamilies, Rom, Termination, TileSet,
    HEADER_SIZE,
};
use std::{fs, path::Path, path::PathBuf};

/// Tiles per row in exported previews
const SHEET_COLUMNS: usize = 16;

#[derive(Parser, Debug)]
struct Arguments {
    /// Print more output, repeat for per-command traces
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decompress a single block and write the result to a file
    Decompress {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,

        /// Write whatever was decoded before an error instead of no output at all
        #[arg(long)]
        keep_partial: bool,

        /// Also write a greyscale tile sheet of the output
        #[arg(long)]
        png: Option<PathBuf>,
    },

    /// List the commands of a block without writing anything
    Trace {
        input: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,
    },

    /// Decompress every block listed in an asset map
    Extract {
        rom: PathBuf,

        #[command(flatten)]
        args: ExtractArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct DecodeArgs {
    /// Start of the compressed block, in hex
    #[arg(short, long, default_value = "0", value_parser = parse_hex)]
    offset: usize,

    /// Stop after this many tiles instead of at the 0x00 command
    #[arg(short, long, conflicts_with = "header")]
    tiles: Option<usize>,

    /// Read the tile count from the two bytes at the offset
    #[arg(long)]
    header: bool,

    /// Give up once the output grows past this many bytes, in hex
    #[arg(long, default_value = "10000", value_parser = parse_hex)]
    max_output: usize,

    /// Decode 0xA0..0xEF with unconfirmed layouts instead of failing on them
    #[arg(long)]
    provisional: bool,
}

impl DecodeArgs {
    /// Where decoding starts and how.
    fn resolve(&self, rom: &Rom) -> anyhow::Result<(usize, DecodeOptions)> {
        let families = if self.provisional {
            log::warn!("Decoding commands 0xA0..0xEF with unconfirmed layouts");
            ExtendedFamilies::Provisional
        } else {
            ExtendedFamilies::Reject
        };
        let options = DecodeOptions::default()
            .with_max_output(Some(self.max_output))
            .with_families(families);

        if self.header {
            let tiles = rom
                .tile_header(self.offset)
                .with_context(|| "Failed to read tile count header")?;
            log::info!("Header at {:#x} announces {} tiles", self.offset, tiles);

            return Ok((
                self.offset + HEADER_SIZE,
                options.with_termination(tile_quota(tiles)?),
            ));
        }

        let termination = match self.tiles {
            Some(tiles) => tile_quota(tiles)?,
            None => Termination::Sentinel,
        };

        Ok((self.offset, options.with_termination(termination)))
    }
}

#[derive(Args, Debug, Clone)]
struct ExtractArgs {
    /// Asset map describing the compressed blocks of the ROM
    #[arg(short, long)]
    map: PathBuf,

    /// The output directory to write the blocks to
    #[arg(short, long, default_value = "extract")]
    out_dir: PathBuf,

    /// Overwrite the output directory if it already exists
    #[arg(long)]
    force: bool,

    /// Also write a greyscale tile sheet for every block
    #[arg(long)]
    png: bool,
}

fn tile_quota(tiles: usize) -> anyhow::Result<Termination> {
    Termination::tiles(tiles).with_context(|| format!("{tiles} tiles is too large to decode"))
}

fn parse_hex(value: &str) -> Result<usize, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    usize::from_str_radix(digits, 16).map_err(|err| format!("invalid hex value '{value}': {err}"))
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    let mut logger = colog::default_builder();
    logger.filter_level(match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    });
    logger.init();

    match args.command {
        Commands::Decompress {
            input,
            output,
            decode,
            keep_partial,
            png,
        } => decompress(&input, &output, &decode, keep_partial, png.as_deref()),
        Commands::Trace { input, decode } => trace(&input, &decode),
        Commands::Extract { rom, args } => extract(&rom, args),
    }
}

fn decompress(
    input: &Path,
    output: &Path,
    decode: &DecodeArgs,
    keep_partial: bool,
    png: Option<&Path>,
) -> anyhow::Result<()> {
    let rom = Rom::open(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let (start, options) = decode.resolve(&rom)?;

    let result = DecodeSession::new(rom.data(), start, options).and_then(|session| session.run());
    let result = match result {
        Ok(result) => result,
        Err(failure) => {
            if keep_partial {
                fs::write(output, failure.partial())
                    .with_context(|| "Failed to write partial output")?;
                log::warn!(
                    "Wrote {:#x} bytes of partial output to {}",
                    failure.partial().len(),
                    output.display()
                );
            }

            anyhow::bail!("{}: {}", failure.kind(), failure);
        }
    };

    fs::write(output, result.output()).with_context(|| "Failed to write output file")?;
    log::info!(
        "Decompressed {:#x} bytes ({} tiles) from {:#x} bytes at {:#x}",
        result.output().len(),
        result.output().len() / gridiron::compression::TILE_SIZE,
        result.bytes_read,
        start
    );

    if let Some(png) = png {
        write_sheet(result.output(), png)?;
    }

    Ok(())
}

fn trace(input: &Path, decode: &DecodeArgs) -> anyhow::Result<()> {
    let rom = Rom::open(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let (start, options) = decode.resolve(&rom)?;

    let mut session = DecodeSession::new(rom.data(), start, options)
        .map_err(|failure| anyhow::anyhow!("{}: {}", failure.kind(), failure))?;

    loop {
        let before = session.output().produced();

        match session.step() {
            Ok(Step::Executed(command)) => println!(
                "{:#07x}  {:02x}  {:<24} {:<40} -> {:#06x}{}",
                command.offset,
                command.opcode,
                format!("{:?}", command.family),
                format!("{:?}", command.operation),
                before,
                provisional_marker(command.family)
            ),
            Ok(Step::Finished) => break,
            Err(failure) => anyhow::bail!("{}: {}", failure.kind(), failure),
        }
    }

    println!(
        "end at {:#07x}, {:#x} bytes of output",
        session.position(),
        session.output().produced()
    );

    Ok(())
}

fn provisional_marker(family: Family) -> &'static str {
    if family.is_validated() {
        ""
    } else {
        "  (provisional)"
    }
}

fn extract(rom_path: &Path, args: ExtractArgs) -> anyhow::Result<()> {
    use indicatif::ProgressBar;

    let rom = Rom::open(rom_path)?;
    let map = AssetMap::parse(
        &fs::read_to_string(&args.map).with_context(|| "Failed to read asset map")?,
    )?;

    match map.metadata_for(&rom) {
        Some(metadata) => log::info!(
            "Loaded ROM: '{}' with CRC: {:#010x}",
            metadata.name,
            metadata.crc
        ),
        None => log::warn!("Asset map is not compatible with the supplied ROM. Continuing anyway."),
    }

    if args.force && args.out_dir.exists() {
        fs::remove_dir_all(&args.out_dir)
            .with_context(|| "Failed to clean up old output directory")?;
    }
    fs::create_dir(&args.out_dir).with_context(|| "Failed to create output directory")?;

    log::info!("Extracting {} blocks...", map.blocks.len());

    let progress = ProgressBar::new(map.blocks.len() as u64);
    let results = rom.extract(&map, DecodeOptions::default(), |_| progress.inc(1));
    progress.finish_and_clear();

    let mut failed = 0;
    for result in results {
        let block = match result {
            Ok(block) => block,
            Err(err) => {
                log::error!("{:#}", anyhow::Error::new(err));
                failed += 1;
                continue;
            }
        };

        let dir = match &block.category {
            Some(category) => args.out_dir.join(category),
            None => args.out_dir.clone(),
        };
        fs::create_dir_all(&dir).with_context(|| "Failed to create directory")?;

        let path = dir.join(format!("{}.bin", block.name));
        fs::write(&path, &block.data)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if args.png {
            write_sheet(&block.data, &dir.join(format!("{}.png", block.name)))?;
        }

        log::info!(
            "Extracted {} ({:#x} -> {:#x} bytes) to {}",
            block.name,
            block.bytes_read,
            block.data.len(),
            path.display()
        );
    }

    if failed > 0 {
        anyhow::bail!("{} of {} blocks failed to decompress", failed, map.blocks.len());
    }

    log::info!("Done!");

    Ok(())
}

fn write_sheet(data: &[u8], path: &Path) -> anyhow::Result<()> {
    let tiles = TileSet::try_from_slice(data)?;
    tiles
        .to_sheet(SHEET_COLUMNS)?
        .save(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;

    log::info!("Wrote {} tiles to {}", tiles.len(), path.display());

    Ok(())
}
