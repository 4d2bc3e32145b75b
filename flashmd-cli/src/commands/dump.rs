//! ROM and save RAM transfer commands.

use std::path::Path;

use anyhow::{Result, bail};
use console::style;
use flashmd::CHUNK_SIZE;

use super::{Context, with_dumper};
use crate::CliError;

fn describe_size(size_kb: u32) -> String {
    if size_kb == 0 {
        "auto".to_string()
    } else {
        format!("{} ({size_kb} KB)", flashmd::kb_to_size_code(size_kb))
    }
}

/// `read`: dump the ROM to `output`.
pub(crate) fn cmd_read(ctx: &Context<'_>, output: &Path, size_kb: u32, no_trim: bool) -> Result<()> {
    ctx.status(&format!(
        "{} Reading ROM into {} [size: {}]",
        style("📥").cyan(),
        output.display(),
        describe_size(size_kb)
    ));

    let bytes = with_dumper(ctx, no_trim, |dumper, config| {
        dumper.read_rom(config, output, size_kb)
    })?;
    ctx.ensure_not_interrupted()?;

    ctx.status(&format!(
        "{} ROM saved to {} ({bytes} bytes)",
        style("✓").green(),
        output.display()
    ));
    Ok(())
}

/// `write`: program the ROM from `input`.
pub(crate) fn cmd_write(ctx: &Context<'_>, input: &Path, size_kb: u32) -> Result<()> {
    if !input.is_file() {
        bail!("input file not found: {}", input.display());
    }
    ctx.status(&format!(
        "{} Writing {} to flash [size: {}]",
        style("📦").cyan(),
        input.display(),
        describe_size(size_kb)
    ));

    let bytes = with_dumper(ctx, false, |dumper, config| {
        dumper.write_rom(config, input, size_kb)
    })?;
    ctx.ensure_not_interrupted()?;

    ctx.status(&format!(
        "{} Programmed {} chunks",
        style("✓").green(),
        bytes.div_ceil(CHUNK_SIZE as u64)
    ));
    Ok(())
}

/// `erase`: exactly one of full chip, sized or single sector.
pub(crate) fn cmd_erase(
    ctx: &Context<'_>,
    all: bool,
    size_kb: Option<u32>,
    sector: Option<u32>,
) -> Result<()> {
    match (all, size_kb, sector) {
        (true, None, None) => {
            ctx.status(&format!("{} Erasing entire flash, this can take a while", style("⏳").yellow()));
            with_dumper(ctx, false, |dumper, config| dumper.erase(config, 0))?;
        },
        (false, Some(size_kb), None) => {
            ctx.status(&format!(
                "{} Erasing {}",
                style("⏳").yellow(),
                describe_size(size_kb)
            ));
            with_dumper(ctx, false, |dumper, config| dumper.erase(config, size_kb))?;
        },
        (false, None, Some(address)) => {
            ctx.status(&format!(
                "{} Erasing sector at 0x{address:06X}",
                style("⏳").yellow()
            ));
            with_dumper(ctx, false, |dumper, config| {
                dumper.erase_sector_at(config, address)
            })?;
        },
        _ => {
            return Err(CliError::Usage(
                "choose one of --all, --size KB or --sector ADDR".to_string(),
            )
            .into());
        },
    }
    ctx.ensure_not_interrupted()?;

    ctx.status(&format!("{} Flash erased", style("✓").green()));
    Ok(())
}

/// `read-sram`: back up the save RAM to `output`.
pub(crate) fn cmd_read_sram(ctx: &Context<'_>, output: &Path) -> Result<()> {
    ctx.status(&format!(
        "{} Reading save RAM into {}",
        style("📥").cyan(),
        output.display()
    ));

    let bytes = with_dumper(ctx, false, |dumper, config| dumper.read_sram(config, output))?;
    ctx.ensure_not_interrupted()?;

    ctx.status(&format!(
        "{} SRAM saved to {} ({bytes} bytes)",
        style("✓").green(),
        output.display()
    ));
    Ok(())
}

/// `write-sram`: restore the save RAM from `input`.
pub(crate) fn cmd_write_sram(ctx: &Context<'_>, input: &Path) -> Result<()> {
    if !input.is_file() {
        bail!("input file not found: {}", input.display());
    }
    ctx.status(&format!(
        "{} Writing {} to save RAM",
        style("📦").cyan(),
        input.display()
    ));

    let bytes = with_dumper(ctx, false, |dumper, config| dumper.write_sram(config, input))?;
    ctx.ensure_not_interrupted()?;

    ctx.status(&format!(
        "{} Save RAM restored from {} ({bytes} bytes)",
        style("✓").green(),
        input.display()
    ));
    Ok(())
}
