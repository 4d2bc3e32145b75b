//! Single-packet diagnostic commands.

use anyhow::Result;
use console::style;

use super::{Context, with_dumper};

/// `connect`: handshake with the dumper.
pub(crate) fn cmd_connect(ctx: &Context<'_>) -> Result<()> {
    with_dumper(ctx, false, |dumper, config| dumper.connect(config))?;
    ctx.status(&format!("{} Dumper connected", style("✓").green()));
    Ok(())
}

/// `id`: print the flash chip identification.
pub(crate) fn cmd_id(ctx: &Context<'_>) -> Result<()> {
    let id = with_dumper(ctx, false, |dumper, config| dumper.check_id(config))?;
    let id = id.trim();
    if id.is_empty() {
        ctx.status(&format!("{} Dumper sent no chip ID", style("!").yellow()));
    } else {
        println!("{id}");
    }
    Ok(())
}

/// `clear`: flush the dumper's receive buffer.
pub(crate) fn cmd_clear(ctx: &Context<'_>) -> Result<()> {
    with_dumper(ctx, false, |dumper, config| dumper.clear_buffer(config))?;
    ctx.status(&format!("{} Buffer cleared", style("✓").green()));
    Ok(())
}
