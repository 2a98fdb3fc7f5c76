//! Health command implementation.

use anyhow::{bail, Result};
use colored::Colorize;
use tracing::info;

use super::Context;

/// Execute the health command.
pub async fn execute(ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let api_base = session.config().api_base.clone();
    ctx.progress(format!("Checking {api_base}"));

    let status = session
        .check_health(|attempt, err| {
            ctx.progress(format!(
                "Backend not answering ({}), retrying (attempt {attempt})",
                err.user_message()
            ));
        })
        .await;

    match status {
        sunprint_core::HealthStatus::Online { attempts } => {
            info!(attempts, "Backend online");
            println!("{} {}", "online".green().bold(), api_base);
            println!(
                "   {} {}",
                "Storefront:".dimmed(),
                session.config().store_domain
            );
            Ok(())
        }
        sunprint_core::HealthStatus::Offline { attempts } => {
            println!("{} {}", "offline".red().bold(), api_base);
            bail!(sunprint_core::SunprintError::unreachable(format!(
                "no answer after {attempts} attempts"
            )))
        }
    }
}
