use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audit_watch::{Config, Runner, Scheduler};

/// DART audit-report monitor with Telegram notifications
#[derive(Parser, Debug)]
#[command(name = "audit-watch", version, about)]
struct Cli {
    /// Check configuration, watch-list, DART and Telegram, then exit
    #[arg(long, conflicts_with_all = ["reset_state", "watch"])]
    test: bool,

    /// Forget every announced filing (asks for confirmation)
    #[arg(long, conflicts_with = "watch")]
    reset_state: bool,

    /// Keep running every CHECK_INTERVAL_MINUTES until Ctrl-C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("audit_watch=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.log_summary();

    let interval = config.check_interval();
    let mut runner = Runner::from_config(config).context("Failed to initialize runner")?;

    if cli.test {
        info!("Running connection checks");
        if runner.test_setup().await {
            println!("✅ All checks passed");
            return Ok(());
        }
        eprintln!("❌ One or more checks failed");
        std::process::exit(1);
    }

    if cli.reset_state {
        if !confirm_reset()? {
            println!("Reset cancelled");
            return Ok(());
        }
        runner.reset_state().context("Failed to reset state")?;
        println!("✅ State reset");
        return Ok(());
    }

    if cli.watch {
        let scheduler = Scheduler::new(runner, interval);
        scheduler
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        info!("Stopped");
        return Ok(());
    }

    let stats = runner.run_once().await;
    println!(
        "📊 entities={} fetched={} audit={} new={} sent={} errors={}",
        stats.entities_watched,
        stats.disclosures_fetched,
        stats.audit_reports,
        stats.disclosures_new,
        stats.notifications_sent,
        stats.error_count
    );

    if let Some(fault) = stats.fault {
        eprintln!("❌ Run aborted: {}", fault);
        std::process::exit(1);
    }

    Ok(())
}

fn confirm_reset() -> Result<bool> {
    print!("⚠️  This deletes every announced-filing record. Type 'yes' to continue: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
