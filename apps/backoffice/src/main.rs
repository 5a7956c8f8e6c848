//! # Shopkeep Back Office Entry Point
//!
//! Headless runner for the back office state layer. Useful for checking a
//! deployment: it loads the configuration, opens the local store and talks
//! to the API exactly as the screens do.
//!
//! ## Usage
//! ```text
//! shopkeep-backoffice                     session + dashboard summary
//! shopkeep-backoffice login <user> <pw>   sign in and keep the session
//! shopkeep-backoffice logout              sign out and clear the session
//! ```
//!
//! ## Startup Sequence
//! 1. Initialize tracing (logging)
//! 2. Load configuration (TOML file, then `SHOPKEEP_*` env overrides)
//! 3. Open the database and connect the API client
//! 4. Restore the stored session
//! 5. Run the requested command

use anyhow::{bail, Context, Result};
use shopkeep_backoffice::AppContext;
use shopkeep_client::ClientConfig;
use shopkeep_core::Timeframe;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,shopkeep=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ClientConfig::load_or_default(None);
    let app = AppContext::open(config)
        .await
        .context("could not start the back office")?;
    let (signed_in, _watcher) = app.start().await.context("could not restore session")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["status"] => status(&app, signed_in).await,
        ["login", username, password] => {
            let user = app.auth.login(username, password).await?;
            info!(username = %user.username, role = ?user.role, "Signed in");
            Ok(())
        }
        ["logout"] => {
            app.auth.logout().await?;
            info!("Signed out");
            Ok(())
        }
        other => bail!("unknown command: {}", other.join(" ")),
    }
}

async fn status(app: &AppContext, signed_in: bool) -> Result<()> {
    if !signed_in {
        info!("Not signed in, run `shopkeep-backoffice login <user> <password>`");
        return Ok(());
    }
    if let Some(user) = app.auth.user().await {
        info!(username = %user.username, "Session active");
    }

    let snapshot = app.dashboard.counts(Timeframe::Month).await?;
    if snapshot.stale {
        warn!(updated_at = ?snapshot.updated_at, "Server unreachable, showing saved figures");
    }
    info!(
        suppliers = snapshot.counts.suppliers.count,
        products = snapshot.counts.products.count,
        sales = snapshot.counts.sales.count,
        revenue = %snapshot.counts.revenue.revenue,
        "Dashboard ({})",
        snapshot.timeframe
    );

    for toast in app.notifications.active() {
        info!(kind = ?toast.kind, "{}", toast.message);
    }
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=shopkeep_client=trace` - Show trace for the API client only
/// - Default: INFO, DEBUG for shopkeep crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    subscriber(filter).init();
}

fn subscriber(filter: EnvFilter) -> SubscriberBuilder<DefaultFields, Format, EnvFilter> {
    tracing_subscriber::fmt().with_env_filter(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_default_filter_is_honoured() {
        let sub = subscriber(EnvFilter::new(DEFAULT_LOG_FILTER)).finish();
        tracing::subscriber::with_default(sub, || {
            assert!(tracing::enabled!(target: "shopkeep_client::http", Level::DEBUG));
            assert!(!tracing::enabled!(target: "shopkeep_client::http", Level::TRACE));
            assert!(tracing::enabled!(target: "sqlx::query", Level::WARN));
            assert!(!tracing::enabled!(target: "sqlx::query", Level::INFO));
        });
    }
}
