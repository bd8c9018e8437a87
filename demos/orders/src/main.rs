//! Order desk example.
//!
//! Three applications share one page:
//! - `shell` owns the navigation bar and routes everything
//! - `orders` edits an order and refuses to be left with unsaved changes
//! - `cart` only lets signed-in users reach checkout
//!
//! Run:
//!   cargo run -p concord-example-orders -- --order 42
//!   cargo run -p concord-example-orders -- --order 42 --dirty --signed-in

use concord_core::{CoordinationConfig, GuardResult, NavigationOutcome, RouteConfig, guard_fn};
use concord_host::{Bus, HostDocument, Participant};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("concord_core=debug".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let order = parse_arg(&args, "--order").unwrap_or(1);
    let dirty = Arc::new(AtomicBool::new(has_flag(&args, "--dirty")));
    let signed_in = has_flag(&args, "--signed-in");

    let document = HostDocument::new();
    let bus = Bus::new();
    let config = CoordinationConfig::default();

    let shell = Participant::mount(
        "shell",
        &document,
        &bus,
        vec![RouteConfig::new("/**")],
        config.clone(),
    )?;

    let unsaved = dirty.clone();
    let orders = Participant::mount(
        "orders",
        &document,
        &bus,
        vec![
            RouteConfig::new("/orders/:id").with_deactivation_guard(guard_fn(move |ctx| {
                let dirty = unsaved.load(Ordering::SeqCst);
                async move {
                    if dirty {
                        tracing::info!("order {} has unsaved changes", ctx.route.url);
                    }
                    Ok(GuardResult::from(!dirty))
                }
            })),
            RouteConfig::new("/**"),
        ],
        config.clone(),
    )?;

    let cart = Participant::mount(
        "cart",
        &document,
        &bus,
        vec![
            RouteConfig::new("/checkout").with_activation_guard(guard_fn(move |_| async move {
                if signed_in {
                    Ok(GuardResult::Allow)
                } else {
                    Ok(GuardResult::redirect("/login"))
                }
            })),
            RouteConfig::new("/**"),
        ],
        config,
    )?;

    let order_url = format!("/orders/{order}");
    let steps = [
        (&shell, order_url.as_str()),
        (&shell, "/checkout"),
        (&cart, "/checkout"),
    ];

    for (participant, url) in steps {
        let result = participant.navigate(url).await;
        let outcome = match &result {
            Ok(outcome) => serde_json::to_string(outcome)?,
            Err(e) => format!("error: {e}"),
        };
        tracing::info!(
            "{} -> {}: {} (page at {:?})",
            participant.name(),
            url,
            outcome,
            document.location()
        );

        let cancelled = matches!(result, Ok(NavigationOutcome::Cancelled { .. }));
        if cancelled && dirty.swap(false, Ordering::SeqCst) {
            tracing::info!("orders saved its changes");
        }
    }

    for p in [&shell, &orders, &cart] {
        tracing::info!("{} is at {:?}", p.name(), p.router().current_url());
    }
    Ok(())
}

fn parse_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
