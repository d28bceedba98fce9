//! A seller dashboard, minus the UI.
//!
//! Two "components" (an order list and a notification badge) share one
//! realtime connection. The badge unmounts after a while, the order list
//! stays until Ctrl-C, which logs the seller out.
//!
//! ```text
//! MARKETLINK_ENDPOINT=http://127.0.0.1:5000 MARKETLINK_TOKEN=... \
//!     cargo run -p order-feed [config.json]
//! ```

use std::time::Duration;

use marketlink::prelude::*;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewOrder {
    order_id: String,
    #[serde(default)]
    total_cents: u64,
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

fn order_list_handlers() -> EventHandlers {
    EventHandlers::new()
        .on_connect(|| tracing::info!("order list: live"))
        .on_disconnect(|reason| tracing::warn!(%reason, "order list: offline"))
        .on_error(|err| tracing::error!(%err, "order list: realtime error"))
        .on_event(|name, data| {
            if name != "order:new" {
                return;
            }
            match serde_json::from_value::<NewOrder>(data.clone()) {
                Ok(order) => tracing::info!(
                    order_id = %order.order_id,
                    total_cents = order.total_cents,
                    "new order"
                ),
                Err(e) => tracing::warn!(error = %e, "malformed order payload"),
            }
        })
}

fn badge_handlers() -> EventHandlers {
    // Only the creating component's handlers are registered, so this
    // on_connect is all the badge hears when it reuses the connection.
    EventHandlers::new().on_connect(|| tracing::info!("badge: live"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    marketlink::init_tracing();

    let builder = match std::env::args().nth(1) {
        Some(path) => MarketlinkClientBuilder::from_file(path)?,
        None => MarketlinkClient::builder().endpoint(
            &std::env::var("MARKETLINK_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".into()),
        ),
    };
    let client = builder.build();

    let credentials = Credentials::new(
        std::env::var("MARKETLINK_TOKEN").unwrap_or_else(|_| "demo-token".into()),
        std::env::var("MARKETLINK_USER").unwrap_or_else(|_| "seller-1".into()),
        Role::Seller,
    );

    // Order list mounts first and creates the connection.
    let (_list_ticket, list) = client
        .activate(credentials.clone(), order_list_handlers())
        .await;
    if tokio::time::timeout(
        Duration::from_secs(5),
        list.wait_for(ConnectionStatus::Connected),
    )
    .await
    .is_err()
    {
        tracing::warn!("not connected yet, continuing; events are queued");
    }

    // Badge mounts and reuses it.
    let (badge_ticket, badge) = client
        .activate(credentials.clone(), badge_handlers())
        .await;
    tracing::info!(same = list.id() == badge.id(), "badge mounted");

    if let Err(e) = list.emit("seller:online", &true) {
        tracing::warn!(error = %e, "could not announce presence");
    }

    // Badge unmounts. The order list mounted earlier, so under the
    // default policy it does not keep the connection alive by itself.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let torn_down = client.deactivate(badge_ticket).await?;
    tracing::info!(torn_down, "badge unmounted");

    if torn_down {
        let (_ticket, list) = client
            .activate(credentials, order_list_handlers())
            .await;
        tracing::info!(id = %list.id(), "order list reconnected");
    }

    tokio::signal::ctrl_c().await?;
    client.force_disconnect().await;
    tracing::info!("logged out");
    Ok(())
}
