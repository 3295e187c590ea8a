//! Live depth ladder - streams a reconciled order book to the terminal
//!
//! Usage:
//!   DEPTH_LADDER_API_TOKEN=xxx cargo run --example live_depth
//!
//! Optional:
//!   DEPTH_LADDER_WS_URL=wss://...   # Override the feed endpoint
//!   DEPTH_LADDER_ENV=testnet        # Use the testnet feed (default: production)
//!   DEPTH_LADDER_SYMBOL=ETH-USD     # Instrument (default: BTC-USD)

use std::cell::RefCell;
use std::rc::Rc;

use depth_ladder::client::{ReconnectConfig, ReconnectingWebSocket};
use depth_ladder::config::Environment;
use depth_ladder::orderbook::{OrderBook, OrderBookProvider, SessionState};
use depth_ladder::types::Instrument;
use depth_ladder::{Config, Error};

const ROWS: usize = 8;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depth_ladder=info".parse()?),
        )
        .init();

    let mut config = Config::from_env()?;
    if std::env::var("DEPTH_LADDER_ENV").unwrap_or_default().eq_ignore_ascii_case("testnet") {
        config = config.with_environment(Environment::Testnet);
    }

    let symbol = std::env::var("DEPTH_LADDER_SYMBOL").unwrap_or_else(|_| "BTC-USD".to_string());
    let instrument = match symbol.split_once('-') {
        Some((base, quote)) => Instrument::new(&symbol, base, quote, 4),
        None => Instrument::default(),
    };

    println!("=== Live Depth: {} ===\n", instrument.code);
    println!("Connecting to {}...", config.websocket_url());

    let mut ws = ReconnectingWebSocket::connect(config, ReconnectConfig::default()).await?;
    let provider = OrderBookProvider::new(ws.transport());

    let book = Rc::new(RefCell::new(OrderBook::new()));
    let store = Rc::clone(&book);
    let _sub = provider.subscribe(&instrument.code, move |update| {
        let previous = store.take();
        *store.borrow_mut() = update.apply(previous);
    })?;

    while let Some(event) = ws.next().await {
        match event.and_then(|ev| provider.dispatch(ev)) {
            Ok(true) => render(&book.borrow(), &instrument),
            Ok(false) => {}
            Err(e @ (Error::SequenceGap { .. } | Error::SymbolMismatch { .. })) => {
                println!("{} (book stale until resync)", e);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        if provider.state(&instrument.code) == SessionState::AwaitingSnapshot {
            println!("-- awaiting full book --");
        }
    }

    ws.close().await?;
    Ok(())
}

fn render(book: &OrderBook, instrument: &Instrument) {
    println!(
        "{:>14} {:>14} {:>14} {:>8}",
        format!("price {}", instrument.currency),
        format!("size {}", instrument.base_asset),
        "total",
        "%"
    );

    // asks are shown price-descending, so the nearest ones are at the end
    let asks = book.asks().rows().collect::<Vec<_>>();
    for row in asks.iter().skip(asks.len().saturating_sub(ROWS)) {
        println!(
            "{:>14} {:>14} {:>14} {:>8}",
            instrument.format(row.price),
            instrument.format(row.quantity),
            instrument.format(row.cumulative_depth),
            row.cumulative_depth_share.round_dp(1)
        );
    }

    match (book.spread(), book.mid_price()) {
        (Some(spread), Some(mid)) => println!(
            "{:-^60}",
            format!(" mid {} spread {} ", instrument.format(mid), instrument.format(spread))
        ),
        _ => println!("{:-^60}", ""),
    }

    for row in book.bids().top(ROWS) {
        println!(
            "{:>14} {:>14} {:>14} {:>8}",
            instrument.format(row.price),
            instrument.format(row.quantity),
            instrument.format(row.cumulative_depth),
            row.cumulative_depth_share.round_dp(1)
        );
    }
    println!();
}
