//! Hello client - connect to an agent, greet it and print its events.
//!
//! This example demonstrates:
//! - Loading `ClientConfig` from the environment
//! - Issuing a `hello` request with the default deadline
//! - Consuming the event stream until Ctrl-C
//!
//! # Running
//!
//! ```text
//! cargo run --example agent              # in one terminal
//! RIPC_PORT=9000 RUST_LOG=debug cargo run --example hello
//! ```

use ripc_client::{ClientBuilder, ClientConfig, Req};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ClientConfig::from_env()?;
    config.validate_strict()?;

    let client = ClientBuilder::from_config(&config).connect().await?;
    let mut events = Box::pin(client.events());

    let rsp = client.request(&Req::hello("agent")).await?;
    match rsp.into_result() {
        Ok(data) => println!("hello ok: {}", data.unwrap_or_default()),
        Err(e) => println!("hello rejected: {e}"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            evt = events.next() => match evt {
                Some(evt) => println!(
                    "[{}] topic={} type={} display={}",
                    evt.kind,
                    evt.topic().unwrap_or("-"),
                    evt.event_type().unwrap_or("-"),
                    evt.display().cloned().unwrap_or_default(),
                ),
                None => break,
            },
        }
    }

    client.close().await?;
    Ok(())
}
