//! Serves a task that takes two seconds to say hello, then calls it.
//!
//! Run with `RUST_LOG=debug cargo run --example hello_world` to see every
//! heartbeat.

use std::time::Duration;

use server_task::{create_task, init_logging, TaskClient, TaskClientConfig};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let hello = create_task("/api/task").with_action(|(): (), _ctx| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        anyhow::Ok("Hello World!".to_string())
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app: axum::Router = hello.router()?;
    tokio::spawn(async move { axum::serve(listener, app).await });
    tracing::info!(%addr, "Serving /api/task");

    let client = TaskClient::new(TaskClientConfig::new(Url::parse(&format!("http://{addr}"))?));
    let binding = client.bind::<(), String>("/api/task");

    let greeting = binding.mutate(&()).await?;
    println!("{greeting}");
    Ok(())
}
