//! An image generation task with a caller-visible failure path.
//!
//! ```text
//! cargo run --example image_generator -- "a lighthouse at dusk"
//! cargo run --example image_generator -- "forbidden"
//! ```
//!
//! The generator is simulated: prompts containing a blocked word produce no
//! image and the action raises a [`TaskError`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use server_task::{create_task, init_logging, ErrorCode, TaskClient, TaskClientConfig, TaskError};
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
struct GenerateImage {
    prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeneratedImage {
    url: String,
}

const BLOCKED_WORDS: &[&str] = &["forbidden"];

async fn render(prompt: &str) -> Option<String> {
    tokio::time::sleep(Duration::from_millis(1500)).await;
    if BLOCKED_WORDS.iter().any(|word| prompt.contains(word)) {
        return None;
    }
    let slug: String = prompt
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    Some(format!("https://images.example.com/{slug}-512x512.png"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "a lighthouse at dusk".to_string());

    let generate_image = create_task("/api/generate-image").with_action(
        |GenerateImage { prompt }, ctx| async move {
            tracing::info!(invocation_id = %ctx.invocation_id(), %prompt, "Generating image");
            let url = render(&prompt)
                .await
                .ok_or_else(|| TaskError::new("Failed to generate image"))?;
            anyhow::Ok(GeneratedImage { url })
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app: axum::Router = generate_image.router()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = TaskClient::new(TaskClientConfig::new(Url::parse(&format!("http://{addr}"))?));
    let binding = client.bind::<GenerateImage, GeneratedImage>("/api/generate-image");

    match binding.mutate(&GenerateImage { prompt }).await {
        Ok(image) => println!("Image ready: {}", image.url),
        Err(err) if err.code() == ErrorCode::ServerError => {
            println!("Generation failed: {}", err.message())
        },
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
