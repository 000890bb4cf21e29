use openrouter::{Client, ClientOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = Client::new(ClientOptions::from_env()?)?;
    let models = client.models();

    let all = models.list().await?;
    println!("{} models available", all.len());

    if let Some(model) = models.cheapest().await? {
        println!("cheapest: {} ({})", model.id, model.name);
    }

    for model in models.supports_vision().await?.iter().take(5) {
        println!("vision: {} ({} tokens)", model.id, model.context_length);
    }

    let cost = client.estimate_cost("openai/gpt-4o-mini", 10_000, 1_000).await?;
    println!("10k in / 1k out on openai/gpt-4o-mini: ${cost:.6}");

    Ok(())
}
