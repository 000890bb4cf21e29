use openrouter::{ChatRequest, Client, ClientOptions, Message, StreamEvent};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt::init();

    let client = Client::new(ClientOptions::from_env()?.with_title("openrouter streaming demo"))?;

    let request = ChatRequest::new(
        "openai/gpt-4o-mini",
        vec![
            Message::system("You are a concise assistant."),
            Message::user("Explain backpressure in two sentences."),
        ],
    );

    println!("curl equivalent:\n{}\n", client.debug_curl(&request));

    let mut reader = client.chat().create_stream(request).await?;
    loop {
        match reader.next().await? {
            StreamEvent::Chunk(chunk) => {
                if let Some(text) = chunk.delta_text() {
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
            }
            StreamEvent::Done(usage) => {
                println!();
                if let Some(usage) = usage {
                    println!(
                        "tokens: {} prompt, {} completion",
                        usage.prompt_tokens, usage.completion_tokens
                    );
                }
                break;
            }
        }
    }

    Ok(())
}
