use dotenv::dotenv;
use farmsmart::*;
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

fn print_replies(turn: &ChatTurn) {
    for reply in turn.replies() {
        println!("\n{}", reply.content);
        if let Some(analytics) = &reply.analytics {
            println!("\n📊 Chart data:");
            for ((name, profit), revenue) in analytics
                .tillage_names
                .iter()
                .zip(&analytics.profits)
                .zip(&analytics.revenue)
            {
                println!("  {:<50} profit ${:>8.0}  revenue ${:>8.0}", name, profit, revenue);
            }
            println!("  Projected: {:?}", analytics.projected_profits);
            println!("  Break-even: ${:.0}", analytics.break_even_point);
        }
    }
    if let Some(error) = &turn.error {
        eprintln!("\n⚠️  {}", error);
    }
    println!("------------------------------------------------------------------");
}

/// `/image <path> <question>` attaches a local photo to the message.
async fn parse_input(line: &str) -> Result<(String, Option<String>), Box<dyn Error>> {
    match line.strip_prefix("/image ") {
        Some(rest) => {
            let (path, text) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            let image = image_data_url(Path::new(path)).await?;
            let text = if text.trim().is_empty() {
                "What do you see in this photo?"
            } else {
                text.trim()
            };
            Ok((text.to_string(), Some(image)))
        }
        None => Ok((line.to_string(), None)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let config = FarmSmartConfig::load()?;
    let user_id = std::env::var("FARMSMART_USER").unwrap_or_else(|_| "demo-farmer".to_string());

    println!("🌾 Starting FarmSmart chat for {}...\n", user_id);

    let store = Arc::new(JsonFileStore::open(&config.persistence.data_dir).await?);
    let deps = ChatDependencies {
        client: Arc::new(OpenAiClient::new(&config.completion)?),
        conversations: store.clone(),
        values: store,
        config,
    };

    let mut session = ChatSession::open(deps, user_id, None).await?;
    for message in &session.conversation().messages {
        println!("{}", message.content);
    }
    println!("\n(type 'quit' to exit, '/image <path> <question>' to send a photo)");
    println!("------------------------------------------------------------------");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let line = input.trim();

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        if line.is_empty() {
            continue;
        }

        let (text, image) = match parse_input(line).await {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("❌ Error: {}", e);
                continue;
            }
        };

        println!("\nThinking...");

        match session.send(&text, image).await {
            Ok(turn) => print_replies(&turn),
            Err(e) => eprintln!("❌ Error: {}", e),
        }
    }

    if session.pending_writes() > 0 {
        eprintln!("⚠️  {} changes could not be saved.", session.pending_writes());
    }

    Ok(())
}
