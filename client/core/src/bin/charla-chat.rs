//! Charla Terminal Chat
//!
//! Minimal line-based driver for the Charla client core: signs in, picks or
//! creates a conversation, and streams model replies to stdout as they
//! arrive.
//!
//! # Usage
//!
//! ```bash
//! # Credentials from the environment
//! CHARLA_EMAIL=ana@example.com CHARLA_PASSWORD=secret charla-chat
//!
//! # Against a non-default backend
//! CHARLA_BASE_URL=https://charla.example.com/api charla-chat
//!
//! # With verbose logging
//! RUST_LOG=debug charla-chat
//! ```
//!
//! # Environment Variables
//!
//! - `CHARLA_BASE_URL`: Backend base URL (default: `http://localhost:8000`)
//! - `CHARLA_EMAIL` / `CHARLA_PASSWORD`: Credentials (prompted if unset)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use charla_client::{
    default_prompt, load_config, ApiClient, ChatClient, Conversation, LoginOutcome, SessionEvent,
    SessionHandle,
};

/// Read one trimmed line from stdin, prompting first.
async fn prompt_line(
    prompt: &str,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow::anyhow!("stdin closed"))?;
    Ok(line.trim().to_string())
}

/// Pick the most recently updated conversation, or create one.
async fn pick_conversation(api: &ApiClient) -> anyhow::Result<Conversation> {
    let mut conversations = api.conversations().await?;
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    match conversations.into_iter().next() {
        Some(conversation) => {
            info!(id = conversation.id, title = %conversation.title, "resuming conversation");
            Ok(conversation)
        }
        None => {
            let conversation = api.create_conversation("").await?;
            info!(id = conversation.id, "created conversation");
            Ok(conversation)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("charla_client=info".parse()?)
                .add_directive("charla_chat=info".parse()?),
        )
        .with_target(false)
        .init();

    let config = load_config()?;
    info!(base_url = %config.base_url, "connecting");

    let (session, mut events) = SessionHandle::new();
    let api = ApiClient::new(&config, session.clone())?;
    let client = ChatClient::new(api.clone(), session.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Sign in, finishing the 2FA challenge when the account has one.
    let email = match std::env::var("CHARLA_EMAIL") {
        Ok(email) => email,
        Err(_) => prompt_line("email: ", &mut lines).await?,
    };
    let password = match std::env::var("CHARLA_PASSWORD") {
        Ok(password) => password,
        Err(_) => prompt_line("password: ", &mut lines).await?,
    };

    match api.login(&email, &password).await? {
        LoginOutcome::SignedIn(_) => {}
        LoginOutcome::NeedsSecondFactor { session_token } => {
            let code = prompt_line("totp code: ", &mut lines).await?;
            api.verify_2fa(&session_token, &code).await?;
        }
    }

    let Some(user) = client.check_auth().await? else {
        anyhow::bail!("session not established after login");
    };
    println!("signed in as {}", user.email);

    // Default system prompt preset, when the backend has one flagged.
    let prompts = api.prompts(50, 0).await.unwrap_or_default();
    let preset = default_prompt(&prompts).cloned();
    if let Some(ref preset) = preset {
        println!("using system prompt preset: {}", preset.name);
    }

    let conversation = pick_conversation(&api).await?;
    let mut chat = client.open_conversation(conversation.id);

    for message in chat.list_messages().await? {
        println!("[{:?}] {}", message.role, message.content);
    }

    println!("type a message, or an empty line to quit");
    loop {
        let line = prompt_line("> ", &mut lines).await?;
        if line.is_empty() {
            break;
        }

        let system = preset.as_ref().map(|p| p.content.as_str());
        let prompt_id = preset.as_ref().map(|p| p.id);

        let result = chat
            .send(&line, system, prompt_id, |chunk| {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();

        match result {
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "send failed");
                let mut expired = false;
                while let Ok(event) = events.try_recv() {
                    expired = expired || matches!(event, SessionEvent::Expired);
                }
                if expired {
                    println!("session expired, please sign in again");
                    break;
                }
            }
        }
    }

    client.logout().await;
    println!("signed out");
    Ok(())
}
