use std::error::Error;

use chrono::DateTime;

use crate::api::ConversationListItem;
use crate::cli::chat::format_message;
use crate::core::client::ChatClient;

/// Render an RFC 3339 timestamp as `YYYY-MM-DD HH:MM UTC`, or pass it through unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.naive_utc().format("%Y-%m-%d %H:%M UTC").to_string(),
        Err(_) => raw.to_string(),
    }
}

pub fn format_conversation_line(item: &ConversationListItem) -> String {
    format!(
        "  • {}  {} [{}]  {}",
        item.id,
        item.title,
        item.ai_provider,
        format_timestamp(&item.updated_at)
    )
}

pub async fn list_conversations(client: &ChatClient) -> Result<(), Box<dyn Error>> {
    let conversations = client.conversations().await?;

    println!("💬 Conversations");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if conversations.is_empty() {
        println!("No conversations yet. Start one with `flexgpt chat`.");
        return Ok(());
    }
    for item in &conversations {
        println!("{}", format_conversation_line(item));
    }
    Ok(())
}

pub async fn show_conversation(client: &ChatClient, id: &str) -> Result<(), Box<dyn Error>> {
    let conversation = client.conversation(id).await?;

    println!("💬 {} [{}]", conversation.title, conversation.ai_provider);
    println!("   Updated: {}", format_timestamp(&conversation.updated_at));
    println!();
    for message in &conversation.messages {
        println!("{}", format_message(message));
        if let Some(files) = &message.files {
            for file in files {
                println!("    📎 {} ({})", file.name, file.mime_type);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AiProvider;

    #[test]
    fn formats_list_entries() {
        let item = ConversationListItem {
            id: "c1".to_string(),
            title: "Borrow checker".to_string(),
            ai_provider: AiProvider::Claude,
            created_at: "2024-05-01T12:00:00.000Z".to_string(),
            updated_at: "2024-05-02T08:30:15.123Z".to_string(),
        };
        assert_eq!(
            format_conversation_line(&item),
            "  • c1  Borrow checker [claude]  2024-05-02 08:30 UTC"
        );
    }

    #[test]
    fn unparseable_timestamps_pass_through() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
        assert_eq!(
            format_timestamp("2024-05-02T10:30:00+02:00"),
            "2024-05-02 08:30 UTC"
        );
    }
}
