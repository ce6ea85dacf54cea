use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::{AiProvider, Message, Role};
use crate::core::chat_stream::{Attachment, ChatStreamService, StreamMessage, StreamParams};
use crate::core::client::ChatClient;
use crate::core::conversation::{ConversationStore, StoreEffect, MAX_MESSAGES};

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Quit,
    NewChat,
    Provider(Option<String>),
    Attach(Option<String>),
    Help,
    Send(String),
    Empty,
}

pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return ChatInput::Send(trimmed.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string())),
        None => (command, None),
    };
    match name {
        "quit" | "exit" | "q" => ChatInput::Quit,
        "new" => ChatInput::NewChat,
        "provider" => ChatInput::Provider(arg.filter(|a| !a.is_empty())),
        "attach" => ChatInput::Attach(arg.filter(|a| !a.is_empty())),
        "help" => ChatInput::Help,
        // Unknown slash commands are sent as ordinary text.
        _ => ChatInput::Send(trimmed.to_string()),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new              start a new conversation");
    println!("  /provider [name]  show or switch provider (claude, gemini, deepseek)");
    println!("  /attach [path]    attach a file to the next message, or list attached files");
    println!("  /quit             leave the chat");
}

pub fn format_message(message: &Message) -> String {
    match (message.role, message.is_error()) {
        (Role::User, _) => format!("you> {}", message.content),
        (Role::Assistant, true) => format!("⚠️  {}", message.content),
        (Role::Assistant, false) => match message.provider {
            Some(provider) => format!("{provider}> {}", message.content),
            None => format!("assistant> {}", message.content),
        },
    }
}

/// The error entry the store recorded, which names the provider it switched to.
pub fn error_notice(store: &ConversationStore) -> Option<String> {
    store
        .messages
        .last()
        .filter(|message| message.is_error())
        .map(format_message)
}

struct ChatSession {
    client: ChatClient,
    store: ConversationStore,
    service: ChatStreamService,
    rx: mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    stream_id: u64,
    staged: Vec<Attachment>,
}

impl ChatSession {
    fn new(client: ChatClient, provider: AiProvider) -> Self {
        let (service, rx) = ChatStreamService::new();
        Self {
            client,
            store: ConversationStore::new(provider),
            service,
            rx,
            stream_id: 0,
            staged: Vec::new(),
        }
    }

    async fn refresh_providers(&mut self) {
        match self.client.providers_status().await {
            Ok(statuses) => {
                if let Some(switched) = self.store.apply_providers_status(statuses) {
                    eprintln!("ℹ️  Selected provider is unavailable, using {switched}");
                }
            }
            Err(err) => warn!(error = %err, "failed to check providers"),
        }
    }

    async fn refresh_conversations(&mut self) {
        match self.client.conversations().await {
            Ok(conversations) => self.store.set_conversations(conversations),
            Err(err) => warn!(error = %err, "failed to load conversations"),
        }
    }

    async fn open_conversation(&mut self, id: &str) -> Result<(), Box<dyn Error>> {
        let conversation = self.client.conversation(id).await?;
        println!("— {} ({})", conversation.title, conversation.ai_provider);
        self.store.select_conversation(conversation);
        for message in &self.store.messages {
            println!("{}", format_message(message));
        }
        Ok(())
    }

    async fn attach(&mut self, path: &Path) {
        match Attachment::from_path(path).await {
            Ok(attachment) => {
                eprintln!("📎 {} ({})", attachment.name, attachment.mime_type);
                self.staged.push(attachment);
            }
            Err(err) => eprintln!("⚠️  Failed to read {}: {err}", path.display()),
        }
    }

    fn list_staged(&self) {
        if self.staged.is_empty() {
            eprintln!("No files attached");
        }
        for attachment in &self.staged {
            eprintln!("📎 {} ({})", attachment.name, attachment.mime_type);
        }
    }

    async fn send(&mut self, text: &str) {
        if self.store.is_limit_reached() {
            eprintln!(
                "⚠️  This conversation reached {MAX_MESSAGES} messages. Use /new to continue."
            );
            return;
        }

        let Some(pending) = self.store.begin_send(text, &self.staged) else {
            return;
        };
        let attachments = std::mem::take(&mut self.staged);

        self.stream_id += 1;
        let stream_id = self.stream_id;
        let request = self.client.stream_request(
            pending.provider,
            &pending.content,
            pending.conversation_id.as_deref(),
            attachments,
        );
        self.service.spawn_stream(StreamParams {
            client: self.client.http().clone(),
            request,
            cancel_token: CancellationToken::new(),
            stream_id,
        });

        print!("{}> ", pending.provider);
        let _ = io::stdout().flush();

        while let Some((message, id)) = self.rx.recv().await {
            if id != stream_id {
                continue;
            }
            let is_end = message == StreamMessage::End;
            let is_error = matches!(message, StreamMessage::Error(_));
            match &message {
                StreamMessage::Chunk(text) => {
                    print!("{text}");
                    let _ = io::stdout().flush();
                }
                StreamMessage::Done | StreamMessage::Error(_) => println!(),
                StreamMessage::Meta(_) | StreamMessage::End => {}
            }

            let was_streaming = self.store.is_streaming;
            if self.store.apply_stream_message(message) == StoreEffect::RefreshConversations {
                self.refresh_conversations().await;
            }
            if is_error {
                if let Some(notice) = error_notice(&self.store) {
                    eprintln!("{notice}");
                }
            }
            if is_end {
                if was_streaming {
                    println!();
                    eprintln!("⚠️  Response ended early");
                }
                break;
            }
        }

        if self.store.is_near_limit() {
            eprintln!(
                "ℹ️  {} messages left in this conversation",
                self.store.messages_remaining()
            );
        }
    }
}

pub async fn run_chat(
    client: ChatClient,
    provider: AiProvider,
    conversation_id: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::new(client, provider);
    session.refresh_providers().await;
    session.refresh_conversations().await;
    if let Some(id) = conversation_id {
        session.open_conversation(&id).await?;
    }

    eprintln!(
        "Chatting with {}. Type /help for commands.",
        session.store.selected_provider
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            ChatInput::Quit => break,
            ChatInput::Empty => {}
            ChatInput::Help => print_help(),
            ChatInput::NewChat => {
                session.store.start_new_chat();
                eprintln!("Started a new conversation");
            }
            ChatInput::Provider(None) => {
                let current = session.store.selected_provider;
                let status = session.store.provider_status(current);
                match status.error {
                    Some(error) if !status.available => {
                        println!("{current} (unavailable: {error})")
                    }
                    _ => println!("{current}"),
                }
            }
            ChatInput::Provider(Some(name)) => match name.parse::<AiProvider>() {
                Ok(provider) => {
                    session.store.set_provider(provider);
                    eprintln!("Switched to {provider}");
                }
                Err(err) => eprintln!("{err}"),
            },
            ChatInput::Attach(Some(path)) => session.attach(Path::new(&path)).await,
            ChatInput::Attach(None) => session.list_staged(),
            ChatInput::Send(text) => session.send(&text).await,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::create_test_message;

    #[test]
    fn stream_error_notice_names_the_fallback_provider() {
        let mut store = ConversationStore::new(AiProvider::Gemini);
        store.begin_send("hi", &[]).expect("message accepted");
        assert_eq!(error_notice(&store), None);

        store.apply_stream_message(StreamMessage::Error("quota exceeded".to_string()));
        assert_eq!(
            error_notice(&store).as_deref(),
            Some("⚠️  Error: quota exceeded. gemini is having trouble, switching to claude.")
        );
        assert_eq!(store.selected_provider, AiProvider::Claude);
    }

    #[tokio::test]
    async fn attached_files_go_out_with_the_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let client = ChatClient::new(reqwest::Client::new(), "http://127.0.0.1:9/api", None);
        let mut session = ChatSession::new(client, AiProvider::Gemini);
        session.attach(&path).await;
        session.attach(&dir.path().join("missing.txt")).await;

        assert_eq!(session.staged.len(), 1);
        assert_eq!(session.staged[0].mime_type, "image/png");

        let pending = session.store.begin_send("what is this?", &session.staged);
        assert!(pending.is_some());
        let files = session.store.messages[0].files.as_ref().unwrap();
        assert_eq!(files[0].name, "plot.png");
    }

    #[test]
    fn parses_commands_and_text() {
        assert_eq!(parse_input("   "), ChatInput::Empty);
        assert_eq!(parse_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_input("/new"), ChatInput::NewChat);
        assert_eq!(parse_input("/provider"), ChatInput::Provider(None));
        assert_eq!(
            parse_input("/provider  claude "),
            ChatInput::Provider(Some("claude".to_string()))
        );
        assert_eq!(
            parse_input("/attach  ./diagram.png "),
            ChatInput::Attach(Some("./diagram.png".to_string()))
        );
        assert_eq!(parse_input("/attach"), ChatInput::Attach(None));
        assert_eq!(
            parse_input("  what is rust?  "),
            ChatInput::Send("what is rust?".to_string())
        );
        assert_eq!(
            parse_input("/etc/hosts looks odd"),
            ChatInput::Send("/etc/hosts looks odd".to_string())
        );
    }

    #[test]
    fn formats_messages_by_role() {
        let user = create_test_message(Role::User, "hi");
        assert_eq!(format_message(&user), "you> hi");

        let reply = create_test_message(Role::Assistant, "hello");
        assert_eq!(format_message(&reply), "gemini> hello");

        let mut error = create_test_message(Role::Assistant, "boom");
        error.is_error = Some(true);
        assert_eq!(format_message(&error), "⚠️  boom");
    }
}
