use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_core::{BranchId, ChatMode, Conversation, MessageId, Persona, Role};
use chat_llm::OpenAiBackend;
use chat_loop::{describe, run_turn, TurnError, TurnEvent};
use chat_prompt::PromptOptions;
use chat_storage::{AppConfig, ChatStorage};

#[derive(Parser)]
#[command(name = "tangent")]
#[command(about = "Branching chat for OpenAI-compatible backends")]
#[command(version)]
struct Cli {
    /// Data directory (documents, indexes, config.json)
    #[arg(long, env = "TANGENT_DATA")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat on a conversation branch
    Chat {
        conversation: String,
        #[arg(long, default_value_t = 0)]
        branch: u32,
    },
    /// Send one message and stream the reply
    Send {
        conversation: String,
        message: String,
        #[arg(long, default_value_t = 0)]
        branch: u32,
    },
    /// Create a conversation for a character
    New {
        character: String,
        /// Title for the index; generated from the first message if omitted
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        first_message: Option<String>,
    },
    /// List conversations
    List,
    /// Print a branch's history
    History {
        conversation: String,
        #[arg(long, default_value_t = 0)]
        branch: u32,
    },
    /// List a conversation's branches
    Branches { conversation: String },
    /// Fork a branch at a message, producing an alternate continuation
    Fork {
        conversation: String,
        /// Message id to fork at (shown by `history`)
        message: String,
        #[arg(long, default_value_t = 0)]
        branch: u32,
    },
    /// List characters
    Characters,
    /// Create a character
    NewCharacter {
        name: String,
        #[arg(long, default_value = "")]
        instruct_prompt: String,
        #[arg(long, default_value = "")]
        greeting: String,
        /// Render as flattened text instead of structured entries
        #[arg(long)]
        chat: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .map(|dir| dir.join("tangent"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    });
    let storage = ChatStorage::new(&data_dir);
    storage.init().await.context("init data directory")?;
    log::debug!("data directory: {}", data_dir.display());

    match cli.command {
        Commands::Chat {
            conversation,
            branch,
        } => interactive_chat(&storage, &conversation, BranchId(branch)).await,
        Commands::Send {
            conversation,
            message,
            branch,
        } => send_message(&storage, &conversation, &message, BranchId(branch)).await,
        Commands::New {
            character,
            description,
            first_message,
        } => new_conversation(&storage, &character, description, first_message).await,
        Commands::List => list_conversations(&storage).await,
        Commands::History {
            conversation,
            branch,
        } => print_history(&storage, &conversation, BranchId(branch)).await,
        Commands::Branches { conversation } => print_branches(&storage, &conversation).await,
        Commands::Fork {
            conversation,
            message,
            branch,
        } => fork_branch(&storage, &conversation, &message, BranchId(branch)).await,
        Commands::Characters => list_characters(&storage).await,
        Commands::NewCharacter {
            name,
            instruct_prompt,
            greeting,
            chat,
        } => new_character(&storage, name, instruct_prompt, greeting, chat).await,
    }
}

async fn load_conversation(storage: &ChatStorage, id: &str) -> anyhow::Result<Conversation> {
    storage
        .load_conversation(id)
        .await
        .with_context(|| format!("load conversation {id}"))?
        .with_context(|| format!("conversation {id} does not exist"))
}

async fn load_persona(storage: &ChatStorage, conversation: &Conversation) -> anyhow::Result<Persona> {
    storage
        .load_character(&conversation.character)
        .await
        .with_context(|| format!("load character {}", conversation.character))?
        .with_context(|| format!("character {} does not exist", conversation.character))
}

fn backend_from(config: &AppConfig) -> OpenAiBackend {
    OpenAiBackend::new(config.api_key.clone())
        .with_base_url(config.endpoint.clone())
        .with_model(config.model.clone())
}

fn options_from(config: &AppConfig) -> PromptOptions {
    PromptOptions {
        system_as_user: config.is_user_instruct,
        ..PromptOptions::default()
    }
}

/// Stream one assistant turn, printing deltas as they arrive. The
/// conversation is mutated (the reply is committed) but not saved.
async fn stream_turn(
    conversation: &mut Conversation,
    persona: &Persona,
    options: &PromptOptions,
    backend: &OpenAiBackend,
    branch: BranchId,
) -> anyhow::Result<Option<MessageId>> {
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Delta { content, .. } => {
                    print!("{}", content.green());
                    let _ = io::stdout().flush();
                }
                TurnEvent::Error { message } => {
                    eprintln!("\n{}", format!("stream error: {message}").red());
                }
                TurnEvent::Complete { .. } => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let result = run_turn(conversation, persona, options, backend, branch, &tx, &cancel).await;

    watcher.abort();
    drop(tx);
    let _ = printer.await;
    println!();

    match result {
        Ok(message) => {
            if cancel.is_cancelled() {
                println!("{}", "(cancelled; partial reply kept)".dimmed());
            }
            Ok(Some(message))
        }
        Err(TurnError::Stream { source, partial }) => {
            eprintln!("{}", format!("❌ Stream failed: {source}").red());
            if !partial.is_empty() {
                eprintln!("{}", format!("partial reply (not kept): {partial}").dimmed());
            }
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}

async fn send_message(
    storage: &ChatStorage,
    conversation_id: &str,
    message: &str,
    branch: BranchId,
) -> anyhow::Result<()> {
    let config = storage.load_config().await.context("load config")?;
    let mut conversation = load_conversation(storage, conversation_id).await?;
    let persona = load_persona(storage, &conversation).await?;
    let backend = backend_from(&config);
    let options = options_from(&config);

    conversation.post_message(branch, Role::User, message)?;
    storage.save_conversation(conversation_id, &conversation).await?;

    println!("{}", format!("{}:", persona.names.assistant).green().bold());
    let committed = stream_turn(&mut conversation, &persona, &options, &backend, branch).await?;

    if committed.is_some() {
        storage.save_conversation(conversation_id, &conversation).await?;
    }
    Ok(())
}

async fn interactive_chat(
    storage: &ChatStorage,
    conversation_id: &str,
    branch: BranchId,
) -> anyhow::Result<()> {
    let config = storage.load_config().await.context("load config")?;
    let mut conversation = load_conversation(storage, conversation_id).await?;
    let persona = load_persona(storage, &conversation).await?;
    let backend = backend_from(&config);
    let options = options_from(&config);

    println!(
        "{}",
        format!("🤖 {} (conversation {}, branch {})", persona.name, conversation_id, branch)
            .cyan()
            .bold()
    );
    println!("{}", "Type 'exit' or 'quit' to leave".dimmed());
    println!();

    {
        let history = conversation.branch_messages(branch)?;
        if history.is_empty() && !persona.greeting.is_empty() {
            println!(
                "{} {}",
                format!("{}:", persona.names.assistant).green().bold(),
                persona.greeting
            );
        }
        for message in &history {
            print_message(&persona, message);
        }
    }

    loop {
        print!("{} ", format!("{}:", persona.names.user).cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }
        if input.is_empty() {
            continue;
        }

        conversation.post_message(branch, Role::User, input)?;
        storage.save_conversation(conversation_id, &conversation).await?;

        println!("{}", format!("{}:", persona.names.assistant).green().bold());
        let committed =
            stream_turn(&mut conversation, &persona, &options, &backend, branch).await?;

        if committed.is_some() {
            storage.save_conversation(conversation_id, &conversation).await?;
        }
        println!();
    }

    Ok(())
}

async fn new_conversation(
    storage: &ChatStorage,
    character: &str,
    description: Option<String>,
    first_message: Option<String>,
) -> anyhow::Result<()> {
    let config = storage.load_config().await.context("load config")?;
    let persona = storage
        .load_character(character)
        .await?
        .with_context(|| format!("character {character} does not exist"))?;

    let description = match (description, first_message.as_deref()) {
        (Some(given), _) => given,
        (None, Some(message)) => {
            let backend = backend_from(&config);
            match describe(&backend, &persona, &options_from(&config), message).await {
                Ok(title) if !title.is_empty() => title,
                Ok(_) => "New chat".to_string(),
                Err(error) => {
                    log::warn!("title generation failed: {error}");
                    "New chat".to_string()
                }
            }
        }
        (None, None) => "New chat".to_string(),
    };

    let id = storage
        .create_conversation(character, &description, first_message.as_deref())
        .await?;
    println!("{} {}  {}", "✅".green(), id.cyan(), description);
    Ok(())
}

async fn list_conversations(storage: &ChatStorage) -> anyhow::Result<()> {
    let index = storage.load_chat_index().await?;
    if index.is_empty() {
        println!("{}", "no conversations yet".dimmed());
        return Ok(());
    }
    for (id, description) in index {
        println!("{}  {}", id.cyan(), description);
    }
    Ok(())
}

fn print_message(persona: &Persona, message: &chat_core::Message) {
    let name = persona.names.for_role(message.role);
    let label = match message.role {
        Role::User => format!("{name}:").cyan().bold(),
        Role::Assistant => format!("{name}:").green().bold(),
        Role::System => format!("{name}:").yellow().bold(),
    };
    println!("{} {} {}", label, message.content, format!("[{}]", message.id).dimmed());
}

async fn print_history(
    storage: &ChatStorage,
    conversation_id: &str,
    branch: BranchId,
) -> anyhow::Result<()> {
    let conversation = load_conversation(storage, conversation_id).await?;
    let persona = load_persona(storage, &conversation).await?;

    for message in conversation.branch_messages(branch)? {
        print_message(&persona, message);
    }
    Ok(())
}

async fn print_branches(storage: &ChatStorage, conversation_id: &str) -> anyhow::Result<()> {
    let conversation = load_conversation(storage, conversation_id).await?;

    for id in conversation.branches.ids() {
        let branch = conversation.branches.branch(id)?;
        let source = match branch.source {
            Some(source) => format!("forked from {}", source),
            None => "root".to_string(),
        };
        println!(
            "{}  {} ({} messages)",
            id.to_string().cyan(),
            source,
            branch.messages.len()
        );
    }
    Ok(())
}

async fn fork_branch(
    storage: &ChatStorage,
    conversation_id: &str,
    message: &str,
    branch: BranchId,
) -> anyhow::Result<()> {
    let mut conversation = load_conversation(storage, conversation_id).await?;

    let at = MessageId::from(message);
    let forked = conversation.fork_at(branch, &at)?;
    storage.save_conversation(conversation_id, &conversation).await?;

    println!(
        "{} branch {} forked from {} at {}",
        "✅".green(),
        forked.to_string().cyan(),
        branch,
        message
    );
    Ok(())
}

async fn list_characters(storage: &ChatStorage) -> anyhow::Result<()> {
    let index = storage.load_character_index().await?;
    if index.is_empty() {
        println!("{}", "no characters yet".dimmed());
        return Ok(());
    }
    for (id, name) in index {
        println!("{}  {}", id.cyan(), name);
    }
    Ok(())
}

async fn new_character(
    storage: &ChatStorage,
    name: String,
    instruct_prompt: String,
    greeting: String,
    chat: bool,
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("character name must not be empty");
    }

    let mode = if chat { ChatMode::Chat } else { ChatMode::Instruct };
    let persona = Persona::new(name)
        .with_instruct_prompt(instruct_prompt)
        .with_greeting(greeting)
        .with_chat_type(mode);

    let id = storage.create_character(&persona).await?;
    println!("{} {}  {}", "✅".green(), id.cyan(), persona.name);
    Ok(())
}
