use anyhow::{Result, bail};
use chatai_client::{
    ChatError, ChatTurn, CompletionOptions, Conversation, SessionState, Snapshot, StreamStats,
};
use colored::Colorize;
use futures::StreamExt;
use serde_json::json;
use std::future::Future;
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use super::CommandContext;
use crate::cli::{AskArgs, ChatArgs};
use crate::config::TurnSettings;
use crate::output::json::print_json;
use crate::output::render::{ReplyPrinter, print_message};

/// Final state of one streamed turn.
struct TurnOutcome {
    snapshot: Option<Snapshot>,
    state: SessionState,
    stats: StreamStats,
    error: Option<ChatError>,
}

pub async fn new_chat(ctx: &mut CommandContext) -> Result<()> {
    let chat = ctx.api.create_new_chat(ctx.store.token()).await?;
    ctx.store.set_chat_id(Some(chat.id.clone()))?;
    tracing::info!(chat_id = %chat.id, "Created chat");

    if ctx.format.is_json() {
        return print_json(&chat);
    }
    println!("{} Active chat: {}", "✓".green(), chat.id);
    Ok(())
}

pub async fn ask(ctx: &CommandContext, args: AskArgs) -> Result<()> {
    let settings = ctx.settings.turn(&args.turn);
    let turn = build_turn(&settings, Conversation::new(), args.prompt)?;

    let echo = !ctx.format.is_json();
    let outcome = stream_turn(ctx, turn, settings.options, echo).await?;

    if ctx.format.is_json() {
        print_json(&json!({
            "state": outcome.state,
            "reply": outcome
                .snapshot
                .as_ref()
                .and_then(Snapshot::assistant)
                .map(|reply| reply.content.as_str()),
            "messages": outcome.snapshot,
            "stats": outcome.stats,
        }))?;
    }

    match outcome.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

pub async fn chat(ctx: &mut CommandContext, args: ChatArgs) -> Result<()> {
    let settings = ctx.settings.turn(&args.turn);
    settings.require_model()?;

    let mut conversation = match &args.resume {
        Some(chat_id) => resume(ctx, chat_id).await?,
        None => {
            start_chat(ctx).await?;
            Conversation::new()
        }
    };

    println!(
        "{}",
        "Type a message. /new starts a new chat; /exit, Ctrl-D or Ctrl-C quits.".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".cyan().bold());
        io::stdout().flush()?;

        let Some(line) = next_prompt(&mut lines, idle_interrupt()).await? else {
            println!();
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "/exit" | "/quit" => break,
            "/new" => {
                start_chat(ctx).await?;
                conversation = Conversation::new();
                continue;
            }
            _ => {}
        }

        let turn = build_turn(&settings, conversation.clone(), prompt)?;
        let outcome = stream_turn(ctx, turn, settings.options, true).await?;

        let replied = outcome
            .snapshot
            .as_ref()
            .filter(|snapshot| snapshot.assistant().is_some());
        if let Some(snapshot) = replied {
            conversation.adopt(snapshot);
        }
        if let Some(err) = outcome.error {
            eprintln!("{} {}", "Error:".red().bold(), err);
        }
    }

    Ok(())
}

/// Next input line, or `None` at end of input or when `interrupt` fires
/// first. Reading a line is cancel safe, so no input is lost.
async fn next_prompt<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => Ok(None),
    }
}

/// Ctrl-C while waiting at the prompt. Never fires if the handler cannot be
/// installed.
async fn idle_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn start_chat(ctx: &mut CommandContext) -> Result<()> {
    let chat = ctx.api.create_new_chat(ctx.store.token()).await?;
    ctx.store.set_chat_id(Some(chat.id.clone()))?;
    println!("{}", format!("Chat {}", chat.id).dimmed());
    Ok(())
}

async fn resume(ctx: &mut CommandContext, chat_id: &str) -> Result<Conversation> {
    let chats = ctx.api.get_chat_history(ctx.store.token()).await?;
    let Some(chat) = chats.into_iter().find(|chat| chat.id == chat_id) else {
        bail!("Chat not found: {chat_id}");
    };
    ctx.store.set_chat_id(Some(chat.id.clone()))?;

    let conversation = chat.conversation();
    for message in &conversation {
        print_message(message);
    }
    Ok(conversation)
}

fn build_turn(
    settings: &TurnSettings,
    history: Conversation,
    prompt: impl Into<String>,
) -> Result<ChatTurn> {
    let model = settings.require_model()?;
    Ok(ChatTurn::new(history, prompt, model).with_system_prompt(settings.system_prompt.clone()))
}

/// Drive one session to its end. Ctrl-C cancels only this session.
async fn stream_turn(
    ctx: &CommandContext,
    turn: ChatTurn,
    options: CompletionOptions,
    echo: bool,
) -> Result<TurnOutcome> {
    let session = ctx.api.session(options);
    let credentials = ctx.store.credentials();

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut printer = ReplyPrinter::default();
    let mut stdout = io::stdout();
    let mut error = None;

    match session.send(turn, &credentials) {
        Ok(mut stream) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(snapshot) if echo => printer.update(&snapshot, &mut stdout)?,
                    Ok(_) => {}
                    Err(err) => {
                        error = Some(err);
                        break;
                    }
                }
            }
        }
        Err(err) => error = Some(err),
    }
    interrupt.abort();

    if printer.has_output() {
        println!();
    }
    if error.is_some() && printer.has_output() {
        eprintln!("{}", "(reply incomplete)".yellow());
    }

    let stats = session.stats();
    if stats.all_frames_malformed() {
        eprintln!(
            "{}",
            "Warning: the server sent no readable frames. Check server.marker_mode.".yellow()
        );
    }

    Ok(TurnOutcome {
        snapshot: session.last_snapshot(),
        state: session.state(),
        stats,
        error,
    })
}
