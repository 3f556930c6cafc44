use anyhow::{Result, bail};
use comfy_table::{Cell, Table};

use super::CommandContext;
use crate::output::json::print_json;
use crate::output::render::print_message;
use crate::output::table::print_table;

const SUMMARY_WIDTH: usize = 48;

pub async fn list(ctx: &CommandContext) -> Result<()> {
    let chats = ctx.api.get_chat_history(ctx.store.token()).await?;

    if ctx.format.is_json() {
        return print_json(&chats);
    }

    if chats.is_empty() {
        println!("No chats yet");
        return Ok(());
    }

    let active = ctx.store.chat_id();
    let mut table = Table::new();
    table.set_header(vec!["#", "ID", "Summary", "Messages"]);
    for (index, chat) in chats.iter().enumerate() {
        let id = if Some(chat.id.as_str()) == active {
            format!("{} *", chat.id)
        } else {
            chat.id.clone()
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(id),
            Cell::new(summarize(chat.summary.as_deref().unwrap_or("-"))),
            Cell::new(chat.messages.len()),
        ]);
    }

    print_table(table)
}

pub async fn show(ctx: &mut CommandContext, chat_id: &str) -> Result<()> {
    let chats = ctx.api.get_chat_history(ctx.store.token()).await?;
    let Some(chat) = chats.into_iter().find(|chat| chat.id == chat_id) else {
        bail!("Chat not found: {chat_id}");
    };

    ctx.store.set_chat_id(Some(chat.id.clone()))?;
    let conversation = chat.conversation();

    if ctx.format.is_json() {
        return print_json(&conversation);
    }

    for message in &conversation {
        print_message(message);
    }
    Ok(())
}

fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_WIDTH {
        return text.to_string();
    }
    let mut short: String = text.chars().take(SUMMARY_WIDTH - 3).collect();
    short.push_str("...");
    short
}
