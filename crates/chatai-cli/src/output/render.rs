use chatai_client::{Message, Role, Snapshot};
use colored::Colorize;
use std::io::{self, Write};

/// Prints a streamed reply incrementally. Replies only grow by appending, so
/// each snapshot contributes the text past what was already written.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    printed: usize,
}

impl ReplyPrinter {
    pub fn update(&mut self, snapshot: &Snapshot, out: &mut impl Write) -> io::Result<()> {
        match snapshot.assistant() {
            Some(reply) => self.write_reply(&reply.content, out),
            None => Ok(()),
        }
    }

    fn write_reply(&mut self, content: &str, out: &mut impl Write) -> io::Result<()> {
        let Some(fresh) = content.get(self.printed..) else {
            return Ok(());
        };
        if !fresh.is_empty() {
            out.write_all(fresh.as_bytes())?;
            out.flush()?;
        }
        self.printed = content.len();
        Ok(())
    }

    pub fn has_output(&self) -> bool {
        self.printed > 0
    }
}

pub fn role_label(role: Role) -> String {
    match role {
        Role::System => "system".dimmed().to_string(),
        Role::User => "you".cyan().bold().to_string(),
        Role::Assistant => "assistant".green().bold().to_string(),
    }
}

pub fn print_message(message: &Message) {
    println!("{}: {}", role_label(message.role), message.content);
}
