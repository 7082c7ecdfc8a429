#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: list the folders of an IMAP account
//!
//! Logs in, discovers the folder tree, waits until the server is idle and
//! prints every folder with its STATUS counters.
//!
//! ## Running
//!
//! ```bash
//! cargo run --package mailer-account --example list_folders -- imap.example.com joe
//! ```
//!
//! The password is asked for on the terminal.

use std::io::{self, Write};

use mailer_account::{
    Account, AccountEvent, AccountHandle, AccountHelper, AccountStatus, Imap4, Mailbox, requests,
};

/// Stops the account as soon as the first synchronization is done.
struct StopWhenIdle {
    handle: AccountHandle,
}

impl AccountHelper for StopWhenIdle {
    fn event(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Status {
                status: AccountStatus::Idle,
                ..
            } => self.handle.stop(),
            AccountEvent::Status {
                status,
                message: Some(text),
            } => println!("{}: {}", status, text),
            _ => {}
        }
    }

    fn error(&mut self, text: &str) -> bool {
        eprintln!("error: {}", text);
        true
    }

    fn confirm(&mut self, text: &str) -> bool {
        print!("{} [y/N] ", text);
        io::stdout().flush().expect("flush stdout");
        let mut answer = String::new();
        io::stdin().read_line(&mut answer).expect("read answer");
        answer.trim().eq_ignore_ascii_case("y")
    }

    fn authenticate(&mut self, prompt: &str) -> Option<String> {
        print!("{}: ", prompt);
        io::stdout().flush().ok()?;
        let mut password = String::new();
        io::stdin().read_line(&mut password).ok()?;
        Some(password.trim().to_string())
    }
}

fn print_tree(mailbox: &Mailbox) {
    let mut stack: Vec<_> = mailbox.roots().iter().rev().map(|&id| (id, 0)).collect();
    while let Some((id, depth)) = stack.pop() {
        let Some(folder) = mailbox.folder(id) else {
            continue;
        };
        let status = folder.status();
        println!(
            "{}{} messages={:?} unseen={:?}",
            "  ".repeat(depth),
            folder.display_name(),
            status.messages,
            status.unseen
        );
        stack.extend(folder.children().iter().rev().map(|&child| (child, depth + 1)));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let hostname = args.next().expect("usage: list_folders <hostname> <username>");
    let username = args.next().expect("usage: list_folders <hostname> <username>");

    let (handle, mut requests) = requests();
    let mut account = Account::<Imap4, _>::new(StopWhenIdle { handle });
    account.config_mut().set_str("hostname", &hostname)?;
    account.config_mut().set_str("username", &username)?;
    account.config_mut().set_str("port", "993")?;
    account.config_mut().set_str("ssl", "true")?;

    account.run(&mut requests).await?;
    print_tree(account.mailbox());
    Ok(())
}
