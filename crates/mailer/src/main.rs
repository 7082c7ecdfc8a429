//! `mailer` - headless mail account runner
//!
//! Loads one IMAP4 or POP3 account from a JSON description, synchronizes it
//! until interrupted with Ctrl-C and prints the folder tree it discovered.
//!
//! ```text
//! mailer [path/to/account.json]
//! ```
//!
//! Without an argument the description is read from
//! `$XDG_CONFIG_HOME/mailer/account.json` (or the platform equivalent).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod console;
mod description;
mod tree;

use std::path::PathBuf;

use anyhow::Context;
use mailer_account::requests;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::ConsoleHelper;
use description::AccountDescription;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailer=info,mailer_account=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map_or_else(AccountDescription::default_path, PathBuf::from);
    let description = AccountDescription::load(&path).await?;
    info!("Starting {} account from {}", description.kind, path.display());

    let (handle, mut requests) = requests();
    let helper = ConsoleHelper::new(
        handle.clone(),
        description.keyring_user(),
        description.remember_password,
    );
    let mut account = description.kind.create(helper);
    description.apply(account.as_mut())?;
    *account.settings_mut() = description.connection_settings();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, disconnecting");
                handle.stop();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let result = account.start(&mut requests).await;
    print!("{}", tree::render(account.mailbox()));
    account.destroy();
    result.context("account stopped with an error")
}
