//! Text rendering of the synchronized folder tree.

use std::fmt::Write;

use mailer_account::{FolderId, Mailbox};

/// Renders every folder with its counters and the subjects of its messages.
pub fn render(mailbox: &Mailbox) -> String {
    let mut out = String::new();
    for &root in mailbox.roots() {
        render_folder(mailbox, root, 0, &mut out);
    }
    out
}

fn render_folder(mailbox: &Mailbox, id: FolderId, depth: usize, out: &mut String) {
    let Some(folder) = mailbox.folder(id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    let status = folder.status();
    let _ = write!(out, "{indent}{} ({})", folder.display_name(), folder.kind());
    if let Some(messages) = status.messages {
        let _ = write!(out, " {messages} messages");
    }
    if let Some(unseen) = status.unseen {
        let _ = write!(out, ", {unseen} unseen");
    }
    out.push('\n');

    for &message in folder.messages() {
        let Some(message) = mailbox.message(message) else {
            continue;
        };
        let subject = message
            .headers()
            .iter()
            .find_map(|header| {
                let (name, value) = header.split_once(':')?;
                name.eq_ignore_ascii_case("subject").then_some(value.trim())
            })
            .unwrap_or("(no subject)");
        let _ = writeln!(out, "{indent}  #{} {subject}", message.server_id());
    }

    for &child in folder.children() {
        render_folder(mailbox, child, depth + 1, out);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use mailer_account::{FolderStatus, NoopHelper};

    #[test]
    fn test_render_tree() {
        let mut helper = NoopHelper;
        let mut mailbox = Mailbox::new();
        let inbox = mailbox
            .folder_get_or_create(&mut helper, None, "INBOX", Some('/'))
            .unwrap();
        let lists = mailbox
            .folder_get_or_create(&mut helper, None, "Lists", Some('/'))
            .unwrap();
        mailbox
            .folder_get_or_create(&mut helper, Some(lists), "Lists/rust", Some('/'))
            .unwrap();
        let status = FolderStatus {
            messages: Some(2),
            unseen: Some(1),
            ..FolderStatus::default()
        };
        mailbox.set_status(&mut helper, inbox, &status);
        let first = mailbox.message_get_or_create(&mut helper, inbox, 1).unwrap();
        mailbox.add_header(&mut helper, first, "Subject: Hello");
        mailbox.message_get_or_create(&mut helper, inbox, 2).unwrap();

        assert_eq!(
            render(&mailbox),
            "Inbox (inbox) 2 messages, 1 unseen\n\
             \x20 #1 Hello\n\
             \x20 #2 (no subject)\n\
             Lists (folder)\n\
             \x20 rust (folder)\n"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&Mailbox::new()), "");
    }
}
