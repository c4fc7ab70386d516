//! Mail transports for alert notifications.

use std::io::Write;
use std::process::{Command, Stdio};

use smokewatch_core::settings;
use smokewatch_traits::{BoxError, Notifier, Priority};

/// Hands each message to the local MTA via `sendmail -t`.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    path: String,
    sender: String,
}

impl SendmailNotifier {
    pub fn new(path: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sender: sender.into(),
        }
    }

    fn message(&self, subject: &str, body: &str, priority: Priority, to: &[String]) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {subject}\r\nX-Priority: {}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n",
            self.sender,
            to.join(", "),
            priority.x_priority(),
        )
    }
}

impl Notifier for SendmailNotifier {
    fn send(
        &mut self,
        subject: &str,
        body: &str,
        priority: Priority,
        recipients: &[String],
    ) -> Result<Vec<String>, BoxError> {
        let recipients: Vec<String> = recipients
            .iter()
            .filter(|r| {
                let ok = settings::is_valid_recipient(r);
                if !ok {
                    tracing::warn!(recipient = ?r, "skipping recipient with control characters");
                }
                ok
            })
            .cloned()
            .collect();
        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        let message = self.message(subject, body, priority, &recipients);
        let mut child = Command::new(&self.path)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| format!("spawn {}: {e}", self.path))?;
        // stdin is closed before waiting so sendmail sees end of message
        let written = child
            .stdin
            .take()
            .map_or(Ok(()), |mut stdin| stdin.write_all(message.as_bytes()));
        let status = child.wait()?;
        written.map_err(|e| format!("write to {}: {e}", self.path))?;
        if !status.success() {
            return Err(format!("{} exited with {status}", self.path).into());
        }
        tracing::debug!(recipients = recipients.len(), "mail handed to sendmail");
        Ok(recipients)
    }
}

/// Writes notifications to the log instead of mailing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &mut self,
        subject: &str,
        body: &str,
        priority: Priority,
        recipients: &[String],
    ) -> Result<Vec<String>, BoxError> {
        tracing::info!(
            subject,
            priority = priority.x_priority(),
            recipients = ?recipients,
            body,
            "notification (not mailed)"
        );
        Ok(recipients.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_priority_header() {
        let n = SendmailNotifier::new("/usr/sbin/sendmail", "monitor@lab");
        let msg = n.message(
            "SMOKE LEVEL WARNING",
            "body",
            Priority::High,
            &["a@lab".to_string(), "b@lab".to_string()],
        );
        assert!(msg.starts_with("From: monitor@lab\r\n"));
        assert!(msg.contains("To: a@lab, b@lab\r\n"));
        assert!(msg.contains("X-Priority: 1\r\n"));
        assert!(msg.ends_with("\r\n\r\nbody\r\n"));
    }

    #[test]
    fn missing_binary_is_an_error() {
        let mut n = SendmailNotifier::new("/nonexistent/sendmail", "monitor@lab");
        let r = n.send("s", "b", Priority::Normal, &["a@lab".to_string()]);
        assert!(r.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn successful_handoff_returns_recipients() {
        let mut n = SendmailNotifier::new("/bin/cat", "monitor@lab");
        let sent = n
            .send("s", "b", Priority::Normal, &["a@lab".to_string()])
            .unwrap();
        assert_eq!(sent, vec!["a@lab".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn mta_that_stops_reading_is_reaped_and_reported() {
        let mut n = SendmailNotifier::new("/bin/true", "monitor@lab");
        let body = "x".repeat(1 << 20);
        let err = n
            .send("s", &body, Priority::Normal, &["a@lab".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("write to /bin/true"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn failing_mta_is_an_error() {
        let mut n = SendmailNotifier::new("/bin/false", "monitor@lab");
        let err = n
            .send("s", "b", Priority::Normal, &["a@lab".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("exited with"), "{err}");
    }

    #[test]
    fn recipients_with_line_breaks_are_never_mailed() {
        let mut n = SendmailNotifier::new("/nonexistent/sendmail", "monitor@lab");
        let r = n
            .send(
                "s",
                "b",
                Priority::Normal,
                &["a@lab\r\nBcc: everyone@lab".to_string()],
            )
            .unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn no_recipients_sends_nothing() {
        let mut n = SendmailNotifier::new("/nonexistent/sendmail", "monitor@lab");
        let r = n.send("s", "b", Priority::Normal, &[]).unwrap();
        assert!(r.is_empty());
    }
}
