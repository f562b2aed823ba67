//! Text rendering of mails.

use crate::datetime::format_mail_date;

use super::types::MailRecord;

/// Separator between header and body.
const RULE: &str = "------------------------------";

/// Render a mail as the lines shown to a viewer.
///
/// `from_name` and `to_names` are display names already resolved from the
/// identity keys stored in the record.
pub fn format_mail(
    mail: &MailRecord,
    from_name: &str,
    to_names: &[String],
    timezone: &str,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(mail.message.len() + 8);

    lines.push(format!("Mail #{} from {}", mail.index, from_name));
    match &mail.date {
        Some(date) => lines.push(format!("Date: {}", format_mail_date(date, timezone))),
        None => lines.push("Date: (not sent)".to_string()),
    }
    lines.push(format!("To: {}", to_names.join(", ")));
    lines.push(RULE.to_string());
    lines.extend(mail.message.iter().cloned());

    if !mail.attachments_original.is_empty() {
        lines.push(RULE.to_string());
        if mail.is_claimed() {
            lines.push("Attachments (claimed):".to_string());
        } else {
            lines.push("Attachments:".to_string());
        }
        for item in &mail.attachments_original {
            lines.push(format!("  - {item}"));
        }
        if mail.fee_money > 0 {
            lines.push(format!("Fee: {}", mail.fee_money));
        }
        if let Some(item) = &mail.fee_item {
            lines.push(format!("Fee item: {item}"));
        }
    }

    lines
}

/// One-line summary used in inbox and outbox listings.
pub fn format_summary(mail: &MailRecord, from_name: &str, unread: bool, timezone: &str) -> String {
    let mark = if unread { "*" } else { " " };
    let date = mail
        .date
        .as_ref()
        .map(|d| format_mail_date(d, timezone))
        .unwrap_or_default();
    let first_line = mail.message.first().map(String::as_str).unwrap_or("");
    format!(
        "{mark} #{} {} {}: {}",
        mail.index, date, from_name, first_line
    )
}
