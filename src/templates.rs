//! Draft lookup and placeholder rendering shared by the automations.

use crate::channels::{Draft, MailAttachment, OutgoingMail};

/// The first draft whose subject equals `subject` exactly.
pub fn find_exact<'a>(drafts: &'a [Draft], subject: &str) -> Option<&'a Draft> {
    drafts.iter().find(|d| d.subject == subject)
}

/// Every draft whose subject contains `marker`.
pub fn find_containing<'a>(drafts: &'a [Draft], marker: &str) -> Vec<&'a Draft> {
    drafts.iter().filter(|d| d.subject.contains(marker)).collect()
}

/// Replace every occurrence of each placeholder with `value`.
pub fn fill(text: &str, placeholders: &[&str], value: &str) -> String {
    placeholders
        .iter()
        .fold(text.to_string(), |acc, p| acc.replace(p, value))
}

/// A draft with its subject and bodies rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
}

impl Rendered {
    /// Fill `placeholders` in the draft's subject and bodies.
    pub fn from_draft(draft: &Draft, placeholders: &[&str], value: &str) -> Self {
        Self {
            subject: fill(&draft.subject, placeholders, value),
            plain_body: fill(&draft.plain_body, placeholders, value),
            html_body: draft.html_body.as_deref().map(|h| fill(h, placeholders, value)),
        }
    }

    /// Outgoing mail to `to` with a replacement subject.
    pub fn into_mail_with_subject(self, to: &str, subject: impl Into<String>) -> OutgoingMail {
        let mail = OutgoingMail::new(to, subject, self.plain_body);
        match self.html_body {
            Some(html) => mail.with_html(html),
            None => mail,
        }
    }
}

/// Attach every draft part as an inline image named `img0`, `img1`, ...
pub fn numbered_inline_images(
    mut mail: OutgoingMail,
    attachments: &[MailAttachment],
) -> OutgoingMail {
    for (index, attachment) in attachments.iter().enumerate() {
        mail = mail.with_inline_image(format!("img{index}"), attachment.clone());
    }
    mail
}

/// Split draft parts: those the HTML references by name (`cid:<name>` or
/// `src="<name>"`) go inline under their own name, the rest stay attachments.
pub fn attach_by_reference(mut mail: OutgoingMail, attachments: &[MailAttachment]) -> OutgoingMail {
    let html = mail.html_body.clone().unwrap_or_default();
    for attachment in attachments {
        let name = &attachment.name;
        let referenced =
            html.contains(&format!("cid:{name}")) || html.contains(&format!("src=\"{name}\""));
        mail = if referenced {
            mail.with_inline_image(name.clone(), attachment.clone())
        } else {
            mail.with_attachment(attachment.clone())
        };
    }
    mail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: &str, subject: &str) -> Draft {
        Draft {
            id: id.into(),
            subject: subject.into(),
            plain_body: "Hallo [NAME], {EMAIL}".into(),
            html_body: Some("<p>Hallo [Name]</p>".into()),
            attachments: vec![],
        }
    }

    fn part(name: &str) -> MailAttachment {
        MailAttachment {
            name: name.into(),
            content_type: "image/png".into(),
            data: vec![0],
        }
    }

    #[test]
    fn exact_lookup_ignores_near_matches() {
        let drafts = vec![
            draft("1", "Template - DO NOT DELETE (copy)"),
            draft("2", "Template - DO NOT DELETE"),
        ];
        let found = find_exact(&drafts, "Template - DO NOT DELETE");
        assert_eq!(found.map(|d| d.id.as_str()), Some("2"));
        assert!(find_exact(&drafts, "template - do not delete").is_none());
    }

    #[test]
    fn containing_lookup_collects_all() {
        let drafts = vec![
            draft("1", "Update zu Haptigation #1"),
            draft("2", "Other"),
            draft("3", "Neues Update zu Haptigation"),
        ];
        let ids: Vec<_> = find_containing(&drafts, "Update zu Haptigation")
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn fill_replaces_every_variant() {
        assert_eq!(
            fill("[NAME] [Name] [name] [NAME]", &["[NAME]", "[Name]", "[name]"], "Eva"),
            "Eva Eva Eva Eva"
        );
        assert_eq!(fill("no placeholders", &["{EMAIL}"], "x"), "no placeholders");
    }

    #[test]
    fn rendered_into_mail() {
        let rendered = Rendered::from_draft(&draft("1", "Hi [NAME]"), &["[NAME]", "[Name]"], "Eva");
        assert_eq!(rendered.subject, "Hi Eva");
        let mail = rendered.into_mail_with_subject("eva@x.com", "Fixed");
        assert_eq!(mail.subject, "Fixed");
        assert_eq!(mail.plain_body, "Hallo Eva, {EMAIL}");
        assert_eq!(mail.html_body.as_deref(), Some("<p>Hallo Eva</p>"));
    }

    #[test]
    fn numbered_images() {
        let mail = OutgoingMail::new("a@x.com", "s", "b");
        let mail = numbered_inline_images(mail, &[part("a.png"), part("b.png")]);
        let ids: Vec<_> = mail.inline_images.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["img0", "img1"]);
    }

    #[test]
    fn referenced_parts_go_inline() {
        let mail = OutgoingMail::new("a@x.com", "s", "b")
            .with_html(r#"<img src="cid:logo.png"><img src="banner.jpg">"#);
        let parts = [part("logo.png"), part("banner.jpg"), part("terms.pdf")];
        let mail = attach_by_reference(mail, &parts);
        let inline: Vec<_> = mail.inline_images.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(inline, vec!["logo.png", "banner.jpg"]);
        assert_eq!(mail.attachments.len(), 1);
        assert_eq!(mail.attachments[0].name, "terms.pdf");
    }

    #[test]
    fn plain_only_mail_keeps_everything_attached() {
        let mail = attach_by_reference(OutgoingMail::new("a@x.com", "s", "b"), &[part("logo.png")]);
        assert!(mail.inline_images.is_empty());
        assert_eq!(mail.attachments.len(), 1);
    }
}
