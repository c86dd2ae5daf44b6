//! Composition of the broadcast text each recipient receives.

use crate::types::{CandidateMessage, Recipient};

/// Placeholder replaced by the recipient's first name.
pub const FIRST_NAME_PLACEHOLDER: &str = "{first_name}";

/// The greeting line prepended to every broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroTemplate {
    template: String,
    escape_html: bool,
}

impl IntroTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), escape_html: false }
    }

    /// Escape the substituted name for HTML-formatted messages.
    pub fn escaping_html(mut self, escape: bool) -> Self {
        self.escape_html = escape;
        self
    }

    /// Render the greeting for one recipient.
    pub fn render(&self, recipient: &Recipient) -> String {
        if self.escape_html {
            self.template.replace(FIRST_NAME_PLACEHOLDER, &escape_html(&recipient.first_name))
        } else {
            self.template.replace(FIRST_NAME_PLACEHOLDER, &recipient.first_name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Escape the characters the Bot API's HTML parser treats as markup.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `intro + "\n" + body`, where body is the text or the image caption.
pub fn compose(intro: &IntroTemplate, recipient: &Recipient, message: &CandidateMessage) -> String {
    format!("{}\n{}", intro.render(recipient), message.body())
}
