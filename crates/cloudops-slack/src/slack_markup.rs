//! Slack mrkdwn to HTML conversion for work item descriptions.
//!
//! The conversion is a single left-to-right scan over the message text. Each
//! `<...>` token is classified once (user mention, channel reference, special
//! mention or link), so mention and link substitution never see each other's
//! output. Code spans and code blocks are copied without substitution.
//!
//! Slack already entity-escapes `&`, `<` and `>` inside message text, so that
//! text is copied as is. Names from the user directory are not escaped by
//! Slack and are HTML-escaped before insertion. Slack leaves `"` alone, so it
//! is escaped inside link `href` attributes.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::slack_models::UserDirectory;

const CODE_FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq)]
enum AngleToken<'a> {
    User { id: &'a str },
    Channel { id: &'a str, label: Option<&'a str> },
    Special { name: &'a str, label: Option<&'a str> },
    Link { url: &'a str, label: Option<&'a str> },
}

/// Converts Slack markup in `text` to HTML, resolving user mentions through
/// `directory`. A failed user lookup fails the whole conversion.
pub async fn convert_slack_markup<D>(text: &str, directory: &D) -> Result<String>
where
    D: UserDirectory + ?Sized,
{
    let mut output = String::with_capacity(text.len());
    let mut resolved_names: HashMap<&str, String> = HashMap::new();
    let mut cursor = 0_usize;

    while let Some(offset) = text[cursor..].find(['<', '`']) {
        let start = cursor + offset;
        output.push_str(&text[cursor..start]);
        let rest = &text[start..];

        if rest.starts_with(CODE_FENCE) {
            match split_code_block(rest) {
                Some((content, consumed)) => {
                    push_code_block(&mut output, content);
                    cursor = start + consumed;
                }
                None => {
                    output.push_str(CODE_FENCE);
                    cursor = start + CODE_FENCE.len();
                }
            }
            continue;
        }

        if rest.starts_with('`') {
            match split_inline_code(rest) {
                Some(consumed) => {
                    output.push_str(&rest[..consumed]);
                    cursor = start + consumed;
                }
                None => {
                    output.push('`');
                    cursor = start + 1;
                }
            }
            continue;
        }

        let Some((inner, consumed)) = split_angle_token(rest) else {
            output.push('<');
            cursor = start + 1;
            continue;
        };
        match classify_angle_token(inner) {
            AngleToken::User { id } => {
                if !resolved_names.contains_key(id) {
                    let profile = directory
                        .user_profile(id)
                        .await
                        .with_context(|| format!("failed to resolve slack user mention {id}"))?;
                    resolved_names.insert(id, escape_html(profile.preferred_name()));
                }
                output.push('@');
                if let Some(name) = resolved_names.get(id) {
                    output.push_str(name);
                }
            }
            AngleToken::Channel { id, label } => {
                output.push('#');
                output.push_str(label.unwrap_or(id));
            }
            AngleToken::Special { name, label } => match label {
                Some(label) => output.push_str(label),
                None => {
                    output.push('@');
                    output.push_str(name);
                }
            },
            AngleToken::Link { url, label } => {
                output.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    url.replace('"', "&quot;"),
                    label.unwrap_or(url)
                ));
            }
        }
        cursor = start + consumed;
    }

    output.push_str(&text[cursor..]);
    Ok(output)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Returns the token body between `<` and `>` and the consumed byte length.
fn split_angle_token(rest: &str) -> Option<(&str, usize)> {
    let close = rest[1..].find(['>', '<'])? + 1;
    if rest.as_bytes()[close] != b'>' {
        return None;
    }
    let inner = &rest[1..close];
    if inner.trim().is_empty() {
        return None;
    }
    Some((inner, close + 1))
}

fn classify_angle_token(inner: &str) -> AngleToken<'_> {
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) if !label.is_empty() => (target, Some(label)),
        Some((target, _)) => (target, None),
        None => (inner, None),
    };
    if let Some(id) = target.strip_prefix('@') {
        if is_user_id(id) {
            return AngleToken::User { id };
        }
    }
    if let Some(id) = target.strip_prefix('#') {
        if !id.is_empty() {
            return AngleToken::Channel { id, label };
        }
    }
    if let Some(name) = target.strip_prefix('!') {
        if !name.is_empty() {
            return AngleToken::Special { name, label };
        }
    }
    AngleToken::Link { url: target, label }
}

fn is_user_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some('U' | 'W'))
        && raw.len() > 1
        && chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
}

/// Returns the consumed byte length of a `` `code` `` span starting at `rest`.
fn split_inline_code(rest: &str) -> Option<usize> {
    let close = rest[1..].find('`')? + 1;
    if close == 1 {
        return None;
    }
    Some(close + 1)
}

/// Returns the fenced content and the consumed byte length of a code block.
fn split_code_block(rest: &str) -> Option<(&str, usize)> {
    let body = &rest[CODE_FENCE.len()..];
    let close = body.find(CODE_FENCE)?;
    let content = &body[..close];
    if content.is_empty() {
        return None;
    }
    Some((content, CODE_FENCE.len() + close + CODE_FENCE.len()))
}

fn push_code_block(output: &mut String, content: &str) {
    output.push_str(CODE_FENCE);
    if !content.starts_with('\n') {
        output.push('\n');
    }
    output.push_str(content);
    if !content.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(CODE_FENCE);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{classify_angle_token, convert_slack_markup, AngleToken};
    use crate::slack_models::{SlackUserProfile, UserDirectory};

    #[derive(Default)]
    struct StaticDirectory {
        profiles: HashMap<String, SlackUserProfile>,
        lookups: Mutex<Vec<String>>,
    }

    impl StaticDirectory {
        fn with_user(mut self, user_id: &str, display_name: &str, real_name: &str) -> Self {
            self.profiles.insert(
                user_id.to_string(),
                SlackUserProfile {
                    display_name: display_name.to_string(),
                    real_name: real_name.to_string(),
                },
            );
            self
        }

        fn lookups(&self) -> Vec<String> {
            self.lookups.lock().expect("lookups lock").clone()
        }
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn user_profile(&self, user_id: &str) -> Result<SlackUserProfile> {
            self.lookups
                .lock()
                .expect("lookups lock")
                .push(user_id.to_string());
            self.profiles
                .get(user_id)
                .cloned()
                .ok_or_else(|| anyhow!("user_not_found"))
        }
    }

    async fn convert(text: &str, directory: &StaticDirectory) -> String {
        convert_slack_markup(text, directory)
            .await
            .expect("conversion succeeds")
    }

    #[tokio::test]
    async fn functional_text_without_markup_is_returned_unchanged() {
        let directory = StaticDirectory::default();
        let text = "Prod deploy failed at 10:42, please take a look.\nThanks & regards";
        assert_eq!(convert(text, &directory).await, text);
        assert!(directory.lookups().is_empty());
    }

    #[tokio::test]
    async fn functional_mention_and_labelled_link_convert_in_one_pass() {
        let directory = StaticDirectory::default().with_user("U123ABC", "", "Jane Doe");
        assert_eq!(
            convert("<@U123ABC> see <https://x.com|here>", &directory).await,
            "@Jane Doe see <a href=\"https://x.com\">here</a>"
        );
    }

    #[tokio::test]
    async fn functional_unlabelled_link_uses_url_as_text() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("<https://x.com>", &directory).await,
            "<a href=\"https://x.com\">https://x.com</a>"
        );
    }

    #[tokio::test]
    async fn functional_mention_prefers_display_name_and_resolves_each_user_once() {
        let directory = StaticDirectory::default()
            .with_user("U1", "jd", "Jane Doe")
            .with_user("W2", "", "Sam Roe");
        let converted = convert("<@U1> ping <@W2> and <@U1> again", &directory).await;
        assert_eq!(converted, "@jd ping @Sam Roe and @jd again");
        assert_eq!(directory.lookups(), vec!["U1".to_string(), "W2".to_string()]);
    }

    #[tokio::test]
    async fn functional_channel_and_special_mentions_render_as_plain_text() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert(
                "<!here> see <#C024BE7LR|general> and <#C1> <!subteam^S1|@ops>",
                &directory
            )
            .await,
            "@here see #general and #C1 @ops"
        );
    }

    #[tokio::test]
    async fn functional_code_spans_are_copied_without_substitution() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("run `kubectl get <pods>` now", &directory).await,
            "run `kubectl get <pods>` now"
        );
        assert!(directory.lookups().is_empty());
    }

    #[tokio::test]
    async fn functional_code_blocks_start_and_end_on_their_own_lines() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("logs: ```error <@U1> &amp; more```", &directory).await,
            "logs: ```\nerror <@U1> &amp; more\n```"
        );
        assert_eq!(
            convert("```\nalready fenced\n```", &directory).await,
            "```\nalready fenced\n```"
        );
    }

    #[tokio::test]
    async fn regression_escaped_entities_are_not_encoded_twice() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("a &lt; b &amp;&amp; <https://x.com/?a=1&amp;b=2>", &directory).await,
            "a &lt; b &amp;&amp; <a href=\"https://x.com/?a=1&amp;b=2\">https://x.com/?a=1&amp;b=2</a>"
        );
    }

    #[tokio::test]
    async fn regression_user_names_are_html_escaped() {
        let directory = StaticDirectory::default().with_user("U1", "Tom & <b>Jerry</b>", "");
        assert_eq!(
            convert("hi <@U1>", &directory).await,
            "hi @Tom &amp; &lt;b&gt;Jerry&lt;/b&gt;"
        );
    }

    #[tokio::test]
    async fn regression_quote_in_link_url_stays_inside_href() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("<https://x.com/a\"onclick=\"x|docs>", &directory).await,
            "<a href=\"https://x.com/a&quot;onclick=&quot;x\">docs</a>"
        );
    }

    #[tokio::test]
    async fn regression_malformed_tokens_pass_through() {
        let directory = StaticDirectory::default();
        assert_eq!(
            convert("open < bracket and `tick and <> and ``` fence", &directory).await,
            "open < bracket and `tick and <> and ``` fence"
        );
        assert_eq!(
            convert("nested <a <https://x.com>", &directory).await,
            "nested <a <a href=\"https://x.com\">https://x.com</a>"
        );
    }

    #[tokio::test]
    async fn regression_failed_mention_lookup_fails_conversion() {
        let directory = StaticDirectory::default();
        let error = convert_slack_markup("hi <@U404>", &directory)
            .await
            .expect_err("unknown user fails");
        assert!(error.to_string().contains("U404"));
    }

    #[test]
    fn unit_classify_angle_token_distinguishes_token_kinds() {
        assert_eq!(
            classify_angle_token("@U1|jane"),
            AngleToken::User { id: "U1" }
        );
        assert_eq!(
            classify_angle_token("@lowercase"),
            AngleToken::Link {
                url: "@lowercase",
                label: None
            }
        );
        assert_eq!(
            classify_angle_token("mailto:ops@example.com|ops"),
            AngleToken::Link {
                url: "mailto:ops@example.com",
                label: Some("ops")
            }
        );
        assert_eq!(
            classify_angle_token("https://x.com|"),
            AngleToken::Link {
                url: "https://x.com",
                label: None
            }
        );
    }
}
