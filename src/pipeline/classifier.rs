//! Inbound message classifier for the auto-responder.
//!
//! Pure decision function: no I/O, no state. Rules are evaluated in a fixed
//! order and the first match wins:
//! 1. emoji reaction → skip
//! 2. test subject prefix → skip
//! 3. sent by the account itself → skip
//! 4. feedback subject prefix → feedback template, fixed subject
//! 5. everything else → default template, `Re: <subject>`

use crate::pipeline::types::{
    Classification, ClassificationPolicy, ConversationSnapshot, ReplyTemplate, SkipReason,
};

/// Prefix of default reply subjects.
pub const REPLY_PREFIX: &str = "Re: ";

/// Bodies up to this many characters may be pure-emoji reactions.
const EMOJI_BODY_MAX_CHARS: usize = 10;

/// Bodies up to this many characters are checked for near-emptiness.
const SHORT_BODY_MAX_CHARS: usize = 5;

/// Non-whitespace characters allowed in a short reaction body.
const SHORT_BODY_MAX_VISIBLE: usize = 2;

/// Classify a conversation. Total: every input yields a decision.
pub fn classify(snapshot: &ConversationSnapshot, policy: &ClassificationPolicy) -> Classification {
    if is_emoji_reaction(snapshot.body_or_empty()) {
        return Classification::Skip {
            reason: SkipReason::EmojiReaction,
        };
    }

    let subject = snapshot.subject_or_empty().trim();

    if policy
        .test_prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && subject.starts_with(prefix.as_str()))
    {
        return Classification::Skip {
            reason: SkipReason::TestMessage,
        };
    }

    if is_self_sent(snapshot, &policy.own_address) {
        return Classification::Skip {
            reason: SkipReason::SelfSent,
        };
    }

    if !policy.feedback_subject_prefix.is_empty()
        && subject.starts_with(policy.feedback_subject_prefix.as_str())
    {
        return Classification::Reply {
            template: ReplyTemplate::Feedback,
            reply_subject: policy.feedback_reply_subject.clone(),
        };
    }

    Classification::Reply {
        template: ReplyTemplate::Default,
        reply_subject: format!("{REPLY_PREFIX}{subject}"),
    }
}

/// Whether a body is a shortform acknowledgement rather than a real reply.
pub fn is_emoji_reaction(body: &str) -> bool {
    let body = body.trim();
    let len = body.chars().count();

    if len == 0 {
        return true;
    }

    if len <= EMOJI_BODY_MAX_CHARS && body.chars().all(is_emoji_char) {
        return true;
    }

    len <= SHORT_BODY_MAX_CHARS
        && body.chars().filter(|c| !c.is_whitespace()).count() <= SHORT_BODY_MAX_VISIBLE
}

/// Pictographs, miscellaneous symbols and dingbats.
fn is_emoji_char(c: char) -> bool {
    matches!(
        c,
        '\u{1F300}'..='\u{1F9FF}' | '\u{2600}'..='\u{26FF}' | '\u{2700}'..='\u{27BF}'
    )
}

/// Bare address from a `From` field.
///
/// `Jane <jane@example.com>` → `jane@example.com`; anything without angle
/// brackets is returned trimmed.
pub fn extract_address(sender_display: &str) -> String {
    if let Some(open) = sender_display.find('<')
        && let Some(len) = sender_display[open + 1..].find('>')
    {
        return sender_display[open + 1..open + 1 + len].trim().to_string();
    }
    sender_display.trim().to_string()
}

fn is_self_sent(snapshot: &ConversationSnapshot, own_address: &str) -> bool {
    let own = own_address.trim().to_lowercase();
    if own.is_empty() {
        return false;
    }
    let sender = if snapshot.sender_display.trim().is_empty() {
        extract_address(&snapshot.sender_address)
    } else {
        extract_address(&snapshot.sender_display)
    };
    sender.to_lowercase() == own
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ClassificationPolicy {
        ClassificationPolicy {
            test_prefixes: vec!["[TEST]".into(), "Test:".into(), "test:".into()],
            feedback_subject_prefix: "Feedback zum App-Design".into(),
            feedback_reply_subject: "Vielen Dank für Ihr Feedback".into(),
            own_address: "me@example.com".into(),
        }
    }

    fn snapshot(sender: &str, subject: Option<&str>, body: Option<&str>) -> ConversationSnapshot {
        ConversationSnapshot {
            sender_address: extract_address(sender),
            sender_display: sender.into(),
            subject: subject.map(String::from),
            plain_body: body.map(String::from),
            is_unread: true,
        }
    }

    const LONG_BODY: &str = "Thanks a lot for your help, I appreciate it.";

    // ── Emoji reactions ─────────────────────────────────────────────

    #[test]
    fn empty_body_is_emoji_reaction() {
        for body in [None, Some(""), Some("   \n\t ")] {
            let result = classify(&snapshot("a@b.com", Some("Hello"), body), &policy());
            assert_eq!(
                result,
                Classification::Skip {
                    reason: SkipReason::EmojiReaction
                }
            );
        }
    }

    #[test]
    fn single_thumbs_up_is_emoji_reaction() {
        let result = classify(&snapshot("a@b.com", Some("Hello"), Some("👍")), &policy());
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::EmojiReaction
            }
        );
    }

    #[test]
    fn emoji_run_within_limit() {
        assert!(is_emoji_reaction("🎉🎉🎉"));
        assert!(is_emoji_reaction("☀✨"));
        assert!(is_emoji_reaction(" 🍕🍕🍕🍕🍕🍕🍕🍕🍕🍕 "));
    }

    #[test]
    fn emoji_run_over_limit_is_not_reaction() {
        assert!(!is_emoji_reaction("🍕🍕🍕🍕🍕🍕🍕🍕🍕🍕🍕"));
    }

    #[test]
    fn two_visible_chars_are_reaction() {
        assert!(is_emoji_reaction("ok"));
        assert!(is_emoji_reaction("o k"));
        assert!(!is_emoji_reaction("okay"));
    }

    #[test]
    fn short_text_is_not_reaction() {
        assert!(!is_emoji_reaction("Hi!!"));
        assert!(!is_emoji_reaction("👍 thanks"));
    }

    // ── Test messages ───────────────────────────────────────────────

    #[test]
    fn test_prefix_skips_long_message() {
        let result = classify(
            &snapshot("a@b.com", Some("Test: hello"), Some(LONG_BODY)),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::TestMessage
            }
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let result = classify(
            &snapshot("a@b.com", Some("TEST: hello"), Some(LONG_BODY)),
            &policy(),
        );
        assert!(matches!(result, Classification::Reply { .. }));
    }

    #[test]
    fn test_prefix_matches_after_trimming_subject() {
        let result = classify(
            &snapshot("a@b.com", Some("  [TEST] newsletter"), Some(LONG_BODY)),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::TestMessage
            }
        );
    }

    #[test]
    fn emoji_rule_precedes_test_rule() {
        let result = classify(&snapshot("a@b.com", Some("Test: hello"), Some("")), &policy());
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::EmojiReaction
            }
        );
    }

    // ── Self-sent ───────────────────────────────────────────────────

    #[test]
    fn own_address_in_angle_brackets_is_self_sent() {
        let result = classify(
            &snapshot("Me <me@example.com>", Some("Anything"), Some(LONG_BODY)),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::SelfSent
            }
        );
    }

    #[test]
    fn self_sent_comparison_ignores_case() {
        let result = classify(
            &snapshot("  ME@Example.COM ", Some("Anything"), Some(LONG_BODY)),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::SelfSent
            }
        );
    }

    #[test]
    fn self_sent_precedes_feedback_routing() {
        let result = classify(
            &snapshot(
                "Me <me@example.com>",
                Some("Feedback zum App-Design - draft"),
                Some(LONG_BODY),
            ),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Skip {
                reason: SkipReason::SelfSent
            }
        );
    }

    #[test]
    fn malformed_sender_falls_back_to_whole_field() {
        assert_eq!(extract_address("Broken <no-close"), "Broken <no-close");
        assert_eq!(extract_address(" plain@example.com "), "plain@example.com");
        assert_eq!(extract_address("A <a@b.com> trailing"), "a@b.com");
        assert_eq!(extract_address(""), "");
    }

    // ── Replies ─────────────────────────────────────────────────────

    #[test]
    fn feedback_subject_gets_fixed_reply_subject() {
        let result = classify(
            &snapshot(
                "User <user@example.org>",
                Some("Feedback zum App-Design - great app"),
                Some(LONG_BODY),
            ),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Reply {
                template: ReplyTemplate::Feedback,
                reply_subject: "Vielen Dank für Ihr Feedback".into()
            }
        );
    }

    #[test]
    fn default_reply_prefixes_subject() {
        let result = classify(
            &snapshot(
                "user@example.org",
                Some("  Question about pricing "),
                Some(LONG_BODY),
            ),
            &policy(),
        );
        assert_eq!(
            result,
            Classification::Reply {
                template: ReplyTemplate::Default,
                reply_subject: "Re: Question about pricing".into()
            }
        );
    }

    #[test]
    fn missing_subject_gets_bare_reply_prefix() {
        let result = classify(&snapshot("user@example.org", None, Some(LONG_BODY)), &policy());
        assert_eq!(
            result,
            Classification::Reply {
                template: ReplyTemplate::Default,
                reply_subject: "Re: ".into()
            }
        );
    }

    #[test]
    fn empty_prefixes_never_match() {
        let policy = ClassificationPolicy {
            test_prefixes: vec![String::new()],
            feedback_subject_prefix: String::new(),
            feedback_reply_subject: "Thanks".into(),
            own_address: String::new(),
        };
        let result = classify(&snapshot("", Some("Hello"), Some(LONG_BODY)), &policy);
        assert_eq!(
            result,
            Classification::Reply {
                template: ReplyTemplate::Default,
                reply_subject: "Re: Hello".into()
            }
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let snap = snapshot("user@example.org", Some("Question"), Some(LONG_BODY));
        let policy = policy();
        let first = classify(&snap, &policy);
        for _ in 0..10 {
            assert_eq!(classify(&snap, &policy), first);
        }
    }
}
