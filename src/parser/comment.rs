use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::CrossThreadLink;

static LINE_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").expect("valid line break pattern"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">>(\d+)").expect("valid quote pattern"));

static BOARD_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r">>>/(\w+)/(\d+)?").expect("valid board link pattern"));

/// Result of parsing one comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedComment {
    pub text: String,
    /// Posts of the same thread this comment quotes.
    pub replies_to: BTreeSet<u64>,
    pub cross_thread_links: Vec<CrossThreadLink>,
}

/// Turns a site's comment markup into plain text and extracts post links.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentParser;

impl CommentParser {
    /// `internal_ids` are the post numbers of the batch being parsed,
    /// `known_boards` the board codes of the post's site.
    pub fn parse(
        &self,
        raw: &str,
        own_no: u64,
        own_board: &str,
        internal_ids: &HashSet<u64>,
        known_boards: &HashSet<String>,
    ) -> ParsedComment {
        let text = Self::to_plain_text(raw);

        let mut replies_to = BTreeSet::new();
        let mut cross_thread_links = Vec::new();

        for captures in BOARD_LINK_RE.captures_iter(&text) {
            let board_code = captures[1].to_string();
            let post_no = captures.get(2).and_then(|m| m.as_str().parse().ok());

            cross_thread_links.push(CrossThreadLink {
                known_board: known_boards.contains(&board_code),
                board_code,
                post_no,
            });
        }

        for captures in QUOTE_RE.captures_iter(&text) {
            let Ok(quoted) = captures[1].parse::<u64>() else {
                continue;
            };

            if quoted == own_no {
                continue;
            }

            if internal_ids.contains(&quoted) {
                replies_to.insert(quoted);
            } else {
                // Quote into another thread of the same board.
                cross_thread_links.push(CrossThreadLink {
                    board_code: own_board.to_string(),
                    post_no: Some(quoted),
                    known_board: true,
                });
            }
        }

        ParsedComment {
            text,
            replies_to,
            cross_thread_links,
        }
    }

    fn to_plain_text(raw: &str) -> String {
        let with_breaks = LINE_BREAK_RE.replace_all(raw, "\n");
        let stripped = TAG_RE.replace_all(&with_breaks, "");
        html_escape::decode_html_entities(&stripped)
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str, internal: &[u64]) -> ParsedComment {
        let internal: HashSet<u64> = internal.iter().copied().collect();
        let known: HashSet<String> = ["g".to_string(), "a".to_string()].into_iter().collect();
        CommentParser.parse(raw, 10, "g", &internal, &known)
    }

    #[test]
    fn test_html_to_text() {
        let parsed = parse("hello<br>world &amp; <b>friends</b><br/>", &[]);
        assert_eq!(parsed.text, "hello\nworld & friends");
    }

    #[test]
    fn test_quotes_resolve_against_internal_ids() {
        let parsed = parse(
            r##"<a href="#p5" class="quotelink">&gt;&gt;5</a><br>&gt;&gt;7 &gt;&gt;10"##,
            &[5, 10],
        );

        assert_eq!(parsed.replies_to.iter().copied().collect::<Vec<_>>(), vec![5]);
        // 7 is not in the batch, 10 is the post itself.
        assert_eq!(parsed.cross_thread_links.len(), 1);
        assert_eq!(parsed.cross_thread_links[0].post_no, Some(7));
    }

    #[test]
    fn test_cross_board_links() {
        let parsed = parse("&gt;&gt;&gt;/a/123 and &gt;&gt;&gt;/zz/", &[]);

        assert!(parsed.replies_to.is_empty());
        assert_eq!(
            parsed.cross_thread_links,
            vec![
                CrossThreadLink {
                    board_code: "a".into(),
                    post_no: Some(123),
                    known_board: true,
                },
                CrossThreadLink {
                    board_code: "zz".into(),
                    post_no: None,
                    known_board: false,
                },
            ]
        );
    }

    #[test]
    fn test_greentext_is_not_a_quote() {
        let parsed = parse("&gt;implying", &[]);
        assert_eq!(parsed.text, ">implying");
        assert!(parsed.cross_thread_links.is_empty());
    }
}
