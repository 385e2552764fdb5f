//! Lightweight markdown-to-HTML formatter for chat messages.
//!
//! Handles the subset of markdown that models actually produce:
//! - fenced code blocks (an unclosed fence runs to the end of the text, so a
//!   half-streamed block still renders as code)
//! - `# Heading` through `#### Heading`
//! - `- bullet` and `* bullet` list items
//! - `**bold**`, `*italic*`, `` `inline code` ``
//! - `[text](url)` links and bare http(s) URLs
//!
//! All text is HTML-escaped; only http(s) and mailto links are emitted.
//! Output is a pure function of the input.

use regex::Regex;
use std::sync::LazyLock;

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("valid url regex"));

pub fn render(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut block = Block::None;
    let mut code: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some((lang, lines)) = code.as_mut() {
            if trimmed.starts_with("```") {
                push_code_block(&mut out, lang, lines);
                code = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("```") {
            block.close(&mut out);
            code = Some((sanitize_lang(rest), Vec::new()));
            continue;
        }

        // Blank line ends the current paragraph or list
        if trimmed.is_empty() {
            block.close(&mut out);
            continue;
        }

        if let Some((level, rest)) = heading(trimmed) {
            block.close(&mut out);
            out.push_str(&format!("<h{}>", level));
            render_inline(rest, &mut out);
            out.push_str(&format!("</h{}>", level));
            continue;
        }

        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        if let Some(item) = bullet {
            if block != Block::List {
                block.close(&mut out);
                out.push_str("<ul>");
                block = Block::List;
            }
            out.push_str("<li>");
            render_inline(item, &mut out);
            out.push_str("</li>");
            continue;
        }

        match block {
            Block::Paragraph => out.push_str("<br>"),
            _ => {
                block.close(&mut out);
                out.push_str("<p>");
                block = Block::Paragraph;
            }
        }
        render_inline(trimmed, &mut out);
    }

    if let Some((lang, lines)) = code {
        push_code_block(&mut out, &lang, &lines);
    }
    block.close(&mut out);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Paragraph,
    List,
}

impl Block {
    fn close(&mut self, out: &mut String) {
        match self {
            Block::Paragraph => out.push_str("</p>"),
            Block::List => out.push_str("</ul>"),
            Block::None => {}
        }
        *self = Block::None;
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=4).contains(&hashes) {
        return None;
    }
    line[hashes..].strip_prefix(' ').map(|rest| (hashes, rest.trim()))
}

fn sanitize_lang(raw: &str) -> String {
    raw.trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '#'))
        .collect()
}

fn push_code_block(out: &mut String, lang: &str, lines: &[&str]) {
    if lang.is_empty() {
        out.push_str("<pre><code>");
    } else {
        out.push_str(&format!("<pre><code class=\"language-{}\">", escape(lang)));
    }
    out.push_str(&escape(&lines.join("\n")));
    out.push_str("</code></pre>");
}

#[derive(Debug)]
enum MarkerKind {
    Bold,   // **
    Italic, // *
    Code,   // `
    Link,   // [
}

/// Find the next inline marker in the text.
fn find_next_marker(text: &str) -> Option<(usize, MarkerKind)> {
    for (pos, c) in text.char_indices() {
        match c {
            '`' => return Some((pos, MarkerKind::Code)),
            '*' if text[pos..].starts_with("**") => return Some((pos, MarkerKind::Bold)),
            '*' => return Some((pos, MarkerKind::Italic)),
            // Only treat as link if followed by ]( somewhere
            '[' if text[pos..].contains("](") => return Some((pos, MarkerKind::Link)),
            _ => {}
        }
    }
    None
}

/// Render a single line with inline formatting.
fn render_inline(text: &str, out: &mut String) {
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((pos, kind)) = find_next_marker(remaining) else {
            autolink(remaining, out);
            break;
        };
        autolink(&remaining[..pos], out);
        remaining = &remaining[pos..];

        match kind {
            MarkerKind::Code => match remaining[1..].find('`') {
                Some(end) => {
                    out.push_str("<code>");
                    out.push_str(&escape(&remaining[1..1 + end]));
                    out.push_str("</code>");
                    remaining = &remaining[end + 2..];
                }
                None => {
                    out.push('`');
                    remaining = &remaining[1..];
                }
            },
            MarkerKind::Bold => match remaining[2..].find("**") {
                Some(end) if end > 0 => {
                    out.push_str("<strong>");
                    render_inline(&remaining[2..2 + end], out);
                    out.push_str("</strong>");
                    remaining = &remaining[end + 4..];
                }
                _ => {
                    out.push_str("**");
                    remaining = &remaining[2..];
                }
            },
            MarkerKind::Italic => {
                let inner = &remaining[1..];
                match inner.find('*') {
                    Some(end) if end > 0 && !inner.starts_with(' ') => {
                        out.push_str("<em>");
                        render_inline(&inner[..end], out);
                        out.push_str("</em>");
                        remaining = &inner[end + 1..];
                    }
                    _ => {
                        out.push('*');
                        remaining = inner;
                    }
                }
            }
            MarkerKind::Link => match parse_link(remaining) {
                Some((label, url, consumed)) => {
                    out.push_str(&anchor(url, &escape(label)));
                    remaining = &remaining[consumed..];
                }
                None => {
                    out.push('[');
                    remaining = &remaining[1..];
                }
            },
        }
    }
}

/// `[label](url)` at the start of `text`; returns label, url and bytes consumed.
fn parse_link(text: &str) -> Option<(&str, &str, usize)> {
    let close_bracket = text.find("](")?;
    let label = &text[1..close_bracket];
    if label.contains('[') {
        return None;
    }
    let after = &text[close_bracket + 2..];
    let close_paren = after.find(')')?;
    let url = after[..close_paren].trim();
    if !is_safe_url(url) {
        return None;
    }
    Some((label, url, close_bracket + 2 + close_paren + 1))
}

fn is_safe_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("mailto:")
}

fn anchor(url: &str, label_html: &str) -> String {
    format!(
        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
        escape(url),
        label_html
    )
}

/// Escape plain text, turning bare URLs into links.
fn autolink(text: &str, out: &mut String) {
    let mut last = 0;
    for m in BARE_URL.find_iter(text) {
        // Trailing punctuation belongs to the sentence, not the URL
        let url = m
            .as_str()
            .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'));
        out.push_str(&escape(&text[last..m.start()]));
        out.push_str(&anchor(url, &escape(url)));
        last = m.start() + url.len();
    }
    out.push_str(&escape(&text[last..]));
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_line_breaks() {
        assert_eq!(render("one\ntwo\n\nthree"), "<p>one<br>two</p><p>three</p>");
    }

    #[test]
    fn test_escapes_markup() {
        assert_eq!(
            render("<script>alert('x')</script>"),
            "<p>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;</p>"
        );
    }

    #[test]
    fn test_bold_italic_code() {
        assert_eq!(
            render("**bold** and *it* and `a<b`"),
            "<p><strong>bold</strong> and <em>it</em> and <code>a&lt;b</code></p>"
        );
    }

    #[test]
    fn test_unmatched_markers_are_literal() {
        assert_eq!(render("2 * 3 and **open"), "<p>2 * 3 and **open</p>");
    }

    #[test]
    fn test_code_fence() {
        assert_eq!(
            render("Here:\n```rust\nfn main() {}\n```\nDone"),
            "<p>Here:</p><pre><code class=\"language-rust\">fn main() {}</code></pre><p>Done</p>"
        );
    }

    #[test]
    fn test_unclosed_fence_renders_as_code() {
        // A fence opened in one chunk and not yet closed
        let partial = render("```py\nprint('**hi**')");
        assert_eq!(
            partial,
            "<pre><code class=\"language-py\">print(&#39;**hi**&#39;)</code></pre>"
        );
        let full = render("```py\nprint('**hi**')\n```");
        assert_eq!(partial, full);
    }

    #[test]
    fn test_headings_and_lists() {
        assert_eq!(
            render("## Steps\n- one\n* two\nafter"),
            "<h2>Steps</h2><ul><li>one</li><li>two</li></ul><p>after</p>"
        );
        assert_eq!(render("#hashtag"), "<p>#hashtag</p>");
    }

    #[test]
    fn test_links() {
        assert_eq!(
            render("see [docs](https://example.com/a?b=1&c=2)."),
            "<p>see <a href=\"https://example.com/a?b=1&amp;c=2\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a>.</p>"
        );
        assert_eq!(
            render("[x](javascript:alert(1))"),
            "<p>[x](javascript:alert(1))</p>"
        );
    }

    #[test]
    fn test_autolink_trims_punctuation() {
        assert_eq!(
            render("Visit https://example.com."),
            "<p>Visit <a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">https://example.com</a>.</p>"
        );
    }
}
