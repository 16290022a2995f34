//! Flatten ENML note bodies to plain text.
//!
//! ENML is XML, but bodies routinely use HTML named entities that no DTD declares. Those are
//! replaced with their characters (stray `&` become `&amp;`) before the body goes through
//! `roxmltree`; the element tree is then walked to produce text.

use roxmltree::{Document, Node, ParsingOptions};
use std::borrow::Cow;

const BLOCK_TAGS: &[&str] = &[
    "div", "p", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "blockquote", "pre",
    "table",
];

/// Longest entity reference examined, `&` and `;` included.
const MAX_ENTITY_LEN: usize = 12;

const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

const HTML_ENTITIES: &[(&str, char)] = &[
    ("nbsp", ' '),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("trade", '\u{2122}'),
    ("hellip", '\u{2026}'),
    ("mdash", '\u{2014}'),
    ("ndash", '\u{2013}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("laquo", '\u{ab}'),
    ("raquo", '\u{bb}'),
    ("bull", '\u{2022}'),
    ("middot", '\u{b7}'),
    ("deg", '\u{b0}'),
    ("plusmn", '\u{b1}'),
    ("times", '\u{d7}'),
    ("divide", '\u{f7}'),
    ("euro", '\u{20ac}'),
    ("pound", '\u{a3}'),
    ("yen", '\u{a5}'),
    ("cent", '\u{a2}'),
    ("sect", '\u{a7}'),
    ("para", '\u{b6}'),
    ("shy", '\u{ad}'),
];

/// Convert an ENML document to plain text. Block elements end lines; entities are decoded.
pub(crate) fn enml_to_text(enml: &str) -> Result<String, roxmltree::Error> {
    let source = replace_html_entities(enml);
    let mut parsing = ParsingOptions::default();
    parsing.allow_dtd = true;
    let document = Document::parse_with_options(&source, parsing)?;

    let mut output = String::with_capacity(source.len());
    flatten(document.root_element(), &mut output);
    Ok(tidy(&output.replace('\u{a0}', " ")))
}

fn flatten(node: Node<'_, '_>, output: &mut String) {
    for child in node.children() {
        if child.is_text() {
            output.push_str(child.text().unwrap_or_default());
            continue;
        }
        if !child.is_element() {
            continue;
        }
        let name = child.tag_name().name().to_ascii_lowercase();
        match name.as_str() {
            "br" | "hr" => {
                output.push('\n');
                continue;
            }
            "en-todo" => {
                let checked = child.attribute("checked") == Some("true");
                output.push_str(if checked { "[x] " } else { "[ ] " });
                continue;
            }
            // Attachments and encrypted blocks carry no readable text.
            "en-media" | "en-crypt" => continue,
            _ => {}
        }

        let block = BLOCK_TAGS.contains(&name.as_str());
        if block && !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        if name == "li" {
            output.push_str("- ");
        }
        flatten(child, output);
        if block {
            output.push('\n');
        }
    }
}

/// Rewrite every `&` that does not start a reference the XML parser understands.
fn replace_html_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        rest = &rest[start..];
        let reference = rest
            .as_bytes()
            .iter()
            .take(MAX_ENTITY_LEN)
            .position(|byte| *byte == b';')
            .map(|end| (&rest[1..end], end + 1));

        let consumed = match reference {
            Some((name, len)) if is_xml_reference(name) => {
                output.push_str(&rest[..len]);
                len
            }
            Some((name, len)) => match html_entity(name) {
                Some(decoded) => {
                    output.push(decoded);
                    len
                }
                None => {
                    output.push_str("&amp;");
                    1
                }
            },
            None => {
                output.push_str("&amp;");
                1
            }
        };
        rest = &rest[consumed..];
    }
    output.push_str(rest);
    Cow::Owned(output)
}

fn is_xml_reference(name: &str) -> bool {
    if XML_ENTITIES.contains(&name) {
        return true;
    }
    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => name.strip_prefix('#').and_then(|dec| dec.parse().ok()),
    };
    code.and_then(char::from_u32).is_some()
}

fn html_entity(name: &str) -> Option<char> {
    HTML_ENTITIES
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|(_, decoded)| *decoded)
}

fn tidy(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}
