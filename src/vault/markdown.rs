//! Markdown pieces the vault needs: the YAML frontmatter block, wikilinks and `^block` ids.

use pulldown_cmark::{Event as MdEvent, LinkType, Options, Parser as MdParser, Tag as MdTag};
use serde_yaml::{Mapping, Value as YamlValue};
use std::ops::Range;

use crate::error::DiscourseError;

pub fn vault_md_options() -> Options {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_WIKILINKS);
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options
}

/// A markdown file split at its frontmatter block.
#[derive(Debug, Clone, PartialEq)]
pub struct MdDocument<'a> {
    pub frontmatter: Option<&'a str>,
    /// Byte range of the whole frontmatter block, fences included.
    pub frontmatter_range: Option<Range<usize>>,
    pub body: &'a str,
}

pub fn split_frontmatter(text: &str) -> MdDocument<'_> {
    let mut range: Option<Range<usize>> = None;
    let mut content: Option<Range<usize>> = None;
    for (event, offset) in MdParser::new_ext(text, vault_md_options()).into_offset_iter() {
        match event {
            MdEvent::Start(MdTag::MetadataBlock(_)) => {
                if offset.start != 0 {
                    break;
                }
                range = Some(offset);
            }
            MdEvent::Text(_) if range.is_some() => {
                content = Some(match content {
                    Some(c) => c.start..offset.end,
                    None => offset,
                });
            }
            _ => break,
        }
    }
    match range {
        Some(range) => {
            let mut end = range.end;
            if text[end..].starts_with("\r\n") {
                end += 2;
            } else if text[end..].starts_with('\n') {
                end += 1;
            }
            MdDocument {
                frontmatter: Some(content.map(|c| &text[c]).unwrap_or("")),
                frontmatter_range: Some(0..end),
                body: &text[end..],
            }
        }
        None => MdDocument {
            frontmatter: None,
            frontmatter_range: None,
            body: text,
        },
    }
}

pub fn parse_frontmatter(text: &str) -> Result<Mapping, DiscourseError> {
    let Some(yaml) = split_frontmatter(text).frontmatter else {
        return Ok(Mapping::new());
    };
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<YamlValue>(yaml)? {
        YamlValue::Mapping(mapping) => Ok(mapping),
        YamlValue::Null => Ok(Mapping::new()),
        other => Err(DiscourseError::Serialization(format!(
            "Frontmatter is not a mapping: {other:?}"
        ))),
    }
}

/// Replace (or add, or drop when empty) the frontmatter block of `text`.
pub fn with_frontmatter(text: &str, frontmatter: &Mapping) -> Result<String, DiscourseError> {
    let body = split_frontmatter(text).body;
    if frontmatter.is_empty() {
        return Ok(body.to_string());
    }
    let mut yaml = serde_yaml::to_string(frontmatter)?;
    if !yaml.ends_with('\n') {
        yaml.push('\n');
    }
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Targets of every `[[wikilink]]` in `text`, without aliases or heading/block suffixes.
pub fn wikilinks(text: &str) -> Vec<String> {
    MdParser::new_ext(text, vault_md_options())
        .filter_map(|event| match event {
            MdEvent::Start(MdTag::Link {
                link_type: LinkType::WikiLink { .. },
                dest_url,
                ..
            }) => Some(link_target(&dest_url).to_string()),
            _ => None,
        })
        .filter(|target| !target.is_empty())
        .collect()
}

/// `Note#Heading` and `Note#^block` both point at `Note`.
pub fn link_target(link: &str) -> &str {
    let link = link.trim();
    let link = link.strip_prefix("[[").unwrap_or(link);
    let link = link.strip_suffix("]]").unwrap_or(link);
    let link = link.split('|').next().unwrap_or(link);
    link.split('#').next().unwrap_or(link).trim()
}

/// The paragraph of `body` that ends in `^block_id`.
pub fn block_paragraph<'a>(body: &'a str, block_id: &str) -> Option<&'a str> {
    let marker = format!("^{block_id}");
    body.split("\n\n").find(|paragraph| {
        paragraph
            .trim_end()
            .lines()
            .last()
            .map(|line| line.trim_end().ends_with(&marker))
            .unwrap_or(false)
    })
}

/// Every `^block` id declared in `body`, with the wikilinks of its paragraph.
pub fn block_references(body: &str) -> Vec<(String, Vec<String>)> {
    body.split("\n\n")
        .filter_map(|paragraph| {
            let last = paragraph.trim_end().lines().last()?.trim_end();
            let (_, id) = last.rsplit_once('^')?;
            let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
            valid.then(|| (id.to_string(), wikilinks(paragraph)))
        })
        .collect()
}

/// Frontmatter list under `key` as strings, tolerating a single scalar.
pub fn string_list(frontmatter: &Mapping, key: &str) -> Vec<String> {
    match frontmatter.get(key) {
        Some(YamlValue::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(YamlValue::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
