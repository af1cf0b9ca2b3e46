//! Parser for the brace-delimited blacklist configuration.
//!
//! The grammar is a small keyword/value language:
//!
//! ```text
//! blacklist {
//!     disabled false
//!     dns-redirect-ip 0.0.0.0
//!     exclude apple.com
//!     domains {
//!         include adsrvr.org
//!         source malc0de {
//!             description "List of zones serving malicious executables"
//!             prefix "zone "
//!             url http://malc0de.com/bl/ZONES
//!         }
//!     }
//!     hosts { ... }
//! }
//! ```
//!
//! Parsing happens in two passes: a recursive-descent walk that produces a
//! generic `Node` tree, then a typed conversion into [`BlacklistTree`].
//! Unknown keywords are ignored so newer configurations still load.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::tree::{Area, BlacklistTree, Source, DEFAULT_REDIRECT_IP, DOMAINS, HOSTS};
use crate::validation::validate_redirect_ip;

const ROOT: &str = "blacklist";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Open,
    Close,
    Newline,
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    line: usize,
}

/// Generic configuration node: `key [value] [{ children }]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    key: String,
    value: Option<String>,
    children: Vec<Node>,
    is_block: bool,
    line: usize,
}

impl Node {
    fn leaves<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children
            .iter()
            .filter(move |n| !n.is_block && n.key == key)
    }

    fn last_leaf<'a>(&'a self, key: &'a str) -> Option<&'a Node> {
        self.leaves(key).last()
    }

    fn blocks<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children
            .iter()
            .filter(move |n| n.is_block && n.key == key)
    }

    /// Depth-first search for the first block named `key`.
    fn find_block(&self, key: &str) -> Option<&Node> {
        if self.is_block && self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(key))
    }
}

/// Parse configuration text into a [`BlacklistTree`].
pub fn parse(text: &str) -> Result<BlacklistTree, ConfigError> {
    let tokens = tokenize(text)?;
    let mut pos = 0;
    let nodes = parse_block(&tokens, &mut pos, 0)?;

    let root = nodes
        .iter()
        .find_map(|c| c.find_block(ROOT))
        .ok_or(ConfigError::MissingRoot)?;

    build_tree(root)
}

fn tokenize(text: &str) -> Result<Vec<Lexeme>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                tokens.push(Lexeme {
                    token: Token::Newline,
                    line,
                });
                line += 1;
            }
            '{' => tokens.push(Lexeme {
                token: Token::Open,
                line,
            }),
            '}' => tokens.push(Lexeme {
                token: Token::Close,
                line,
            }),
            '#' => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                let start = line;
                chars.next();
                let mut closed = false;
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if n == '\n' {
                        line += 1;
                    }
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return Err(ConfigError::MalformedBlock {
                        line: start,
                        reason: "unterminated comment".to_string(),
                    });
                }
            }
            '"' => {
                let start = line;
                let mut word = String::new();
                let mut closed = false;
                while let Some(n) = chars.next() {
                    match n {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                word.push(escaped);
                            }
                        }
                        '\n' => {
                            line += 1;
                            word.push(n);
                        }
                        _ => word.push(n),
                    }
                }
                if !closed {
                    return Err(ConfigError::MalformedBlock {
                        line: start,
                        reason: "unterminated quoted string".to_string(),
                    });
                }
                tokens.push(Lexeme {
                    token: Token::Word(word),
                    line: start,
                });
            }
            c if c.is_whitespace() => {}
            c => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() || matches!(n, '{' | '}' | '"') {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                tokens.push(Lexeme {
                    token: Token::Word(word),
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_block(tokens: &[Lexeme], pos: &mut usize, depth: usize) -> Result<Vec<Node>, ConfigError> {
    let mut nodes = Vec::new();

    loop {
        let Some(lexeme) = tokens.get(*pos) else {
            if depth > 0 {
                let line = tokens.last().map(|l| l.line).unwrap_or(1);
                return Err(ConfigError::MalformedBlock {
                    line,
                    reason: "unclosed block, expected '}'".to_string(),
                });
            }
            return Ok(nodes);
        };

        match &lexeme.token {
            Token::Newline => *pos += 1,
            Token::Close => {
                if depth == 0 {
                    return Err(ConfigError::MalformedBlock {
                        line: lexeme.line,
                        reason: "unexpected '}'".to_string(),
                    });
                }
                *pos += 1;
                return Ok(nodes);
            }
            Token::Open => {
                return Err(ConfigError::MalformedBlock {
                    line: lexeme.line,
                    reason: "block has no name".to_string(),
                });
            }
            Token::Word(_) => {
                let line = lexeme.line;
                let mut words = Vec::new();
                while let Some(Lexeme {
                    token: Token::Word(w),
                    ..
                }) = tokens.get(*pos)
                {
                    words.push(w.clone());
                    *pos += 1;
                }

                let key = words.remove(0);
                let value = if words.is_empty() {
                    None
                } else {
                    Some(words.join(" "))
                };

                let is_block = matches!(tokens.get(*pos).map(|l| &l.token), Some(Token::Open));
                let children = if is_block {
                    *pos += 1;
                    parse_block(tokens, pos, depth + 1)?
                } else {
                    Vec::new()
                };

                nodes.push(Node {
                    key,
                    value,
                    children,
                    is_block,
                    line,
                });
            }
        }
    }
}

fn build_tree(root: &Node) -> Result<BlacklistTree, ConfigError> {
    let disabled = parse_flag(root)?;
    let redirect_ip = parse_redirect(root)?.unwrap_or(DEFAULT_REDIRECT_IP);
    let exclude = list_values(root, "exclude");

    let mut areas: Vec<Area> = Vec::new();
    for block in root.children.iter().filter(|n| n.is_block) {
        if block.key != DOMAINS && block.key != HOSTS {
            continue;
        }
        let parsed = build_area(block, redirect_ip)?;
        match areas.iter_mut().find(|a| a.name == parsed.name) {
            Some(existing) => merge_area(existing, parsed),
            None => areas.push(parsed),
        }
    }

    if areas.is_empty() {
        return Err(ConfigError::NoAreas);
    }

    Ok(BlacklistTree::new(disabled, redirect_ip, exclude, areas))
}

fn build_area(block: &Node, inherited_ip: Ipv4Addr) -> Result<Area, ConfigError> {
    let mut area = Area::new(block.key.clone(), inherited_ip);
    area.disabled = parse_flag(block)?;
    if let Some(ip) = parse_redirect(block)? {
        area.redirect_ip = ip;
    }
    area.include = list_values(block, "include");
    area.exclude = list_values(block, "exclude");
    area.sources = block.blocks("source").map(build_source).collect();
    Ok(area)
}

fn build_source(block: &Node) -> Source {
    let text = |key: &str| block.last_leaf(key).and_then(|n| n.value.clone());
    Source {
        name: block.value.clone().unwrap_or_default(),
        url: text("url"),
        file: text("file").map(PathBuf::from),
        prefix: text("prefix").filter(|p| !p.is_empty()),
        description: text("description").unwrap_or_default(),
    }
}

/// Repeated areas are folded into the first occurrence.
fn merge_area(existing: &mut Area, other: Area) {
    existing.disabled |= other.disabled;
    existing.include.extend(other.include);
    existing.exclude.extend(other.exclude);
    existing.sources.extend(other.sources);
}

fn parse_flag(node: &Node) -> Result<bool, ConfigError> {
    match node.last_leaf("disabled") {
        None => Ok(false),
        Some(leaf) => match leaf.value.as_deref() {
            None | Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ConfigError::MalformedBlock {
                line: leaf.line,
                reason: format!("disabled expects true or false, got '{}'", other),
            }),
        },
    }
}

fn parse_redirect(node: &Node) -> Result<Option<Ipv4Addr>, ConfigError> {
    match node.last_leaf("dns-redirect-ip") {
        None => Ok(None),
        Some(leaf) => {
            let value = leaf.value.as_deref().unwrap_or_default();
            validate_redirect_ip(value).map(Some)
        }
    }
}

fn list_values(node: &Node, key: &str) -> Vec<String> {
    node.leaves(key)
        .filter_map(|n| n.value.as_deref())
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}
