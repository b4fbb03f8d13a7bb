//! Canonical entity tokens and the filter-string grammar.
//!
//! Every indexed entity is addressed by exactly one canonical token:
//!
//! - `U:<name>` / `U:<name>:<stars>` — a unit, optionally at a star level
//! - `I:<name>` — an item
//! - `T:<name>` / `T:<name>:<tier>` — a trait, optionally at an achieved tier
//! - `E:<unit>|<item>` / `E:<unit>|<item>:<copies>` — a unit holding an item
//!
//! A leading `-` or `!` marks negation ("match absence of"). Names are
//! case-folded to ASCII lowercase and trimmed before lookup, so two surface
//! spellings of the same entity can never resolve to different bitmaps.
//!
//! Parsing is strict: anything that does not match the grammar is a
//! [`TokenParseError`], never a best-effort guess. Callers that want the
//! degrade-to-empty behavior (the filter resolver) map the error to an empty
//! bitmap themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad token category, used for graph-builder candidate filtering and
/// search-index labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Unit,
    Item,
    Trait,
    Equipped,
}

/// Item subtype derived from the canonical item name.
///
/// The index artifact carries no item metadata, so classification is by
/// naming convention: emblems, radiant and artifact variants are marked in
/// the name, components come from the fixed base-component set, and
/// everything else is a completed ("full") item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Component,
    Full,
    Radiant,
    Artifact,
    Emblem,
}

const COMPONENT_ITEMS: &[&str] = &[
    "bfsword",
    "recurvebow",
    "chainvest",
    "negatroncloak",
    "giantsbelt",
    "needlesslylargerod",
    "tearofthegoddess",
    "sparringgloves",
    "spatula",
    "fryingpan",
];

impl ItemClass {
    /// Classify a canonical (lowercased) item name.
    pub fn classify(name: &str) -> ItemClass {
        if name.contains("emblem") {
            ItemClass::Emblem
        } else if name.contains("radiant") {
            ItemClass::Radiant
        } else if name.contains("artifact") || name.contains("ornn") {
            ItemClass::Artifact
        } else if COMPONENT_ITEMS.contains(&name) {
            ItemClass::Component
        } else {
            ItemClass::Full
        }
    }
}

/// A canonical entity token.
///
/// `Token` is the single key type of the whole engine: the catalog maps
/// tokens to bitmaps, filters are lists of signed tokens, and every ranked
/// row in graph/cluster/playbook output carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Token {
    Unit { name: String, stars: Option<u8> },
    Item { name: String },
    Trait { name: String, tier: Option<u8> },
    Equipped {
        unit: String,
        item: String,
        copies: Option<u8>,
    },
}

/// Strict parse failure for a single token string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenParseError {
    #[error("empty token")]
    Empty,
    #[error("missing `{0}:` prefix in `{1}`")]
    MissingPrefix(&'static str, String),
    #[error("unknown token prefix in `{0}`")]
    UnknownPrefix(String),
    #[error("empty entity name in `{0}`")]
    EmptyName(String),
    #[error("invalid numeric suffix in `{0}`")]
    BadNumber(String),
    #[error("star level out of range (1..=3) in `{0}`")]
    StarsOutOfRange(String),
    #[error("equipped copies must be >= 2 in `{0}`")]
    CopiesOutOfRange(String),
    #[error("item tokens take no qualifier in `{0}`")]
    ItemQualifier(String),
    #[error("equipped token needs `E:<unit>|<item>` in `{0}`")]
    MalformedEquipped(String),
}

impl Token {
    /// Parse one canonical token (without a sign). Input is case-folded and
    /// trimmed; the result round-trips through `Display`.
    pub fn parse(raw: &str) -> Result<Token, TokenParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TokenParseError::Empty);
        }
        let lower = raw.to_ascii_lowercase();
        let Some((prefix, rest)) = lower.split_once(':') else {
            return Err(TokenParseError::UnknownPrefix(raw.to_string()));
        };

        match prefix {
            "u" => {
                let (name, stars) = split_numeric_suffix(rest, raw)?;
                if name.is_empty() {
                    return Err(TokenParseError::EmptyName(raw.to_string()));
                }
                if let Some(s) = stars {
                    if !(1..=3).contains(&s) {
                        return Err(TokenParseError::StarsOutOfRange(raw.to_string()));
                    }
                }
                Ok(Token::Unit {
                    name: name.to_string(),
                    stars,
                })
            }
            "i" => {
                if rest.is_empty() {
                    return Err(TokenParseError::EmptyName(raw.to_string()));
                }
                // The grammar grants no `:<n>` qualifier to items; `I:x:2`
                // must fail loudly rather than name an item `x:2`.
                if rest.contains(':') {
                    return Err(TokenParseError::ItemQualifier(raw.to_string()));
                }
                Ok(Token::Item {
                    name: rest.to_string(),
                })
            }
            "t" => {
                let (name, tier) = split_numeric_suffix(rest, raw)?;
                if name.is_empty() {
                    return Err(TokenParseError::EmptyName(raw.to_string()));
                }
                Ok(Token::Trait {
                    name: name.to_string(),
                    tier,
                })
            }
            "e" => {
                let (pair, copies) = split_numeric_suffix(rest, raw)?;
                let Some((unit, item)) = pair.split_once('|') else {
                    return Err(TokenParseError::MalformedEquipped(raw.to_string()));
                };
                if unit.is_empty() || item.is_empty() {
                    return Err(TokenParseError::MalformedEquipped(raw.to_string()));
                }
                if let Some(c) = copies {
                    if c < 2 {
                        return Err(TokenParseError::CopiesOutOfRange(raw.to_string()));
                    }
                }
                Ok(Token::Equipped {
                    unit: unit.to_string(),
                    item: item.to_string(),
                    copies,
                })
            }
            _ => Err(TokenParseError::UnknownPrefix(raw.to_string())),
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Unit { .. } => TokenKind::Unit,
            Token::Item { .. } => TokenKind::Item,
            Token::Trait { .. } => TokenKind::Trait,
            Token::Equipped { .. } => TokenKind::Equipped,
        }
    }

    /// The token with star/tier/copy qualifiers stripped.
    ///
    /// Base tokens are what filters and clustering reason about when the
    /// qualifier does not matter: `U:ahri:2` and `U:ahri:3` share the base
    /// `U:ahri`.
    pub fn base(&self) -> Token {
        match self {
            Token::Unit { name, .. } => Token::Unit {
                name: name.clone(),
                stars: None,
            },
            Token::Item { name } => Token::Item { name: name.clone() },
            Token::Trait { name, .. } => Token::Trait {
                name: name.clone(),
                tier: None,
            },
            Token::Equipped { unit, item, .. } => Token::Equipped {
                unit: unit.clone(),
                item: item.clone(),
                copies: None,
            },
        }
    }

    /// Human-readable label for typeahead display.
    pub fn label(&self) -> String {
        match self {
            Token::Unit { name, stars: None } => title_case(name),
            Token::Unit {
                name,
                stars: Some(s),
            } => format!("{} ({}★)", title_case(name), s),
            Token::Item { name } => title_case(name),
            Token::Trait { name, tier: None } => title_case(name),
            Token::Trait {
                name,
                tier: Some(t),
            } => format!("{} {}", title_case(name), t),
            Token::Equipped {
                unit,
                item,
                copies: None,
            } => format!("{} + {}", title_case(unit), title_case(item)),
            Token::Equipped {
                unit,
                item,
                copies: Some(c),
            } => format!("{} + {} x{}", title_case(unit), title_case(item), c),
        }
    }

    /// Item class for graph-builder subtype filtering. `None` for non-item
    /// tokens (equipped tokens classify by their item half).
    pub fn item_class(&self) -> Option<ItemClass> {
        match self {
            Token::Item { name } => Some(ItemClass::classify(name)),
            Token::Equipped { item, .. } => Some(ItemClass::classify(item)),
            _ => None,
        }
    }

    /// Item-name view for family-prefix filtering, when the token has one.
    pub fn item_name(&self) -> Option<&str> {
        match self {
            Token::Item { name } => Some(name),
            Token::Equipped { item, .. } => Some(item),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Unit { name, stars: None } => write!(f, "U:{name}"),
            Token::Unit {
                name,
                stars: Some(s),
            } => write!(f, "U:{name}:{s}"),
            Token::Item { name } => write!(f, "I:{name}"),
            Token::Trait { name, tier: None } => write!(f, "T:{name}"),
            Token::Trait {
                name,
                tier: Some(t),
            } => write!(f, "T:{name}:{t}"),
            Token::Equipped {
                unit,
                item,
                copies: None,
            } => write!(f, "E:{unit}|{item}"),
            Token::Equipped {
                unit,
                item,
                copies: Some(c),
            } => write!(f, "E:{unit}|{item}:{c}"),
        }
    }
}

/// A token plus its negation flag, as written in a filter string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedToken {
    pub token: Token,
    pub negated: bool,
}

impl SignedToken {
    /// Parse one filter entry: optional `-`/`!` sign, then a token.
    pub fn parse(raw: &str) -> Result<SignedToken, TokenParseError> {
        let raw = raw.trim();
        let (negated, body) = if let Some(rest) = raw.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix('!') {
            (true, rest)
        } else {
            (false, raw)
        };
        Ok(SignedToken {
            token: Token::parse(body)?,
            negated,
        })
    }
}

/// Split a trailing `:<int>` qualifier off a token body, if present.
fn split_numeric_suffix<'a>(
    body: &'a str,
    raw: &str,
) -> Result<(&'a str, Option<u8>), TokenParseError> {
    match body.rsplit_once(':') {
        Some((head, tail)) => {
            let n: u8 = tail
                .parse()
                .map_err(|_| TokenParseError::BadNumber(raw.to_string()))?;
            Ok((head, Some(n)))
        }
        None => Ok((body, None)),
    }
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
