//! Model response parsing into a typed [`AgentAction`].
//!
//! Models are asked for a single `Action: ...` line but answer in whatever
//! shape they like. Several recovery strategies are tried in order:
//!
//! 1. Direct JSON (`{"action": "BUY", "item_name": ..., "quantity": ...}`)
//! 2. JSON inside a markdown code block
//! 3. Either of the above with trailing commas stripped
//! 4. The `Action: BUY, Item: 'Classic Cola', Quantity: 10` line form
//! 5. A bare `DO_NOTHING` anywhere in the text
//!
//! If everything fails the decision is [`AgentAction::NoOp`] and a warning
//! is logged. An unparseable answer never fails a step.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;
use webvend_types::AgentAction;

/// Which strategy produced the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole response was JSON.
    Json,
    /// JSON was found in a code block.
    CodeBlock,
    /// JSON parsed after removing trailing commas.
    TrailingCommas,
    /// The `Action: ...` line form.
    ActionLine,
    /// A bare `DO_NOTHING` keyword.
    Keyword,
    /// Nothing matched; defaulted to no-op.
    Fallback,
}

impl ParseStrategy {
    /// Stable name for logs and step records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::CodeBlock => "code_block",
            Self::TrailingCommas => "trailing_commas",
            Self::ActionLine => "action_line",
            Self::Keyword => "keyword",
            Self::Fallback => "fallback",
        }
    }
}

/// A parsed decision and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDecision {
    /// The chosen action.
    pub action: AgentAction,
    /// The strategy that recognized it.
    pub strategy: ParseStrategy,
}

/// Parse a raw model response. Never fails.
pub fn parse_decision(raw: &str) -> ParsedDecision {
    match try_parse(raw.trim()) {
        Some((action, strategy)) => ParsedDecision { action, strategy },
        None => {
            warn!(raw_response = raw, "failed to parse model response, defaulting to DO_NOTHING");
            ParsedDecision {
                action: AgentAction::NoOp,
                strategy: ParseStrategy::Fallback,
            }
        }
    }
}

fn try_parse(text: &str) -> Option<(AgentAction, ParseStrategy)> {
    if let Ok(action) = serde_json::from_str::<AgentAction>(text) {
        return Some((action, ParseStrategy::Json));
    }

    let block = extract_codeblock(text);
    if let Some(inner) = block
        && let Ok(action) = serde_json::from_str::<AgentAction>(inner)
    {
        return Some((action, ParseStrategy::CodeBlock));
    }

    let candidates = [Some(text), block];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(action) = serde_json::from_str::<AgentAction>(&strip_trailing_commas(candidate)) {
            return Some((action, ParseStrategy::TrailingCommas));
        }
    }

    if let Some(action) = parse_action_line(text) {
        return Some((action, ParseStrategy::ActionLine));
    }

    text.to_ascii_uppercase()
        .contains("DO_NOTHING")
        .then_some((AgentAction::NoOp, ParseStrategy::Keyword))
}

// ---------------------------------------------------------------------------
// JSON recovery
// ---------------------------------------------------------------------------

/// The body of the first fenced code block, language tag dropped.
fn extract_codeblock(text: &str) -> Option<&str> {
    let (_, after_fence) = text.split_once("```")?;
    // Skip the rest of the opening fence line (e.g. `json`).
    let body = match after_fence.split_once('\n') {
        Some((tag, rest)) if !tag.trim_start().starts_with('{') => rest,
        _ => after_fence,
    };
    let (inner, _) = body.split_once("```")?;
    Some(inner.trim())
}

/// Drop commas that directly precede a closing brace or bracket.
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == ',' {
            let rest = chars.clone().find(|n| !n.is_whitespace());
            if matches!(rest, Some('}' | ']')) {
                continue;
            }
        }
        result.push(c);
    }
    result
}

// ---------------------------------------------------------------------------
// Action line
// ---------------------------------------------------------------------------

/// Parse `Action: X, Item: 'Y', Quantity|Price|Discount: Z`.
fn parse_action_line(text: &str) -> Option<AgentAction> {
    let line = text.lines().find_map(|line| {
        // ASCII lowercasing keeps byte offsets stable.
        let pos = line.to_ascii_lowercase().find("action:")?;
        line.get(pos..)
    })?;

    let fields: BTreeMap<String, &str> = split_fields(line)
        .into_iter()
        .filter_map(|field| {
            let (key, value) = field.split_once(':')?;
            Some((key.trim().to_ascii_lowercase(), value))
        })
        .collect();

    let name = unquote(fields.get("action")?).to_ascii_uppercase();
    match name.as_str() {
        "DO_NOTHING" => Some(AgentAction::NoOp),
        "BUY" => Some(AgentAction::Buy {
            item_name: unquote(fields.get("item")?).to_owned(),
            quantity: leading_digits(fields.get("quantity")?).parse().ok()?,
        }),
        "UPDATE_PRICE" => {
            let price = fields.get("price")?.trim().trim_start_matches('$');
            let end = price
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(price.len());
            Some(AgentAction::UpdatePrice {
                item_name: unquote(fields.get("item")?).to_owned(),
                price: Decimal::from_str(price.get(..end)?.trim_end_matches('.')).ok()?,
            })
        }
        "OFFER_DISCOUNT" => Some(AgentAction::OfferDiscount {
            item_name: unquote(fields.get("item")?).to_owned(),
            discount_percent: leading_digits(fields.get("discount")?).parse().ok()?,
        }),
        _ => None,
    }
}

/// Split on commas that are not inside single or double quotes.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, ',') => {
                if let Some(field) = line.get(start..i) {
                    fields.push(field);
                }
                start = i.saturating_add(1);
            }
            _ => {}
        }
    }
    if let Some(field) = line.get(start..) {
        fields.push(field);
    }
    fields
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '*' | '`'))
}

fn leading_digits(value: &str) -> &str {
    let value = value.trim();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value.get(..end).unwrap_or_default()
}
