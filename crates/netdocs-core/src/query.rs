//! Search query mini-language.
//!
//! A query string is split on whitespace; tokens of the form `key:value`
//! with a recognized key become structured parameters, everything else is
//! joined back together (in order) as the full-text clause. Malformed
//! values never fail the parse, they fall back to the configured default.

pub const MIN_TOP: u32 = 1;
pub const MAX_TOP: u32 = 500;

pub const DEFAULT_SELECT: &str = "standardAttributes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    #[default]
    Relevance,
    LastMod,
}

impl OrderBy {
    /// Accepts either spelling case-insensitively; anything else is
    /// unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "relevance" => Some(Self::Relevance),
            "lastmod" => Some(Self::LastMod),
            _ => None,
        }
    }

    /// Canonical value sent in the `$orderby` parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::LastMod => "lastMod",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryDefaults {
    pub top: u32,
    pub order_by: OrderBy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub cabinet_id: Option<String>,
    pub top: u32,
    pub order_by: OrderBy,
    pub select: Vec<String>,
    pub full_text: String,
}

impl ParsedQuery {
    pub fn select_param(&self) -> String {
        self.select.join(",")
    }
}

/// Parses the mini-language. Recognized keys are consumed even when their
/// value is malformed; with duplicates the last occurrence wins.
pub fn parse(raw: &str, defaults: QueryDefaults) -> ParsedQuery {
    let mut cabinet_id = None;
    let mut top = None;
    let mut order_by = None;
    let mut select: Option<Vec<String>> = None;
    let mut residual: Vec<&str> = Vec::new();

    for token in raw.split_whitespace() {
        match recognized_key(token) {
            Some(("cabinetId", value)) => cabinet_id = Some(value.to_string()),
            Some(("top", value)) => {
                top = value
                    .parse::<u32>()
                    .ok()
                    .filter(|n| (MIN_TOP..=MAX_TOP).contains(n));
            }
            Some(("orderby", value)) => order_by = OrderBy::parse(value),
            Some(("select", value)) => {
                let fields: Vec<String> = value
                    .split(',')
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect();
                select = if fields.is_empty() { None } else { Some(fields) };
            }
            Some(_) | None => residual.push(token),
        }
    }

    ParsedQuery {
        cabinet_id,
        top: top.unwrap_or(defaults.top),
        order_by: order_by.unwrap_or(defaults.order_by),
        select: select.unwrap_or_else(|| vec![DEFAULT_SELECT.to_string()]),
        full_text: residual.join(" "),
    }
}

/// Splits a `key:value` token when the key is one of ours and the value is
/// non-empty. Tokens like `deadline:` or `foo:bar` stay full text.
fn recognized_key(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once(':')?;
    if value.is_empty() {
        return None;
    }
    matches!(key, "cabinetId" | "top" | "orderby" | "select").then_some((key, value))
}
