//! Email address parsing (RFC 5322 §3.4).

/// A parsed mailbox.
///
/// # Examples
/// - `"Jean Dupont <jean@exemple.fr>"` → `display_name = "Jean Dupont"`, `address = "jean@exemple.fr"`
/// - `"jean@exemple.fr (Jean)"` → `display_name = "Jean"`, `address = "jean@exemple.fr"`
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Parse a single mailbox. Unparseable input is stored as the address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        // "user@domain (Comment Name)"
        if let (Some(open), true) = (trimmed.find('('), trimmed.ends_with(')')) {
            return Self {
                display_name: trimmed[open + 1..trimmed.len() - 1].trim().to_string(),
                address: trimmed[..open].trim().to_string(),
            };
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated address list.
    ///
    /// Commas inside quotes, comments or angle brackets do not split, and group syntax
    /// (`Team: a@b.com, c@d.com;`) yields the group members.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;
        let mut comment_depth = 0usize;

        let mut flush = |current: &mut String| {
            let addr = Self::parse(current);
            if !addr.is_empty() {
                results.push(addr);
            }
            current.clear();
        };

        for ch in raw.chars() {
            match ch {
                '"' if comment_depth == 0 => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '(' if !in_quotes => {
                    comment_depth += 1;
                    current.push(ch);
                }
                ')' if !in_quotes && comment_depth > 0 => {
                    comment_depth -= 1;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                // Group display name ends here
                ':' if !in_quotes && !in_angle && comment_depth == 0 => current.clear(),
                ',' | ';' if !in_quotes && !in_angle && comment_depth == 0 => {
                    flush(&mut current)
                }
                _ => current.push(ch),
            }
        }
        flush(&mut current);

        results
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }

    /// Lookup key: the address, lowercased.
    pub fn key(&self) -> String {
        self.address.to_lowercase()
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}
