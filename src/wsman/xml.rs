//! SOAP body parser.
//! Converts the XML envelopes printed by `wsman` into JSON documents keyed by
//! CIM property name. Namespace prefixes are dropped, attributes are ignored.
//!
//! Value rules:
//!   - leaf text that is a plain integer becomes a number ("2" -> 2, "007" stays a string)
//!   - "true"/"false" become booleans
//!   - repeated child elements become an array
//!   - elements with children become objects

use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(qualified_name: &str) -> Self {
        Self {
            name: local_name(qualified_name).to_string(),
            ..Default::default()
        }
    }

    /// Depth-first search by local name; does not descend into a match.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.find_all(name, out);
        }
    }

    pub fn to_value(&self) -> Value {
        if self.children.is_empty() {
            return scalar(self.text.trim());
        }

        let mut map = Map::new();
        for child in &self.children {
            let value = child.to_value();
            if let Some(existing) = map.get_mut(&child.name) {
                match existing {
                    Value::Array(items) => items.push(value),
                    _ => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, value]);
                    }
                }
            } else {
                map.insert(child.name.clone(), value);
            }
        }
        Value::Object(map)
    }
}

/// Every element named `name` across all documents in `xml`, as JSON.
pub fn documents(xml: &str, name: &str) -> Result<Vec<Value>, String> {
    let roots = parse(xml)?;
    let mut found = Vec::new();
    for root in &roots {
        root.find_all(name, &mut found);
    }
    Ok(found.into_iter().map(Element::to_value).collect())
}

/// Parse one or more concatenated XML documents into element trees.
/// Text outside any element (client chatter around the envelopes) is skipped.
pub fn parse(xml: &str) -> Result<Vec<Element>, String> {
    let mut roots = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut rest = xml;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<?") {
            rest = skip_past(after, "?>")?;
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = skip_past(after, "-->")?;
        } else if let Some(after) = rest.strip_prefix("<![CDATA[") {
            let end = after.find("]]>").ok_or("unterminated CDATA section")?;
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&after[..end]);
            }
            rest = &after[end + 3..];
        } else if let Some(after) = rest.strip_prefix("<!") {
            rest = skip_past(after, ">")?;
        } else if let Some(after) = rest.strip_prefix("</") {
            let end = after.find('>').ok_or("unterminated end tag")?;
            let name = local_name(after[..end].trim());
            let element = stack
                .pop()
                .ok_or_else(|| format!("unexpected end tag </{}>", name))?;
            if element.name != name {
                return Err(format!(
                    "mismatched end tag </{}>, expected </{}>",
                    name, element.name
                ));
            }
            attach(&mut stack, &mut roots, element);
            rest = &after[end + 1..];
        } else if let Some(after) = rest.strip_prefix('<') {
            let end = tag_end(after).ok_or("unterminated start tag")?;
            let tag = &after[..end];
            let (tag, self_closing) = match tag.strip_suffix('/') {
                Some(t) => (t, true),
                None => (tag, false),
            };
            let name = tag.split(char::is_whitespace).next().unwrap_or_default();
            if name.is_empty() {
                return Err("empty tag name".to_string());
            }
            let element = Element::new(name);
            if self_closing {
                attach(&mut stack, &mut roots, element);
            } else {
                stack.push(element);
            }
            rest = &after[end + 1..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&decode_entities(&rest[..end]));
            }
            rest = &rest[end..];
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unclosed element <{}>", open.name));
    }
    Ok(roots)
}

fn attach(stack: &mut [Element], roots: &mut Vec<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => roots.push(element),
    }
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn skip_past<'a>(s: &'a str, pattern: &str) -> Result<&'a str, String> {
    s.find(pattern)
        .map(|i| &s[i + pattern.len()..])
        .ok_or_else(|| format!("missing '{}'", pattern))
}

// Position of the closing '>' of a tag, ignoring any inside quoted attribute values.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn scalar(text: &str) -> Value {
    let negative = text.starts_with('-');
    let digits = text.strip_prefix('-').unwrap_or(text);
    // "007" and "-0" would not survive a round trip as numbers
    let plain_integer = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && !(digits.starts_with('0') && (digits.len() > 1 || negative));

    if plain_integer {
        if let Ok(n) = text.parse::<i64>() {
            return Value::from(n);
        }
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';').and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end))) {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = entity.strip_prefix('#')?;
            let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
