//! Multi-status result model and its `DAV:multistatus` XML rendering.

use crate::types::{PropertyName, WireElement, DAV_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated reply for one query: one response per entry, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiStatus {
    pub responses: Vec<EntryResponse>,
}

/// Per-entry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryResponse {
    /// Absolute, escaped reference to the entry.
    pub href: String,
    pub propstat: PropStat,
}

/// Property values sharing one status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropStat {
    pub props: Vec<WireElement>,
    /// e.g. `HTTP/1.1 200 OK`.
    pub status: String,
}

impl PropStat {
    pub fn ok(protocol: &str, props: Vec<WireElement>) -> Self {
        Self {
            props,
            status: format!("{protocol} 200 OK"),
        }
    }
}

impl MultiStatus {
    pub const STATUS_CODE: u16 = 207;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, response: EntryResponse) {
        self.responses.push(response);
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Renders the XML body. `DAV:` is bound to `D`, other namespaces to
    /// `ns0`, `ns1`, ... in order of first appearance.
    pub fn to_xml(&self) -> String {
        let prefixes = self.namespace_prefixes();

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus");
        for (namespace, prefix) in &prefixes {
            out.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape(namespace)));
        }
        out.push('>');

        for response in &self.responses {
            out.push_str("<D:response><D:href>");
            out.push_str(&escape(&response.href));
            out.push_str("</D:href><D:propstat><D:prop>");
            for prop in &response.propstat.props {
                write_element(&mut out, prop, &prefixes);
            }
            out.push_str("</D:prop><D:status>");
            out.push_str(&escape(&response.propstat.status));
            out.push_str("</D:status></D:propstat></D:response>");
        }

        out.push_str("</D:multistatus>\n");
        out
    }

    fn namespace_prefixes(&self) -> BTreeMap<String, String> {
        let mut prefixes = BTreeMap::new();
        prefixes.insert(DAV_NAMESPACE.to_string(), "D".to_string());

        let mut next = 0usize;
        let mut stack: Vec<&WireElement> = self
            .responses
            .iter()
            .flat_map(|r| r.propstat.props.iter())
            .rev()
            .collect();
        while let Some(element) = stack.pop() {
            let namespace = &element.name.namespace;
            if !namespace.is_empty() && !prefixes.contains_key(namespace) {
                prefixes.insert(element.name.namespace.clone(), format!("ns{next}"));
                next += 1;
            }
            stack.extend(element.children.iter().rev());
        }
        prefixes
    }
}

fn write_element(out: &mut String, element: &WireElement, prefixes: &BTreeMap<String, String>) {
    let tag = qualified_tag(&element.name, prefixes);
    if element.text.is_none() && element.children.is_empty() {
        out.push_str(&format!("<{tag}/>"));
        return;
    }

    out.push_str(&format!("<{tag}>"));
    if let Some(text) = &element.text {
        out.push_str(&escape(text));
    }
    for child in &element.children {
        write_element(out, child, prefixes);
    }
    out.push_str(&format!("</{tag}>"));
}

fn qualified_tag(name: &PropertyName, prefixes: &BTreeMap<String, String>) -> String {
    match prefixes.get(&name.namespace) {
        Some(prefix) if !name.namespace.is_empty() => format!("{prefix}:{}", name.local),
        _ => name.local.clone(),
    }
}

/// XML character escaping for text and attribute values.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
