//! Tolerant extraction of `openid.server` / `openid.delegate` link tags from
//! an identity page.
//!
//! Identity pages in the wild are rarely valid HTML, so this is a lenient
//! scanner rather than a real parser: tag and attribute names match
//! case-insensitively, attribute values may be double-quoted, single-quoted,
//! or bare, and `rel` is treated as whitespace-separated multi-valued.

use once_cell::sync::Lazy;
use regex::Regex;

// Link discovery is constrained to the document head; scanning stops at the
// first `</head>` or `<body>`.
static HEAD_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</head\s*>|<body[\s>]").unwrap());

static LINK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link\s([^>]*)>").unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)([a-z0-9._-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

#[derive(Debug, Default, PartialEq)]
pub(crate) struct OpenIdLinks {
    pub(crate) server: Option<String>,
    pub(crate) delegate: Option<String>,
}

/// Scan the head of `html` for the first `openid.server` and `openid.delegate`
/// links.
pub(crate) fn find_openid_links(html: &str) -> OpenIdLinks {
    let head = match HEAD_END.find(html) {
        Some(m) => &html[..m.start()],
        None => html,
    };

    let mut links = OpenIdLinks::default();
    for tag in LINK_TAG.captures_iter(head) {
        let mut rel = None;
        let mut href = None;
        for attribute in ATTRIBUTE.captures_iter(&tag[1]) {
            let value = attribute
                .get(2)
                .or_else(|| attribute.get(3))
                .or_else(|| attribute.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            match attribute[1].to_ascii_lowercase().as_str() {
                "rel" => rel = Some(value.to_string()),
                "href" => href = Some(value.to_string()),
                _ => {}
            }
        }
        let (Some(rel), Some(href)) = (rel, href) else {
            continue;
        };
        for rel_value in rel.split_whitespace() {
            if rel_value.eq_ignore_ascii_case("openid.server") && links.server.is_none() {
                links.server = Some(href.clone());
            }
            if rel_value.eq_ignore_ascii_case("openid.delegate") && links.delegate.is_none() {
                links.delegate = Some(href.clone());
            }
        }
        if links.server.is_some() && links.delegate.is_some() {
            break;
        }
    }
    links
}
