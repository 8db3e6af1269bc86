//! Reference rewriting for HTML documents
//!
//! Works on the raw markup bytes with regular expressions rather than a DOM,
//! so anything the patterns do not recognise passes through unchanged,
//! including text in legacy single-byte charsets.

use std::sync::LazyLock;

use regex::bytes::{Captures, NoExpand, Regex};

use super::css::{rewrite_css, rewrite_css_quoted};
use super::interceptor::inject;
use super::{is_proxied, proxied, starts_with_ignore_case};
use crate::proxy::target::RewriteContext;

static LINK_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)(\s)(href|src|action)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("link attribute pattern is valid")
});

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is-u)(<style\b[^>]*>)(.*?)(</style\s*>)").expect("style block pattern is valid")
});

static STYLE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)(\sstyle\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("style attribute pattern is valid")
});

static QUOT_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("&quot;").expect("quot entity pattern is valid"));

static DOUBLE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\"").expect("double quote pattern is valid"));

const SKIPPED_PREFIXES: [&str; 3] = ["#", "javascript:", "data:"];

/// Rewrite `html` so every reference routes through the proxy, then inject
/// the network interceptor before `</body>`.
pub fn rewrite_html(html: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    let html = rewrite_link_attributes(html, ctx);
    let html = rewrite_style_blocks(&html, ctx);
    let html = rewrite_style_attributes(&html, ctx);
    inject(&html)
}

fn rewrite_link_attributes(html: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    LINK_ATTR
        .replace_all(html, |caps: &Captures| {
            let (value, quote) = match caps.get(4) {
                Some(m) => (m.as_bytes(), b'"'),
                None => (caps.get(5).map_or(&b""[..], |m| m.as_bytes()), b'\''),
            };

            match rewrite_reference(value, ctx) {
                Some(rewritten) => {
                    let mut out = Vec::with_capacity(caps[0].len() + rewritten.len());
                    out.extend_from_slice(&caps[1]);
                    out.extend_from_slice(&caps[2]);
                    out.extend_from_slice(&caps[3]);
                    out.push(quote);
                    out.extend_from_slice(rewritten.as_bytes());
                    out.push(quote);
                    out
                }
                None => caps[0].to_vec(),
            }
        })
        .into_owned()
}

fn rewrite_reference(value: &[u8], ctx: &RewriteContext) -> Option<String> {
    let value = String::from_utf8_lossy(value);
    let value = value.trim();
    if value.is_empty()
        || SKIPPED_PREFIXES
            .iter()
            .any(|prefix| starts_with_ignore_case(value, prefix))
        || is_proxied(value, ctx)
    {
        return None;
    }

    proxied(&value.replace("&amp;", "&"), ctx)
}

fn rewrite_style_blocks(html: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    STYLE_BLOCK
        .replace_all(html, |caps: &Captures| {
            [&caps[1], rewrite_css(&caps[2], ctx).as_slice(), &caps[3]].concat()
        })
        .into_owned()
}

fn rewrite_style_attributes(html: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    STYLE_ATTR
        .replace_all(html, |caps: &Captures| match caps.get(2) {
            Some(m) => {
                // Double-quoted: entity-encoded quotes are CSS quotes
                let css = QUOT_ENTITY.replace_all(m.as_bytes(), NoExpand(b"\""));
                let css = rewrite_css_quoted(&css, ctx, b'\'');
                let css = DOUBLE_QUOTE.replace_all(&css, NoExpand(b"&quot;"));
                [&caps[1], &b"\""[..], &*css, &b"\""[..]].concat()
            }
            None => {
                let css = caps.get(3).map_or(&b""[..], |m| m.as_bytes());
                let css = rewrite_css_quoted(css, ctx, b'"');
                [&caps[1], &b"'"[..], css.as_slice(), &b"'"[..]].concat()
            }
        })
        .into_owned()
}
