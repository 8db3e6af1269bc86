//! `url(...)` rewriting for stylesheets, `<style>` blocks and style attributes

use std::sync::LazyLock;

use regex::bytes::{Captures, Regex};

use super::{is_proxied, proxied, starts_with_ignore_case};
use crate::proxy::target::RewriteContext;

// Byte-oriented so stylesheets in any ASCII-compatible charset survive intact
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"')]*?))\s*\)"#)
        .expect("css url pattern is valid")
});

/// Rewrite every `url(...)` in `css` to go through the proxy
pub fn rewrite_css(css: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    rewrite_css_quoted(css, ctx, b'"')
}

/// Same as [`rewrite_css`] but emits `quote` around rewritten values, for CSS
/// that sits inside an attribute delimited by the other quote character.
pub(crate) fn rewrite_css_quoted(css: &[u8], ctx: &RewriteContext, quote: u8) -> Vec<u8> {
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            let original = &caps[0];
            let value = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| String::from_utf8_lossy(m.as_bytes()))
                .unwrap_or_default();
            let value = value.trim();

            if should_skip(value, ctx) {
                return original.to_vec();
            }

            match proxied(value, ctx) {
                Some(rewritten) => {
                    let quote = char::from(quote);
                    format!("url({quote}{rewritten}{quote})").into_bytes()
                }
                None => original.to_vec(),
            }
        })
        .into_owned()
}

fn should_skip(value: &str, ctx: &RewriteContext) -> bool {
    value.is_empty()
        || value.starts_with('#')
        || starts_with_ignore_case(value, "data:")
        || is_proxied(value, ctx)
}
