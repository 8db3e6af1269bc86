//! Content rewriting
//!
//! Pure, pattern-based rewriting of HTML and CSS text so that every embedded
//! reference loops back through the proxy. Nothing here touches the network
//! or holds state between calls.

pub mod css;
pub mod html;
pub mod interceptor;

pub use css::rewrite_css;
pub use html::rewrite_html;
pub use interceptor::{inject, interceptor_script};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::proxy::target::RewriteContext;

/// `encodeURIComponent` keeps `-_.!~*'()`; the quote is encoded here as well
/// so rewritten values stay inert inside single-quoted attributes.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a value for use inside the `url` query parameter
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Resolve `reference` against the context base and prefix it with the proxy
/// base. Returns `None` when the reference cannot be resolved, in which case
/// callers keep the original text.
pub(crate) fn proxied(reference: &str, ctx: &RewriteContext) -> Option<String> {
    let absolute = ctx.base().join(reference).ok()?;
    Some(format!(
        "{}{}",
        ctx.proxy_base().as_str(),
        encode_component(absolute.as_str())
    ))
}

/// Values that already route through this proxy are left alone so that a
/// second pass over rewritten content is a no-op for them.
pub(crate) fn is_proxied(reference: &str, ctx: &RewriteContext) -> bool {
    reference.starts_with(ctx.proxy_base().as_str())
}

pub(crate) fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
