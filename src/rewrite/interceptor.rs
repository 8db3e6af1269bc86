//! Client-side interception of runtime network calls
//!
//! Markup rewriting only covers references present when the page is fetched.
//! The injected script patches `fetch` and `XMLHttpRequest` so requests the
//! page builds at runtime are routed through the proxy as well.

use std::sync::LazyLock;

use regex::bytes::Regex;

const INTERCEPTOR_SCRIPT: &str = r#"<script>
(function () {
  var proxyBase = location.origin + "/proxy?url=";

  function shouldProxy(url) {
    return typeof url === "string" && /^https?:\/\//i.test(url) && url.indexOf(proxyBase) !== 0;
  }

  function toProxy(url) {
    if (url instanceof URL) {
      url = url.href;
    }
    return shouldProxy(url) ? proxyBase + encodeURIComponent(url) : url;
  }

  var originalFetch = window.fetch;
  if (typeof originalFetch === "function") {
    window.fetch = function (input, init) {
      if (typeof input === "string" || input instanceof URL) {
        input = toProxy(input);
      } else if (input && typeof input.url === "string" && shouldProxy(input.url)) {
        input = new Request(toProxy(input.url), input);
      }
      return originalFetch.call(this, input, init);
    };
  }

  var OriginalXHR = window.XMLHttpRequest;
  if (typeof OriginalXHR === "function") {
    var ProxiedXHR = function () {
      var xhr = new OriginalXHR();
      var originalOpen = xhr.open;
      xhr.open = function (method, url) {
        var args = Array.prototype.slice.call(arguments);
        args[1] = toProxy(url);
        return originalOpen.apply(xhr, args);
      };
      return xhr;
    };
    ProxiedXHR.prototype = OriginalXHR.prototype;
    ["UNSENT", "OPENED", "HEADERS_RECEIVED", "LOADING", "DONE"].forEach(function (name) {
      ProxiedXHR[name] = OriginalXHR[name];
    });
    window.XMLHttpRequest = ProxiedXHR;
  }
})();
</script>"#;

static BODY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i-u)</body\s*>").expect("body close pattern is valid"));

/// The `<script>` element spliced into proxied documents
pub fn interceptor_script() -> &'static str {
    INTERCEPTOR_SCRIPT
}

/// Insert the interceptor immediately before the last `</body>` tag.
/// Documents without one are returned unchanged.
pub fn inject(html: &[u8]) -> Vec<u8> {
    let Some(close) = BODY_CLOSE.find_iter(html).last() else {
        return html.to_vec();
    };

    let mut out = Vec::with_capacity(html.len() + INTERCEPTOR_SCRIPT.len());
    out.extend_from_slice(&html[..close.start()]);
    out.extend_from_slice(INTERCEPTOR_SCRIPT.as_bytes());
    out.extend_from_slice(&html[close.start()..]);
    out
}
