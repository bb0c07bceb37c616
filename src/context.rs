//! Request-scoped context consulted when a log entry is enriched.
//!
//! Web framework integration wraps each inbound request in [`scope`] (or
//! [`sync_scope`] on a plain thread); the context is visible to every log
//! call made inside that scope and is gone as soon as the scope returns.
//! Outside any scope [`current`] is `None`.

use std::future::Future;

use crate::entry::HttpRequestInfo;

/// W3C trace context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Google Cloud trace header, `TRACE_ID/SPAN_ID;o=OPTIONS`.
pub const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

/// Trace, span and HTTP request for one inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub http_request: Option<HttpRequestInfo>,
}

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Run `fut` with `ctx` as the ambient request context.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(ctx, fut).await
}

/// Run `f` with `ctx` as the ambient request context on the current thread.
pub fn sync_scope<F, R>(ctx: RequestContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    REQUEST_CONTEXT.sync_scope(ctx, f)
}

/// The ambient request context, if the caller is inside a scope.
pub fn current() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_span(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_http_request(mut self, http_request: HttpRequestInfo) -> Self {
        self.http_request = Some(http_request);
        self
    }

    /// Build a context from inbound request headers.
    ///
    /// `traceparent` wins over `X-Cloud-Trace-Context`. Header names are
    /// matched case-insensitively. Headers that do not parse contribute
    /// nothing; no identifier is ever invented.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut traceparent = None;
        let mut cloud_trace = None;
        let mut http = HttpRequestInfo::default();

        for (name, value) in headers {
            let name = name.as_ref();
            let value = value.as_ref().trim();
            if name.eq_ignore_ascii_case(TRACEPARENT_HEADER) {
                traceparent = parse_traceparent(value);
            } else if name.eq_ignore_ascii_case(CLOUD_TRACE_HEADER) {
                cloud_trace = parse_cloud_trace(value);
            } else if name.eq_ignore_ascii_case("user-agent") {
                http.user_agent = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("referer") {
                http.referer = Some(value.to_string());
            }
        }

        let (trace_id, span_id) = traceparent.or(cloud_trace).unwrap_or_default();
        RequestContext {
            trace_id,
            span_id,
            http_request: (!http.is_empty()).then_some(http),
        }
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn all_zero(s: &str) -> bool {
    s.bytes().all(|b| b == b'0')
}

/// `VERSION-TRACE_ID-PARENT_ID-FLAGS`, e.g.
/// `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`.
fn parse_traceparent(value: &str) -> Option<(Option<String>, Option<String>)> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if !is_hex(version, 2) || version.eq_ignore_ascii_case("ff") || !is_hex(flags, 2) {
        return None;
    }
    if !is_hex(trace_id, 32) || all_zero(trace_id) {
        return None;
    }
    let span_id = (is_hex(span_id, 16) && !all_zero(span_id)).then(|| span_id.to_ascii_lowercase());
    Some((Some(trace_id.to_ascii_lowercase()), span_id))
}

/// `TRACE_ID[/SPAN_ID][;o=OPTIONS]`, span id in decimal.
fn parse_cloud_trace(value: &str) -> Option<(Option<String>, Option<String>)> {
    let without_options = value.split(';').next()?;
    let mut parts = without_options.splitn(2, '/');
    let trace_id = parts.next()?.trim();
    if !is_hex(trace_id, 32) || all_zero(trace_id) {
        return None;
    }
    let span_id = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|s| *s != 0)
        .map(|s| format!("{s:016x}"));
    Some((Some(trace_id.to_ascii_lowercase()), span_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

    #[test]
    fn outside_scope_is_absent() {
        assert_eq!(current(), None);
    }

    #[test]
    fn sync_scope_sets_and_clears() {
        let ctx = RequestContext::new().with_trace(TRACE).with_span("b7ad6b7169203331");
        let seen = sync_scope(ctx.clone(), current);
        assert_eq!(seen, Some(ctx));
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn async_scope_is_visible_across_awaits() {
        let ctx = RequestContext::new().with_trace(TRACE);
        let seen = scope(ctx.clone(), async {
            tokio::task::yield_now().await;
            current()
        })
        .await;
        assert_eq!(seen, Some(ctx));
        assert_eq!(current(), None);
    }

    #[test]
    fn traceparent_parses() {
        let ctx = RequestContext::from_headers([(
            "traceparent",
            "00-0AF7651916CD43DD8448EB211C80319C-b7ad6b7169203331-01",
        )]);
        assert_eq!(ctx.trace_id.as_deref(), Some(TRACE));
        assert_eq!(ctx.span_id.as_deref(), Some("b7ad6b7169203331"));
        assert_eq!(ctx.http_request, None);
    }

    #[test]
    fn traceparent_wins_over_cloud_trace() {
        let ctx = RequestContext::from_headers([
            ("X-Cloud-Trace-Context", "11111111111111111111111111111111/1;o=1"),
            ("Traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"),
        ]);
        assert_eq!(ctx.trace_id.as_deref(), Some(TRACE));
    }

    #[test]
    fn cloud_trace_span_becomes_hex() {
        let ctx = RequestContext::from_headers([(
            "X-Cloud-Trace-Context",
            "0af7651916cd43dd8448eb211c80319c/255;o=1",
        )]);
        assert_eq!(ctx.trace_id.as_deref(), Some(TRACE));
        assert_eq!(ctx.span_id.as_deref(), Some("00000000000000ff"));
    }

    #[test]
    fn cloud_trace_without_span() {
        let ctx = RequestContext::from_headers([("x-cloud-trace-context", TRACE)]);
        assert_eq!(ctx.trace_id.as_deref(), Some(TRACE));
        assert_eq!(ctx.span_id, None);
    }

    #[test]
    fn malformed_headers_yield_nothing() {
        let ctx = RequestContext::from_headers([
            ("traceparent", "00-00000000000000000000000000000000-b7ad6b7169203331-01"),
            ("x-cloud-trace-context", "not-a-trace/12"),
        ]);
        assert_eq!(ctx, RequestContext::default());

        let ctx = RequestContext::from_headers([("traceparent", "garbage")]);
        assert_eq!(ctx.trace_id, None);
    }

    #[test]
    fn malformed_traceparent_falls_back_to_cloud_trace() {
        let ctx = RequestContext::from_headers([
            ("traceparent", "00-zz-b7ad6b7169203331-01"),
            ("x-cloud-trace-context", "0af7651916cd43dd8448eb211c80319c/1"),
        ]);
        assert_eq!(ctx.trace_id.as_deref(), Some(TRACE));
        assert_eq!(ctx.span_id.as_deref(), Some("0000000000000001"));
    }

    #[test]
    fn user_agent_and_referer_fill_http_request() {
        let ctx = RequestContext::from_headers([
            ("User-Agent", "curl/8.0"),
            ("Referer", "https://example.com/"),
        ]);
        let http = ctx.http_request.unwrap();
        assert_eq!(http.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(http.referer.as_deref(), Some("https://example.com/"));
    }
}
