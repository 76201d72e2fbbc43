//! Renders the per-test HTML fragments that make up an exercise report.

pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the built-in fragment for one inline test: pass/fail glyph, the
/// error message if any, the submission source listing, and optionally the
/// raw runner log.
pub(crate) fn inline_fragment(
    name: &str,
    passed: bool,
    error: Option<&str>,
    source: &str,
    log: &str,
    include_logs: bool,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("<h2>{}</h2>\n", html_escape(name)));
    if passed {
        out.push_str("<span class='ico green'>&#10003;</span> <span class='message'>Looks OK.</span>\n");
    } else {
        out.push_str("<span class='ico red'>&#10007;</span> <span class='message'>Something is not right.</span>\n");
    }
    if let Some(error) = error {
        out.push_str(&format!("<pre class='error'>{}</pre>\n", html_escape(error)));
    }
    out.push_str(&format!(
        "<pre class='code'>{}</pre>\n",
        html_escape(source)
    ));
    if include_logs {
        out.push_str(&format!("<pre class='logs'>{}</pre>\n", html_escape(log)));
    }
    out
}

/// The fragment emitted when a report template script itself fails.
pub(crate) fn reporter_error_fragment(message: &str) -> String {
    format!(
        "\n<h2 style='color: red'>Reporter error</h2>\n<pre>{}</pre>",
        html_escape(message)
    )
}
