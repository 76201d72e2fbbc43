//! The built-in HTML surface: upload form, report page with its inlined
//! stylesheet, the self-refreshing placeholder, and the favicon bytes.

pub(crate) const UPLOAD_FORM_HTML: &str = r#"<!DOCTYPE html>
<title>Upload notebook | nbgrade</title>
<link rel='stylesheet' type='text/css' href='/static/style.css'/>
<h2>Notebook upload</h2>
You can upload a notebook for checking.
<p>
<form method="POST" action="/upload" enctype="multipart/form-data">
	<input type="file" name="notebook">
	<input type="submit" value="Upload">
</form>"#;

pub(crate) fn upload_result_page(report_url: &str) -> String {
    format!(
        "<html>\n<title>Upload completed</title>\n\
         <link rel='stylesheet' type='text/css' href='/static/style.css'/>\n\
         <h2>Upload succeeded</h2>\nClick here for the <a href='{report_url}'>Report</a>.\n"
    )
}

pub(crate) fn waiting_page(reload_ms: i64) -> String {
    format!(
        "<title>Please wait</title>\n\
         <script>\n\
         function refresh(t) {{\n\
         \tsetTimeout(\"location.reload(true)\", t)\n\
         }}\n\
         </script>\n\
         <body onload=\"refresh({reload_ms})\">\n\
         <h2>Waiting for {} seconds, report is being generated now</h2>\n\
         </body>",
        (reload_ms + 999) / 1000
    )
}

pub(crate) const ERROR_PAGE: &str = "<title>Something went wrong</title>\n\
<h2>Error</h2>\n\
Something went wrong, please reload this page.\n\
If reloading does not help, wait a minute and retry your upload.\n";

// The OK/FAIL glyphs, line-numbered code blocks and syntax-highlight colors
// used by the report fragments.
const REPORT_STYLE: &str = r#"h2 {
  color: #697;
  font-size: 10pt;
  font-family: Verdana, Arial, sans-serif;
  margin-top: 2em;
}
.message {
  font-size: 14pt;
  font-weight: medium;
}
.ico {
  font-size: 16pt;
  font-weight: bold;
  padding: 0px 2px 0px 2px;
  margin: 10px 4px 1px 4px;
  background: #EEE;
  border: 1pt solid #DDD;
  border-radius: 3pt;
}
.green {
  color: #2F2;
}
.red {
  color: #F22;
}
.error {
  color: #B00;
}
.code, .logs {
  white-space: pre;
  font-family: monospace;
  background: #F0F0F0;
  padding: 3pt;
  margin: 4pt;
  border: 1pt solid #DDD;
  border-radius: 3pt;
}
.code ol {
  margin: 0px;
  padding: 0px;
  padding-inline-start: 22pt;
  margin-block-start: 0em;
  margin-block-end: 0em;
  line-height: 10%;
}
.code ol li {
  margin: 0px;
  padding: 0px;
  line-height: 120%;
}
.code ol li:nth-child(odd) {
  background: #F8F8F8;
}
.code li:last-child {
  margin-bottom: 0px;
}

/* Highlight colors for pre-rendered code fragments. */
.pln { color: #000 }
.str { color: #080 }
.kwd { color: #008 }
.com { color: #800 }
.typ { color: #606 }
.lit { color: #066 }
.pun, .opn, .clo { color: #660 }
.tag { color: #008 }
.atn { color: #606 }
.atv { color: #080 }
.dec, .var { color: #606 }
.fun { color: red }
ol.linenums { margin-top: 0; margin-bottom: 0 }
li.L1, li.L3, li.L5, li.L7, li.L9 { background: #eee }
"#;

/// The full report page: every exercise fragment in ascending exercise-id
/// order, wrapped with the inlined stylesheet.
pub(crate) fn report_page(
    submission_id: &str,
    exercises: &[(String, String)],
    error: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<title>Report for {submission_id}</title>\n<style type='text/css'>\n{REPORT_STYLE}</style>\n"
    ));
    for (exercise_id, html) in exercises {
        out.push_str(&format!("<h2>{exercise_id}</h2>\n{html}\n"));
    }
    if let Some(error) = error {
        out.push_str(&format!("<div class='error'>\n{error}\n</div>\n"));
    }
    out
}

// A 1x1 32-bit icon, served from memory.
pub(crate) const FAVICON: &[u8] = &[
    // ICONDIR
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, //
    // ICONDIRENTRY: 1x1, 32bpp, 48 bytes at offset 22
    0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00, //
    0x30, 0x00, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00, //
    // BITMAPINFOHEADER (height doubled for the AND mask)
    0x28, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, //
    0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x20, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    // one BGRA pixel
    0x97, 0x66, 0x22, 0xFF, //
    // AND mask row
    0x00, 0x00, 0x00, 0x00, //
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn waiting_page_rounds_seconds_up() {
        let page = waiting_page(1500);
        assert!(page.contains("refresh(1500)"));
        assert!(page.contains("Waiting for 2 seconds"));
    }

    #[test]
    fn report_page_orders_sections() {
        let page = report_page(
            "abc",
            &[
                ("e1".to_string(), "<p>one</p>".to_string()),
                ("e2".to_string(), "<p>two</p>".to_string()),
            ],
            None,
        );
        let e1 = page.find("<h2>e1</h2>").expect("e1 section");
        let e2 = page.find("<h2>e2</h2>").expect("e2 section");
        assert!(e1 < e2);
        assert!(page.contains(".green"));
        assert!(page.contains(".red"));
    }
}
