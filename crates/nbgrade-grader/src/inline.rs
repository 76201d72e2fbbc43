//! Synthesizes a self-contained inline-test script from an exercise's
//! context source, the student's submission and the inline test body.
//!
//! The emitted script reports its outcome with `OK{{}}`, `FAIL{{message}}`
//! and `ERROR{{message}}` markers on stdout. The double braces keep the
//! markers extractable by regex even when the message itself contains
//! single braces.

fn indent(source: &str) -> String {
    if source.trim().is_empty() {
        return "  pass\n".to_string();
    }
    let mut out = String::new();
    for line in source.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Emits the inline-test script. Each of the three sections runs inside its
/// own try block: a failing context is an ERROR, a failing submission or a
/// failed assertion is a FAIL, and any other exception inside the test
/// itself is an ERROR.
pub fn assemble_inline_test(context: Option<&str>, submission: &str, inline_test: &str) -> String {
    let mut script = String::from("import sys\n\ntry:\n");
    script.push_str(&indent(context.unwrap_or_default()));
    script.push_str(
        "except Exception as e:\n\
         \x20 sys.stdout.write('While executing context: ERROR{{%s}}' % e)\n\
         \x20 raise\n\
         \n\
         try:\n",
    );
    script.push_str(&indent(submission));
    script.push_str(
        "except Exception as e:\n\
         \x20 sys.stdout.write('While executing submission: FAIL{{%s: %s}}' % (e.__class__.__name__, e))\n\
         \x20 sys.exit(1)\n\
         \n\
         try:\n",
    );
    script.push_str(&indent(inline_test));
    script.push_str(
        "except AssertionError as e:\n\
         \x20 sys.stdout.write('While executing inline test: FAIL{{%s}}' % e)\n\
         \x20 sys.exit(1)\n\
         except Exception as e:\n\
         \x20 sys.stdout.write('While executing inline test: ERROR{{%s}}' % e)\n\
         \x20 raise\n\
         \n\
         sys.stdout.write('OK{{}}')\n",
    );
    script
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn sections_are_indented_into_try_blocks() {
        let script = assemble_inline_test(Some("x = 0\n"), "x = 1\n", "assert x == 1\n");
        assert!(script.contains("try:\n  x = 0\n"));
        assert!(script.contains("try:\n  x = 1\n"));
        assert!(script.contains("try:\n  assert x == 1\n"));
        assert!(script.ends_with("sys.stdout.write('OK{{}}')\n"));
    }

    #[test]
    fn empty_context_becomes_pass() {
        let script = assemble_inline_test(None, "x = 1\n", "assert x == 1\n");
        assert!(script.contains("try:\n  pass\nexcept"));
    }

    #[test]
    fn blank_lines_are_not_padded() {
        let script = assemble_inline_test(None, "x = 1\n\ny = 2\n", "assert x == 1\n");
        assert!(script.contains("  x = 1\n\n  y = 2\n"));
    }

    #[test]
    fn failure_markers_use_double_braces() {
        let script = assemble_inline_test(None, "x = 1\n", "assert x == 2, 'x was %d' % x\n");
        assert!(script.contains("While executing submission: FAIL{{%s: %s}}"));
        assert!(script.contains("While executing inline test: FAIL{{%s}}"));
        assert!(script.contains("While executing context: ERROR{{%s}}"));
    }
}
