//! Assembles the self-contained Python program shipped to a remote host.
//!
//! Layout of the generated program, top to bottom:
//!
//! 1. prelude: private imports, stdout/stderr redirected into one buffer, and
//!    an exception hook that turns a failure outside the call (a decorator
//!    or a definition that raises) into a reply carrying the traceback;
//! 2. one assignment per captured context value;
//! 3. dependency definitions, in resolver order;
//! 4. the target's own definition;
//! 5. the call, wrapped so that a raised exception is recorded (as text in the
//!    buffer and as the reply's `error` field) instead of ending the program;
//! 6. the reply line: `{"output", "result", "error", "variables"}` printed to
//!    the real stdout as the program's only output.
//!
//! Every helper name the program introduces starts with `__landing_`.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use serde_json::Value;

use crate::callable::Callable;
use crate::wire::{self, JSON_MODULE};


/// Marker written into the captured output ahead of a remote traceback.
pub const EXCEPTION_MARKER: &str = "[EXCEPTION]";

/// Everything the assembler needs for one remote execution.
#[derive(Debug, Clone)]
pub struct Payload<'a> {
    pub target: &'a Callable,
    pub dependencies: &'a [Arc<Callable>],
    pub context: &'a BTreeMap<String, Value>,
    pub args: &'a [Value],
}

/// Render the remote program for `payload`.
pub fn assemble(payload: &Payload<'_>) -> String {
    let mut out = String::new();
    write_prelude(&mut out);

    if !payload.context.is_empty() {
        out.push_str("\n# context\n");
        for (name, value) in payload.context {
            let _ = writeln!(out, "{} = {}", name, wire::python_literal(value));
        }
    }

    if !payload.dependencies.is_empty() {
        out.push_str("\n# dependencies\n");
        for dep in payload.dependencies {
            push_definition(&mut out, dep.source());
        }
    }

    out.push_str("\n# target\n");
    push_definition(&mut out, payload.target.source());

    write_invocation(&mut out, payload.target.name(), payload.args);
    write_variables(&mut out, payload.context);
    write_reply(&mut out);
    out
}

fn write_prelude(out: &mut String) {
    let _ = writeln!(out, "import io as __landing_io");
    let _ = writeln!(out, "import json as {}", JSON_MODULE);
    let _ = writeln!(out, "import sys as __landing_sys");
    let _ = writeln!(out, "import traceback as __landing_traceback");
    out.push('\n');
    out.push_str("__landing_stdout = __landing_sys.stdout\n");
    out.push_str("__landing_stderr = __landing_sys.stderr\n");
    out.push_str("__landing_buffer = __landing_io.StringIO()\n");
    out.push_str("__landing_sys.stdout = __landing_buffer\n");
    out.push_str("__landing_sys.stderr = __landing_buffer\n");
    out.push('\n');
    out.push_str("def __landing_abort(kind, value, tb):\n");
    out.push_str("    __landing_sys.stdout = __landing_stdout\n");
    out.push_str("    __landing_sys.stderr = __landing_stderr\n");
    out.push_str(
        "    __landing_text = \"\".join(__landing_traceback.format_exception(kind, value, tb))\n",
    );
    let _ = writeln!(
        out,
        "    __landing_buffer.write(\"\\n{}\\n\" + __landing_text)",
        EXCEPTION_MARKER
    );
    let _ = writeln!(
        out,
        "    print({}.dumps({{\"output\": __landing_buffer.getvalue(), \"result\": None, \"error\": __landing_text, \"variables\": {{}}}}))",
        JSON_MODULE
    );
    out.push('\n');
    out.push_str("__landing_sys.excepthook = __landing_abort\n");
}

fn push_definition(out: &mut String, source: &str) {
    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
}

fn write_invocation(out: &mut String, name: &str, args: &[Value]) {
    let rendered: Vec<String> = args.iter().map(wire::python_literal).collect();
    out.push_str("# invocation\n");
    out.push_str("__landing_result = None\n");
    out.push_str("__landing_error = None\n");
    out.push_str("try:\n");
    let _ = writeln!(out, "    __landing_result = {}({})", name, rendered.join(", "));
    out.push_str("except BaseException:\n");
    out.push_str("    __landing_error = __landing_traceback.format_exc()\n");
    let _ = writeln!(
        out,
        "    __landing_buffer.write(\"\\n{}\\n\" + __landing_error)",
        EXCEPTION_MARKER
    );
}

fn write_variables(out: &mut String, context: &BTreeMap<String, Value>) {
    let names: Vec<Value> = context.keys().map(|k| Value::String(k.clone())).collect();
    out.push('\n');
    out.push_str("__landing_variables = {}\n");
    let _ = writeln!(
        out,
        "for __landing_name in {}:",
        wire::python_literal(&Value::Array(names))
    );
    out.push_str("    try:\n");
    out.push_str("        __landing_value = globals()[__landing_name]\n");
    let _ = writeln!(
        out,
        "        {}.dumps(__landing_value, allow_nan=False)",
        JSON_MODULE
    );
    out.push_str("        __landing_variables[__landing_name] = __landing_value\n");
    out.push_str("    except BaseException:\n");
    out.push_str("        pass\n");
}

fn write_reply(out: &mut String) {
    out.push('\n');
    out.push_str("__landing_sys.stdout = __landing_stdout\n");
    out.push_str("__landing_sys.stderr = __landing_stderr\n");
    out.push_str("try:\n");
    let _ = writeln!(
        out,
        "    __landing_reply = {}.dumps({{\"output\": __landing_buffer.getvalue(), \"result\": __landing_result, \"error\": __landing_error, \"variables\": __landing_variables}}, allow_nan=False)",
        JSON_MODULE
    );
    out.push_str("except BaseException:\n");
    out.push_str(
        "    __landing_error = \"result is not encodable:\\n\" + __landing_traceback.format_exc()\n",
    );
    let _ = writeln!(
        out,
        "    __landing_buffer.write(\"\\n{}\\n\" + __landing_error)",
        EXCEPTION_MARKER
    );
    let _ = writeln!(
        out,
        "    __landing_reply = {}.dumps({{\"output\": __landing_buffer.getvalue(), \"result\": None, \"error\": __landing_error, \"variables\": __landing_variables}})",
        JSON_MODULE
    );
    out.push_str("print(__landing_reply)\n");
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> Callable {
        Callable::new(
            "collect_info",
            "def collect_info(path):\n    header()\n    return len(path) + data\n",
        )
        .unwrap()
    }

    fn header() -> Arc<Callable> {
        Arc::new(Callable::new("header", "def header():\n    print('scanning')\n").unwrap())
    }

    fn render(context: &BTreeMap<String, Value>, deps: &[Arc<Callable>], args: &[Value]) -> String {
        let t = target();
        assemble(&Payload {
            target: &t,
            dependencies: deps,
            context,
            args,
        })
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("'{}' not found in:\n{}", needle, haystack))
    }

    #[test]
    fn sections_appear_in_order() {
        let mut ctx = BTreeMap::new();
        ctx.insert("data".to_string(), json!(3));
        let script = render(&ctx, &[header()], &[json!("/proc/cpuinfo")]);

        let redirect = position(&script, "__landing_sys.stdout = __landing_buffer");
        let context = position(&script, "data = __landing_json.loads(\"3\")");
        let dep = position(&script, "def header():");
        let def = position(&script, "def collect_info(path):");
        let call = position(&script, "__landing_result = collect_info(");
        let reply = position(&script, "print(__landing_reply)");
        assert!(redirect < context);
        assert!(context < dep);
        assert!(dep < def);
        assert!(def < call);
        assert!(call < reply);
    }

    #[test]
    fn reply_print_is_the_last_line() {
        let script = render(&BTreeMap::new(), &[], &[]);
        assert_eq!(script.trim_end().lines().last(), Some("print(__landing_reply)"));
    }

    #[test]
    fn arguments_are_wire_literals() {
        let script = render(&BTreeMap::new(), &[], &[json!("a\"b"), json!(true), json!(null)]);
        assert!(script.contains(
            r#"collect_info(__landing_json.loads("\"a\\\"b\""), __landing_json.loads("true"), __landing_json.loads("null"))"#
        ));
    }

    #[test]
    fn no_arguments_renders_empty_call() {
        let script = render(&BTreeMap::new(), &[], &[]);
        assert!(script.contains("    __landing_result = collect_info()\n"));
    }

    #[test]
    fn only_the_call_is_wrapped() {
        let script = render(&BTreeMap::new(), &[header()], &[]);
        let try_at = position(&script, "try:\n    __landing_result");
        assert!(position(&script, "def collect_info") < try_at);
        assert!(script.contains("except BaseException:\n    __landing_error = __landing_traceback.format_exc()"));
        assert!(script.contains(EXCEPTION_MARKER));
    }

    #[test]
    fn exception_hook_precedes_shipped_code() {
        let mut ctx = BTreeMap::new();
        ctx.insert("data".to_string(), json!(3));
        let script = render(&ctx, &[header()], &[]);
        let hook = position(&script, "__landing_sys.excepthook = __landing_abort\n");
        assert!(hook < position(&script, "data = "));
        assert!(hook < position(&script, "def header():"));
        assert!(script.contains("__landing_traceback.format_exception(kind, value, tb)"));
    }

    #[test]
    fn definitions_stay_at_top_level() {
        let script = render(&BTreeMap::new(), &[header()], &[]);
        assert!(script.contains("\ndef header():\n    print('scanning')\n"));
        assert!(script.contains("\ndef collect_info(path):\n"));
    }

    #[test]
    fn context_names_are_reported_back() {
        let mut ctx = BTreeMap::new();
        ctx.insert("data".to_string(), json!(3));
        ctx.insert("prefix".to_string(), json!("LOG"));
        let script = render(&ctx, &[], &[]);
        assert!(script.contains(
            r#"for __landing_name in __landing_json.loads("[\"data\",\"prefix\"]"):"#
        ));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let script = render(&BTreeMap::new(), &[], &[]);
        assert!(!script.contains("# context"));
        assert!(!script.contains("# dependencies"));
        assert!(script.contains("# target"));
    }

    #[test]
    fn assembly_is_deterministic() {
        let mut ctx = BTreeMap::new();
        ctx.insert("b".to_string(), json!(2));
        ctx.insert("a".to_string(), json!(1));
        let first = render(&ctx, &[header()], &[json!(1)]);
        let second = render(&ctx, &[header()], &[json!(1)]);
        assert_eq!(first, second);
        assert!(position(&first, "a = ") < position(&first, "b = "));
    }
}
