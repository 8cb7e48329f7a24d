//! Evaluator bridge.
//!
//! Each script block runs in a fresh QuickJS runtime. The host registers
//! a small set of primitive-typed callbacks closing over the shared
//! document state, then evaluates a shim that assembles the `$` runtime
//! object (plus bare aliases for the non-reserved method names) and
//! finally the rewritten fragment, wrapped as `(function ($) { … })($)`.
//!
//! Nothing of the host's lexical environment is exposed: identifier
//! visibility flows exclusively through the textual prelude the rewriter
//! injects, and values cross back as a tagged JSON encoding.

use crate::runtime::DocState;
use crate::value::Value;
use rquickjs::{CatchResultExt, CaughtError, Context, Function, Runtime};
use std::cell::RefCell;
use std::rc::Rc;

/// Script-side half of the runtime object. Talks to the host through the
/// `__hxp_*` globals registered below.
const SHIM: &str = r#"
const __hxp_scope = {
    block: (r) => { if (r === "__END__") { __hxp_cond_end(); } else { __hxp_cond_block(!!r); } },
    show: () => __hxp_cond_show(),
};
const __hxp_enc = (v) => {
    if (v === null) { return { t: "null" }; }
    if (v === undefined) { return { t: "undef" }; }
    switch (typeof v) {
        case "boolean": return { t: "bool", v: v };
        case "number": return { t: "num", v: String(v) };
        case "bigint": return { t: "bigint", v: v.toString() };
        case "string": return { t: "str", v: v };
        case "function": return { t: "fn", v: v.toString() };
        case "symbol": return { t: "sym", v: v.description === undefined ? "" : v.description };
        case "object": break;
        default: return { t: "undef" };
    }
    if (Array.isArray(v)) { return { t: "arr", v: v.map(__hxp_enc) }; }
    if (v instanceof Date) { return { t: "date", v: String(v.getTime()) }; }
    if (v instanceof RegExp) { return { t: "re", v: v.toString() }; }
    const pairs = [];
    for (const k of Object.keys(v)) { pairs.push([k, __hxp_enc(v[k])]); }
    return { t: "obj", v: pairs };
};
const $ = {
    conditionalScope: __hxp_scope,
    echo: (content, _scope) => { __hxp_echo(String(content)); },
    context: (name, value) => { __hxp_context(String(name), JSON.stringify(__hxp_enc(value))); },
    define: (name, value) => { __hxp_define(String(name), JSON.stringify(__hxp_enc(value))); },
    include: (reference, _scope, capture) => {
        const captured = __hxp_include(String(reference), !!capture);
        return captured === null || captured === undefined ? undefined : captured;
    },
    obOpen: () => { __hxp_ob_open(); },
    obClose: () => __hxp_ob_close(),
    obStatus: () => __hxp_ob_status(),
    if: (r, scope) => { (scope || __hxp_scope).block(r); },
    elseif: (r, scope) => { (scope || __hxp_scope).block(r); },
    else: (scope) => { (scope || __hxp_scope).block(true); },
    end: (scope) => { (scope || __hxp_scope).block("__END__"); },
    version: () => __hxp_version(),
};
const echo = (content) => $.echo(content, $.conditionalScope);
const include = (reference, capture) => $.include(reference, $.conditionalScope, capture);
const define = (name, value) => $.define(name, value);
const context = (name, value) => $.context(name, value);
const obOpen = () => $.obOpen();
const obClose = () => $.obClose();
const obStatus = () => $.obStatus();
const version = () => $.version();
"#;

/// Evaluate one rewritten fragment against the document state.
///
/// `include` re-enters the driver; it returns the captured output (or an
/// error envelope) as `Some`, and `None` for append-mode success or a
/// hidden conditional branch.
pub fn eval_block(
    state: Rc<RefCell<DocState>>,
    include: impl Fn(&str, bool) -> Option<String> + 'static,
    shim_extra: &str,
    fragment: &str,
) -> Result<(), String> {
    let runtime =
        Runtime::new().map_err(|err| format!("evaluator runtime unavailable: {err}"))?;
    let context =
        Context::full(&runtime).map_err(|err| format!("evaluator context unavailable: {err}"))?;

    let source = format!("{SHIM}{shim_extra}\n;(function ($) {{\n{fragment}\n}})($);\n");

    context.with(|ctx| -> Result<(), String> {
        let globals = ctx.globals();
        let js = |err: rquickjs::Error| err.to_string();

        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_echo",
                    Function::new(ctx.clone(), move |text: String| {
                        st.borrow_mut().echo(&text);
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_context",
                    Function::new(ctx.clone(), move |name: String, encoded: String| {
                        let value = Value::decode_tagged(&encoded);
                        st.borrow_mut().set_context(&name, value);
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_define",
                    Function::new(ctx.clone(), move |name: String, encoded: String| {
                        let value = Value::decode_tagged(&encoded);
                        st.borrow_mut().define(&name, value);
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            globals
                .set(
                    "__hxp_include",
                    Function::new(ctx.clone(), move |reference: String, capture: bool| {
                        include(&reference, capture)
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_ob_open",
                    Function::new(ctx.clone(), move || {
                        st.borrow_mut().ob_open();
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_ob_close",
                    Function::new(ctx.clone(), move || -> String { st.borrow_mut().ob_close() })
                        .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_ob_status",
                    Function::new(ctx.clone(), move || -> bool { st.borrow().ob_status() })
                        .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_cond_block",
                    Function::new(ctx.clone(), move |truthy: bool| {
                        st.borrow_mut()
                            .cond
                            .block(crate::runtime::BlockSignal::Value(truthy));
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_cond_end",
                    Function::new(ctx.clone(), move || {
                        st.borrow_mut().cond.block(crate::runtime::BlockSignal::End);
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            let st = Rc::clone(&state);
            globals
                .set(
                    "__hxp_cond_show",
                    Function::new(ctx.clone(), move || -> bool { st.borrow().cond.show() })
                        .map_err(js)?,
                )
                .map_err(js)?;
        }
        {
            globals
                .set(
                    "__hxp_version",
                    Function::new(ctx.clone(), move || -> String {
                        env!("CARGO_PKG_VERSION").to_string()
                    })
                    .map_err(js)?,
                )
                .map_err(js)?;
        }

        match ctx.eval::<(), _>(source.as_str()).catch(&ctx) {
            Ok(()) => Ok(()),
            Err(CaughtError::Exception(exception)) => Err(exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string())),
            Err(CaughtError::Value(value)) => Err(format!("uncaught value: {value:?}")),
            Err(CaughtError::Error(error)) => Err(error.to_string()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn state() -> Rc<RefCell<DocState>> {
        Rc::new(RefCell::new(DocState::new(
            PathBuf::from("/d"),
            PathBuf::from("/d"),
            String::new(),
        )))
    }

    fn no_include() -> impl Fn(&str, bool) -> Option<String> + 'static {
        |_, _| None
    }

    #[test]
    fn echo_reaches_the_document_buffer() {
        let st = state();
        eval_block(Rc::clone(&st), no_include(), "", "$.echo(`hi`);").unwrap();
        assert_eq!(st.borrow().main, "hi");
    }

    #[test]
    fn context_round_trips_through_the_tagged_encoding() {
        let st = state();
        eval_block(
            Rc::clone(&st),
            no_include(),
            "",
            "$.context('n', 41 + 1); $.context('s', `x`); $.context('list', [1, `a`]);",
        )
        .unwrap();
        let st = st.borrow();
        assert_eq!(st.lookup("n"), Some(&Value::Int(42)));
        assert_eq!(st.lookup("s"), Some(&Value::Str("x".to_string())));
        assert_eq!(
            st.lookup("list"),
            Some(&Value::Array(vec![Value::Int(1), Value::Str("a".to_string())]))
        );
    }

    #[test]
    fn bare_aliases_are_available() {
        let st = state();
        eval_block(
            Rc::clone(&st),
            no_include(),
            "",
            "obOpen(); echo(` padded `); context('got', obClose()); echo(version());",
        )
        .unwrap();
        let st = st.borrow();
        assert_eq!(st.lookup("got"), Some(&Value::Str("padded".to_string())));
        assert_eq!(st.main, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn conditional_scope_gates_echo() {
        let st = state();
        eval_block(
            Rc::clone(&st),
            no_include(),
            "",
            "$.if(false, $.conditionalScope); $.echo(`a`); $.elseif(true, $.conditionalScope); $.echo(`b`); $.end($.conditionalScope); $.echo(`c`);",
        )
        .unwrap();
        assert_eq!(st.borrow().main, "bc");
    }

    #[test]
    fn include_bridge_passes_capture_flag_and_returns_text() {
        let st = state();
        let seen: Rc<RefCell<Vec<(String, bool)>>> = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        eval_block(
            Rc::clone(&st),
            move |reference, capture| {
                log.borrow_mut().push((reference.to_string(), capture));
                capture.then(|| "CAPTURED".to_string())
            },
            "",
            "$.include(`plain`, $.conditionalScope); $.echo($.include(`part`, $.conditionalScope, true));",
        )
        .unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![("plain".to_string(), false), ("part".to_string(), true)]
        );
        assert_eq!(st.borrow().main, "CAPTURED");
    }

    #[test]
    fn evaluation_errors_surface_as_messages() {
        let st = state();
        let err = eval_block(Rc::clone(&st), no_include(), "", "null.x;").unwrap_err();
        assert!(!err.is_empty());
        let err = eval_block(Rc::clone(&st), no_include(), "", "throw new Error('boom');")
            .unwrap_err();
        assert!(err.contains("boom"));
    }

    #[test]
    fn extensions_appear_on_the_runtime_object() {
        let st = state();
        eval_block(
            Rc::clone(&st),
            no_include(),
            "$.siteName = `docs`;\n",
            "$.echo($.siteName);",
        )
        .unwrap();
        assert_eq!(st.borrow().main, "docs");
    }
}
