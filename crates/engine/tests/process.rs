//! End-to-end driver tests: whole documents in, whole documents out,
//! served from an in-memory loader.

use hxp_engine::{MemoryLoader, Options, Preprocessor, ProcessOptions, Value};
use std::path::PathBuf;

fn engine_with(files: &[(&str, &str)]) -> Preprocessor {
    let mut loader = MemoryLoader::new();
    for (path, contents) in files {
        loader.insert(*path, *contents);
    }
    Preprocessor::new(Options {
        loader: Box::new(loader),
        root_dir: Some(PathBuf::from("/site")),
        ..Options::default()
    })
    .expect("engine options")
}

fn engine() -> Preprocessor {
    engine_with(&[])
}

fn run(engine: &Preprocessor, input: &str) -> String {
    engine
        .process(
            input,
            ProcessOptions {
                cwd: Some(PathBuf::from("/site")),
                ..ProcessOptions::default()
            },
        )
        .expect("process")
}

#[test]
fn markup_only_documents_pass_through() {
    let out = run(&engine(), "<p class=\"a\">static</p>");
    assert_eq!(out, "<p class=\"a\">static</p>");
}

#[test]
fn output_buffering_captures_literal_markup() {
    let out = run(
        &engine(),
        "<hxp>$obOpen();</hxp>Hello<hxp>let content = $obClose(); $echo(content);</hxp>",
    );
    assert_eq!(out, "Hello");
}

#[test]
fn include_propagates_variables() {
    let engine = engine_with(&[("/site/b.hxp", "<hxp>$echo(t);</hxp>")]);
    let out = run(&engine, "<hxp>let t = 'T'; $include('b.hxp');</hxp>");
    assert_eq!(out, "T");
}

#[test]
fn constants_are_protected() {
    let out = run(
        &engine(),
        "<hxp>$define('K', 1);</hxp><hxp>K = 2;</hxp><hxp>$echo(K);</hxp>",
    );
    let envelope = "<< Error: Attempt to redeclare defined constant 'K'. >>";
    assert_eq!(out, format!("{envelope}1"));
    assert_eq!(out.matches(envelope).count(), 1);
}

#[test]
fn conditional_selection_keeps_one_region() {
    let out = run(
        &engine(),
        "<hxp>$if(false);</hxp>A<hxp>$elseif(true);</hxp>B<hxp>$else();</hxp>C<hxp>$end();</hxp>D",
    );
    assert_eq!(out, "BD");
}

#[test]
fn conditional_first_truthy_wins() {
    let out = run(
        &engine(),
        "<hxp>$if(true);</hxp>A<hxp>$elseif(true);</hxp>B<hxp>$end();</hxp>C",
    );
    assert_eq!(out, "AC");
}

#[test]
fn undefined_identifier_renders_sentinel() {
    let out = run(&engine(), "<hxp>$echo(missing);</hxp>");
    assert_eq!(out, "<< Undefined: missing >>");
}

#[test]
fn capture_mode_include_isolates_buffers() {
    let engine = engine_with(&[("/site/partial.hxp", "X")]);
    let out = run(
        &engine,
        "<hxp>let p = $include('partial.hxp');</hxp><hxp>$echo(p + p);</hxp>",
    );
    assert_eq!(out, "XX");
}

#[test]
fn capture_mode_include_with_script_output() {
    let engine = engine_with(&[("/site/noisy.hxp", "N<hxp>$echo('n');</hxp>")]);
    let out = run(
        &engine,
        "<hxp>let p = $include('noisy.hxp');</hxp>!<hxp>$echo(p);</hxp>",
    );
    // Nothing from the include lands before the literal `!`.
    assert_eq!(out, "!Nn");
}

#[test]
fn context_carries_across_blocks() {
    let out = run(&engine(), "<hxp>x = 5;</hxp><hxp>$echo(x);</hxp>");
    assert_eq!(out, "5");
}

#[test]
fn functions_carry_across_blocks() {
    let out = run(
        &engine(),
        "<hxp>const greet = (n) => 'Hi ' + n;</hxp><hxp>$echo(greet('A'));</hxp>",
    );
    assert_eq!(out, "Hi A");
}

#[test]
fn process_calls_are_independent() {
    let engine = engine();
    let first = run(&engine, "<hxp>y = 1;</hxp><hxp>$echo(y);</hxp>");
    assert_eq!(first, "1");
    let second = run(&engine, "<hxp>$echo(y);</hxp>");
    assert_eq!(second, "<< Undefined: y >>");
}

#[test]
fn missing_include_emits_envelope_once() {
    let out = run(&engine(), "a<hxp>$include('nope.hxp');</hxp>b");
    assert_eq!(out, "a<< Error: Failed to resolve include 'nope.hxp'. >>b");
}

#[test]
fn evaluation_error_is_recoverable() {
    let out = run(
        &engine(),
        "<hxp>throw new Error('boom');</hxp>ok<hxp>$echo(1);</hxp>",
    );
    assert_eq!(out, "<< Error: boom. >>ok1");
}

#[test]
fn unclosed_conditional_is_reported() {
    let out = run(&engine(), "<hxp>$if(true);</hxp>X");
    assert_eq!(out, "X<< Error: Unclosed conditional block detected. >>");
}

#[test]
fn hidden_branch_suppresses_includes_and_echo() {
    let engine = engine_with(&[("/site/part.hxp", "SHOULD NOT APPEAR")]);
    let out = run(
        &engine,
        "<hxp>$if(false);</hxp>H<hxp>$include('part.hxp'); $echo('e');</hxp><hxp>$end();</hxp>T",
    );
    assert_eq!(out, "T");
}

#[test]
fn define_errors_surface_inside_hidden_branches() {
    // `define` takes no conditional scope, so its envelope is emitted
    // even while the surrounding branch is hidden.
    let out = run(
        &engine(),
        "<hxp>$define('K', 1);</hxp><hxp>$if(false);</hxp>H<hxp>$define('K', 2);</hxp><hxp>$end();</hxp>T",
    );
    assert_eq!(
        out,
        "<< Error: Attempt to redeclare defined constant 'K'. >>T"
    );
}

#[test]
fn seeded_constants_and_context_are_visible() {
    let loader = MemoryLoader::new();
    let engine = Preprocessor::new(Options {
        constants: vec![("SITE".to_string(), Value::Str("HXP".to_string()))],
        loader: Box::new(loader),
        ..Options::default()
    })
    .expect("engine options");
    let out = engine
        .process(
            "<hxp>$echo(SITE + ' ' + name);</hxp>",
            ProcessOptions {
                context: vec![("name".to_string(), Value::Str("World".to_string()))],
                cwd: Some(PathBuf::from("/site")),
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    assert_eq!(out, "HXP World");
}

#[test]
fn values_round_trip_through_serialization_and_context() {
    let orig = Value::Object(vec![
        ("n".to_string(), Value::Int(1)),
        ("s".to_string(), Value::Str("a`b${x}".to_string())),
        (
            "a".to_string(),
            Value::Array(vec![Value::Int(1), Value::Bool(true), Value::Null]),
        ),
        ("d".to_string(), Value::Date { epoch_ms: 86_400_000 }),
        (
            "r".to_string(),
            Value::Regex {
                literal: "/x+/g".to_string(),
            },
        ),
    ]);
    let out = engine()
        .process(
            // Block one re-encodes the seeded value into context; block
            // two reads it back through a fresh prelude rendering.
            "<hxp>copy = orig;</hxp>\
             <hxp>$echo([copy.n, copy.s, copy.a.length, copy.d.getTime(), copy.r.source, copy.r.flags].join('|'));</hxp>",
            ProcessOptions {
                context: vec![("orig".to_string(), orig)],
                cwd: Some(PathBuf::from("/site")),
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    assert_eq!(out, "1|a`b${x}|3|86400000|x+|g");
}

#[test]
fn ob_status_tracks_the_open_buffer() {
    let out = run(
        &engine(),
        "<hxp>$obOpen();</hxp>A<hxp>x = $obStatus(); $echo($obClose() + x);</hxp>",
    );
    assert_eq!(out, "Atrue");
}

#[test]
fn define_over_variable_is_rejected() {
    let out = run(
        &engine(),
        "<hxp>v = 1;</hxp><hxp>$define('v', 2); $echo(v);</hxp>",
    );
    assert_eq!(
        out,
        "<< Error: Cannot define constant 'v': a variable with this name already exists. >>1"
    );
}

#[test]
fn equal_redefinition_is_silent() {
    let out = run(
        &engine(),
        "<hxp>$define('K', 7);</hxp><hxp>$define('K', 7); $echo(K);</hxp>",
    );
    assert_eq!(out, "7");
}

#[test]
fn includes_resolve_root_relative_references() {
    let engine = engine_with(&[
        ("/site/shared/head.hxp", "HEAD"),
        ("/site/blog/page.hxp", "<hxp>$include('/shared/head.hxp');</hxp>-body"),
    ]);
    let out = engine
        .process(
            "/site/blog/page.hxp",
            ProcessOptions {
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    assert_eq!(out, "HEAD-body");
}

#[test]
fn nested_include_uses_the_included_files_directory() {
    let engine = engine_with(&[
        ("/site/a/outer.hxp", "<hxp>$include('inner.hxp');</hxp>"),
        ("/site/a/inner.hxp", "deep"),
    ]);
    let out = run(&engine, "<hxp>$include('a/outer.hxp');</hxp>");
    assert_eq!(out, "deep");
}

#[test]
fn unreadable_outer_input_is_an_error() {
    let err = engine()
        .process("/site/nope.hxp", ProcessOptions::default())
        .unwrap_err();
    assert!(matches!(err, hxp_engine::EngineError::Input { .. }));
}

#[test]
fn pre_hooks_mutate_the_source_tree() {
    let engine = engine();
    let out = engine
        .process(
            "a<secret>x</secret>b",
            ProcessOptions {
                cwd: Some(PathBuf::from("/site")),
                pre_hooks: vec![Box::new(|cx: &mut hxp_engine::HookContext<'_>| {
                    for id in hxp_dom::find_by_tag(cx.tree, "secret") {
                        cx.tree.remove(id);
                    }
                })],
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    // The element's subtree and its paired close tag go together.
    assert_eq!(out, "ab");
}

#[test]
fn builtin_hook_rewrites_root_relative_urls() {
    let loader = MemoryLoader::new();
    let engine = Preprocessor::new(Options {
        register_builtin_hooks: true,
        loader: Box::new(loader),
        ..Options::default()
    })
    .expect("engine options");
    let out = engine
        .process(
            "<a href=\"/style.css\">x</a>",
            ProcessOptions {
                cwd: Some(PathBuf::from("/site")),
                rel_path: Some("blog/post.html".to_string()),
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    assert_eq!(out, "<a href=\"../style.css\">x</a>");
}

#[test]
fn extensions_are_reachable_via_sugar() {
    let loader = MemoryLoader::new();
    let engine = Preprocessor::new(Options {
        extensions: vec![("siteName".to_string(), Value::Str("docs".to_string()))],
        loader: Box::new(loader),
        ..Options::default()
    })
    .expect("engine options");
    let out = engine
        .process(
            "<hxp>$echo($siteName);</hxp>",
            ProcessOptions {
                cwd: Some(PathBuf::from("/site")),
                ..ProcessOptions::default()
            },
        )
        .expect("process");
    assert_eq!(out, "docs");
}
