//! Integration tests for the processor façade and output sinks.

use weft::{ErrorPolicy, Processor, Scratch, Sink, Value, params};

// =============================================================================
// Evaluation basics
// =============================================================================

#[test]
fn empty_template_renders_empty() {
    let p = Processor::builder().template("").build();
    assert_eq!(p.evaluate(params! {}).unwrap(), "");
    assert_eq!(p.errors(), Vec::<String>::new());
}

#[test]
fn literal_template_is_identity() {
    let text = "plain text, no sigils here: 1 < 2 & 3 = 3";
    let p = Processor::builder().template(text).build();
    assert_eq!(p.evaluate(params! {}).unwrap(), text);
}

#[test]
fn source_exposes_template_text() {
    let p = Processor::builder().template("abc").build();
    assert_eq!(p.source(), "abc");
}

#[test]
fn params_macro_builds_bindings() {
    let p = params! { "a" => "x", "n" => 3, "xs" => vec!["1", "2"] };
    assert_eq!(p.len(), 3);
    assert_eq!(p.get("a"), Some(&Value::from("x")));
    assert_eq!(p.get("n"), Some(&Value::from(3)));
    assert_eq!(p.get("xs"), Some(&Value::from(vec!["1", "2"])));
}

// =============================================================================
// Sinks
// =============================================================================

#[test]
fn sink_writer_receives_output() {
    let p = Processor::builder().template("pre<=v/>post").build();
    let mut buffer: Vec<u8> = Vec::new();
    p.evaluate_to_sink(Sink::Writer(&mut buffer), params! { "v" => "X" })
        .expect("write succeeds");
    assert_eq!(String::from_utf8(buffer).unwrap(), "preXpost");
}

#[test]
fn sink_func_receives_output() {
    let p = Processor::builder().template("<=v/>").build();
    let mut collected = String::new();
    let mut consumer = |rendered: &str| collected.push_str(rendered);
    p.evaluate_to_sink(Sink::Func(&mut consumer), params! { "v" => "X" })
        .expect("consumer succeeds");
    assert_eq!(collected, "X");
}

#[test]
fn sink_path_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.html");
    let p = Processor::builder().template("<=v/>").build();
    p.evaluate_to_sink(Sink::Path(target.clone()), params! { "v" => "X" })
        .expect("file written");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "X");
}

#[test]
fn sink_run_uses_caller_scratchpad() {
    let p = Processor::builder()
        .template(r#"<:get("seed")/>-<:bump("n")/>"#)
        .build();
    let mut scratch = Scratch::new();
    scratch.set("seed", Value::from("S"));
    let mut buffer: Vec<u8> = Vec::new();
    p.evaluate_to_sink_with(Sink::Writer(&mut buffer), &mut scratch, params! {})
        .expect("write succeeds");
    assert_eq!(String::from_utf8(buffer).unwrap(), "S-1");
    assert_eq!(scratch.get("n"), Some(&Value::from("1")));
}

#[test]
fn sink_target_untouched_when_evaluation_fails() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.html");
    let p = Processor::builder()
        .template(r#"<: die "boom" />"#)
        .on_error(ErrorPolicy::Die)
        .build();
    p.evaluate_to_sink(Sink::Path(target.clone()), params! {})
        .expect_err("evaluation aborts first");
    assert!(!target.exists());
}
