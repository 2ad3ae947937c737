//! Integration tests for control sequences: for, eval, cond, set.

use weft::{Processor, Scratch, Value, params};

fn render(template: &str, params: weft::Params) -> String {
    Processor::builder()
        .template(template)
        .build()
        .evaluate(params)
        .expect("evaluation succeeds")
}

// =============================================================================
// for
// =============================================================================

#[test]
fn for_scalar_binding_renders_once() {
    let out = render(r#"<:for x="A"><:code><=x/></:code></:for>"#, params! {});
    assert_eq!(out, "A");
}

#[test]
fn for_without_code_child_renders_body() {
    let out = render(r#"<:for x="A">[<=x/>]</:for>"#, params! {});
    assert_eq!(out, "[A]");
}

#[test]
fn for_list_binding_expands_per_element() {
    let out = render(
        r#"<:for x="<:[1,2,3]/>"><:code><=x/>;</:code></:for>"#,
        params! {},
    );
    assert_eq!(out, "1;2;3;");
}

#[test]
fn for_cartesian_product_order() {
    let out = render(
        r#"<:for y="<:[1,2,3]/>" x="<:[10,20]/>"><:code><=x/>-<=y/>;</:code></:for>"#,
        params! {},
    );
    assert_eq!(out, "10-1;10-2;10-3;20-1;20-2;20-3;");
}

#[test]
fn for_empty_list_renders_nothing() {
    let out = render(r#"a<:for x="<:[]/>"><:code>X</:code></:for>b"#, params! {});
    assert_eq!(out, "ab");
}

#[test]
fn for_without_inherit_hides_outer_bindings() {
    let out = render(
        r#"<:for x="1"><:code><=o/><=x/></:code></:for>"#,
        params! { "o" => "O" },
    );
    assert_eq!(out, "1");
}

#[test]
fn for_with_inherit_passes_outer_bindings_through() {
    let out = render(
        r#"<:for :inherit x="1"><:code><=o/><=x/></:code></:for>"#,
        params! { "o" => "O" },
    );
    assert_eq!(out, "O1");
}

#[test]
fn for_set_child_contributes_binding() {
    let out = render(
        r#"<:for><:set n>N</:set><:code><=n/></:code></:for>"#,
        params! {},
    );
    assert_eq!(out, "N");
}

#[test]
fn for_mixed_literal_substitution_binding_expands() {
    // A binding mixing literal text with a list substitution expands
    // per element into a list of rendered strings.
    let out = render(
        r#"<:for x="a<:[1,2]/>b"><:code><=x/>,</:code></:for>"#,
        params! {},
    );
    assert_eq!(out, "a1b,a2b,");
}

// =============================================================================
// eval
// =============================================================================

#[test]
fn eval_static_body_roundtrips() {
    assert_eq!(render("<:eval>hello</:eval>", params! {}), "hello");
}

#[test]
fn eval_generated_template_sees_enclosing_scope() {
    // The body renders to the literal source `<=v/>`, which is then parsed
    // and evaluated under the enclosing parameter map.
    let out = render(
        r#"<:eval><:"<=v" . "/>"/></:eval>"#,
        params! { "v" => "X" },
    );
    assert_eq!(out, "X");
}

#[test]
fn eval_bindings_scope_body_only() {
    // `t` is visible while rendering the body, but the generated template
    // evaluates under the enclosing map, where `v` is bound.
    let out = render(
        r#"<:eval t="v"><:"<=" . $t . "/>"/></:eval>"#,
        params! { "v" => "X" },
    );
    assert_eq!(out, "X");
}

#[test]
fn eval_matches_direct_evaluation() {
    let direct = render("pre<=v/>post", params! { "v" => "X" });
    let staged = render(
        r#"<:eval><:"pre<=v" . "/>post"/></:eval>"#,
        params! { "v" => "X" },
    );
    assert_eq!(staged, direct);
}

// =============================================================================
// cond
// =============================================================================

#[test]
fn cond_first_truthy_case_wins() {
    let out = render(
        r#"<:cond><:case "">A</:case><:case 1>B</:case><:case 1>C</:case></:cond>"#,
        params! {},
    );
    assert_eq!(out, "B");
}

#[test]
fn cond_no_match_renders_nothing() {
    let out = render(
        r#"x<:cond><:case "">A</:case><:case 0>B</:case></:cond>y"#,
        params! {},
    );
    assert_eq!(out, "xy");
}

#[test]
fn cond_short_circuits_after_first_match() {
    // The counter in the third case must never run.
    let processor = Processor::builder()
        .template(
            r#"<:cond><:case bump("n") && "">A</:case><:case 1>B</:case><:case bump("n")>C</:case></:cond>"#,
        )
        .build();
    let mut scratch = Scratch::new();
    let out = processor
        .evaluate_with(&mut scratch, params! {})
        .expect("evaluation succeeds");
    assert_eq!(out, "B");
    assert_eq!(scratch.get("n"), Some(&Value::from("1")));
}

#[test]
fn cond_condition_sees_current_element() {
    let out = render(
        r#"<=xs><:cond><:case $v eq "b">!</:case><:case 1><:/></:case></:cond></=xs>"#,
        params! { "xs" => vec!["a", "b", "c"] },
    );
    assert_eq!(out, "a!c");
}

#[test]
fn cond_condition_reads_bindings() {
    let t = r#"<:cond n><:case $n == 3>three</:case><:case 1>other</:case></:cond>"#;
    assert_eq!(render(t, params! { "n" => 3 }), "three");
    assert_eq!(render(t, params! { "n" => 4 }), "other");
}

#[test]
fn cond_vars_restrict_condition_visibility() {
    // `secret` resolves in the condition only because the opener names it.
    let declared =
        r#"<:cond secret><:case $secret eq "yes">open</:case><:case 1>shut</:case></:cond>"#;
    assert_eq!(render(declared, params! { "secret" => "yes" }), "open");

    let undeclared = r#"<:cond><:case $secret eq "yes">open</:case><:case 1>shut</:case></:cond>"#;
    assert_eq!(render(undeclared, params! { "secret" => "yes" }), "shut");
}

// =============================================================================
// Code bodies and stray sections
// =============================================================================

#[test]
fn code_body_binds_as_current_value() {
    assert_eq!(render("<:uc($v)>abc</:>", params! {}), "ABC");
    assert_eq!(render("<:>xyz</:>", params! {}), "xyz");
}

#[test]
fn stray_section_reports_error() {
    let processor = Processor::builder().template("a<:pre>x</:pre>b").build();
    let out = processor.evaluate(params! {}).expect("warn policy continues");
    assert_eq!(out, "ab");
    assert_eq!(processor.errors().len(), 1);
}

// =============================================================================
// Private scratchpad
// =============================================================================

#[test]
fn scratch_is_shared_across_scopes_within_one_evaluation() {
    let out = render(
        r#"<:for a="1"><:code><:bump("k")/></:code></:for><:bump("k")/>"#,
        params! {},
    );
    assert_eq!(out, "12");
}

#[test]
fn fresh_scratch_per_evaluation_when_omitted() {
    let processor = Processor::builder().template(r#"<:bump("k")/>"#).build();
    assert_eq!(processor.evaluate(params! {}).unwrap(), "1");
    assert_eq!(processor.evaluate(params! {}).unwrap(), "1");
}

#[test]
fn caller_scratch_passes_through_unchanged() {
    let processor = Processor::builder().template(r#"<:get("seed")/>"#).build();
    let mut scratch = Scratch::new();
    scratch.set("seed", Value::from("S"));
    let out = processor.evaluate_with(&mut scratch, params! {}).unwrap();
    assert_eq!(out, "S");
}
