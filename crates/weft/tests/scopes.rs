//! Integration tests for variable-scope expansion and list transforms.

use weft::{Processor, Value, params};

fn render(template: &str, params: weft::Params) -> String {
    let processor = Processor::builder().template(template).build();
    let out = processor.evaluate(params).expect("evaluation succeeds");
    assert_eq!(processor.errors(), Vec::<String>::new());
    out
}

// =============================================================================
// Substitution basics
// =============================================================================

#[test]
fn scalar_substitution() {
    assert_eq!(render("pre<=v/>post", params! { "v" => "X" }), "preXpost");
}

#[test]
fn missing_binding_renders_nothing() {
    assert_eq!(render("pre<=v/>post", params! {}), "prepost");
}

#[test]
fn list_elements_with_body_template() {
    let out = render(
        "<=xs><:/>,</=xs>",
        params! { "xs" => vec!["a", "b", "c"] },
    );
    assert_eq!(out, "a,b,c,");
}

#[test]
fn self_closing_scope_renders_list_as_is() {
    let out = render("<=xs/>", params! { "xs" => vec!["a", "b"] });
    assert_eq!(out, "ab");
}

#[test]
fn nested_lists_flatten_in_rendering() {
    let inner = Value::List(vec![Value::from("b"), Value::from("c")]);
    let xs = Value::List(vec![Value::from("a"), inner]);
    assert_eq!(render("<=xs/>", params! { "xs" => xs }), "abc");
}

#[test]
fn first_last_code_selection() {
    let out = render(
        r#"<=xs first="[<:/>]" last="(<:/>)" code="<<:/>>"/>"#,
        params! { "xs" => vec!["a", "b", "c", "d"] },
    );
    assert_eq!(out, "[a]<b><c>(d)");
}

#[test]
fn single_element_prefers_first_over_last() {
    let out = render(
        r#"<=xs first="[<:/>]" last="(<:/>)"/>"#,
        params! { "xs" => vec!["only"] },
    );
    assert_eq!(out, "[only]");
}

#[test]
fn section_forms_of_first_and_code() {
    let out = render(
        "<=xs><:first>F:<:/></:first><:code>.<:/></:code></=xs>",
        params! { "xs" => vec!["a", "b"] },
    );
    assert_eq!(out, "F:a.b");
}

// =============================================================================
// Type gating
// =============================================================================

#[test]
fn type_gate_scalar() {
    let t = r#"<=v type="scalar"><:/></=v>"#;
    assert_eq!(render(t, params! { "v" => "x" }), "x");
    assert_eq!(render(t, params! { "v" => vec!["x"] }), "");
    assert_eq!(render(t, params! {}), "");
}

#[test]
fn type_gate_array() {
    let t = r#"<=v type="array"><:/></=v>"#;
    assert_eq!(render(t, params! { "v" => vec!["x", "y"] }), "xy");
    assert_eq!(render(t, params! { "v" => "x" }), "");
}

#[test]
fn type_gate_empty() {
    let t = r#"<=v type="empty" pre="none"><:pre>-</:pre></=v>"#;
    assert_eq!(render(t, params! {}), "-");
    assert_eq!(render(t, params! { "v" => "x" }), "");
}

#[test]
fn type_gate_union() {
    let t = r#"<=v type="scalar,array"><:/></=v>"#;
    assert_eq!(render(t, params! { "v" => "x" }), "x");
    assert_eq!(render(t, params! { "v" => vec!["x"] }), "x");
    assert_eq!(render(t, params! {}), "");
}

#[test]
fn empty_string_classifies_empty() {
    let t = r#"<=v type="empty">E</=v>"#;
    assert_eq!(render(t, params! { "v" => "" }), "E");
}

// =============================================================================
// pre / post
// =============================================================================

#[test]
fn pre_post_attrs_wrap_nonempty_list() {
    let out = render(
        r#"<=xs pre="[" post="]"><:/>,</=xs>"#,
        params! { "xs" => vec!["a", "b"] },
    );
    assert_eq!(out, "[a,b,]");
}

#[test]
fn pre_post_attrs_suppressed_on_empty() {
    let out = render(r#"<=xs pre="[" post="]"><:/></=xs>"#, params! {});
    assert_eq!(out, "");
}

#[test]
fn pre_post_sections_force_emission() {
    let out = render(
        "<=xs><:pre>[</:pre><:/><:post>]</:post></=xs>",
        params! {},
    );
    assert_eq!(out, "[]");
}

// =============================================================================
// List transforms
// =============================================================================

#[test]
fn map_attr_transforms_elements() {
    let out = render(
        r#"<=xs map="uc($v)"><:/>,</=xs>"#,
        params! { "xs" => vec!["a", "b"] },
    );
    assert_eq!(out, "A,B,");
}

#[test]
fn grep_attr_filters_elements() {
    let out = render(
        r#"<=xs grep="$v ne \"b\""><:/>,</=xs>"#,
        params! { "xs" => vec!["a", "b", "c"] },
    );
    assert_eq!(out, "a,c,");
}

#[test]
fn sort_attr_orders_elements() {
    let out = render(
        r#"<=xs sort="$a <=> $b"><:/>,</=xs>"#,
        params! { "xs" => vec!["3", "1", "2"] },
    );
    assert_eq!(out, "1,2,3,");
}

#[test]
fn sort_descending_with_swapped_bindings() {
    let out = render(
        r#"<=xs sort="$b <=> $a"><:/></=xs>"#,
        params! { "xs" => vec!["1", "3", "2"] },
    );
    assert_eq!(out, "321");
}

#[test]
fn sort_section_body_is_fragment_source() {
    let out = render(
        "<=xs><:sort>$a cmp $b</:sort><:/></=xs>",
        params! { "xs" => vec!["c", "a", "b"] },
    );
    assert_eq!(out, "abc");
}

#[test]
fn grep_section_form() {
    let out = render(
        r#"<=xs><:grep>$v ne "b"</:grep><:/></=xs>"#,
        params! { "xs" => vec!["a", "b", "c"] },
    );
    assert_eq!(out, "ac");
}

#[test]
fn attr_transform_applies_before_section_transform() {
    // Attribute-form map runs first, then the section form, so each element
    // arrives at the section already suffixed.
    let out = render(
        r#"<=xs map="$v . \"1\""><:map>$v . "2"</:map><:/>,</=xs>"#,
        params! { "xs" => vec!["a"] },
    );
    assert_eq!(out, "a12,");
}

#[test]
fn attr_transforms_apply_in_textual_order() {
    let out = render(
        r#"<=xs grep="$v ne \"b\"" map="uc($v)"><:/></=xs>"#,
        params! { "xs" => vec!["a", "b"] },
    );
    assert_eq!(out, "A");
}

#[test]
fn map_then_scalar_classification_unchanged() {
    // A scalar binding still normalizes to a one-element list for map.
    let out = render(r#"<=v map="uc($v)"><:/></=v>"#, params! { "v" => "hi" });
    assert_eq!(out, "HI");
}

// =============================================================================
// Comments and shadowing
// =============================================================================

#[test]
fn comment_neutrality() {
    let with = render(
        "<# leading />a<=v><#>inner</#><:/></=v>b<# trailing />",
        params! { "v" => "X" },
    );
    let without = render("a<=v><:/></=v>b", params! { "v" => "X" });
    assert_eq!(with, without);
}

#[test]
fn inner_for_binding_shadows_outer_name() {
    let out = render(
        r#"<=v/>|<:for v="inner"><:code><=v/></:code></:for>"#,
        params! { "v" => "outer" },
    );
    assert_eq!(out, "outer|inner");
}
