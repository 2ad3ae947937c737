//! Template source parser using winnow.
//!
//! Turns template bytes into a tree of IR nodes. Recognizes the three
//! sigils (`<=` variable scope, `<:` control/code sequence, `<#` comment),
//! their self-closing and paired forms, and attribute lists with quoted
//! values and inline sub-templates.
//!
//! Node dispatch, attribute lists, identifiers, and comments are winnow
//! combinators over a [`Stateful`] input carrying the diagnostics list;
//! only the quote/escape-sensitive leaves (literal text runs, attribute
//! tokens, quoted values, raw fragment source) are scanned by hand.
//!
//! The parser is total: on a structural error it records a diagnostic,
//! emits the offending span as a literal text node, and resumes at the next
//! opener. Every loop consumes at least one byte, so parsing is linear in
//! the input on any byte sequence.

use std::cell::RefCell;
use std::rc::Rc;

use winnow::combinator::{alt, opt, peek, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::Stateful;
use winnow::token::{rest, take_until, take_while};

use super::ast::{Attr, AttrList, AttrValue, Case, Node, Section, SectionKind, Template};
use super::error::ParseDiagnostic;

/// A parse result: the IR tree plus any recovery diagnostics.
///
/// Parsing is pure; the same source always yields a structurally equal
/// `Parsed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub template: Template,
    pub diagnostics: Vec<ParseDiagnostic>,
}

type Input<'s> = Stateful<&'s str, ParseState<'s>>;

/// Parser state threaded through every combinator: the original input for
/// position calculation and the shared diagnostics list.
#[derive(Debug, Clone)]
struct ParseState<'s> {
    original: &'s str,
    diagnostics: Rc<RefCell<Vec<ParseDiagnostic>>>,
}

impl ParseState<'_> {
    /// Record a diagnostic at the position `remaining` points into the
    /// original input.
    fn diag(&self, remaining: &str, message: impl Into<String>) {
        let (line, column) = calculate_position(self.original, remaining);
        self.diagnostics.borrow_mut().push(ParseDiagnostic {
            line,
            column,
            message: message.into(),
        });
    }
}

/// Parse a template source into IR.
pub fn parse_template(source: &str) -> Parsed {
    let mut input = Input {
        input: source,
        state: ParseState {
            original: source,
            diagnostics: Rc::new(RefCell::new(Vec::new())),
        },
    };
    let nodes = body(&mut input, None);
    let diagnostics = input.state.diagnostics.take();
    Parsed {
        template: Template { nodes },
        diagnostics,
    }
}

/// Control tags recognized after `<:`. Anything else is a code fragment.
const KNOWN_TAGS: &[&str] = &[
    "for", "eval", "include", "cond", "case", "set", "code", "pre", "post", "first", "last", "map",
    "grep", "sort",
];

/// Calculate line and column from the original input and a remaining slice.
fn calculate_position(original: &str, remaining: &str) -> (usize, usize) {
    let consumed = original.len() - remaining.len();
    let consumed_str = &original[..consumed];
    let line = consumed_str.chars().filter(|&c| c == '\n').count() + 1;
    let column = match consumed_str.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, column)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `s` begins with a template opener.
fn at_opener(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes {
        [b'<', b'#', ..] | [b'<', b':', ..] => true,
        // `<=` opens a scope only when a name follows; `$a <=> $b` does not.
        [b'<', b'=', c, ..] => is_ident_start(*c as char),
        _ => false,
    }
}

/// Whether `s` begins with a closer of any kind.
fn at_closer(s: &str) -> bool {
    matches!(s.as_bytes(), [b'<', b'/', b'=' | b':' | b'#', ..])
}

/// Whether `s` textually contains a template sequence (used to decide if an
/// attribute value is parsed as inline IR).
fn contains_template_sequence(s: &str) -> bool {
    let mut rest = s;
    while let Some(pos) = rest.find('<') {
        if at_opener(&rest[pos..]) {
            return true;
        }
        rest = &rest[pos + 1..];
    }
    false
}

/// Parse optional whitespace.
fn ws(input: &mut Input<'_>) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

/// Parse an identifier (must not start with a digit).
fn ident<'s>(input: &mut Input<'s>) -> ModalResult<&'s str> {
    let name: &str = take_while(1.., is_ident_cont).parse_next(input)?;
    if !name.starts_with(is_ident_start) {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(name)
}

/// Consume `literal` if present.
fn token(input: &mut Input<'_>, literal: &str) -> bool {
    matches!(
        opt::<_, _, ContextError, _>(literal).parse_next(input),
        Ok(Some(_))
    )
}

/// Merge adjacent text nodes (recovery can produce runs of them).
fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut result: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) => {
                if let Some(Node::Text(prev)) = result.last_mut() {
                    prev.push_str(&text);
                } else {
                    result.push(Node::Text(text));
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// Parse nodes until `closer` (consumed) or end of input.
///
/// This is the recovery driver around the combinator-based [`node`] parser:
/// it owns closer matching and the unmatched-closer diagnostic, which a
/// fail-fast `repeat` cannot express.
fn body(input: &mut Input<'_>, closer: Option<&str>) -> Vec<Node> {
    let mut nodes = Vec::new();
    loop {
        if input.input.is_empty() {
            if let Some(c) = closer {
                input
                    .state
                    .diag(input.input, format!("missing `{c}` before end of input"));
            }
            break;
        }
        if let Some(c) = closer
            && token(input, c)
        {
            break;
        }
        if at_closer(input.input) {
            // A closer that does not match the enclosing opener.
            let span_len = input.input.find('>').map(|i| i + 1).unwrap_or(input.input.len());
            let (span, remaining) = input.input.split_at(span_len);
            input.state.diag(input.input, format!("unmatched `{span}`"));
            input.input = remaining;
            nodes.push(Node::Text(span.to_string()));
            continue;
        }
        match node(input) {
            Ok(parsed) => nodes.push(parsed),
            // Unreachable in practice: text_run accepts any non-empty rest.
            Err(_) => break,
        }
    }
    merge_text(nodes)
}

/// Parse a single node: comment, variable scope, control sequence, or a
/// literal text run.
fn node(input: &mut Input<'_>) -> ModalResult<Node> {
    alt((comment, var_scope, control, text_run)).parse_next(input)
}

/// Consume a literal text run up to the next opener or closer.
fn text_run(input: &mut Input<'_>) -> ModalResult<Node> {
    if input.input.is_empty() {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let mut end = input.input.len();
    for (i, _) in input.input.char_indices().skip(1) {
        let remaining = &input.input[i..];
        if at_opener(remaining) || at_closer(remaining) {
            end = i;
            break;
        }
    }
    let (text, remaining) = input.input.split_at(end);
    input.input = remaining;
    Ok(Node::Text(text.to_string()))
}

/// Parse a comment: `<# ... />` or `<#>...</#>`.
///
/// Comments never contribute output and never cause errors; an unterminated
/// comment silently consumes to end of input.
fn comment(input: &mut Input<'_>) -> ModalResult<Node> {
    "<#".parse_next(input)?;
    if opt('>').parse_next(input)?.is_some() {
        alt((terminated(take_until(0.., "</#>"), "</#>"), rest))
            .void()
            .parse_next(input)?;
    } else {
        alt((terminated(take_until(0.., "/>"), "/>"), rest))
            .void()
            .parse_next(input)?;
    }
    Ok(Node::Comment)
}

/// Record a diagnostic at `start`, consume up to the next opener or closer,
/// and yield the offending span as literal text.
fn recover(input: &mut Input<'_>, start: &str, message: String) -> Node {
    input.state.diag(start, message);
    let consumed = start.len() - input.input.len();
    let mut end = input.input.len();
    for (i, _) in input.input.char_indices() {
        let remaining = &input.input[i..];
        if at_opener(remaining) || at_closer(remaining) {
            end = i;
            break;
        }
    }
    // Guarantee progress even when an opener immediately follows.
    if consumed == 0 && end == 0 {
        end = input.input.chars().next().map(char::len_utf8).unwrap_or(0);
    }
    input.input = &input.input[end..];
    Node::Text(start[..consumed + end].to_string())
}

/// Parse a variable scope: `<=name attrs/>` or `<=name attrs>body</=name>`.
/// Backtracks (to a text run) when no name follows the sigil.
fn var_scope(input: &mut Input<'_>) -> ModalResult<Node> {
    let start = input.input;
    "<=".parse_next(input)?;
    let name = ident(input)?.to_string();

    let attrs = match attr_list(input) {
        Ok(attrs) => attrs,
        Err(_) => {
            return Ok(recover(
                input,
                start,
                format!("malformed `<={name}` opener"),
            ));
        }
    };
    if token(input, "/>") {
        return Ok(Node::VarScope {
            name,
            attrs,
            body: Vec::new(),
        });
    }
    if token(input, ">") {
        let closer = format!("</={name}>");
        let body = body(input, Some(&closer));
        return Ok(Node::VarScope { name, attrs, body });
    }
    Ok(recover(
        input,
        start,
        format!("unterminated `<={name}` opener"),
    ))
}

/// Parse a known control tag name followed by a word boundary. Backtracks
/// on anything else, so `<:formula/>` stays a code fragment.
fn known_tag<'s>(input: &mut Input<'s>) -> ModalResult<&'s str> {
    let tag = ident(input)?;
    if !KNOWN_TAGS.contains(&tag) {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    peek(alt((
        take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
        '>'.void(),
        '/'.void(),
    )))
    .parse_next(input)?;
    Ok(tag)
}

/// Parse a control sequence, section, or code fragment after `<:`.
fn control(input: &mut Input<'_>) -> ModalResult<Node> {
    let start = input.input;
    "<:".parse_next(input)?;

    let Some(tag) = opt(known_tag).parse_next(input)? else {
        return Ok(code_node(input, start));
    };

    let attrs = match attr_list(input) {
        Ok(attrs) => attrs,
        Err(_) => {
            return Ok(recover(
                input,
                start,
                format!("malformed `<:{tag}` opener"),
            ));
        }
    };

    let parsed = match tag {
        "for" | "eval" | "include" => tagged_body(input, tag).map(|body_nodes| match tag {
            "for" => Node::For {
                attrs,
                body: body_nodes,
            },
            "eval" => Node::Eval {
                attrs,
                body: body_nodes,
            },
            _ => Node::Include {
                attrs,
                body: body_nodes,
            },
        }),
        "cond" => {
            let vars: Vec<String> = attrs.bare().map(str::to_string).collect();
            if token(input, "/>") || !token(input, ">") {
                Err("`<:cond>` requires at least one `<:case>`".to_string())
            } else {
                let cases = cond_body(input);
                if cases.is_empty() {
                    input
                        .state
                        .diag(input.input, "`<:cond>` requires at least one `<:case>`");
                }
                Ok(Node::Cond { vars, cases })
            }
        }
        "case" => Err("`<:case>` outside `<:cond>`".to_string()),
        "set" => match attrs.bare().next().map(str::to_string) {
            Some(target) => tagged_body(input, tag).map(|body_nodes| {
                Node::Section(Section {
                    kind: SectionKind::Set,
                    target: Some(target),
                    body: body_nodes,
                })
            }),
            None => Err("`<:set>` requires a name".to_string()),
        },
        _ => {
            // Structural sections: code, pre, post, first, last, map, grep, sort.
            let kind = SectionKind::from_name(tag).unwrap_or(SectionKind::Code);
            tagged_body(input, tag).map(|body_nodes| {
                Node::Section(Section {
                    kind,
                    target: None,
                    body: body_nodes,
                })
            })
        }
    };
    Ok(match parsed {
        Ok(node) => node,
        Err(message) => recover(input, start, message),
    })
}

/// Consume the opener terminator and, for the paired form, the body up to
/// `</:tag>`.
fn tagged_body(input: &mut Input<'_>, tag: &str) -> Result<Vec<Node>, String> {
    if token(input, "/>") {
        return Ok(Vec::new());
    }
    if token(input, ">") {
        let closer = format!("</:{tag}>");
        return Ok(body(input, Some(&closer)));
    }
    Err(format!("unterminated `<:{tag}` opener"))
}

/// Parse a code fragment: `<:source/>` or `<:source>body</:>`.
fn code_node(input: &mut Input<'_>, start: &str) -> Node {
    match scan_code_source(input) {
        Some((source, self_closing)) => {
            let body_nodes = if self_closing {
                Vec::new()
            } else {
                body(input, Some("</:>"))
            };
            Node::Code {
                source,
                body: body_nodes,
            }
        }
        None => recover(input, start, "unterminated code sequence".to_string()),
    }
}

/// Scan raw fragment source up to `/>` or `>`, skipping double-quoted
/// strings. A `>` directly preceded by `=` stays in the source so that
/// comparator spellings like `<=>` and `=>` survive unquoted.
///
/// Returns the trimmed source and whether the sequence was self-closing.
fn scan_code_source(input: &mut Input<'_>) -> Option<(String, bool)> {
    let bytes = input.input.as_bytes();
    let mut i = 0;
    let mut in_quotes = false;
    while i < bytes.len() {
        let c = bytes[i];
        if in_quotes {
            match c {
                b'\\' if i + 1 < bytes.len() => i += 2,
                b'"' => {
                    in_quotes = false;
                    i += 1;
                }
                _ => i += 1,
            }
            continue;
        }
        match c {
            b'"' => {
                in_quotes = true;
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                let source = input.input[..i].trim().to_string();
                input.input = &input.input[i + 2..];
                return Some((source, true));
            }
            b'>' if i > 0 && bytes[i - 1] == b'=' => i += 1,
            b'>' => {
                let source = input.input[..i].trim().to_string();
                input.input = &input.input[i + 1..];
                return Some((source, false));
            }
            _ => i += 1,
        }
    }
    None
}

/// Parse a `<:case` opener prefix with its word boundary.
fn case_opener(input: &mut Input<'_>) -> ModalResult<()> {
    "<:case".parse_next(input)?;
    peek(alt((
        take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
        '>'.void(),
        '/'.void(),
    )))
    .parse_next(input)?;
    Ok(())
}

/// Parse the children of a `<:cond>`: whitespace, comments, and `<:case>`
/// arms up to `</:cond>`.
fn cond_body(input: &mut Input<'_>) -> Vec<Case> {
    let mut cases = Vec::new();
    loop {
        let _ = ws(input);
        if input.input.is_empty() {
            input
                .state
                .diag(input.input, "missing `</:cond>` before end of input");
            break;
        }
        if token(input, "</:cond>") {
            break;
        }
        if input.input.starts_with("<#") {
            let _ = comment(input);
            continue;
        }
        if matches!(opt(case_opener).parse_next(input), Ok(Some(()))) {
            match scan_code_source(input) {
                Some((condition, self_closing)) => {
                    let case_body = if self_closing {
                        Vec::new()
                    } else {
                        body(input, Some("</:case>"))
                    };
                    cases.push(Case {
                        condition,
                        body: case_body,
                    });
                }
                None => {
                    input.state.diag(input.input, "unterminated `<:case` opener");
                    input.input = "";
                    break;
                }
            }
            continue;
        }
        // Anything else between cases is a structural error; skip one run.
        input
            .state
            .diag(input.input, "unexpected content inside `<:cond>`");
        let mut end = input.input.len();
        for (i, _) in input.input.char_indices().skip(1) {
            if input.input[i..].starts_with('<') {
                end = i;
                break;
            }
        }
        input.input = &input.input[end..];
    }
    cases
}

/// One parsed attribute: either the reserved inheritance keyword or a
/// `name[=value]` pair.
enum RawAttr {
    Inherit,
    Plain(Attr),
}

/// Parse an attribute list: whitespace-separated `name=value` and bare
/// tokens, stopping before `/>` or `>`. Fails (for the caller to recover)
/// when the opener never terminates.
fn attr_list(input: &mut Input<'_>) -> ModalResult<AttrList> {
    let attrs: Vec<RawAttr> = repeat(0.., preceded(ws, attr)).parse_next(input)?;
    ws(input)?;
    peek(alt(("/>", ">"))).parse_next(input)?;

    let mut list = AttrList::default();
    for raw in attrs {
        match raw {
            RawAttr::Inherit => list.inherit = true,
            RawAttr::Plain(attr) => list.attrs.push(attr),
        }
    }
    Ok(list)
}

/// Parse a single attribute: `name`, `name=value`, or `:inherit`.
fn attr(input: &mut Input<'_>) -> ModalResult<RawAttr> {
    let name = attr_name(input)?.to_string();
    let value: Option<String> = opt(preceded('=', attr_value_raw)).parse_next(input)?;
    Ok(match value {
        Some(raw) => {
            let value = attr_value(raw, &input.state);
            RawAttr::Plain(Attr {
                name,
                value: Some(value),
            })
        }
        None if name == ":inherit" || name == ":inheritparms" => RawAttr::Inherit,
        None => RawAttr::Plain(Attr { name, value: None }),
    })
}

/// Consume an attribute name: a run of characters that is not whitespace,
/// `=`, `>`, or the `/` of a final `/>`.
fn attr_name<'s>(input: &mut Input<'s>) -> ModalResult<&'s str> {
    let bytes = input.input.as_bytes();
    let mut end = bytes.len();
    for (i, &c) in bytes.iter().enumerate() {
        if c.is_ascii_whitespace() || c == b'=' || c == b'>' {
            end = i;
            break;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'>') {
            end = i;
            break;
        }
    }
    if end == 0 {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let (token, remaining) = input.input.split_at(end);
    input.input = remaining;
    Ok(token)
}

/// Parse an attribute value after `=`: double-quoted with escapes, or an
/// unquoted run. A value that opens a quote must close it.
fn attr_value_raw(input: &mut Input<'_>) -> ModalResult<String> {
    if input.input.starts_with('"') {
        quoted_value(input)
    } else {
        Ok(unquoted_value(input).to_string())
    }
}

/// Consume an unquoted attribute value: a run of characters that is not
/// whitespace, `>`, or the `/` of a final `/>`. Unlike attribute names, a
/// value may contain `=`.
fn unquoted_value<'s>(input: &mut Input<'s>) -> &'s str {
    let bytes = input.input.as_bytes();
    let mut end = bytes.len();
    for (i, &c) in bytes.iter().enumerate() {
        if c.is_ascii_whitespace() || c == b'>' {
            end = i;
            break;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'>') {
            end = i;
            break;
        }
    }
    let (token, remaining) = input.input.split_at(end);
    input.input = remaining;
    token
}

/// Consume a double-quoted attribute value, unescaping `\"` and `\\`.
fn quoted_value(input: &mut Input<'_>) -> ModalResult<String> {
    debug_assert!(input.input.starts_with('"'));
    let mut out = String::new();
    let mut chars = input.input[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ErrMode::Backtrack(ContextError::new())),
            },
            '"' => {
                input.input = &input.input[1 + i + 1..];
                return Ok(out);
            }
            _ => out.push(c),
        }
    }
    Err(ErrMode::Backtrack(ContextError::new()))
}

/// Build an attribute value, parsing inline IR when the raw text contains a
/// template sequence. Sub-template diagnostics propagate to the outer parse.
fn attr_value(raw: String, state: &ParseState<'_>) -> AttrValue {
    let template = if contains_template_sequence(&raw) {
        let sub = parse_template(&raw);
        state.diagnostics.borrow_mut().extend(sub.diagnostics);
        Some(sub.template)
    } else {
        None
    };
    AttrValue { raw, template }
}
