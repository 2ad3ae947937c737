//! The template evaluator: a depth-first IR walker producing output text.
//!
//! The walker carries a [`Frame`] (parameter map, current value) and an
//! [`EvalContext`] (scratchpad, include stack, depth). Scope expansion,
//! list transforms, control-sequence dispatch, and error-policy handling
//! all live here; fragment compilation and template parsing go through the
//! shared cache.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::path::PathBuf;

use crate::cache;
use crate::interpreter::context::{EvalContext, Frame};
use crate::interpreter::error::{EvalError, FragmentError};
use crate::interpreter::fragment::{FragmentCtx, FragmentEngine};
use crate::interpreter::loader::Loader;
use crate::interpreter::processor::ErrorPolicy;
use crate::parser::{AttrList, AttrValue, Case, Node, Parsed, Section, SectionKind};
use crate::types::{Params, Value};

/// One evaluation pass over a template, borrowing processor configuration.
pub(crate) struct Evaluator<'p> {
    pub engine: &'p dyn FragmentEngine,
    pub loader: &'p dyn Loader,
    pub namespace: &'p str,
    pub search_path: &'p [PathBuf],
    pub on_error: &'p ErrorPolicy,
    pub eprefix: &'p str,
    pub no_cache: bool,
    pub errors: &'p RefCell<Vec<String>>,
}

impl Evaluator<'_> {
    /// Append a template's parse diagnostics to the error list. Cached
    /// parses carry their diagnostics, so hits report the same list as a
    /// fresh parse.
    pub fn replay_diagnostics(&self, parsed: &Parsed) {
        for diagnostic in &parsed.diagnostics {
            let message = format!("{}{diagnostic}", self.eprefix);
            log::debug!("{message}");
            self.errors.borrow_mut().push(message);
        }
    }

    /// Record a diagnostic without dispatching the error policy (parse-time
    /// problems log and continue).
    fn report(&self, message: String) {
        let message = format!("{}{message}", self.eprefix);
        log::debug!("{message}");
        self.errors.borrow_mut().push(message);
    }

    /// Dispatch a runtime failure through the processor's error policy.
    ///
    /// `out` is the buffer for the failure site, so the `output` policy and
    /// handler replacements land where the failing node would have rendered.
    fn handle_runtime_error(&self, message: String, out: &mut String) -> Result<(), EvalError> {
        let message = format!("{}{message}", self.eprefix);
        self.errors.borrow_mut().push(message.clone());
        match self.on_error {
            ErrorPolicy::Warn => log::warn!("{message}"),
            ErrorPolicy::Die => return Err(EvalError::Aborted { message }),
            ErrorPolicy::Output => out.push_str(&message),
            ErrorPolicy::Handler(handler) => match handler(&message) {
                Ok(replacement) => out.push_str(&replacement),
                Err(handler_message) => {
                    self.errors
                        .borrow_mut()
                        .push(format!("{}{handler_message}", self.eprefix));
                    return Err(EvalError::Aborted { message });
                }
            },
        }
        Ok(())
    }

    pub fn eval_nodes(
        &self,
        nodes: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
    ) -> Result<String, EvalError> {
        let mut out = String::new();
        for node in nodes {
            self.eval_node(node, frame, ctx, &mut out)?;
        }
        Ok(out)
    }

    fn eval_node(
        &self,
        node: &Node,
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Comment => {}
            Node::Code { source, body } => self.eval_code(source, body, frame, ctx, out)?,
            Node::VarScope { name, attrs, body } => {
                let rendered = self.eval_var_scope(name, attrs, body, frame, ctx, out)?;
                out.push_str(&rendered);
            }
            Node::For { attrs, body } => self.eval_for(attrs, body, frame, ctx, out)?,
            Node::Eval { attrs, body } => self.eval_eval(attrs, body, frame, ctx, out)?,
            Node::Include { attrs, body } => self.eval_include(attrs, body, frame, ctx, out)?,
            Node::Cond { vars, cases } => self.eval_cond(vars, cases, frame, ctx, out)?,
            Node::Section(section) => {
                // Sections are consumed by their parent scope; one here is
                // stray.
                self.handle_runtime_error(
                    format!("stray `<:{}>` section", section.kind.name()),
                    out,
                )?;
            }
        }
        Ok(())
    }

    /// Compile (through the cache) and invoke a fragment in the given frame.
    fn call_fragment(
        &self,
        source: &str,
        frame: &Frame,
        ctx: &mut EvalContext<'_>,
    ) -> Result<Value, FragmentError> {
        let fragment = cache::fragment(source, self.namespace, self.engine, self.no_cache)?;
        let mut fctx = FragmentCtx {
            value: &frame.value,
            element: frame.element,
            scratch: ctx.scratch(),
            params: &frame.params,
        };
        fragment.call(&mut fctx)
    }

    /// Invoke a fragment with a list element bound as the conventional
    /// per-element variable `v` and as the current value.
    fn call_with_element(
        &self,
        source: &str,
        element: &Value,
        frame: &Frame,
        ctx: &mut EvalContext<'_>,
    ) -> Result<Value, FragmentError> {
        let fragment = cache::fragment(source, self.namespace, self.engine, self.no_cache)?;
        let mut params = frame.params.clone();
        params.insert("v", element.clone());
        let mut fctx = FragmentCtx {
            value: element,
            element: true,
            scratch: ctx.scratch(),
            params: &params,
        };
        fragment.call(&mut fctx)
    }

    /// Evaluate a code node. A paired body renders first and binds as the
    /// fragment's current value, so `<:>X</:>` emits `X` and a bare `<:/>`
    /// emits the enclosing scope's current element.
    fn eval_code(
        &self,
        source: &str,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        let result = if body.is_empty() {
            self.call_fragment(source, frame, ctx)
        } else {
            let rendered = self.eval_nodes(body, frame, ctx)?;
            let saved_value = std::mem::replace(&mut frame.value, Value::Scalar(rendered));
            let saved_element = std::mem::replace(&mut frame.element, true);
            let result = self.call_fragment(source, frame, ctx);
            frame.value = saved_value;
            frame.element = saved_element;
            result
        };
        match result {
            Ok(value) => out.push_str(&value.render()),
            Err(e) => self.handle_runtime_error(e.to_string(), out)?,
        }
        Ok(())
    }

    /// Evaluate a variable scope: classification, type gate, list
    /// transforms, and the pre / per-element / post emission pipeline.
    fn eval_var_scope(
        &self,
        name: &str,
        attrs: &AttrList,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        parent_out: &mut String,
    ) -> Result<String, EvalError> {
        let value = frame.params.get(name).cloned().unwrap_or(Value::Empty);
        let kind = value.kind();

        if let Some(ty) = attrs.get("type") {
            let allowed = ty.source().split(',').map(str::trim).any(|k| k == kind.keyword());
            if !allowed {
                return Ok(String::new());
            }
        }

        let mut xs = value.into_elements();

        // List transforms: attribute forms apply before section forms;
        // textual order within each group.
        for (attr_name, attr_value) in attrs.bindings() {
            if matches!(attr_name, "grep" | "map" | "sort") {
                self.apply_transform(attr_name, attr_value.source(), &mut xs, frame, ctx, parent_out)?;
            }
        }
        for node in body {
            if let Node::Section(section) = node
                && matches!(
                    section.kind,
                    SectionKind::Grep | SectionKind::Map | SectionKind::Sort
                )
            {
                let source = section_source(section);
                self.apply_transform(section.kind.name(), &source, &mut xs, frame, ctx, parent_out)?;
            }
        }

        let mut out = String::new();

        // pre: the attribute form is suppressed on empty xs, the section
        // form always emits.
        if !xs.is_empty()
            && let Some(pre) = attrs.get("pre")
        {
            out.push_str(&self.eval_nodes(&pre.to_nodes(), frame, ctx)?);
        }
        for node in body {
            if let Node::Section(section) = node
                && section.kind == SectionKind::Pre
            {
                out.push_str(&self.eval_nodes(&section.body, frame, ctx)?);
            }
        }

        // Per-element templates: attribute form wins over section form.
        let first_nodes = self.scope_template(attrs, body, "first", SectionKind::First);
        let last_nodes = self.scope_template(attrs, body, "last", SectionKind::Last);
        let code_nodes = self.scope_template(attrs, body, "code", SectionKind::Code);
        let stripped: Vec<Node> = body
            .iter()
            .filter(|n| !matches!(n, Node::Section(_)))
            .cloned()
            .collect();

        let len = xs.len();
        for (i, element) in xs.into_iter().enumerate() {
            // First defined of: first (i == 0), last (i == len-1), code,
            // the body minus its sections. An empty body fallback renders
            // the element as-is.
            let template: Option<&[Node]> = if i == 0 && first_nodes.is_some() {
                first_nodes.as_deref()
            } else if i + 1 == len && last_nodes.is_some() {
                last_nodes.as_deref()
            } else if let Some(code) = &code_nodes {
                Some(code)
            } else if stripped.is_empty() {
                None
            } else {
                Some(&stripped)
            };

            let saved_value = std::mem::replace(&mut frame.value, element);
            let saved_element = std::mem::replace(&mut frame.element, true);
            let rendered = match template {
                Some(nodes) => self.eval_nodes(nodes, frame, ctx),
                None => Ok(frame.value.render()),
            };
            frame.value = saved_value;
            frame.element = saved_element;
            out.push_str(&rendered?);
        }

        // post mirrors pre.
        if len > 0
            && let Some(post) = attrs.get("post")
        {
            out.push_str(&self.eval_nodes(&post.to_nodes(), frame, ctx)?);
        }
        for node in body {
            if let Node::Section(section) = node
                && section.kind == SectionKind::Post
            {
                out.push_str(&self.eval_nodes(&section.body, frame, ctx)?);
            }
        }

        Ok(out)
    }

    /// Select a per-element template: the attribute form if present,
    /// otherwise the first matching child section.
    fn scope_template(
        &self,
        attrs: &AttrList,
        body: &[Node],
        attr_name: &str,
        section_kind: SectionKind,
    ) -> Option<Vec<Node>> {
        if let Some(av) = attrs.get(attr_name) {
            return Some(av.to_nodes());
        }
        body.iter().find_map(|n| match n {
            Node::Section(s) if s.kind == section_kind => Some(s.body.clone()),
            _ => None,
        })
    }

    /// Apply one `grep`, `map`, or `sort` transform to the element list.
    fn apply_transform(
        &self,
        which: &str,
        source: &str,
        xs: &mut Vec<Value>,
        frame: &Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        match which {
            "grep" => {
                let mut kept = Vec::with_capacity(xs.len());
                for element in xs.drain(..) {
                    match self.call_with_element(source, &element, frame, ctx) {
                        Ok(v) if v.is_truthy() => kept.push(element),
                        Ok(_) => {}
                        Err(e) => self.handle_runtime_error(e.to_string(), out)?,
                    }
                }
                *xs = kept;
            }
            "map" => {
                for element in xs.iter_mut() {
                    match self.call_with_element(source, element, frame, ctx) {
                        Ok(v) => *element = v,
                        Err(e) => {
                            self.handle_runtime_error(e.to_string(), out)?;
                            *element = Value::Empty;
                        }
                    }
                }
            }
            "sort" => {
                let fragment =
                    match cache::fragment(source, self.namespace, self.engine, self.no_cache) {
                        Ok(f) => f,
                        Err(e) => {
                            self.handle_runtime_error(e.to_string(), out)?;
                            return Ok(());
                        }
                    };
                // The comparator operates on the conventional bindings $a
                // and $b and yields a signed number.
                let mut cmp_params = frame.params.clone();
                let empty = Value::Empty;
                let mut failure: Option<FragmentError> = None;
                xs.sort_by(|a, b| {
                    if failure.is_some() {
                        return Ordering::Equal;
                    }
                    cmp_params.insert("a", a.clone());
                    cmp_params.insert("b", b.clone());
                    let mut fctx = FragmentCtx {
                        value: &empty,
                        element: false,
                        scratch: ctx.scratch(),
                        params: &cmp_params,
                    };
                    match fragment.call(&mut fctx) {
                        Ok(v) => {
                            let n: i64 = v.render().trim().parse().unwrap_or(0);
                            n.cmp(&0)
                        }
                        Err(e) => {
                            failure = Some(e);
                            Ordering::Equal
                        }
                    }
                });
                if let Some(e) = failure {
                    self.handle_runtime_error(e.to_string(), out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Evaluate the `k=v` attributes and `<:set>` children of a control
    /// opener into bindings, in the enclosing frame.
    fn eval_bindings(
        &self,
        attrs: &AttrList,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<Vec<(String, Value)>, EvalError> {
        let mut bindings = Vec::new();
        for (name, attr_value) in attrs.bindings() {
            let value = self.eval_binding_value(attr_value, frame, ctx, out)?;
            bindings.push((name.to_string(), value));
        }
        for node in body {
            if let Node::Section(section) = node
                && section.kind == SectionKind::Set
                && let Some(target) = &section.target
            {
                let rendered = self.eval_nodes(&section.body, frame, ctx)?;
                bindings.push((target.clone(), Value::Scalar(rendered)));
            }
        }
        Ok(bindings)
    }

    /// Evaluate one binding value per the attribute-value template rules:
    /// a lone substitution keeps its value shape (a returned list stays a
    /// list); mixed literal text and substitutions expand Cartesian-wise
    /// over every list-valued substitution; anything else is the rendered
    /// scalar.
    fn eval_binding_value(
        &self,
        attr_value: &AttrValue,
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<Value, EvalError> {
        let Some(template) = &attr_value.template else {
            return Ok(Value::Scalar(attr_value.raw.clone()));
        };

        if let [Node::Code { source, body }] = template.nodes.as_slice()
            && body.is_empty()
        {
            return match self.call_fragment(source, frame, ctx) {
                Ok(value) => Ok(value),
                Err(e) => {
                    self.handle_runtime_error(e.to_string(), out)?;
                    Ok(Value::Empty)
                }
            };
        }

        let mut combos: Vec<String> = vec![String::new()];
        for node in &template.nodes {
            let piece = match node {
                Node::Text(text) => Value::scalar(text.clone()),
                Node::Code { source, body } if body.is_empty() => {
                    match self.call_fragment(source, frame, ctx) {
                        Ok(value) => value,
                        Err(e) => {
                            self.handle_runtime_error(e.to_string(), out)?;
                            Value::Empty
                        }
                    }
                }
                other => {
                    let mut buf = String::new();
                    self.eval_node(other, frame, ctx, &mut buf)?;
                    Value::scalar(buf)
                }
            };
            match piece {
                Value::List(elements) => {
                    let mut next = Vec::with_capacity(combos.len() * elements.len());
                    for prefix in &combos {
                        for element in &elements {
                            next.push(format!("{prefix}{}", element.render()));
                        }
                    }
                    combos = next;
                }
                other => {
                    let rendered = other.render();
                    for combo in &mut combos {
                        combo.push_str(&rendered);
                    }
                }
            }
        }

        let mut values = combos.into_iter().map(Value::Scalar);
        Ok(match (values.next(), values.len()) {
            (Some(single), 0) => single,
            (Some(first), _) => {
                let mut list = vec![first];
                list.extend(values);
                Value::List(list)
            }
            (None, _) => Value::Empty,
        })
    }

    /// Evaluate `<:for>`: bind, expand the Cartesian product across
    /// list-valued bindings, and render the body once per tuple.
    fn eval_for(
        &self,
        attrs: &AttrList,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        let bindings = self.eval_bindings(attrs, body, frame, ctx, out)?;

        // A `<:code>` child narrows rendering to that child alone.
        let render_nodes: Vec<Node> = match body.iter().find_map(|n| match n {
            Node::Section(s) if s.kind == SectionKind::Code => Some(s.body.clone()),
            _ => None,
        }) {
            Some(code_body) => code_body,
            None => body
                .iter()
                .filter(|n| !matches!(n, Node::Section(_)))
                .cloned()
                .collect(),
        };

        let total: usize = bindings
            .iter()
            .filter_map(|(_, v)| v.as_list().map(<[Value]>::len))
            .product();

        for tuple in 0..total {
            let mut params = if attrs.inherit {
                frame.params.clone()
            } else {
                Params::new()
            };
            let mut stride = 1;
            for (name, value) in &bindings {
                match value.as_list() {
                    Some(elements) if !elements.is_empty() => {
                        let index = (tuple / stride) % elements.len();
                        params.insert(name.clone(), elements[index].clone());
                        stride *= elements.len();
                    }
                    _ => {
                        params.insert(name.clone(), value.clone());
                    }
                }
            }
            let mut sub = Frame {
                params,
                value: frame.value.clone(),
                element: frame.element,
            };
            out.push_str(&self.eval_nodes(&render_nodes, &mut sub, ctx)?);
        }
        Ok(())
    }

    /// Evaluate `<:eval>`: render the body once under the binding-augmented
    /// map, then parse the result as a fresh template (through the cache)
    /// and evaluate it under the enclosing scope's map.
    fn eval_eval(
        &self,
        attrs: &AttrList,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        let bindings = self.eval_bindings(attrs, body, frame, ctx, out)?;
        let mut params = if attrs.inherit {
            frame.params.clone()
        } else {
            Params::new()
        };
        for (name, value) in bindings {
            params.insert(name, value);
        }
        let mut sub = Frame {
            params,
            value: frame.value.clone(),
            element: frame.element,
        };
        let render_nodes: Vec<Node> = body
            .iter()
            .filter(|n| !matches!(n, Node::Section(_)))
            .cloned()
            .collect();
        let source = self.eval_nodes(&render_nodes, &mut sub, ctx)?;

        ctx.enter()?;
        let parsed = cache::parsed(&source, self.no_cache);
        self.replay_diagnostics(&parsed);
        let result = self.eval_nodes(&parsed.template.nodes, frame, ctx);
        ctx.leave();
        out.push_str(&result?);
        Ok(())
    }

    /// Evaluate `<:include>`: resolve the template name through the loader,
    /// parse through the cache, and evaluate under the declared bindings.
    fn eval_include(
        &self,
        attrs: &AttrList,
        body: &[Node],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        let Some(name) = attrs.bare().next().map(str::to_string) else {
            self.handle_runtime_error("include without a template name".to_string(), out)?;
            return Ok(());
        };

        let source = match self.loader.resolve(&name, self.search_path) {
            Ok(source) => source,
            Err(e) => {
                self.handle_runtime_error(e.to_string(), out)?;
                return Ok(());
            }
        };

        let bindings = self.eval_bindings(attrs, body, frame, ctx, out)?;

        match ctx.push_include(&name) {
            Ok(()) => {}
            Err(EvalError::IncludeCycle { chain }) => {
                self.report(format!("include cycle: {}", chain.join(" -> ")));
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut params = if attrs.inherit {
            frame.params.clone()
        } else {
            Params::new()
        };
        for (binding_name, value) in bindings {
            params.insert(binding_name, value);
        }

        let parsed = cache::parsed(&source, self.no_cache);
        self.replay_diagnostics(&parsed);
        let mut sub = Frame::new(params);
        let result = self.eval_nodes(&parsed.template.nodes, &mut sub, ctx);
        ctx.pop_include();
        out.push_str(&result?);
        Ok(())
    }

    /// Evaluate `<:cond>`: conditions run in source order; the first truthy
    /// one renders its body and the rest are not evaluated.
    ///
    /// The names declared on the opener are the bindings a case condition
    /// sees, copied from the enclosing map; the current element is still
    /// live as `$v`. Case bodies render under the full enclosing scope.
    fn eval_cond(
        &self,
        vars: &[String],
        cases: &[Case],
        frame: &mut Frame,
        ctx: &mut EvalContext<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        let mut cond_params = Params::new();
        for name in vars {
            if let Some(value) = frame.params.get(name) {
                cond_params.insert(name.clone(), value.clone());
            }
        }
        let cond_frame = Frame {
            params: cond_params,
            value: frame.value.clone(),
            element: frame.element,
        };
        for case in cases {
            match self.call_fragment(&case.condition, &cond_frame, ctx) {
                Ok(v) if v.is_truthy() => {
                    let rendered = self.eval_nodes(&case.body, frame, ctx)?;
                    out.push_str(&rendered);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => self.handle_runtime_error(e.to_string(), out)?,
            }
        }
        Ok(())
    }
}

/// Flatten a fragment-source section body back to raw text. The parser
/// leaves comparator spellings like `<=>` as literal text, so this is the
/// inverse of how section-form `map`/`grep`/`sort` sources are written.
fn section_source(section: &Section) -> String {
    let mut source = String::new();
    for node in &section.body {
        if let Node::Text(text) = node {
            source.push_str(text);
        }
    }
    source.trim().to_string()
}
