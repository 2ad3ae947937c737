//! Public IR types for parsed templates.
//!
//! These types are public to enable external tooling (linters, template
//! analyzers, etc.).

/// A parsed template: the root vector of IR nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// One node of the template IR.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal output text.
    Text(String),

    /// `<# ... />` or `<#>...</#>`. Parsed, never rendered.
    Comment,

    /// `<:source/>` or `<:source>body</:>`: an embedded code fragment.
    ///
    /// The source is raw text handed to the fragment engine. An empty source
    /// stands for "the current value rendered as-is".
    Code { source: String, body: Vec<Node> },

    /// `<=name attrs>body</=name>`: a variable-substitution scope.
    VarScope {
        name: String,
        attrs: AttrList,
        body: Vec<Node>,
    },

    /// `<:for bindings>body</:for>`: bounded looping / rebinding.
    For { attrs: AttrList, body: Vec<Node> },

    /// `<:eval bindings>body</:eval>`: deferred re-evaluation of the
    /// rendered body as a fresh template.
    Eval { attrs: AttrList, body: Vec<Node> },

    /// `<:include name bindings>...</:include>`. The body is only inspected
    /// for `<:set>` children.
    Include { attrs: AttrList, body: Vec<Node> },

    /// `<:cond vars><:case c>body</:case>...</:cond>`: first truthy case wins.
    Cond { vars: Vec<String>, cases: Vec<Case> },

    /// A structural child consumed by its parent scope.
    Section(Section),
}

/// A structural section: `<:code>`, `<:pre>`, `<:post>`, `<:first>`,
/// `<:last>`, `<:map>`, `<:grep>`, `<:sort>`, or `<:set name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    /// Binding target, present only for `set`.
    pub target: Option<String>,
    pub body: Vec<Node>,
}

/// The structural modifier a section carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Code,
    Pre,
    Post,
    First,
    Last,
    Map,
    Grep,
    Sort,
    Set,
}

impl SectionKind {
    /// Resolve a tag name to a section kind.
    pub fn from_name(name: &str) -> Option<SectionKind> {
        match name {
            "code" => Some(SectionKind::Code),
            "pre" => Some(SectionKind::Pre),
            "post" => Some(SectionKind::Post),
            "first" => Some(SectionKind::First),
            "last" => Some(SectionKind::Last),
            "map" => Some(SectionKind::Map),
            "grep" => Some(SectionKind::Grep),
            "sort" => Some(SectionKind::Sort),
            "set" => Some(SectionKind::Set),
            _ => None,
        }
    }

    /// The tag name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Code => "code",
            SectionKind::Pre => "pre",
            SectionKind::Post => "post",
            SectionKind::First => "first",
            SectionKind::Last => "last",
            SectionKind::Map => "map",
            SectionKind::Grep => "grep",
            SectionKind::Sort => "sort",
            SectionKind::Set => "set",
        }
    }
}

/// One `<:case condition>body</:case>` arm of a `<:cond>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Raw fragment source of the condition.
    pub condition: String,
    pub body: Vec<Node>,
}

/// The attribute list of an opener, in textual order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrList {
    pub attrs: Vec<Attr>,
    /// Whether `:inherit` (or `:inheritparms`) was present.
    pub inherit: bool,
}

impl AttrList {
    /// Look up the first `name=value` attribute with the given name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.as_ref())
    }

    /// Iterate `name=value` attributes in textual order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs
            .iter()
            .filter_map(|a| a.value.as_ref().map(|v| (a.name.as_str(), v)))
    }

    /// Iterate bare attribute names in textual order.
    pub fn bare(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .iter()
            .filter(|a| a.value.is_none())
            .map(|a| a.name.as_str())
    }
}

/// A single attribute. A bare attribute has no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: Option<AttrValue>,
}

/// An attribute value, remembering its raw text alongside any inline IR.
///
/// A value that textually contains a template sequence is parsed as a
/// sub-template that evaluates to a string when bound. Fragment-source
/// attributes (`map=`, `grep=`, `sort=`, case conditions) always read the
/// raw text instead.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrValue {
    pub raw: String,
    pub template: Option<Template>,
}

impl AttrValue {
    /// The raw text, used where the value is a fragment source.
    pub fn source(&self) -> &str {
        &self.raw
    }

    /// The value as template nodes: the inline IR when one was parsed,
    /// otherwise a single literal text node.
    pub fn to_nodes(&self) -> Vec<Node> {
        match &self.template {
            Some(t) => t.nodes.clone(),
            None => {
                if self.raw.is_empty() {
                    Vec::new()
                } else {
                    vec![Node::Text(self.raw.clone())]
                }
            }
        }
    }
}
