//! Compiled XSD model
//!
//! Compiles a single XML Schema document into arenas of element
//! declarations, complex types and simple types. References are resolved
//! once, at compile time: an extension carries its base type's content and
//! attributes, named groups and attribute groups are inlined, and every
//! complex type knows the declaration behind each element name it may
//! contain.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use regex::Regex;
use roxmltree::Node;

use crate::error::{Error, ParseError, Result};

use super::xsd_builtins::{Builtin, WhiteSpace};
use super::xsd_identity::IdentityConstraint;

/// XSD 1.0 namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// `xsi:` namespace; its attributes are always allowed
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Nested `xs:group`/`xs:attributeGroup` references followed before giving up
const MAX_GROUP_DEPTH: usize = 64;

/// Members of an `xs:all` group, tracked as a bit set while matching
pub const MAX_ALL_MEMBERS: usize = 64;

/// Index into [`XsdModel::elements`]
pub type ElementId = usize;
/// Index into [`XsdModel::complex_types`]
pub type ComplexId = usize;
/// Index into [`XsdModel::simple_types`]
pub type SimpleId = usize;

/// Occurrence bounds; `max == None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// minOccurs
    pub min: u32,
    /// maxOccurs
    pub max: Option<u32>,
}

impl Occurs {
    /// Exactly once
    pub const ONCE: Occurs = Occurs { min: 1, max: Some(1) };

    fn from_node(node: Node) -> Result<Self> {
        let min = match node.attribute("minOccurs") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| schema_error(node, format!("invalid minOccurs '{}'", v)))?,
            None => 1,
        };
        let max = match node.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => None,
            Some(v) => Some(
                v.parse()
                    .map_err(|_| schema_error(node, format!("invalid maxOccurs '{}'", v)))?,
            ),
            None => Some(1),
        };
        if matches!(max, Some(max) if max < min) {
            return Err(schema_error(node, "maxOccurs is smaller than minOccurs"));
        }
        Ok(Occurs { min, max })
    }
}

/// Namespaces a wildcard accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    /// `##any`
    Any,
    /// `##other`: any namespace except this one, and not unqualified
    Not(Option<String>),
    /// Explicit list; `None` stands for `##local`
    Set(Vec<Option<String>>),
}

/// `processContents` of a wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessContents {
    /// A declaration must exist and is checked
    Strict,
    /// Checked when a declaration exists
    Lax,
    /// Never checked
    Skip,
}

/// `xs:any` or `xs:anyAttribute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    /// Accepted namespaces
    pub namespaces: NamespaceConstraint,
    /// How matched items are checked
    pub process: ProcessContents,
}

impl Wildcard {
    /// Whether an item in `namespace` matches
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.namespaces {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Not(excluded) => {
                namespace.is_some() && namespace != excluded.as_deref()
            }
            NamespaceConstraint::Set(allowed) => allowed.iter().any(|ns| ns.as_deref() == namespace),
        }
    }

    /// Short form used in "Expected is" lists
    pub fn describe(&self) -> &'static str {
        match self.namespaces {
            NamespaceConstraint::Not(_) => "##other*",
            _ => "*",
        }
    }
}

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// `xs:sequence`
    Sequence,
    /// `xs:choice`
    Choice,
    /// `xs:all`
    All,
}

/// What a particle matches
#[derive(Debug, Clone)]
pub enum Term {
    /// One element declaration
    Element(ElementId),
    /// An element wildcard
    Any(Wildcard),
    /// A nested model group
    Group(Compositor, Vec<Particle>),
}

/// A term with occurrence bounds
#[derive(Debug, Clone)]
pub struct Particle {
    /// Matched term
    pub term: Term,
    /// Occurrence bounds
    pub occurs: Occurs,
}

/// Constraining facets of one restriction step
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// `xs:enumeration`
    pub enumeration: Vec<String>,
    /// `xs:pattern` values of this step; one match is enough
    pub patterns: Vec<(String, Regex)>,
    /// `xs:length`
    pub length: Option<usize>,
    /// `xs:minLength`
    pub min_length: Option<usize>,
    /// `xs:maxLength`
    pub max_length: Option<usize>,
    /// `xs:minInclusive`
    pub min_inclusive: Option<String>,
    /// `xs:maxInclusive`
    pub max_inclusive: Option<String>,
    /// `xs:minExclusive`
    pub min_exclusive: Option<String>,
    /// `xs:maxExclusive`
    pub max_exclusive: Option<String>,
    /// `xs:totalDigits`
    pub total_digits: Option<usize>,
    /// `xs:fractionDigits`
    pub fraction_digits: Option<usize>,
    /// `xs:whiteSpace`
    pub whitespace: Option<WhiteSpace>,
}

impl Facets {
    fn is_empty(&self) -> bool {
        self.enumeration.is_empty()
            && self.patterns.is_empty()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min_inclusive.is_none()
            && self.max_inclusive.is_none()
            && self.min_exclusive.is_none()
            && self.max_exclusive.is_none()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
            && self.whitespace.is_none()
    }
}

/// How a simple type is derived
#[derive(Debug, Clone)]
pub enum Variety {
    /// A built-in type
    Builtin(Builtin),
    /// Restriction of another simple type
    Restriction {
        /// Base type
        base: SimpleId,
        /// Facets added by this step
        facets: Facets,
    },
    /// Whitespace separated list
    List {
        /// Item type
        item: SimpleId,
    },
    /// Union of member types
    Union {
        /// Member types, tried in order
        members: Vec<SimpleId>,
    },
}

/// A simple type definition
#[derive(Debug, Clone)]
pub struct SimpleType {
    /// Name, `None` for anonymous types
    pub name: Option<String>,
    /// Derivation
    pub variety: Variety,
}

/// Attribute use of a complex type
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// Local name
    pub name: String,
    /// Namespace, `None` for unqualified attributes
    pub namespace: Option<String>,
    /// `use="required"`
    pub required: bool,
    /// `fixed` value constraint
    pub fixed: Option<String>,
    /// Value type
    pub simple_type: SimpleId,
}

/// Content type of a complex type
#[derive(Debug, Clone)]
pub enum Content {
    /// No child elements
    Empty,
    /// Text of a simple type
    Simple(SimpleId),
    /// Child elements
    Elements(Particle),
}

/// A complex type with its derivation chain resolved
#[derive(Debug, Clone)]
pub struct ComplexType {
    /// Name, `None` for anonymous types
    pub name: Option<String>,
    /// Content type
    pub content: Content,
    /// Text allowed between child elements
    pub mixed: bool,
    /// Attribute uses keyed by [`attribute_key`]
    pub attributes: IndexMap<String, AttributeUse>,
    /// `xs:anyAttribute`
    pub any_attribute: Option<Wildcard>,
    /// Declaration of each element name the content model contains
    pub children: HashMap<String, ElementId>,
    /// First element wildcard of the content model
    pub wildcard: Option<Wildcard>,
}

/// Type of an element declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDef {
    /// `xs:anyType`, or no type at all
    AnyType,
    /// A simple type
    Simple(SimpleId),
    /// A complex type
    Complex(ComplexId),
}

/// Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Local name
    pub name: String,
    /// Namespace, `None` for unqualified elements
    pub namespace: Option<String>,
    /// Element type
    pub type_def: TypeDef,
    /// `fixed` value constraint
    pub fixed: Option<String>,
    /// `xs:unique`, `xs:key` and `xs:keyref` defined on this element
    pub identities: Vec<IdentityConstraint>,
}

impl ElementDecl {
    /// Whether `node` is an instance of this declaration by name
    pub fn matches(&self, node: Node) -> bool {
        node.tag_name().name() == self.name
            && node.tag_name().namespace() == self.namespace.as_deref()
    }
}

/// A compiled schema
#[derive(Debug, Default)]
pub struct XsdModel {
    /// `targetNamespace`
    pub target_namespace: Option<String>,
    /// Element declarations, global and local
    pub elements: Vec<ElementDecl>,
    /// Complex types, named and anonymous
    pub complex_types: Vec<ComplexType>,
    /// Simple types, named, anonymous and built-in
    pub simple_types: Vec<SimpleType>,
    globals: HashMap<String, ElementId>,
    named_complex: HashMap<String, ComplexId>,
    named_simple: HashMap<String, SimpleId>,
}

impl XsdModel {
    /// Compile a schema from its XSD text
    pub fn compile(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text).map_err(|e| {
            Error::Parse(
                ParseError::new(format!("schema is not well-formed: {}", e))
                    .with_location(format!("line {}", e.pos().row)),
            )
        })?;

        let root = doc.root_element();
        if !is_xs(root, "schema") {
            return Err(Error::Parse(ParseError::new(format!(
                "expected xs:schema root, found '{}'",
                root.tag_name().name()
            ))));
        }

        Compiler::new(root)?.run()
    }

    /// Global element declaration for an instance element
    pub fn global_element(&self, namespace: Option<&str>, name: &str) -> Option<ElementId> {
        if namespace != self.target_namespace.as_deref() {
            return None;
        }
        self.globals.get(name).copied()
    }

    /// Element declaration by id
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id]
    }

    /// Complex type by id
    pub fn complex_type(&self, id: ComplexId) -> &ComplexType {
        &self.complex_types[id]
    }

    /// Simple type by id
    pub fn simple_type(&self, id: SimpleId) -> &SimpleType {
        &self.simple_types[id]
    }

    /// Named complex type
    pub fn complex_type_named(&self, name: &str) -> Option<&ComplexType> {
        self.named_complex.get(name).map(|id| &self.complex_types[*id])
    }

    /// Named simple type
    pub fn simple_type_named(&self, name: &str) -> Option<&SimpleType> {
        self.named_simple.get(name).map(|id| &self.simple_types[*id])
    }

    /// Built-in type at the root of a restriction chain; `None` for lists and unions
    pub fn builtin_root(&self, mut id: SimpleId) -> Option<Builtin> {
        for _ in 0..self.simple_types.len() {
            match &self.simple_types[id].variety {
                Variety::Builtin(builtin) => return Some(*builtin),
                Variety::Restriction { base, .. } => id = *base,
                Variety::List { .. } | Variety::Union { .. } => return None,
            }
        }
        None
    }

    /// Whether values of `id` are whitespace separated lists
    pub fn is_list(&self, mut id: SimpleId) -> bool {
        for _ in 0..self.simple_types.len() {
            match &self.simple_types[id].variety {
                Variety::Builtin(builtin) => return builtin.is_list(),
                Variety::Restriction { base, .. } => id = *base,
                Variety::List { .. } => return true,
                Variety::Union { .. } => return false,
            }
        }
        false
    }

    /// Whitespace rule applied to values of `id`
    pub fn whitespace(&self, mut id: SimpleId) -> WhiteSpace {
        for _ in 0..self.simple_types.len() {
            match &self.simple_types[id].variety {
                Variety::Builtin(builtin) => return builtin.whitespace(),
                Variety::Restriction { base, facets } => match facets.whitespace {
                    Some(ws) => return ws,
                    None => id = *base,
                },
                Variety::List { .. } | Variety::Union { .. } => return WhiteSpace::Collapse,
            }
        }
        WhiteSpace::Collapse
    }

    /// Name used in messages: the type name, or the built-in it restricts
    pub fn display_name(&self, id: SimpleId) -> String {
        let ty = &self.simple_types[id];
        match (&ty.name, &ty.variety) {
            (_, Variety::Builtin(builtin)) => builtin.to_string(),
            (Some(name), _) => name.clone(),
            (None, Variety::List { .. }) => "local list type".to_string(),
            (None, Variety::Union { .. }) => "local union type".to_string(),
            (None, Variety::Restriction { .. }) => match self.builtin_root(id) {
                Some(builtin) => builtin.to_string(),
                None => "local atomic type".to_string(),
            },
        }
    }
}

fn is_xs(node: Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().namespace() == Some(XSD_NAMESPACE)
        && node.tag_name().name() == local
}

fn xs_name<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    if node.is_element() && node.tag_name().namespace() == Some(XSD_NAMESPACE) {
        Some(node.tag_name().name())
    } else {
        None
    }
}

/// `xs:` children other than annotations
fn xs_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|c| xs_name(*c).is_some_and(|name| name != "annotation"))
}

/// Schema compile error pointing at `node`
pub(crate) fn schema_error(node: Node, message: impl Into<String>) -> Error {
    let doc = node.document();
    let pos = doc.text_pos_at(node.range().start);
    let source = doc.input_text()[node.range()].lines().next().unwrap_or_default().trim();
    Error::Parse(
        ParseError::new(message)
            .with_location(format!("line {}", pos.row))
            .with_source(source),
    )
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        schema_error(
            node,
            format!("xs:{} is missing attribute '{}'", node.tag_name().name(), name),
        )
    })
}

/// Key of an attribute use in [`ComplexType::attributes`]
pub fn attribute_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{{{}}}{}", ns, name),
        None => name.to_string(),
    }
}

/// Resolve a QName against the in-scope namespaces of `node`
fn resolve_qname<'a>(node: Node<'a, '_>, qname: &'a str) -> Result<(Option<&'a str>, &'a str)> {
    let qname = qname.trim();
    match qname.split_once(':') {
        Some((prefix, local)) => match node.lookup_namespace_uri(Some(prefix)) {
            Some(ns) => Ok((Some(ns), local)),
            None => Err(schema_error(node, format!("unbound prefix in '{}'", qname))),
        },
        None => Ok((node.lookup_namespace_uri(None), qname)),
    }
}

/// Translate an XSD regular expression into an anchored `regex` pattern
fn translate_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?:");
    let mut in_class = false;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') if in_class => out.push_str(r"\p{L}_:"),
                Some('i') => out.push_str(r"[\p{L}_:]"),
                Some('I') => out.push_str(r"[^\p{L}_:]"),
                Some('c') if in_class => out.push_str(r"\p{L}\p{N}\p{M}._:\-"),
                Some('c') => out.push_str(r"[\p{L}\p{N}\p{M}._:\-]"),
                Some('C') => out.push_str(r"[^\p{L}\p{N}\p{M}._:\-]"),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str(r"\\"),
            },
            '[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            // Anchors are ordinary characters in XSD patterns
            '^' | '$' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push_str(")$");
    out
}

struct Compiler<'a, 'input> {
    target_namespace: Option<&'a str>,
    qualified_elements: bool,
    qualified_attributes: bool,
    element_nodes: HashMap<&'a str, Node<'a, 'input>>,
    complex_nodes: HashMap<&'a str, Node<'a, 'input>>,
    simple_nodes: HashMap<&'a str, Node<'a, 'input>>,
    group_nodes: HashMap<&'a str, Node<'a, 'input>>,
    attribute_group_nodes: HashMap<&'a str, Node<'a, 'input>>,
    attribute_nodes: HashMap<&'a str, Node<'a, 'input>>,
    elements: Vec<Option<ElementDecl>>,
    complex_types: Vec<Option<ComplexType>>,
    simple_types: Vec<Option<SimpleType>>,
    globals: HashMap<String, ElementId>,
    named_complex: HashMap<String, ComplexId>,
    named_simple: HashMap<String, SimpleId>,
    builtins: HashMap<Builtin, SimpleId>,
    /// Element names by id, known from the moment an id is reserved
    element_names: Vec<String>,
    group_depth: usize,
}

impl<'a, 'input> Compiler<'a, 'input> {
    fn new(root: Node<'a, 'input>) -> Result<Self> {
        let mut compiler = Compiler {
            target_namespace: root.attribute("targetNamespace"),
            qualified_elements: root.attribute("elementFormDefault") == Some("qualified"),
            qualified_attributes: root.attribute("attributeFormDefault") == Some("qualified"),
            element_nodes: HashMap::new(),
            complex_nodes: HashMap::new(),
            simple_nodes: HashMap::new(),
            group_nodes: HashMap::new(),
            attribute_group_nodes: HashMap::new(),
            attribute_nodes: HashMap::new(),
            elements: Vec::new(),
            complex_types: Vec::new(),
            simple_types: Vec::new(),
            globals: HashMap::new(),
            named_complex: HashMap::new(),
            named_simple: HashMap::new(),
            builtins: HashMap::new(),
            element_names: Vec::new(),
            group_depth: 0,
        };

        for child in xs_children(root) {
            let table = match xs_name(child) {
                Some("element") => &mut compiler.element_nodes,
                Some("complexType") => &mut compiler.complex_nodes,
                Some("simpleType") => &mut compiler.simple_nodes,
                Some("group") => &mut compiler.group_nodes,
                Some("attributeGroup") => &mut compiler.attribute_group_nodes,
                Some("attribute") => &mut compiler.attribute_nodes,
                Some(other @ ("include" | "import" | "redefine" | "override")) => {
                    return Err(schema_error(
                        child,
                        format!("xs:{} is not supported; schemas must be self-contained", other),
                    ))
                }
                _ => continue, // notation
            };
            let name = required_attr(child, "name")?;
            if table.insert(name, child).is_some() {
                return Err(schema_error(child, format!("duplicate global component '{}'", name)));
            }
        }
        Ok(compiler)
    }

    fn run(mut self) -> Result<XsdModel> {
        if self.element_nodes.is_empty() {
            return Err(Error::Parse(ParseError::new("schema declares no global element")));
        }

        // Compile every global component so schema errors surface at load time
        let mut names: Vec<&'a str> = self.complex_nodes.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            self.complex_id(name)?;
        }
        let mut names: Vec<&'a str> = self.simple_nodes.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            self.simple_id(name)?;
        }
        let mut names: Vec<&'a str> = self.element_nodes.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            self.global_element_id(name)?;
        }

        let model = XsdModel {
            target_namespace: self.target_namespace.map(str::to_string),
            elements: finish(self.elements)?,
            complex_types: finish(self.complex_types)?,
            simple_types: finish(self.simple_types)?,
            globals: self.globals,
            named_complex: self.named_complex,
            named_simple: self.named_simple,
        };
        check_simple_cycles(&model)?;
        Ok(model)
    }

    fn builtin_id(&mut self, builtin: Builtin) -> SimpleId {
        if let Some(id) = self.builtins.get(&builtin) {
            return *id;
        }
        let id = self.simple_types.len();
        self.simple_types.push(Some(SimpleType {
            name: None,
            variety: Variety::Builtin(builtin),
        }));
        self.builtins.insert(builtin, id);
        id
    }

    fn is_target(&self, namespace: Option<&str>) -> bool {
        namespace == self.target_namespace
    }

    // types

    fn complex_id(&mut self, name: &'a str) -> Result<ComplexId> {
        if let Some(id) = self.named_complex.get(name) {
            return Ok(*id);
        }
        let node = self.complex_nodes[name];
        let id = self.complex_types.len();
        self.complex_types.push(None);
        self.named_complex.insert(name.to_string(), id);
        let ty = self.complex_type(node, Some(name.to_string()))?;
        self.complex_types[id] = Some(ty);
        Ok(id)
    }

    /// A complex type whose definition is complete, for use as a base
    fn complex_base(&mut self, node: Node<'a, 'input>, name: &'a str) -> Result<ComplexType> {
        let id = self.complex_id(name)?;
        self.complex_types[id]
            .clone()
            .ok_or_else(|| schema_error(node, format!("circular derivation of type '{}'", name)))
    }

    fn simple_id(&mut self, name: &'a str) -> Result<SimpleId> {
        if let Some(id) = self.named_simple.get(name) {
            return Ok(*id);
        }
        let node = self.simple_nodes[name];
        let id = self.simple_types.len();
        self.simple_types.push(None);
        self.named_simple.insert(name.to_string(), id);
        let ty = self.simple_type(node, Some(name.to_string()))?;
        self.simple_types[id] = Some(ty);
        Ok(id)
    }

    fn anonymous_simple(&mut self, node: Node<'a, 'input>) -> Result<SimpleId> {
        let ty = self.simple_type(node, None)?;
        self.simple_types.push(Some(ty));
        Ok(self.simple_types.len() - 1)
    }

    fn anonymous_complex(&mut self, node: Node<'a, 'input>) -> Result<ComplexId> {
        let ty = self.complex_type(node, None)?;
        self.complex_types.push(Some(ty));
        Ok(self.complex_types.len() - 1)
    }

    /// Resolve the `type` of an element
    fn type_ref(&mut self, node: Node<'a, 'input>, qname: &'a str) -> Result<TypeDef> {
        let (ns, local) = resolve_qname(node, qname)?;
        if ns == Some(XSD_NAMESPACE) {
            if local == "anyType" {
                return Ok(TypeDef::AnyType);
            }
            return Builtin::from_name(local)
                .map(|b| TypeDef::Simple(self.builtin_id(b)))
                .ok_or_else(|| schema_error(node, format!("unknown built-in type 'xs:{}'", local)));
        }
        if self.is_target(ns) {
            if self.complex_nodes.contains_key(local) {
                return Ok(TypeDef::Complex(self.complex_id(local)?));
            }
            if self.simple_nodes.contains_key(local) {
                return Ok(TypeDef::Simple(self.simple_id(local)?));
            }
        }
        Err(schema_error(node, format!("unknown type '{}'", qname)))
    }

    /// Resolve a reference that must name a simple type
    fn simple_ref(&mut self, node: Node<'a, 'input>, qname: &'a str) -> Result<SimpleId> {
        match self.type_ref(node, qname)? {
            TypeDef::Simple(id) => Ok(id),
            TypeDef::AnyType => Ok(self.builtin_id(Builtin::AnySimpleType)),
            TypeDef::Complex(_) => Err(schema_error(
                node,
                format!("'{}' is a complex type where a simple type is required", qname),
            )),
        }
    }

    /// Base of a restriction or item type of a list, by attribute or inline
    fn simple_operand(
        &mut self,
        node: Node<'a, 'input>,
        attribute: &str,
    ) -> Result<SimpleId> {
        if let Some(name) = node.attribute(attribute) {
            return self.simple_ref(node, name);
        }
        match xs_children(node).find(|c| is_xs(*c, "simpleType")) {
            Some(inline) => self.anonymous_simple(inline),
            None => Err(schema_error(
                node,
                format!("xs:{} has neither '{}' nor an inline type", node.tag_name().name(), attribute),
            )),
        }
    }

    fn simple_type(&mut self, node: Node<'a, 'input>, name: Option<String>) -> Result<SimpleType> {
        let Some(derivation) = xs_children(node).next() else {
            return Err(schema_error(node, "xs:simpleType has no derivation"));
        };
        let variety = match xs_name(derivation) {
            Some("restriction") => Variety::Restriction {
                base: self.simple_operand(derivation, "base")?,
                facets: parse_facets(derivation)?,
            },
            Some("list") => Variety::List {
                item: self.simple_operand(derivation, "itemType")?,
            },
            Some("union") => {
                let mut members = Vec::new();
                let member_types = derivation.attribute("memberTypes").unwrap_or_default();
                for member in member_types.split_ascii_whitespace() {
                    members.push(self.simple_ref(derivation, member)?);
                }
                for inline in xs_children(derivation).filter(|c| is_xs(*c, "simpleType")) {
                    members.push(self.anonymous_simple(inline)?);
                }
                if members.is_empty() {
                    return Err(schema_error(derivation, "xs:union has no member types"));
                }
                Variety::Union { members }
            }
            _ => return Err(schema_error(derivation, "unexpected simple type derivation")),
        };
        Ok(SimpleType { name, variety })
    }

    fn complex_type(&mut self, node: Node<'a, 'input>, name: Option<String>) -> Result<ComplexType> {
        let mut ty = ComplexType {
            name,
            content: Content::Empty,
            mixed: node.attribute("mixed") == Some("true"),
            attributes: IndexMap::new(),
            any_attribute: None,
            children: HashMap::new(),
            wildcard: None,
        };

        let mut particle = None;
        for child in xs_children(node) {
            match xs_name(child) {
                Some("complexContent") => {
                    if child.attribute("mixed") == Some("true") {
                        ty.mixed = true;
                    }
                    particle = self.complex_content(child, &mut ty)?;
                }
                Some("simpleContent") => self.simple_content(child, &mut ty)?,
                _ => match self.particle(child)? {
                    Some(p) => particle = Some(p),
                    None => self.attribute_item(child, &mut ty.attributes, &mut ty.any_attribute)?,
                },
            }
        }

        if let Some(particle) = particle {
            self.collect_children(&particle, &mut ty.children, &mut ty.wildcard);
            ty.content = Content::Elements(particle);
        }
        Ok(ty)
    }

    fn complex_content(
        &mut self,
        node: Node<'a, 'input>,
        ty: &mut ComplexType,
    ) -> Result<Option<Particle>> {
        let Some(derivation) = xs_children(node).next() else {
            return Err(schema_error(node, "xs:complexContent has no derivation"));
        };
        let extension = match xs_name(derivation) {
            Some("extension") => true,
            Some("restriction") => false,
            _ => return Err(schema_error(derivation, "unexpected complex content derivation")),
        };

        let base_name = required_attr(derivation, "base")?;
        let (ns, local) = resolve_qname(derivation, base_name)?;
        let base = if ns == Some(XSD_NAMESPACE) && local == "anyType" {
            None
        } else if self.is_target(ns) && self.complex_nodes.contains_key(local) {
            Some(self.complex_base(derivation, local)?)
        } else {
            return Err(schema_error(
                derivation,
                format!("complex content base '{}' is not a complex type", base_name),
            ));
        };

        let mut own_particle = None;
        let mut own_attributes = IndexMap::new();
        let mut own_wildcard = None;
        for child in xs_children(derivation) {
            match self.particle(child)? {
                Some(p) => own_particle = Some(p),
                None => self.attribute_item(child, &mut own_attributes, &mut own_wildcard)?,
            }
        }

        let Some(base) = base else {
            ty.attributes = own_attributes;
            ty.any_attribute = own_wildcard;
            return Ok(own_particle);
        };

        ty.attributes = base.attributes.clone();
        ty.attributes.extend(own_attributes);
        if !extension {
            // prohibited uses were skipped when collected; drop the inherited ones
            let prohibited: Vec<String> = xs_children(derivation)
                .filter(|c| is_xs(*c, "attribute") && c.attribute("use") == Some("prohibited"))
                .filter_map(|c| {
                    c.attribute("name")
                        .map(|n| attribute_key(self.attribute_namespace(c), n))
                })
                .collect();
            for key in prohibited {
                ty.attributes.shift_remove(&key);
            }
            ty.any_attribute = own_wildcard;
            return Ok(own_particle);
        }

        ty.any_attribute = own_wildcard.or(base.any_attribute);
        ty.mixed |= base.mixed;
        let base_particle = match base.content {
            Content::Elements(p) => Some(p),
            Content::Empty => None,
            Content::Simple(_) => {
                return Err(schema_error(
                    derivation,
                    "complex content cannot extend a type with simple content",
                ))
            }
        };
        Ok(match (base_particle, own_particle) {
            (Some(base), Some(own)) => Some(Particle {
                term: Term::Group(Compositor::Sequence, vec![base, own]),
                occurs: Occurs::ONCE,
            }),
            (base, own) => base.or(own),
        })
    }

    fn simple_content(&mut self, node: Node<'a, 'input>, ty: &mut ComplexType) -> Result<()> {
        let Some(derivation) = xs_children(node).next() else {
            return Err(schema_error(node, "xs:simpleContent has no derivation"));
        };
        let extension = match xs_name(derivation) {
            Some("extension") => true,
            Some("restriction") => false,
            _ => return Err(schema_error(derivation, "unexpected simple content derivation")),
        };

        let base_name = required_attr(derivation, "base")?;
        let (ns, local) = resolve_qname(derivation, base_name)?;
        let (base_simple, base_attributes) =
            if self.is_target(ns) && self.complex_nodes.contains_key(local) {
                let base = self.complex_base(derivation, local)?;
                match base.content {
                    Content::Simple(id) => (id, base.attributes),
                    _ => {
                        return Err(schema_error(
                            derivation,
                            format!("simple content base '{}' has no simple content", base_name),
                        ))
                    }
                }
            } else {
                (self.simple_ref(derivation, base_name)?, IndexMap::new())
            };

        let mut own_attributes = IndexMap::new();
        let mut own_wildcard = None;
        for child in xs_children(derivation) {
            self.attribute_item(child, &mut own_attributes, &mut own_wildcard)?;
        }
        ty.attributes = base_attributes;
        ty.attributes.extend(own_attributes);
        ty.any_attribute = own_wildcard;

        let simple = if extension {
            base_simple
        } else {
            let facets = parse_facets(derivation)?;
            let base = match xs_children(derivation).find(|c| is_xs(*c, "simpleType")) {
                Some(inline) => self.anonymous_simple(inline)?,
                None => base_simple,
            };
            if facets.is_empty() {
                base
            } else {
                self.simple_types.push(Some(SimpleType {
                    name: None,
                    variety: Variety::Restriction { base, facets },
                }));
                self.simple_types.len() - 1
            }
        };
        ty.content = Content::Simple(simple);
        Ok(())
    }

    // particles

    /// Compile a model group member; `Ok(None)` for non-particles and `maxOccurs="0"`
    fn particle(&mut self, node: Node<'a, 'input>) -> Result<Option<Particle>> {
        let term = match xs_name(node) {
            Some("element") => Term::Element(self.local_element(node)?),
            Some("any") => Term::Any(self.wildcard(node)?),
            Some(kind @ ("sequence" | "choice" | "all")) => {
                let compositor = match kind {
                    "sequence" => Compositor::Sequence,
                    "choice" => Compositor::Choice,
                    _ => Compositor::All,
                };
                let mut members = Vec::new();
                for child in xs_children(node) {
                    if let Some(p) = self.particle(child)? {
                        members.push(p);
                    }
                }
                if compositor == Compositor::All && members.len() > MAX_ALL_MEMBERS {
                    return Err(schema_error(node, "xs:all group has too many members"));
                }
                Term::Group(compositor, members)
            }
            Some("group") => {
                let reference = required_attr(node, "ref")?;
                let (ns, local) = resolve_qname(node, reference)?;
                let group = match self.group_nodes.get(local) {
                    Some(group) if self.is_target(ns) => *group,
                    _ => return Err(schema_error(node, format!("unknown group '{}'", reference))),
                };
                if self.group_depth >= MAX_GROUP_DEPTH {
                    return Err(schema_error(node, format!("group '{}' nests too deeply", reference)));
                }
                let Some(body) = xs_children(group).next() else {
                    return Err(schema_error(group, "xs:group has no model group"));
                };
                self.group_depth += 1;
                let inner = self.particle(body);
                self.group_depth -= 1;
                match inner? {
                    Some(inner) => inner.term,
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };

        let occurs = Occurs::from_node(node)?;
        if occurs.max == Some(0) {
            return Ok(None);
        }
        Ok(Some(Particle { term, occurs }))
    }

    fn wildcard(&self, node: Node<'a, 'input>) -> Result<Wildcard> {
        let tns = self.target_namespace.map(str::to_string);
        let namespaces = match node.attribute("namespace").map(str::trim).unwrap_or("##any") {
            "##any" => NamespaceConstraint::Any,
            "##other" => NamespaceConstraint::Not(tns),
            list => NamespaceConstraint::Set(
                list.split_ascii_whitespace()
                    .map(|item| match item {
                        "##local" => None,
                        "##targetNamespace" => tns.clone(),
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        let process = match node.attribute("processContents").unwrap_or("strict") {
            "strict" => ProcessContents::Strict,
            "lax" => ProcessContents::Lax,
            "skip" => ProcessContents::Skip,
            other => {
                return Err(schema_error(node, format!("invalid processContents '{}'", other)))
            }
        };
        Ok(Wildcard { namespaces, process })
    }

    fn collect_children(
        &self,
        particle: &Particle,
        children: &mut HashMap<String, ElementId>,
        wildcard: &mut Option<Wildcard>,
    ) {
        match &particle.term {
            Term::Element(id) => {
                children.entry(self.element_names[*id].clone()).or_insert(*id);
            }
            Term::Any(w) => {
                if wildcard.is_none() {
                    *wildcard = Some(w.clone());
                }
            }
            Term::Group(_, members) => {
                for member in members {
                    self.collect_children(member, children, wildcard);
                }
            }
        }
    }

    // elements

    fn reserve_element(&mut self, name: &str) -> ElementId {
        self.elements.push(None);
        self.element_names.push(name.to_string());
        self.elements.len() - 1
    }

    fn global_element_id(&mut self, name: &'a str) -> Result<ElementId> {
        if let Some(id) = self.globals.get(name) {
            return Ok(*id);
        }
        let node = self.element_nodes[name];
        let id = self.reserve_element(name);
        self.globals.insert(name.to_string(), id);
        let namespace = self.target_namespace.map(str::to_string);
        let decl = self.element_decl(node, name, namespace)?;
        self.elements[id] = Some(decl);
        Ok(id)
    }

    fn local_element(&mut self, node: Node<'a, 'input>) -> Result<ElementId> {
        if let Some(reference) = node.attribute("ref") {
            let (ns, local) = resolve_qname(node, reference)?;
            if !self.is_target(ns) || !self.element_nodes.contains_key(local) {
                return Err(schema_error(node, format!("unknown element '{}'", reference)));
            }
            return self.global_element_id(local);
        }

        let name = required_attr(node, "name")?;
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => self.qualified_elements,
        };
        let namespace = if qualified {
            self.target_namespace.map(str::to_string)
        } else {
            None
        };
        let id = self.reserve_element(name);
        let decl = self.element_decl(node, name, namespace)?;
        self.elements[id] = Some(decl);
        Ok(id)
    }

    fn element_decl(
        &mut self,
        node: Node<'a, 'input>,
        name: &str,
        namespace: Option<String>,
    ) -> Result<ElementDecl> {
        let type_def = if let Some(type_name) = node.attribute("type") {
            self.type_ref(node, type_name)?
        } else if let Some(ct) = xs_children(node).find(|c| is_xs(*c, "complexType")) {
            TypeDef::Complex(self.anonymous_complex(ct)?)
        } else if let Some(st) = xs_children(node).find(|c| is_xs(*c, "simpleType")) {
            TypeDef::Simple(self.anonymous_simple(st)?)
        } else {
            TypeDef::AnyType
        };

        let mut identities = Vec::new();
        for child in xs_children(node) {
            if let Some("unique" | "key" | "keyref") = xs_name(child) {
                identities.push(IdentityConstraint::compile(child)?);
            }
        }

        Ok(ElementDecl {
            name: name.to_string(),
            namespace,
            type_def,
            fixed: node.attribute("fixed").map(str::to_string),
            identities,
        })
    }

    // attributes

    fn attribute_namespace(&self, node: Node) -> Option<&'a str> {
        let qualified = match node.attribute("form") {
            Some(form) => form == "qualified",
            None => self.qualified_attributes,
        };
        if qualified {
            self.target_namespace
        } else {
            None
        }
    }

    /// Add an `xs:attribute`, `xs:attributeGroup` or `xs:anyAttribute`
    fn attribute_item(
        &mut self,
        node: Node<'a, 'input>,
        attributes: &mut IndexMap<String, AttributeUse>,
        any_attribute: &mut Option<Wildcard>,
    ) -> Result<()> {
        match xs_name(node) {
            Some("attribute") => {
                if node.attribute("use") == Some("prohibited") {
                    return Ok(());
                }
                let attribute = self.attribute_use(node)?;
                let key = attribute_key(attribute.namespace.as_deref(), &attribute.name);
                attributes.insert(key, attribute);
            }
            Some("attributeGroup") => {
                let reference = required_attr(node, "ref")?;
                let (ns, local) = resolve_qname(node, reference)?;
                let group = match self.attribute_group_nodes.get(local) {
                    Some(group) if self.is_target(ns) => *group,
                    _ => {
                        return Err(schema_error(
                            node,
                            format!("unknown attribute group '{}'", reference),
                        ))
                    }
                };
                if self.group_depth >= MAX_GROUP_DEPTH {
                    return Err(schema_error(
                        node,
                        format!("attribute group '{}' nests too deeply", reference),
                    ));
                }
                self.group_depth += 1;
                let result = xs_children(group)
                    .try_for_each(|child| self.attribute_item(child, attributes, any_attribute));
                self.group_depth -= 1;
                result?;
            }
            Some("anyAttribute") => *any_attribute = Some(self.wildcard(node)?),
            _ => {}
        }
        Ok(())
    }

    fn attribute_use(&mut self, node: Node<'a, 'input>) -> Result<AttributeUse> {
        let (decl, name, namespace) = match node.attribute("ref") {
            Some(reference) => {
                let (ns, local) = resolve_qname(node, reference)?;
                match self.attribute_nodes.get(local) {
                    Some(global) if self.is_target(ns) => (*global, local, self.target_namespace),
                    _ => {
                        return Err(schema_error(node, format!("unknown attribute '{}'", reference)))
                    }
                }
            }
            None => (node, required_attr(node, "name")?, self.attribute_namespace(node)),
        };

        let simple_type = if let Some(type_name) = decl.attribute("type") {
            self.simple_ref(decl, type_name)?
        } else if let Some(inline) = xs_children(decl).find(|c| is_xs(*c, "simpleType")) {
            self.anonymous_simple(inline)?
        } else {
            self.builtin_id(Builtin::AnySimpleType)
        };

        Ok(AttributeUse {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            required: node.attribute("use") == Some("required"),
            fixed: node
                .attribute("fixed")
                .or_else(|| decl.attribute("fixed"))
                .map(str::to_string),
            simple_type,
        })
    }
}

fn finish<T>(arena: Vec<Option<T>>) -> Result<Vec<T>> {
    arena
        .into_iter()
        .map(|item| item.ok_or_else(|| Error::Parse(ParseError::new("schema component left unresolved"))))
        .collect()
}

fn parse_facets(derivation: Node) -> Result<Facets> {
    let mut facets = Facets::default();
    for facet in xs_children(derivation) {
        let kind = match xs_name(facet) {
            Some("simpleType" | "attribute" | "attributeGroup" | "anyAttribute") | None => continue,
            Some(kind) => kind,
        };
        let value = required_attr(facet, "value")?;
        let size = || {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| schema_error(facet, format!("invalid {} value '{}'", kind, value)))
        };
        match kind {
            "enumeration" => facets.enumeration.push(value.to_string()),
            "pattern" => {
                let regex = Regex::new(&translate_pattern(value))
                    .map_err(|e| schema_error(facet, format!("invalid pattern '{}': {}", value, e)))?;
                facets.patterns.push((value.to_string(), regex));
            }
            "length" => facets.length = Some(size()?),
            "minLength" => facets.min_length = Some(size()?),
            "maxLength" => facets.max_length = Some(size()?),
            "totalDigits" => facets.total_digits = Some(size()?),
            "fractionDigits" => facets.fraction_digits = Some(size()?),
            "minInclusive" => facets.min_inclusive = Some(value.trim().to_string()),
            "maxInclusive" => facets.max_inclusive = Some(value.trim().to_string()),
            "minExclusive" => facets.min_exclusive = Some(value.trim().to_string()),
            "maxExclusive" => facets.max_exclusive = Some(value.trim().to_string()),
            "whiteSpace" => {
                let ws = WhiteSpace::from_facet(value).ok_or_else(|| {
                    schema_error(facet, format!("invalid whiteSpace value '{}'", value))
                })?;
                facets.whitespace = Some(ws);
            }
            other => return Err(schema_error(facet, format!("unsupported facet xs:{}", other))),
        }
    }
    Ok(facets)
}

fn check_simple_cycles(model: &XsdModel) -> Result<()> {
    for start in 0..model.simple_types.len() {
        let mut seen = HashSet::new();
        let mut id = start;
        while let Variety::Restriction { base, .. } = &model.simple_types[id].variety {
            if !seen.insert(id) {
                let name = model.simple_types[start].name.clone().unwrap_or_default();
                return Err(Error::Parse(ParseError::new(format!(
                    "circular derivation of simple type '{}'",
                    name
                ))));
            }
            id = *base;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::SchemaVariant;

    const SMALL: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
        <xs:complexType name="tBase">
            <xs:sequence><xs:element name="Text" minOccurs="0"/></xs:sequence>
            <xs:attribute name="id" type="xs:string" use="required"/>
        </xs:complexType>
        <xs:complexType name="tRoot">
            <xs:complexContent>
                <xs:extension base="tBase">
                    <xs:choice maxOccurs="unbounded">
                        <xs:element name="A"/>
                        <xs:group ref="gB"/>
                    </xs:choice>
                    <xs:attributeGroup ref="agKind"/>
                </xs:extension>
            </xs:complexContent>
        </xs:complexType>
        <xs:group name="gB">
            <xs:sequence><xs:element name="B" type="tRoot"/></xs:sequence>
        </xs:group>
        <xs:attributeGroup name="agKind">
            <xs:attribute name="kind">
                <xs:simpleType>
                    <xs:restriction base="xs:string">
                        <xs:enumeration value="x"/>
                    </xs:restriction>
                </xs:simpleType>
            </xs:attribute>
        </xs:attributeGroup>
        <xs:element name="Root" type="tRoot"/>
    </xs:schema>"#;

    #[test]
    fn test_extension_prepends_base_content() {
        let model = XsdModel::compile(SMALL).unwrap();
        let root = model.complex_type_named("tRoot").unwrap();

        let Content::Elements(particle) = &root.content else {
            panic!("expected element content");
        };
        let Term::Group(Compositor::Sequence, parts) = &particle.term else {
            panic!("expected base then own content");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1].term, Term::Group(Compositor::Choice, _)));
        assert_eq!(parts[1].occurs, Occurs { min: 1, max: None });

        let keys: Vec<_> = root.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, ["id", "kind"]);
        assert!(root.attributes["id"].required);
    }

    #[test]
    fn test_children_cover_groups_and_recursion() {
        let model = XsdModel::compile(SMALL).unwrap();
        let root = model.complex_type_named("tRoot").unwrap();

        let mut names: Vec<_> = root.children.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["A", "B", "Text"]);

        let b = model.element(root.children["B"]);
        let global = model.global_element(None, "Root").unwrap();
        assert_eq!(b.type_def, model.element(global).type_def);
    }

    #[test]
    fn test_embedded_schemas_compile() {
        for variant in SchemaVariant::ALL {
            let model = XsdModel::compile(variant.text()).unwrap();
            let tns = model.target_namespace.as_deref();
            let scl = model.global_element(tns, "SCL").expect("SCL element");
            assert!(!model.element(scl).identities.is_empty(), "{}", variant);
            assert!(model.complex_type_named("tLNodeType").is_some());

            let Some(SimpleType {
                variety: Variety::Restriction { facets, .. },
                ..
            }) = model.simple_type_named("tBasicTypeEnum")
            else {
                panic!("tBasicTypeEnum is a restriction");
            };
            assert!(facets.enumeration.iter().any(|v| v == "Quality"));
        }
    }

    #[test]
    fn test_variant_differences() {
        let b4 = XsdModel::compile(SchemaVariant::Scl2007B4.text()).unwrap();
        let ed1 = XsdModel::compile(SchemaVariant::Scl2003.text()).unwrap();

        assert!(b4.complex_type_named("tLine").is_some());
        assert!(ed1.complex_type_named("tLine").is_none());
        let ied = |model: &XsdModel| model.complex_type_named("tIED").unwrap().attributes.clone();
        assert!(ied(&b4).contains_key("originalSclRelease"));
        assert!(!ied(&ed1).contains_key("engRight"));
    }

    #[test]
    fn test_pattern_translation() {
        assert_eq!(translate_pattern(r"\d+"), r"^(?:\d+)$");
        assert_eq!(translate_pattern(r"[a-z]$"), r"^(?:[a-z]\$)$");
        assert_eq!(
            translate_pattern(r"\i\c*"),
            r"^(?:[\p{L}_:][\p{L}\p{N}\p{M}._:\-]*)$"
        );
    }

    #[test]
    fn test_schema_errors_carry_location() {
        let text = "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\">\n\
                    <xs:element name=\"Root\" type=\"tMissing\"/>\n</xs:schema>";
        let Err(Error::Parse(err)) = XsdModel::compile(text) else {
            panic!("expected a parse error");
        };
        assert!(err.message.contains("unknown type 'tMissing'"));
        assert_eq!(err.location.as_deref(), Some("line 2"));
        assert!(err.source.as_deref().unwrap().starts_with("<xs:element"));
    }

    #[test]
    fn test_circular_extension_is_rejected() {
        let text = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:complexType name="tA">
                <xs:complexContent><xs:extension base="tB"/></xs:complexContent>
            </xs:complexType>
            <xs:complexType name="tB">
                <xs:complexContent><xs:extension base="tA"/></xs:complexContent>
            </xs:complexType>
            <xs:element name="Root" type="tA"/>
        </xs:schema>"#;
        let err = XsdModel::compile(text).unwrap_err();
        assert!(err.to_string().contains("circular derivation"));
    }

    #[test]
    fn test_not_a_schema() {
        assert!(XsdModel::compile("<root/>").is_err());
        assert!(XsdModel::compile("<xs:schema").is_err());
    }
}
