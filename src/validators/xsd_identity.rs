//! XSD identity constraints
//!
//! `xs:unique`, `xs:key` and `xs:keyref` with the restricted XPath subset
//! the XSD recommendation allows for selectors and fields: unions of
//! relative child paths, an optional leading `.//`, `*` and `p:*` name
//! tests, and a trailing `@attribute` step in fields.
//!
//! Constraints are evaluated when their scope element has been validated.
//! Keys and uniques of a scope are checked first, then keyrefs are resolved
//! against the tables of the same scope element or its descendants.

use std::collections::{HashMap, HashSet};
use std::fmt;

use roxmltree::{Node, NodeId};

use crate::error::Result;

use super::xsd_model::{
    attribute_key, schema_error, Content, ElementId, SimpleId, TypeDef, XsdModel,
};

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// `xs:unique`
    Unique,
    /// `xs:key`
    Key,
    /// `xs:keyref`
    Keyref,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentityKind::Unique => "unique",
            IdentityKind::Key => "key",
            IdentityKind::Keyref => "keyref",
        })
    }
}

/// Name test of one path step
#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    /// `*`
    Any,
    /// `p:*`
    AnyIn(Option<String>),
    /// `name` or `p:name`
    Name(Option<String>, String),
}

impl NameTest {
    fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::AnyIn(ns) => ns.as_deref() == namespace,
            NameTest::Name(ns, name) => ns.as_deref() == namespace && name == local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    /// Reached through `//` instead of `/`
    descendant: bool,
    test: NameTest,
}

/// One branch of a `|` union
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathExpr {
    steps: Vec<Step>,
    attribute: Option<NameTest>,
}

/// Value of one field, compared by type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// Value of an integer-derived type
    Integer(i128),
    /// Whitespace-normalized lexical value
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

/// Field values of one selected node
pub type FieldTuple = Vec<FieldValue>;

/// A compiled `xs:unique`, `xs:key` or `xs:keyref`
#[derive(Debug, Clone)]
pub struct IdentityConstraint {
    /// Constraint name
    pub name: String,
    /// Constraint kind
    pub kind: IdentityKind,
    /// Local name of the referenced key, for keyrefs
    pub refer: Option<String>,
    selector: Vec<PathExpr>,
    fields: Vec<(String, Vec<PathExpr>)>,
}

impl IdentityConstraint {
    /// Compile an identity constraint definition
    pub fn compile(node: Node) -> Result<Self> {
        let kind = match node.tag_name().name() {
            "unique" => IdentityKind::Unique,
            "key" => IdentityKind::Key,
            _ => IdentityKind::Keyref,
        };
        let name = node
            .attribute("name")
            .ok_or_else(|| schema_error(node, "identity constraint has no name"))?
            .to_string();
        let refer = match kind {
            IdentityKind::Keyref => {
                let refer = node
                    .attribute("refer")
                    .ok_or_else(|| schema_error(node, format!("keyref '{}' has no refer", name)))?;
                Some(refer.rsplit(':').next().unwrap_or(refer).to_string())
            }
            _ => None,
        };

        let mut selector = None;
        let mut fields = Vec::new();
        for child in node.children().filter(Node::is_element) {
            let Some(xpath) = child.attribute("xpath") else {
                continue;
            };
            match child.tag_name().name() {
                "selector" => selector = Some(parse_union(child, xpath, false)?),
                "field" => fields.push((xpath.to_string(), parse_union(child, xpath, true)?)),
                _ => {}
            }
        }
        let selector = selector
            .ok_or_else(|| schema_error(node, format!("identity constraint '{}' has no selector", name)))?;
        if fields.is_empty() {
            return Err(schema_error(
                node,
                format!("identity constraint '{}' has no field", name),
            ));
        }

        Ok(IdentityConstraint {
            name,
            kind,
            refer,
            selector,
            fields,
        })
    }

    /// Nodes selected below `scope`, in document order
    pub fn select<'a, 'input>(&self, scope: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
        let mut selected = Vec::new();
        let mut seen = HashSet::new();
        for path in &self.selector {
            for node in walk_steps(scope, &path.steps) {
                if seen.insert(node.id()) {
                    selected.push(node);
                }
            }
        }
        selected.sort_by_key(|n| n.range().start);
        selected
    }
}

fn parse_union(node: Node, xpath: &str, field: bool) -> Result<Vec<PathExpr>> {
    xpath
        .split('|')
        .map(|branch| {
            parse_path(node, branch.trim(), field).ok_or_else(|| {
                schema_error(node, format!("unsupported identity constraint XPath '{}'", xpath))
            })
        })
        .collect()
}

fn parse_path(node: Node, path: &str, field: bool) -> Option<PathExpr> {
    let mut steps = Vec::new();
    let mut attribute = None;
    let (mut descendant, rest) = match path.strip_prefix(".//") {
        Some(rest) => (true, rest),
        None => (false, path.strip_prefix("./").unwrap_or(path)),
    };
    if rest == "." {
        return Some(PathExpr { steps, attribute });
    }

    let segments: Vec<&str> = rest.split('/').map(str::trim).collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            // `a//b`
            descendant = true;
            continue;
        }
        if *segment == "." {
            continue;
        }
        let attr = segment
            .strip_prefix('@')
            .or_else(|| segment.strip_prefix("attribute::"));
        if let Some(attr) = attr {
            if !field || i + 1 != segments.len() {
                return None;
            }
            attribute = Some(name_test(node, attr)?);
            continue;
        }
        let segment = segment.strip_prefix("child::").unwrap_or(segment);
        steps.push(Step {
            descendant,
            test: name_test(node, segment)?,
        });
        descendant = false;
    }
    Some(PathExpr { steps, attribute })
}

fn name_test(node: Node, test: &str) -> Option<NameTest> {
    if test == "*" {
        return Some(NameTest::Any);
    }
    match test.split_once(':') {
        Some((prefix, local)) => {
            let ns = node.lookup_namespace_uri(Some(prefix))?.to_string();
            if local == "*" {
                Some(NameTest::AnyIn(Some(ns)))
            } else {
                Some(NameTest::Name(Some(ns), local.to_string()))
            }
        }
        // unprefixed names are in no namespace
        None if is_ncname(test) => Some(NameTest::Name(None, test.to_string())),
        None => None,
    }
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn walk_steps<'a, 'input>(start: Node<'a, 'input>, steps: &[Step]) -> Vec<Node<'a, 'input>> {
    let mut current = vec![start];
    for step in steps {
        let mut next = Vec::new();
        let matches = |c: &Node| {
            c.is_element() && step.test.matches(c.tag_name().namespace(), c.tag_name().name())
        };
        for node in &current {
            if step.descendant {
                next.extend(node.descendants().skip(1).filter(matches));
            } else {
                next.extend(node.children().filter(matches));
            }
        }
        current = next;
    }
    current
}

/// Key tables of completed scopes, for keyref resolution
#[derive(Default)]
pub struct IdentityTables<'a, 'input> {
    tables: Vec<(Node<'a, 'input>, String, HashSet<FieldTuple>)>,
}

impl<'a, 'input> IdentityTables<'a, 'input> {
    /// Create an empty table set
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    fn lookup(&self, scope: Node<'a, 'input>, name: &str) -> Option<HashSet<&FieldTuple>> {
        let own = self
            .tables
            .iter()
            .find(|(node, table, _)| *node == scope && table == name);
        if let Some((_, _, rows)) = own {
            return Some(rows.iter().collect());
        }

        let mut found = false;
        let mut rows = HashSet::new();
        for (node, table, values) in &self.tables {
            if table == name && node.ancestors().skip(1).any(|a| a == scope) {
                found = true;
                rows.extend(values.iter());
            }
        }
        found.then_some(rows)
    }
}

/// Evaluates constraints with access to the declarations assigned by the walker
pub struct IdentityEvaluator<'m, 'w> {
    model: &'m XsdModel,
    assigned: &'w HashMap<NodeId, ElementId>,
}

impl<'m, 'w> IdentityEvaluator<'m, 'w> {
    /// Evaluator over `model`, with `assigned` mapping validated elements to declarations
    pub fn new(model: &'m XsdModel, assigned: &'w HashMap<NodeId, ElementId>) -> Self {
        Self { model, assigned }
    }

    /// Check the constraints of `decl` on `scope`; returns offending nodes with messages
    pub fn evaluate<'a, 'input>(
        &self,
        scope: Node<'a, 'input>,
        decl: ElementId,
        tables: &mut IdentityTables<'a, 'input>,
    ) -> Vec<(Node<'a, 'input>, String)> {
        let identities = &self.model.element(decl).identities;
        let mut errors = Vec::new();

        for constraint in identities.iter().filter(|c| c.kind != IdentityKind::Keyref) {
            let mut rows = HashSet::new();
            for node in constraint.select(scope) {
                match self.field_tuple(constraint, node) {
                    Ok(Some(tuple)) => {
                        if !rows.insert(tuple.clone()) {
                            errors.push((
                                node,
                                format!(
                                    "Duplicate key-sequence {} in {} identity-constraint '{}'.",
                                    key_sequence(&tuple),
                                    constraint.kind,
                                    constraint.name
                                ),
                            ));
                        }
                    }
                    Ok(None) if constraint.kind == IdentityKind::Key => errors.push((
                        node,
                        format!(
                            "Not all fields of key identity-constraint '{}' evaluate to a node.",
                            constraint.name
                        ),
                    )),
                    Ok(None) => {}
                    Err(message) => errors.push((node, message)),
                }
            }
            tables.tables.push((scope, constraint.name.clone(), rows));
        }

        for constraint in identities.iter().filter(|c| c.kind == IdentityKind::Keyref) {
            let refer = constraint.refer.as_deref().unwrap_or_default();
            let rows = tables.lookup(scope, refer).unwrap_or_default();
            for node in constraint.select(scope) {
                match self.field_tuple(constraint, node) {
                    Ok(Some(tuple)) if !rows.contains(&tuple) => errors.push((
                        node,
                        format!(
                            "No match found for key-sequence {} of keyref '{}'.",
                            key_sequence(&tuple),
                            constraint.name
                        ),
                    )),
                    Ok(_) => {}
                    Err(message) => errors.push((node, message)),
                }
            }
        }
        errors
    }

    /// Field values of `node`; `Ok(None)` when some field is absent
    fn field_tuple(
        &self,
        constraint: &IdentityConstraint,
        node: Node,
    ) -> std::result::Result<Option<FieldTuple>, String> {
        let mut tuple = Vec::with_capacity(constraint.fields.len());
        for (xpath, paths) in &constraint.fields {
            let mut values = Vec::new();
            for path in paths {
                for target in walk_steps(node, &path.steps) {
                    match &path.attribute {
                        Some(test) => {
                            for attr in target.attributes() {
                                if test.matches(attr.namespace(), attr.name()) {
                                    let ty = self.attribute_type(target, attr.namespace(), attr.name());
                                    values.push(self.typed(attr.value(), ty));
                                }
                            }
                        }
                        None => {
                            let text: String = target
                                .descendants()
                                .filter(Node::is_text)
                                .filter_map(|t| t.text())
                                .collect();
                            values.push(self.typed(&text, self.element_type(target)));
                        }
                    }
                }
            }
            match values.len() {
                0 => return Ok(None),
                1 => tuple.extend(values),
                _ => {
                    return Err(format!(
                        "The XPath '{}' of a field of {} identity-constraint '{}' evaluates to a node-set with more than one member.",
                        xpath, constraint.kind, constraint.name
                    ))
                }
            }
        }
        Ok(Some(tuple))
    }

    fn element_type(&self, node: Node) -> Option<SimpleId> {
        let decl = self.assigned.get(&node.id())?;
        match self.model.element(*decl).type_def {
            TypeDef::Simple(id) => Some(id),
            TypeDef::Complex(id) => match self.model.complex_type(id).content {
                Content::Simple(id) => Some(id),
                _ => None,
            },
            TypeDef::AnyType => None,
        }
    }

    fn attribute_type(&self, node: Node, namespace: Option<&str>, name: &str) -> Option<SimpleId> {
        let decl = self.assigned.get(&node.id())?;
        match self.model.element(*decl).type_def {
            TypeDef::Complex(id) => self
                .model
                .complex_type(id)
                .attributes
                .get(&attribute_key(namespace, name))
                .map(|a| a.simple_type),
            _ => None,
        }
    }

    fn typed(&self, value: &str, ty: Option<SimpleId>) -> FieldValue {
        let Some(ty) = ty else {
            return FieldValue::String(value.to_string());
        };
        let value = self.model.whitespace(ty).apply(value);
        if self.model.builtin_root(ty).is_some_and(|b| b.is_integer()) {
            if let Ok(i) = value.trim_start_matches('+').parse::<i128>() {
                return FieldValue::Integer(i);
            }
        }
        FieldValue::String(value)
    }
}

/// `['a', 'b']`
fn key_sequence(tuple: &[FieldValue]) -> String {
    let items: Vec<String> = tuple.iter().map(|v| format!("'{}'", v)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(xml: &str) -> IdentityConstraint {
        let doc = roxmltree::Document::parse(xml).unwrap();
        IdentityConstraint::compile(doc.root_element()).unwrap()
    }

    #[test]
    fn test_compile_key_and_keyref() {
        let key = constraint(
            r#"<xs:key xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:p="urn:p" name="K">
                <xs:selector xpath="./p:Types/p:T"/>
                <xs:field xpath="@id"/>
                <xs:field xpath="@cls"/>
            </xs:key>"#,
        );
        assert_eq!(key.kind, IdentityKind::Key);
        assert_eq!(key.fields.len(), 2);
        assert_eq!(key.selector[0].steps.len(), 2);
        assert_eq!(
            key.selector[0].steps[1].test,
            NameTest::Name(Some("urn:p".to_string()), "T".to_string())
        );

        let keyref = constraint(
            r#"<xs:keyref xmlns:xs="http://www.w3.org/2001/XMLSchema" name="R" refer="p:K">
                <xs:selector xpath=".//Use"/>
                <xs:field xpath="@ref"/>
            </xs:keyref>"#,
        );
        assert_eq!(keyref.refer.as_deref(), Some("K"));
        assert!(keyref.selector[0].steps[0].descendant);
    }

    #[test]
    fn test_select_union_in_document_order() {
        let unique = constraint(
            r#"<xs:unique xmlns:xs="http://www.w3.org/2001/XMLSchema" name="U">
                <xs:selector xpath="./B|./A"/>
                <xs:field xpath="@name"/>
            </xs:unique>"#,
        );
        let doc = roxmltree::Document::parse(r#"<R><A name="1"/><B name="2"/><C/><A name="3"/></R>"#)
            .unwrap();
        let names: Vec<_> = unique
            .select(doc.root_element())
            .iter()
            .filter_map(|n| n.attribute("name"))
            .collect();
        assert_eq!(names, ["1", "2", "3"]);
    }

    #[test]
    fn test_unsupported_xpath_is_rejected() {
        let doc = roxmltree::Document::parse(
            r#"<xs:key xmlns:xs="http://www.w3.org/2001/XMLSchema" name="K">
                <xs:selector xpath="../A"/>
                <xs:field xpath="@id"/>
            </xs:key>"#,
        )
        .unwrap();
        let err = IdentityConstraint::compile(doc.root_element()).unwrap_err();
        assert!(err.to_string().contains("unsupported identity constraint XPath"));
    }

    #[test]
    fn test_key_sequence_format() {
        let tuple = vec![FieldValue::String("T1".into()), FieldValue::Integer(3)];
        assert_eq!(key_sequence(&tuple), "['T1', '3']");
    }
}
