//! Instance validation against a compiled XSD model
//!
//! This is the engine the schema worker runs. Problems are reported in the
//! shape libxml2 uses, `Element 'X': <description>`, with 1-based line
//! numbers, so the dispatcher can split context from description.
//!
//! The walk assigns a declaration to every element it can, checks
//! attributes, then content, then descends. Identity constraints of an
//! element are evaluated once its subtree is done.

use std::cmp::Ordering;
use std::collections::HashMap;

use roxmltree::{Node, NodeId};

use crate::error::Result;

use super::xsd_builtins::Builtin;
use super::xsd_content::{match_content, ContentError};
use super::xsd_identity::{IdentityEvaluator, IdentityTables};
use super::xsd_model::{
    attribute_key, ComplexType, Content, ElementId, Facets, ProcessContents, SimpleId, TypeDef,
    Variety, XsdModel, XSI_NAMESPACE,
};

/// `part` of violations found by schema rules
pub const SCHEMA_VALIDITY_ERROR: &str = "Schemas validity error";

/// `part` of violations found while parsing the instance
pub const PARSER_ERROR: &str = "Parser error";

/// Nested list and union member types followed before giving up
const MAX_SIMPLE_TYPE_DEPTH: usize = 32;

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// 1-based source line
    pub line: u32,
    /// Local name of the offending element
    pub node: String,
    /// Error class
    pub part: String,
    /// `Element 'X': description`
    pub message: String,
}

/// A pluggable XSD implementation for the schema worker
pub trait XsdEngine: Send + Sync {
    /// Compile schema text; an `Err` is reported to the host as `loaded: false`
    fn load(&self, schema_name: &str, text: &str) -> Result<Box<dyn LoadedSchema>>;
}

/// A compiled schema able to check documents
pub trait LoadedSchema: Send {
    /// All violations of `xml`; empty when the document is valid
    fn validate(&self, xml: &str) -> Vec<Violation>;
}

/// The built-in engine backed by [`XsdModel`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralXsdEngine;

impl XsdEngine for StructuralXsdEngine {
    fn load(&self, _schema_name: &str, text: &str) -> Result<Box<dyn LoadedSchema>> {
        Ok(Box::new(CompiledSchema::compile(text)?))
    }
}

/// A schema compiled by [`StructuralXsdEngine`]
#[derive(Debug)]
pub struct CompiledSchema {
    model: XsdModel,
}

impl CompiledSchema {
    /// Compile schema text
    pub fn compile(text: &str) -> Result<Self> {
        Ok(Self {
            model: XsdModel::compile(text)?,
        })
    }
}

impl LoadedSchema for CompiledSchema {
    fn validate(&self, xml: &str) -> Vec<Violation> {
        let doc = match roxmltree::Document::parse(xml) {
            Ok(doc) => doc,
            Err(e) => {
                return vec![Violation {
                    line: e.pos().row,
                    node: "document".to_string(),
                    part: PARSER_ERROR.to_string(),
                    message: format!("Document: {}", e),
                }]
            }
        };

        let root = doc.root_element();
        let mut walker = Walker {
            model: &self.model,
            violations: Vec::new(),
            assigned: HashMap::new(),
            tables: IdentityTables::new(),
        };
        match self
            .model
            .global_element(root.tag_name().namespace(), root.tag_name().name())
        {
            Some(decl) => walker.element(root, decl),
            None => walker.report(
                root,
                "No matching global declaration available for the validation root.",
            ),
        }
        walker.violations
    }
}

/// Outcome of a simple value check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Valid,
    /// Lexically valid for the built-in, but a facet rejects it
    FacetFailed,
    Invalid,
}

struct Walker<'m, 'a, 'input> {
    model: &'m XsdModel,
    violations: Vec<Violation>,
    assigned: HashMap<NodeId, ElementId>,
    tables: IdentityTables<'a, 'input>,
}

/// Offset of the `>` closing the start tag of `node`; errors are reported
/// on that line, the way libxml2 numbers element nodes
fn start_tag_end(node: Node) -> usize {
    let start = node.range().start;
    let text = &node.document().input_text()[start..node.range().end];
    let mut quote = None;
    for (offset, c) in text.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, '>') => return start + offset,
            _ => {}
        }
    }
    start
}

impl<'m, 'a, 'input> Walker<'m, 'a, 'input> {
    fn report(&mut self, node: Node, description: impl AsRef<str>) {
        let name = node.tag_name().name();
        self.push(node, format!("Element '{}': {}", name, description.as_ref()));
    }

    fn report_attribute(&mut self, node: Node, attribute: &str, description: impl AsRef<str>) {
        let name = node.tag_name().name();
        self.push(
            node,
            format!(
                "Element '{}', attribute '{}': {}",
                name,
                attribute,
                description.as_ref()
            ),
        );
    }

    fn push(&mut self, node: Node, message: String) {
        let pos = node.document().text_pos_at(start_tag_end(node));
        self.violations.push(Violation {
            line: pos.row,
            node: node.tag_name().name().to_string(),
            part: SCHEMA_VALIDITY_ERROR.to_string(),
            message,
        });
    }

    fn element(&mut self, node: Node<'a, 'input>, decl: ElementId) {
        let model = self.model;
        self.assigned.insert(node.id(), decl);
        let element = model.element(decl);

        match element.type_def {
            TypeDef::AnyType => self.any_content(node),
            TypeDef::Simple(ty) => {
                for attr in node.attributes() {
                    if attr.namespace() != Some(XSI_NAMESPACE) {
                        self.report_attribute(
                            node,
                            attr.name(),
                            format!("The attribute '{}' is not allowed.", attr.name()),
                        );
                    }
                }
                if node.children().any(|c| c.is_element()) {
                    self.report(
                        node,
                        "Element content is not allowed, because the type definition is simple.",
                    );
                }
                self.simple_text(node, ty, element.fixed.as_deref());
            }
            TypeDef::Complex(ct) => {
                self.complex_element(node, model.complex_type(ct), element.fixed.as_deref())
            }
        }

        if !element.identities.is_empty() {
            let evaluator = IdentityEvaluator::new(model, &self.assigned);
            let errors = evaluator.evaluate(node, decl, &mut self.tables);
            for (target, message) in errors {
                self.report(target, message);
            }
        }
    }

    /// `xs:anyType`: anything goes, known elements are still checked
    fn any_content(&mut self, node: Node<'a, 'input>) {
        for child in node.children().filter(Node::is_element) {
            let tag = child.tag_name();
            if let Some(decl) = self.model.global_element(tag.namespace(), tag.name()) {
                self.element(child, decl);
            }
        }
    }

    fn simple_text(&mut self, node: Node, ty: SimpleId, fixed: Option<&str>) {
        let text = text_content(node);
        let errors = self.value_errors(&text, ty);
        let valid = errors.is_empty();
        for error in errors {
            self.report(node, error);
        }
        if let (true, Some(fixed)) = (valid, fixed) {
            if !self.same_value(&text, fixed, ty) {
                self.report(
                    node,
                    format!(
                        "The value '{}' does not match the fixed value constraint '{}'.",
                        text, fixed
                    ),
                );
            }
        }
    }

    fn complex_element(&mut self, node: Node<'a, 'input>, ty: &'m ComplexType, fixed: Option<&str>) {
        self.attributes(node, ty);

        let children: Vec<Node<'a, 'input>> = node.children().filter(Node::is_element).collect();
        let particle = match &ty.content {
            Content::Simple(simple) => {
                if !children.is_empty() {
                    self.report(
                        node,
                        "Element content is not allowed, because the content type is a simple type definition.",
                    );
                }
                self.simple_text(node, *simple, fixed);
                return;
            }
            Content::Empty => {
                if !text_content(node).trim().is_empty() {
                    self.report(
                        node,
                        "Character content is not allowed, because the content type is empty.",
                    );
                }
                for child in children {
                    self.report(child, "This element is not expected.");
                }
                return;
            }
            Content::Elements(particle) => particle,
        };

        if !ty.mixed && !text_content(node).trim().is_empty() {
            self.report(
                node,
                "Character content other than whitespace is not allowed because the content type is 'element-only'.",
            );
        }

        let error = match_content(self.model, particle, &children).err();
        let unexpected = match &error {
            Some(ContentError::Unexpected { index, .. }) => Some(*index),
            _ => None,
        };

        for (index, child) in children.iter().enumerate() {
            if unexpected == Some(index) {
                if let Some(error) = &error {
                    self.report(*child, error.message());
                }
                continue;
            }
            self.child_element(*child, ty);
        }

        if let Some(error @ ContentError::Missing { .. }) = &error {
            self.report(node, error.message());
        }
    }

    fn child_element(&mut self, child: Node<'a, 'input>, parent: &'m ComplexType) {
        let model = self.model;
        let tag = child.tag_name();
        if let Some(decl) = parent.children.get(tag.name()) {
            if model.element(*decl).matches(child) {
                self.element(child, *decl);
                return;
            }
        }

        let Some(wildcard) = parent.wildcard.as_ref().filter(|w| w.allows(tag.namespace())) else {
            return;
        };
        let global = model.global_element(tag.namespace(), tag.name());
        match (wildcard.process, global) {
            (ProcessContents::Skip, _) => {}
            (_, Some(decl)) => self.element(child, decl),
            (ProcessContents::Lax, None) => {}
            (ProcessContents::Strict, None) => self.report(
                child,
                "No matching global element declaration available, but demanded by the strict wildcard.",
            ),
        }
    }

    fn attributes(&mut self, node: Node, ty: &ComplexType) {
        let mut not_allowed = Vec::new();
        for attr in node.attributes() {
            let key = attribute_key(attr.namespace(), attr.name());
            match ty.attributes.get(&key) {
                Some(decl) => {
                    let errors = self.value_errors(attr.value(), decl.simple_type);
                    let valid = errors.is_empty();
                    for error in errors {
                        self.report_attribute(node, attr.name(), error);
                    }
                    if let (true, Some(fixed)) = (valid, decl.fixed.as_deref()) {
                        if !self.same_value(attr.value(), fixed, decl.simple_type) {
                            self.report_attribute(
                                node,
                                attr.name(),
                                format!(
                                    "The value '{}' does not match the fixed value constraint '{}'.",
                                    attr.value(),
                                    fixed
                                ),
                            );
                        }
                    }
                }
                None if attr.namespace() == Some(XSI_NAMESPACE) => {}
                None => {
                    let wildcard = ty.any_attribute.as_ref();
                    if !wildcard.is_some_and(|w| w.allows(attr.namespace())) {
                        not_allowed.push(attr.name());
                    }
                }
            }
        }

        for name in not_allowed {
            self.report_attribute(node, name, format!("The attribute '{}' is not allowed.", name));
        }

        for decl in ty.attributes.values().filter(|d| d.required) {
            let present = node
                .attributes()
                .any(|a| a.name() == decl.name && a.namespace() == decl.namespace.as_deref());
            if !present {
                self.report(
                    node,
                    format!("The attribute '{}' is required but missing.", decl.name),
                );
            }
        }
    }

    // simple values

    /// Messages for `raw` against `ty`; empty when valid
    fn value_errors(&self, raw: &str, ty: SimpleId) -> Vec<String> {
        let value = self.model.whitespace(ty).apply(raw);
        let mut errors = Vec::new();
        self.check(&value, ty, ty, 0, &mut errors);
        errors
    }

    fn check(
        &self,
        value: &str,
        ty: SimpleId,
        named: SimpleId,
        depth: usize,
        out: &mut Vec<String>,
    ) -> Lexical {
        if depth > MAX_SIMPLE_TYPE_DEPTH {
            return Lexical::Valid;
        }
        let model = self.model;
        match &model.simple_type(ty).variety {
            Variety::Builtin(builtin) => {
                if builtin.accepts(value) {
                    Lexical::Valid
                } else {
                    out.push(self.not_valid(value, "atomic", named));
                    Lexical::Invalid
                }
            }
            Variety::Restriction { base, facets } => {
                let base_result = self.check(value, *base, named, depth + 1, out);
                if base_result == Lexical::Invalid {
                    return Lexical::Invalid;
                }
                let before = out.len();
                self.facets(value, ty, facets, out);
                if out.len() > before {
                    Lexical::FacetFailed
                } else {
                    base_result
                }
            }
            Variety::List { item } => {
                for token in value.split_ascii_whitespace() {
                    if self.check(token, *item, *item, depth + 1, out) != Lexical::Valid {
                        out.push(self.not_valid(value, "list", named));
                        return Lexical::Invalid;
                    }
                }
                Lexical::Valid
            }
            Variety::Union { members } => {
                let accepted = members.iter().any(|member| {
                    let normalized = model.whitespace(*member).apply(value);
                    let mut scratch = Vec::new();
                    self.check(&normalized, *member, *member, depth + 1, &mut scratch) == Lexical::Valid
                });
                if accepted {
                    Lexical::Valid
                } else {
                    out.push(self.not_valid(value, "union", named));
                    Lexical::Invalid
                }
            }
        }
    }

    fn not_valid(&self, value: &str, variety: &str, ty: SimpleId) -> String {
        let def = self.model.simple_type(ty);
        match (&def.name, &def.variety) {
            (_, Variety::Builtin(builtin)) => format!(
                "'{}' is not a valid value of the {} type '{}'.",
                value, variety, builtin
            ),
            (Some(name), _) => format!(
                "'{}' is not a valid value of the {} type '{}'.",
                value, variety, name
            ),
            (None, _) => format!("'{}' is not a valid value of the local {} type.", value, variety),
        }
    }

    /// Facets of one restriction step
    fn facets(&self, value: &str, ty: SimpleId, facets: &Facets, out: &mut Vec<String>) {
        let length = self.length(value, ty);
        if let Some(expected) = facets.length.filter(|l| length != Some(*l)) {
            out.push(format!(
                "[facet 'length'] The value '{}' has a length of '{}'; this differs from the allowed length of '{}'.",
                value,
                length.unwrap_or_default(),
                expected
            ));
        }
        if let Some(min) = facets.min_length.filter(|min| length.is_some_and(|l| l < *min)) {
            out.push(format!(
                "[facet 'minLength'] The value '{}' has a length of '{}'; this underruns the allowed minimum length of '{}'.",
                value,
                length.unwrap_or_default(),
                min
            ));
        }
        if let Some(max) = facets.max_length.filter(|max| length.is_some_and(|l| l > *max)) {
            out.push(format!(
                "[facet 'maxLength'] The value '{}' has a length of '{}'; this exceeds the allowed maximum length of '{}'.",
                value,
                length.unwrap_or_default(),
                max
            ));
        }

        let range = [
            (&facets.min_inclusive, Ordering::Less, "minInclusive", "is less than the minimum value allowed"),
            (&facets.max_inclusive, Ordering::Greater, "maxInclusive", "is greater than the maximum value allowed"),
        ];
        for (bound, rejected, facet, phrase) in range {
            if let Some(bound) = bound {
                if self.compare(value, bound, ty) == Some(rejected) {
                    out.push(format!(
                        "[facet '{}'] The value '{}' {} ('{}').",
                        facet, value, phrase, bound
                    ));
                }
            }
        }
        if let Some(bound) = &facets.min_exclusive {
            if matches!(self.compare(value, bound, ty), Some(Ordering::Less | Ordering::Equal)) {
                out.push(format!(
                    "[facet 'minExclusive'] The value '{}' must be greater than '{}'.",
                    value, bound
                ));
            }
        }
        if let Some(bound) = &facets.max_exclusive {
            if matches!(self.compare(value, bound, ty), Some(Ordering::Greater | Ordering::Equal)) {
                out.push(format!(
                    "[facet 'maxExclusive'] The value '{}' must be less than '{}'.",
                    value, bound
                ));
            }
        }

        let (total, fraction) = digits(value);
        if let Some(max) = facets.total_digits.filter(|max| total > *max) {
            out.push(format!(
                "[facet 'totalDigits'] The value '{}' has more digits than are allowed ('{}').",
                value, max
            ));
        }
        if let Some(max) = facets.fraction_digits.filter(|max| fraction > *max) {
            out.push(format!(
                "[facet 'fractionDigits'] The value '{}' has more fractional digits than are allowed ('{}').",
                value, max
            ));
        }

        if !facets.enumeration.is_empty()
            && !facets
                .enumeration
                .iter()
                .any(|e| self.same_value(value, e, ty))
        {
            let set: Vec<String> = facets.enumeration.iter().map(|e| format!("'{}'", e)).collect();
            out.push(format!(
                "[facet 'enumeration'] The value '{}' is not an element of the set {{{}}}.",
                value,
                set.join(", ")
            ));
        }

        if !facets.patterns.is_empty() && !facets.patterns.iter().any(|(_, re)| re.is_match(value)) {
            let sources: Vec<&str> = facets.patterns.iter().map(|(s, _)| s.as_str()).collect();
            out.push(format!(
                "[facet 'pattern'] The value '{}' is not accepted by the pattern '{}'.",
                value,
                sources.join("|")
            ));
        }
    }

    /// Length as the length facets count it; `None` where they do not apply
    fn length(&self, value: &str, ty: SimpleId) -> Option<usize> {
        if self.model.is_list(ty) {
            return Some(value.split_ascii_whitespace().count());
        }
        match self.model.builtin_root(ty)? {
            Builtin::HexBinary => Some(value.len() / 2),
            Builtin::Base64Binary => {
                let chars = value.chars().filter(|c| !c.is_ascii_whitespace()).count();
                let padding = value.chars().rev().take_while(|c| *c == '=').count();
                Some((chars / 4 * 3).saturating_sub(padding.min(2)))
            }
            builtin if builtin.is_numeric() => None,
            _ => Some(value.chars().count()),
        }
    }

    /// Order of two values of `ty`; `None` when not comparable
    fn compare(&self, value: &str, bound: &str, ty: SimpleId) -> Option<Ordering> {
        let builtin = self.model.builtin_root(ty)?;
        if builtin.is_integer() {
            let a = value.trim_start_matches('+').parse::<i128>().ok()?;
            let b = bound.trim_start_matches('+').parse::<i128>().ok()?;
            return Some(a.cmp(&b));
        }
        if builtin.is_numeric() {
            let a = parse_float(value)?;
            let b = parse_float(bound)?;
            return a.partial_cmp(&b);
        }
        // dates and times in the same lexical form order as strings
        (value.len() == bound.len()).then(|| value.cmp(bound))
    }

    fn same_value(&self, value: &str, expected: &str, ty: SimpleId) -> bool {
        let ws = self.model.whitespace(ty);
        let (value, expected) = (ws.apply(value), ws.apply(expected));
        match self.model.builtin_root(ty) {
            Some(builtin) if builtin.is_numeric() => {
                self.compare(&value, &expected, ty) == Some(Ordering::Equal)
            }
            _ => value == expected,
        }
    }
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => value.parse().ok(),
    }
}

/// Total and fraction digit counts of a decimal lexical value
fn digits(value: &str) -> (usize, usize) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    (int.len() + frac.len(), frac.len())
}

fn text_content(node: Node) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::SchemaVariant;
    use pretty_assertions::assert_eq;

    const VALID_2003: &str = r#"<SCL xmlns="http://www.iec.ch/61850/2003/SCL">
  <Header id="project"/>
  <DataTypeTemplates>
    <LNodeType id="LLN0_T" lnClass="LLN0">
      <DO name="Mod" type="ENC_Mod"/>
    </LNodeType>
    <DOType id="ENC_Mod" cdc="ENC">
      <DA name="stVal" bType="Enum" type="Beh" fc="ST"/>
    </DOType>
    <EnumType id="Beh">
      <EnumVal ord="1">on</EnumVal>
    </EnumType>
  </DataTypeTemplates>
</SCL>"#;

    const FACETS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="tNum">
    <xs:restriction base="xs:unsignedInt"><xs:maxInclusive value="10"/></xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="tUnion"><xs:union memberTypes="tNum xs:boolean"/></xs:simpleType>
  <xs:simpleType name="tList"><xs:list itemType="tNum"/></xs:simpleType>
  <xs:element name="R">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="C" type="tNum" minOccurs="0" maxOccurs="unbounded"/>
        <xs:element name="E" minOccurs="0"><xs:complexType/></xs:element>
      </xs:sequence>
      <xs:attribute name="n" type="tNum"/>
      <xs:attribute name="u" type="tUnion"/>
      <xs:attribute name="l" type="tList"/>
      <xs:attribute name="r" type="xs:string" use="required"/>
      <xs:attribute name="f" type="xs:int" fixed="3"/>
      <xs:attribute name="s">
        <xs:simpleType>
          <xs:restriction base="xs:string">
            <xs:maxLength value="2"/>
            <xs:pattern value="[a-z]+"/>
          </xs:restriction>
        </xs:simpleType>
      </xs:attribute>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

    fn schema(variant: SchemaVariant) -> CompiledSchema {
        CompiledSchema::compile(variant.text()).unwrap()
    }

    fn messages(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.message.as_str()).collect()
    }

    #[test]
    fn test_valid_document() {
        let violations = schema(SchemaVariant::Scl2003).validate(VALID_2003);
        assert_eq!(violations, vec![]);
    }

    #[test]
    fn test_missing_required_attribute() {
        let xml = VALID_2003.replace(r#" lnClass="LLN0""#, "");
        let violations = schema(SchemaVariant::Scl2003).validate(&xml);

        assert_eq!(violations[0].line, 4);
        assert_eq!(violations[0].node, "LNodeType");
        assert_eq!(violations[0].part, SCHEMA_VALIDITY_ERROR);
        assert_eq!(
            violations[0].message,
            "Element 'LNodeType': The attribute 'lnClass' is required but missing."
        );
        // the key on (id, lnClass) no longer evaluates
        assert_eq!(
            violations[1].message,
            "Element 'LNodeType': Not all fields of key identity-constraint 'LNodeTypeKey' evaluate to a node."
        );
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn test_enumeration_facet() {
        let xml = VALID_2003.replace(r#"bType="Enum""#, r#"bType="Enumeration""#);
        let violations = schema(SchemaVariant::Scl2003).validate(&xml);

        assert_eq!(violations.len(), 1);
        assert!(violations[0]
            .message
            .starts_with("Element 'DA', attribute 'bType': [facet 'enumeration'] The value 'Enumeration'"));
    }

    #[test]
    fn test_unexpected_child_lists_alternatives() {
        let xml = VALID_2003.replace("<Header id=\"project\"/>", "<Heading/>");
        let violations = schema(SchemaVariant::Scl2003).validate(&xml);

        assert_eq!(
            messages(&violations),
            ["Element 'Heading': This element is not expected. Expected is one of ( ##other*, Text, Private, Header )."]
        );
        assert_eq!(violations[0].line, 2);
    }

    #[test]
    fn test_missing_child_element() {
        let xml = r#"<SCL xmlns="http://www.iec.ch/61850/2003/SCL">
  <Header id="project"/>
  <DataTypeTemplates/>
</SCL>"#;
        let violations = schema(SchemaVariant::Scl2003).validate(xml);
        assert_eq!(
            messages(&violations),
            ["Element 'DataTypeTemplates': Missing child element(s). Expected is ( LNodeType )."]
        );
    }

    #[test]
    fn test_fixed_version_attribute() {
        let xml = VALID_2003.replace(
            "<SCL xmlns=\"http://www.iec.ch/61850/2003/SCL\">",
            "<SCL xmlns=\"http://www.iec.ch/61850/2003/SCL\" version=\"2010\" revision=\"B\">",
        );
        let violations = schema(SchemaVariant::Scl2007B).validate(&xml);

        assert_eq!(
            messages(&violations),
            ["Element 'SCL', attribute 'version': The value '2010' does not match the fixed value constraint '2007'."]
        );
    }

    #[test]
    fn test_2003_rejects_release_attribute() {
        let xml = VALID_2003.replace(
            "<SCL xmlns=\"http://www.iec.ch/61850/2003/SCL\">",
            "<SCL xmlns=\"http://www.iec.ch/61850/2003/SCL\" release=\"4\">",
        );
        let violations = schema(SchemaVariant::Scl2003).validate(&xml);
        assert_eq!(
            messages(&violations),
            ["Element 'SCL', attribute 'release': The attribute 'release' is not allowed."]
        );
    }

    #[test]
    fn test_foreign_attributes_allowed_by_wildcard() {
        let xml = VALID_2003.replace(
            "<Header id=\"project\"/>",
            "<Header id=\"project\"/><Substation xmlns:ext=\"urn:vendor\" ext:tag=\"x\" name=\"S1\">\
             <VoltageLevel name=\"V1\"><Bay name=\"B1\"/></VoltageLevel></Substation>",
        );
        assert_eq!(schema(SchemaVariant::Scl2003).validate(&xml), vec![]);
    }

    #[test]
    fn test_identity_constraints() {
        let duplicate = VALID_2003.replace(
            "<EnumVal ord=\"1\">on</EnumVal>\n    </EnumType>",
            "<EnumVal ord=\"1\">on</EnumVal>\n    </EnumType>\n    <EnumType id=\"Beh\"><EnumVal ord=\"2\">off</EnumVal></EnumType>",
        );
        let violations = schema(SchemaVariant::Scl2003).validate(&duplicate);
        assert_eq!(
            messages(&violations),
            ["Element 'EnumType': Duplicate key-sequence ['Beh'] in key identity-constraint 'EnumTypeKey'."]
        );
        assert_eq!(violations[0].line, 13);

        let dangling = VALID_2003.replace(r#"type="ENC_Mod""#, r#"type="Missing_T""#);
        let violations = schema(SchemaVariant::Scl2003).validate(&dangling);
        assert_eq!(
            messages(&violations),
            ["Element 'DO': No match found for key-sequence ['Missing_T'] of keyref 'ref2DOType'."]
        );
        assert_eq!(violations[0].line, 5);
    }

    #[test]
    fn test_simple_type_messages() {
        let schema = CompiledSchema::compile(FACETS).unwrap();
        let xml = r#"<R n="x" u="zz" l="1 x 3" bad="1" f=" 03 " s="ABC"><C>11</C><C>y<D/></C><E>t</E><E/></R>"#;

        assert_eq!(
            messages(&schema.validate(xml)),
            [
                "Element 'R', attribute 'n': 'x' is not a valid value of the atomic type 'tNum'.",
                "Element 'R', attribute 'u': 'zz' is not a valid value of the union type 'tUnion'.",
                "Element 'R', attribute 'l': 'x' is not a valid value of the atomic type 'tNum'.",
                "Element 'R', attribute 'l': '1 x 3' is not a valid value of the list type 'tList'.",
                "Element 'R', attribute 's': [facet 'maxLength'] The value 'ABC' has a length of '3'; this exceeds the allowed maximum length of '2'.",
                "Element 'R', attribute 's': [facet 'pattern'] The value 'ABC' is not accepted by the pattern '[a-z]+'.",
                "Element 'R', attribute 'bad': The attribute 'bad' is not allowed.",
                "Element 'R': The attribute 'r' is required but missing.",
                "Element 'C': [facet 'maxInclusive'] The value '11' is greater than the maximum value allowed ('10').",
                "Element 'C': Element content is not allowed, because the type definition is simple.",
                "Element 'C': 'y' is not a valid value of the atomic type 'tNum'.",
                "Element 'E': Character content is not allowed, because the content type is empty.",
                "Element 'E': This element is not expected.",
            ]
        );
    }

    #[test]
    fn test_malformed_document() {
        let violations = schema(SchemaVariant::Scl2003).validate("<SCL>\n<Header>\n</SCL>");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].part, PARSER_ERROR);
        assert_eq!(violations[0].line, 3);
    }

    #[test]
    fn test_unknown_root() {
        let violations = schema(SchemaVariant::Scl2003).validate("<Project/>");
        assert_eq!(
            violations[0].message,
            "Element 'Project': No matching global declaration available for the validation root."
        );

        // right name, wrong namespace
        let violations = schema(SchemaVariant::Scl2003).validate("<SCL/>");
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_digit_counts() {
        assert_eq!(digits("-012.3400"), (3, 2));
        assert_eq!(digits("7"), (1, 0));
    }
}
