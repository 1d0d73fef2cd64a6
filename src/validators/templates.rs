//! Data type template validation
//!
//! Walks the `DataTypeTemplates` section depth first and checks each
//! template element against the NSD reference documents. Issues come out in
//! batches, one per top-level template, so a caller can show progress and
//! stop early simply by dropping the iterator.

use std::fmt;

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::documents::{Element, SclDocument};
use crate::error::Result;
use crate::issues::Issue;
use crate::nsd::{NsdStore, TemplateResolver};

/// Template elements with a check of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateTag {
    /// Logical node type
    LNodeType,
    /// Data object type
    DOType,
    /// Data attribute type
    DAType,
    /// Data object of an `LNodeType`
    DO,
    /// Sub data object of a `DOType`
    SDO,
    /// Data attribute of a `DOType`
    DA,
    /// Basic data attribute of a `DAType`
    BDA,
}

impl TemplateTag {
    /// The tag of `element`, if it has a check
    pub fn of(element: &Element) -> Option<Self> {
        match element.local_name() {
            "LNodeType" => Some(TemplateTag::LNodeType),
            "DOType" => Some(TemplateTag::DOType),
            "DAType" => Some(TemplateTag::DAType),
            "DO" => Some(TemplateTag::DO),
            "SDO" => Some(TemplateTag::SDO),
            "DA" => Some(TemplateTag::DA),
            "BDA" => Some(TemplateTag::BDA),
            _ => None,
        }
    }

    /// Element name
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateTag::LNodeType => "LNodeType",
            TemplateTag::DOType => "DOType",
            TemplateTag::DAType => "DAType",
            TemplateTag::DO => "DO",
            TemplateTag::SDO => "SDO",
            TemplateTag::DA => "DA",
            TemplateTag::BDA => "BDA",
        }
    }
}

impl fmt::Display for TemplateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tag` lacks the required attribute `attribute`
pub fn missing_attribute(tag: TemplateTag, attribute: &str, identity: &str) -> Issue {
    Issue::new(format!(
        "The attribute {} is required but missing in {}",
        attribute, tag
    ))
    .with_message(identity)
}

/// `tag` references a type id no template carries
pub fn missing_reference(tag: TemplateTag, type_id: &str, identity: &str) -> Issue {
    Issue::new(format!(
        "The {} references the type {} which does not exist",
        tag, type_id
    ))
    .with_message(identity)
}

/// `tag`'s `attribute` disagrees with the NSD
pub fn incorrect_attribute(
    tag: TemplateTag,
    attribute: &str,
    found: &str,
    expected: &str,
    identity: &str,
) -> Issue {
    Issue::new(format!(
        "The attribute {} of {} is {} but should be {}",
        attribute, tag, found, expected
    ))
    .with_message(identity)
}

/// A mandatory child named in the NSD is absent
pub fn missing_mandatory_child(
    owner: &str,
    owner_id: &str,
    child_tag: &str,
    child_name: &str,
    identity: &str,
) -> Issue {
    Issue::new(format!(
        "The {} {} is missing mandatory {} {}",
        owner, owner_id, child_tag, child_name
    ))
    .with_message(identity)
}

/// Start a template walk over `doc`
///
/// Yields one batch per `LNodeType`, `DOType` and `DAType` directly under
/// `DataTypeTemplates`; other top-level elements are skipped. The iterator is
/// empty when the document has no `DataTypeTemplates`.
pub fn validate_templates<'a>(nsd: &'a NsdStore, doc: &'a SclDocument) -> TemplateIssues<'a> {
    match doc.data_type_templates() {
        Some(templates) => TemplateIssues {
            validator: Some(TemplateValidator::new(TemplateResolver::new(nsd, templates))),
            top_level: templates.children.iter(),
            batches: 0,
        },
        None => TemplateIssues {
            validator: None,
            top_level: <&[Element]>::default().iter(),
            batches: 0,
        },
    }
}

/// Lazy sequence of issue batches
#[derive(Debug)]
pub struct TemplateIssues<'a> {
    validator: Option<TemplateValidator<'a>>,
    top_level: std::slice::Iter<'a, Element>,
    batches: usize,
}

impl<'a> Iterator for TemplateIssues<'a> {
    type Item = Result<Vec<Issue>>;

    fn next(&mut self) -> Option<Self::Item> {
        let validator = self.validator.as_ref()?;
        for element in self.top_level.by_ref() {
            if let Some(tag) = TemplateTag::of(element) {
                self.batches += 1;
                trace!(batch = self.batches, tag = %tag, "validating template");
                return Some(validator.dispatch(tag, element, ""));
            }
        }

        debug!(batches = self.batches, "template walk finished");
        self.validator = None;
        None
    }
}

/// Per-element template checks
#[derive(Debug, Clone, Copy)]
pub struct TemplateValidator<'a> {
    resolver: TemplateResolver<'a>,
}

impl<'a> TemplateValidator<'a> {
    /// Create a validator using `resolver`
    pub fn new(resolver: TemplateResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Issues of `element` and, where its check recurses, its subtree
    pub fn validate(&self, element: &Element) -> Result<Vec<Issue>> {
        match TemplateTag::of(element) {
            Some(tag) => self.dispatch(tag, element, ""),
            None => Ok(Vec::new()),
        }
    }

    fn dispatch(&self, tag: TemplateTag, element: &Element, parent: &str) -> Result<Vec<Issue>> {
        match tag {
            TemplateTag::LNodeType => self.ln_node_type(element),
            TemplateTag::DOType => self.do_type(element),
            TemplateTag::DAType => self.da_type(element),
            TemplateTag::DO | TemplateTag::SDO => Ok(self.data_object(tag, element, parent)),
            TemplateTag::DA | TemplateTag::BDA => Ok(self.data_attribute(tag, element, parent)),
        }
    }

    fn children(&self, element: &Element, identity: &str) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        for child in &element.children {
            if let Some(tag) = TemplateTag::of(child) {
                issues.extend(self.dispatch(tag, child, identity)?);
            }
        }
        Ok(issues)
    }

    fn ln_node_type(&self, element: &Element) -> Result<Vec<Issue>> {
        let id = element.attribute_or_empty("id");
        let ln_class = element.attribute_or_empty("lnClass");
        if ln_class.is_empty() {
            return Ok(vec![missing_attribute(TemplateTag::LNodeType, "lnClass", id)]);
        }

        let required: IndexSet<&str> = self
            .resolver
            .mandatory_data_objects(ln_class)?
            .into_iter()
            .map(|object| object.attribute_or_empty("name"))
            .collect();
        let mut issues = missing_children(element, "DO", required, |name| {
            missing_mandatory_child("LNodeType", ln_class, "DO", name, id)
        });

        issues.extend(self.children(element, id)?);
        Ok(issues)
    }

    fn do_type(&self, element: &Element) -> Result<Vec<Issue>> {
        let id = element.attribute_or_empty("id");
        let cdc = element.attribute_or_empty("cdc");
        if cdc.is_empty() {
            return Ok(vec![missing_attribute(TemplateTag::DOType, "cdc", id)]);
        }

        let mut issues = Vec::new();
        if let Some(object) = self.resolver.resolve_nsd_data_object(element)? {
            let expected = object.attribute_or_empty("type");
            if !expected.is_empty() && expected != cdc {
                issues.push(incorrect_attribute(TemplateTag::DOType, "cdc", cdc, expected, id));
            }
        }

        let required: IndexSet<&str> = self
            .resolver
            .mandatory_children_of_do_type(element, cdc)?
            .into_iter()
            .map(|attribute| attribute.attribute_or_empty("name"))
            .collect();
        issues.extend(missing_children(element, "DA", required, |name| {
            missing_mandatory_child("Common Data Class", cdc, "DA", name, id)
        }));

        issues.extend(self.children(element, id)?);
        Ok(issues)
    }

    fn da_type(&self, element: &Element) -> Result<Vec<Issue>> {
        let id = element.attribute_or_empty("id");
        let required: IndexSet<&str> = self
            .resolver
            .mandatory_children_of_da_type(element)?
            .into_iter()
            .map(|attribute| attribute.attribute_or_empty("name"))
            .collect();
        let mut issues = missing_children(element, "BDA", required, |name| {
            missing_mandatory_child("DAType", id, "BDA", name, id)
        });

        issues.extend(self.children(element, id)?);
        Ok(issues)
    }

    fn data_object(&self, tag: TemplateTag, element: &Element, parent: &str) -> Vec<Issue> {
        self.type_reference(tag, element, parent).into_iter().collect()
    }

    fn data_attribute(&self, tag: TemplateTag, element: &Element, parent: &str) -> Vec<Issue> {
        match element.attribute_or_empty("bType") {
            "Struct" | "Enum" => self.type_reference(tag, element, parent).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn type_reference(&self, tag: TemplateTag, element: &Element, parent: &str) -> Option<Issue> {
        let identity = format!("{}>{}", parent, element.attribute_or_empty("name"));
        match element.get_attribute("type") {
            None => Some(missing_attribute(tag, "type", &identity)),
            Some(type_id) if self.resolver.find_type(type_id).is_none() => {
                Some(missing_reference(tag, type_id, &identity))
            }
            Some(_) => None,
        }
    }
}

/// Issues for each `required` name with no direct `child_tag` child of that name
fn missing_children<'r>(
    element: &Element,
    child_tag: &'static str,
    required: IndexSet<&'r str>,
    issue: impl Fn(&'r str) -> Issue,
) -> Vec<Issue> {
    let present: IndexSet<&str> = element
        .children_named(child_tag)
        .map(|child| child.attribute_or_empty("name"))
        .collect();
    required
        .into_iter()
        .filter(|name| !present.contains(name))
        .map(issue)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NsdLocations;
    use crate::limits::Limits;
    use pretty_assertions::assert_eq;

    const NSD_7_4: &str = r#"<NS>
  <LNClasses>
    <AbstractLNClass name="Base">
      <DataObject name="Foo" type="SPS" presCond="M"/>
    </AbstractLNClass>
    <LNClass name="Derived" base="Base"/>
    <LNClass name="XCBR">
      <DataObject name="Pos" type="DPC" presCond="M"/>
      <DataObject name="Loc" type="SPS" presCond="O"/>
    </LNClass>
  </LNClasses>
</NS>"#;

    const NSD_7_3: &str = r#"<NS>
  <CDCs>
    <CDC name="DPC">
      <DataAttribute name="stVal" type="Dbpos" presCond="M"/>
      <DataAttribute name="origin" type="Originator" presCond="O"/>
    </CDC>
  </CDCs>
  <ConstructedAttributes>
    <ConstructedAttribute name="Originator">
      <SubDataAttribute name="orCat" presCond="M"/>
    </ConstructedAttribute>
  </ConstructedAttributes>
</NS>"#;

    const NSD_8_1: &str = "<ServiceNS/>";

    fn store() -> NsdStore {
        NsdStore::with_locations(NsdLocations::inline(NSD_7_4, NSD_7_3, NSD_8_1), Limits::default())
    }

    fn scl(templates: &str) -> SclDocument {
        SclDocument::from_string(&format!(
            r#"<SCL xmlns="http://www.iec.ch/61850/2003/SCL"><DataTypeTemplates>{}</DataTypeTemplates></SCL>"#,
            templates
        ))
        .unwrap()
    }

    fn titles(nsd: &NsdStore, doc: &SclDocument) -> Vec<String> {
        validate_templates(nsd, doc)
            .flat_map(|batch| batch.unwrap())
            .map(|issue| issue.title)
            .collect()
    }

    #[test]
    fn test_missing_ln_class_stops_recursion() {
        let nsd = store();
        let doc = scl(r#"<LNodeType id="T"><DO name="X"/></LNodeType>"#);

        let issues: Vec<Issue> = validate_templates(&nsd, &doc).flat_map(|b| b.unwrap()).collect();
        assert_eq!(
            issues,
            vec![missing_attribute(TemplateTag::LNodeType, "lnClass", "T")]
        );
    }

    #[test]
    fn test_do_type_reference() {
        let nsd = store();
        let missing = scl(r#"<LNodeType id="T" lnClass="LLN0"><DO name="X"/></LNodeType>"#);
        assert_eq!(
            titles(&nsd, &missing),
            vec!["The attribute type is required but missing in DO"]
        );

        let broken = scl(r#"<LNodeType id="T" lnClass="LLN0"><DO name="X" type="doesNotExist"/></LNodeType>"#);
        assert_eq!(
            titles(&nsd, &broken),
            vec!["The DO references the type doesNotExist which does not exist"]
        );

        let resolved = scl(
            r#"<LNodeType id="T" lnClass="LLN0"><DO name="X" type="RealDOTypeId"/></LNodeType>
               <DOType id="RealDOTypeId" cdc="SPS"/>"#,
        );
        assert!(titles(&nsd, &resolved).is_empty());
    }

    #[test]
    fn test_primitive_da_needs_no_type() {
        let nsd = store();
        let primitive = scl(r#"<DOType id="D" cdc="SPS"><DA name="d1" bType="BOOLEAN"/></DOType>"#);
        assert!(titles(&nsd, &primitive).is_empty());

        let structured = scl(r#"<DOType id="D" cdc="SPS"><DA name="d1" bType="Struct"/></DOType>"#);
        let issues: Vec<Issue> = validate_templates(&nsd, &structured)
            .flat_map(|b| b.unwrap())
            .collect();
        assert_eq!(
            issues,
            vec![missing_attribute(TemplateTag::DA, "type", "D>d1")]
        );
    }

    #[test]
    fn test_sub_data_object_reference() {
        let nsd = store();
        let cases = [
            (r#"<SDO name="x"/>"#, missing_attribute(TemplateTag::SDO, "type", "D>x")),
            (
                r#"<SDO name="x" type="nope"/>"#,
                missing_reference(TemplateTag::SDO, "nope", "D>x"),
            ),
        ];
        for (sdo, expected) in cases {
            let doc = scl(&format!(r#"<DOType id="D" cdc="SPS">{}</DOType>"#, sdo));
            let issues: Vec<Issue> = validate_templates(&nsd, &doc).flat_map(|b| b.unwrap()).collect();
            assert_eq!(issues, vec![expected]);
        }
    }

    #[test]
    fn test_basic_data_attribute_reference() {
        let nsd = store();
        let cases = [
            (
                r#"<BDA name="b" bType="Struct"/>"#,
                missing_attribute(TemplateTag::BDA, "type", "A>b"),
            ),
            (
                r#"<BDA name="b" bType="Enum" type="nope"/>"#,
                missing_reference(TemplateTag::BDA, "nope", "A>b"),
            ),
        ];
        for (bda, expected) in cases {
            let doc = scl(&format!(r#"<DAType id="A">{}</DAType>"#, bda));
            let issues: Vec<Issue> = validate_templates(&nsd, &doc).flat_map(|b| b.unwrap()).collect();
            assert_eq!(issues, vec![expected]);
        }
    }

    #[test]
    fn test_mandatory_data_object() {
        let nsd = store();
        let without = scl(r#"<LNodeType id="XCBR_T" lnClass="XCBR"/>"#);
        let expected = vec![missing_mandatory_child("LNodeType", "XCBR", "DO", "Pos", "XCBR_T")];

        let first: Vec<Issue> = validate_templates(&nsd, &without).flat_map(|b| b.unwrap()).collect();
        let second: Vec<Issue> = validate_templates(&nsd, &without).flat_map(|b| b.unwrap()).collect();
        assert_eq!(first, expected);
        assert_eq!(first, second);
        assert_eq!(first[0].title, "The LNodeType XCBR is missing mandatory DO Pos");

        let with = scl(
            r#"<LNodeType id="XCBR_T" lnClass="XCBR"><DO name="Pos" type="DPC_T"/></LNodeType>
               <DOType id="DPC_T" cdc="DPC"><DA name="stVal" bType="Dbpos"/></DOType>"#,
        );
        assert!(titles(&nsd, &with).is_empty());
    }

    #[test]
    fn test_mandatory_objects_are_inherited() {
        let nsd = store();
        let doc = scl(r#"<LNodeType id="D_T" lnClass="Derived"/>"#);
        assert_eq!(
            titles(&nsd, &doc),
            vec!["The LNodeType Derived is missing mandatory DO Foo"]
        );
    }

    #[test]
    fn test_do_type_checks() {
        let nsd = store();
        let doc = scl(
            r#"<LNodeType id="XCBR_T" lnClass="XCBR"><DO name="Pos" type="Pos_T"/></LNodeType>
               <DOType id="Pos_T" cdc="SPC"/>
               <DOType id="Dpc_T" cdc="DPC"/>
               <DOType id="NoCdc_T"><DA name="q"/></DOType>"#,
        );
        assert_eq!(
            titles(&nsd, &doc),
            vec![
                "The attribute cdc of DOType is SPC but should be DPC",
                "The Common Data Class DPC is missing mandatory DA stVal",
                "The attribute cdc is required but missing in DOType",
            ]
        );
    }

    #[test]
    fn test_da_type_children() {
        let nsd = store();
        let doc = scl(
            r#"<DOType id="Dpc_T" cdc="DPC">
                 <DA name="stVal" bType="Dbpos"/>
                 <DA name="origin" bType="Struct" type="Orig_T"/>
               </DOType>
               <DAType id="Orig_T"><BDA name="orIdent" bType="Octet64"/></DAType>"#,
        );
        assert_eq!(
            titles(&nsd, &doc),
            vec!["The DAType Orig_T is missing mandatory BDA orCat"]
        );
    }

    #[test]
    fn test_one_batch_per_typed_template() {
        let nsd = store();
        let doc = scl(
            r#"<LNodeType id="A" lnClass="LLN0"/><LNodeType id="B" lnClass="LLN0"/>
               <DOType id="C" cdc="SPS"/>
               <DAType id="E"/><DAType id="F"/><DAType id="G"/>
               <EnumType id="H"><EnumVal ord="1">on</EnumVal></EnumType>"#,
        );
        assert_eq!(validate_templates(&nsd, &doc).count(), 6);
    }

    #[test]
    fn test_no_templates_section() {
        let nsd = store();
        let doc = SclDocument::from_string("<SCL><Header id=\"h\"/></SCL>").unwrap();
        assert_eq!(validate_templates(&nsd, &doc).count(), 0);
    }

    #[test]
    fn test_unreadable_nsd_is_an_error() {
        let nsd = NsdStore::with_locations(
            NsdLocations::inline("<NS><unclosed>", NSD_7_3, NSD_8_1),
            Limits::default(),
        );
        let doc = scl(r#"<LNodeType id="T" lnClass="XCBR"/>"#);
        let batches: Vec<_> = validate_templates(&nsd, &doc).collect();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_err());
    }
}
