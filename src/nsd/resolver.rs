//! Cross references between a project's data type templates and the NSD files
//!
//! All lookups are read-only. Element references returned point into either
//! the NSD store or the project's `DataTypeTemplates` section.

use std::collections::HashSet;

use tracing::trace;

use crate::documents::Element;
use crate::error::{Error, Result};

use super::NsdStore;

/// DA names whose structure comes from the 8-1 service attributes
pub const CONTROL_SERVICES: [&str; 4] = ["Oper", "SBOw", "SBO", "Cancel"];

/// Presence condition of a mandatory NSD child
const MANDATORY: &str = "M";

/// Lookups that need both the NSD documents and the project templates
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    nsd: &'a NsdStore,
    templates: &'a Element,
}

fn named<'e, 'n>(
    parent: &'e Element,
    tag: &'static str,
    name: &'n str,
) -> impl Iterator<Item = &'e Element> + 'n
where
    'e: 'n,
{
    parent
        .children_named(tag)
        .filter(move |child| child.attribute_or_empty("name") == name)
}

fn mandatory<'e>(parent: &'e Element, tag: &'static str) -> impl Iterator<Item = &'e Element> + 'e {
    parent
        .children_named(tag)
        .filter(|child| child.attribute_or_empty("presCond") == MANDATORY)
}

/// Service presence conditions made mandatory by a `ctlModel` value
pub fn control_presence_conditions(ctl_model: Option<&str>) -> &'static [&'static str] {
    match ctl_model {
        Some(model) if model.contains("direct") => &["MOctrl"],
        Some(model) if model.contains("normal") => &["MOctrl", "MOsbo", "MOsboNormal"],
        Some(model) if model.contains("enhanced") => &["MOctrl", "MOsbo", "MOsboEnhanced"],
        _ => &[],
    }
}

impl<'a> TemplateResolver<'a> {
    /// Resolver for the `DataTypeTemplates` element `templates`
    pub fn new(nsd: &'a NsdStore, templates: &'a Element) -> Self {
        Self { nsd, templates }
    }

    /// The project's `DataTypeTemplates` element
    pub fn templates(&self) -> &'a Element {
        self.templates
    }

    /// `LNClass`/`AbstractLNClass` elements of `ln_class` and all its bases
    ///
    /// Most derived first. A base naming a class already in the chain is an
    /// [`Error::BaseCycle`]; chains longer than the configured limit are
    /// rejected too.
    pub fn ln_class_chain(&self, ln_class: &str) -> Result<Vec<&'a Element>> {
        let root = self.nsd.part_7_4()?;
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        let mut current = ln_class.to_string();

        while !current.is_empty() {
            path.push(current.clone());
            if !seen.insert(current.clone()) {
                return Err(Error::BaseCycle(path.join(" -> ")));
            }
            self.nsd.limits().check_base_chain(seen.len())?;

            let classes: Vec<&'a Element> = root
                .descendants()
                .filter(|e| matches!(e.local_name(), "LNClass" | "AbstractLNClass"))
                .filter(|e| e.attribute_or_empty("name") == current)
                .collect();
            current = classes
                .iter()
                .map(|class| class.attribute_or_empty("base"))
                .find(|base| !base.is_empty())
                .unwrap_or("")
                .to_string();
            chain.extend(classes);
        }

        trace!(ln_class, classes = chain.len(), "resolved LN class chain");
        Ok(chain)
    }

    /// Mandatory `DataObject`s of `ln_class` across its base chain
    pub fn mandatory_data_objects(&self, ln_class: &str) -> Result<Vec<&'a Element>> {
        Ok(self
            .ln_class_chain(ln_class)?
            .into_iter()
            .flat_map(|class| mandatory(class, "DataObject"))
            .collect())
    }

    /// Mandatory sub attributes of the constructed type of `cdc`'s `da_name`
    pub fn mandatory_data_attributes(&self, cdc: &str, da_name: &str) -> Result<Vec<&'a Element>> {
        let root = self.nsd.part_7_3()?;
        let da_type = root
            .descendants_named("CDC")
            .filter(|c| c.attribute_or_empty("name") == cdc)
            .flat_map(|c| named(c, "DataAttribute", da_name))
            .map(|da| da.attribute_or_empty("type"))
            .next();
        let Some(da_type) = da_type.filter(|t| !t.is_empty()) else {
            return Ok(Vec::new());
        };

        Ok(root
            .descendants_named("ConstructedAttributes")
            .flat_map(|group| named(group, "ConstructedAttribute", da_type))
            .flat_map(|attribute| mandatory(attribute, "SubDataAttribute"))
            .collect())
    }

    /// Mandatory sub attributes of the 8-1 service attribute `da_name`
    pub fn mandatory_service_attributes(&self, da_name: &str) -> Result<Vec<&'a Element>> {
        let root = self.nsd.part_8_1()?;
        Ok(root
            .descendants_named("ServiceConstructedAttributes")
            .flat_map(|group| named(group, "ServiceConstructedAttribute", da_name))
            .flat_map(|attribute| mandatory(attribute, "SubDataAttribute"))
            .collect())
    }

    /// Mandatory `BDA`s of a `DAType`, found through the `DA` that uses it
    pub fn mandatory_children_of_da_type(&self, da_type: &Element) -> Result<Vec<&'a Element>> {
        let id = da_type.attribute_or_empty("id");
        let user = self.templates.children_named("DOType").find_map(|do_type| {
            do_type
                .children_named("DA")
                .find(|da| da.attribute_or_empty("type") == id)
                .map(|da| (do_type, da))
        });
        let Some((do_type, da)) = user else {
            return Ok(Vec::new());
        };

        let name = da.attribute_or_empty("name");
        if CONTROL_SERVICES.contains(&name) {
            self.mandatory_service_attributes(name)
        } else {
            self.mandatory_data_attributes(do_type.attribute_or_empty("cdc"), name)
        }
    }

    /// Mandatory `DA`s of a `DOType` with common data class `cdc`
    ///
    /// The 7-3 mandatory attributes, followed by the 8-1 service attributes
    /// its `ctlModel` value calls for.
    pub fn mandatory_children_of_do_type(&self, do_type: &Element, cdc: &str) -> Result<Vec<&'a Element>> {
        let mut children: Vec<&'a Element> = self
            .nsd
            .part_7_3()?
            .descendants_named("CDC")
            .filter(|c| c.attribute_or_empty("name") == cdc)
            .flat_map(|c| mandatory(c, "DataAttribute"))
            .collect();

        let ctl_model = do_type
            .children_named("DA")
            .find(|da| da.attribute_or_empty("name") == "ctlModel")
            .and_then(|da| da.child_text("Val"));
        let conditions = control_presence_conditions(ctl_model);
        if !conditions.is_empty() {
            children.extend(
                self.nsd
                    .part_8_1()?
                    .descendants_named("ServiceCDC")
                    .filter(|c| c.attribute_or_empty("cdc") == cdc)
                    .flat_map(|c| c.children_named("ServiceDataAttribute"))
                    .filter(|sda| conditions.contains(&sda.attribute_or_empty("presCond"))),
            );
        }
        Ok(children)
    }

    /// The NSD `DataObject` describing the `DO` that references `element`
    ///
    /// `None` when no `LNodeType` `DO` references the element's `id` or the
    /// LN class has no such data object.
    pub fn resolve_nsd_data_object(&self, element: &Element) -> Result<Option<&'a Element>> {
        let id = element.attribute_or_empty("id");
        if id.is_empty() {
            return Ok(None);
        }
        let user = self.templates.children_named("LNodeType").find_map(|ln_type| {
            ln_type
                .children_named("DO")
                .find(|d| d.attribute_or_empty("type") == id)
                .map(|d| (ln_type.attribute_or_empty("lnClass"), d.attribute_or_empty("name")))
        });
        let Some((ln_class, name)) = user else {
            return Ok(None);
        };
        if ln_class.is_empty() || name.is_empty() {
            return Ok(None);
        }

        Ok(self
            .ln_class_chain(ln_class)?
            .into_iter()
            .flat_map(|class| named(class, "DataObject", name))
            .next())
    }

    /// The `DOType`, `DAType` or `EnumType` with the given `id`
    pub fn find_type(&self, id: &str) -> Option<&'a Element> {
        self.templates
            .children
            .iter()
            .filter(|e| matches!(e.local_name(), "DOType" | "DAType" | "EnumType"))
            .find(|e| e.attribute_or_empty("id") == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NsdLocations;
    use crate::documents::Document;
    use crate::limits::Limits;
    use pretty_assertions::assert_eq;

    const NSD_7_4: &str = r#"<NS>
  <LNClasses>
    <AbstractLNClass name="DomainLN">
      <DataObject name="Beh" type="ENS" presCond="M"/>
      <DataObject name="NamPlt" type="LPL" presCond="O"/>
    </AbstractLNClass>
    <LNClass name="XCBR" base="DomainLN">
      <DataObject name="Pos" type="DPC" presCond="M"/>
      <DataObject name="BlkOpn" type="SPC" presCond="M"/>
    </LNClass>
    <LNClass name="LOOP" base="LOOP2"/>
    <LNClass name="LOOP2" base="LOOP"/>
  </LNClasses>
</NS>"#;

    const NSD_7_3: &str = r#"<NS>
  <CDCs>
    <CDC name="DPC">
      <DataAttribute name="stVal" type="Dbpos" presCond="M"/>
      <DataAttribute name="q" type="Quality" presCond="M"/>
      <DataAttribute name="origin" type="Originator" presCond="O"/>
    </CDC>
  </CDCs>
  <ConstructedAttributes>
    <ConstructedAttribute name="Originator">
      <SubDataAttribute name="orCat" presCond="M"/>
      <SubDataAttribute name="orIdent" presCond="O"/>
    </ConstructedAttribute>
  </ConstructedAttributes>
</NS>"#;

    const NSD_8_1: &str = r#"<ServiceNS>
  <ServiceCDCs>
    <ServiceCDC cdc="DPC">
      <ServiceDataAttribute name="Oper" presCond="MOctrl"/>
      <ServiceDataAttribute name="SBOw" presCond="MOsboEnhanced"/>
      <ServiceDataAttribute name="SBO" presCond="MOsboNormal"/>
      <ServiceDataAttribute name="Cancel" presCond="MOsbo"/>
    </ServiceCDC>
  </ServiceCDCs>
  <ServiceConstructedAttributes>
    <ServiceConstructedAttribute name="Oper">
      <SubDataAttribute name="ctlVal" presCond="M"/>
      <SubDataAttribute name="operTm" presCond="O"/>
      <SubDataAttribute name="Test" presCond="M"/>
    </ServiceConstructedAttribute>
  </ServiceConstructedAttributes>
</ServiceNS>"#;

    const TEMPLATES: &str = r#"<DataTypeTemplates>
  <LNodeType id="XCBR_T" lnClass="XCBR">
    <DO name="Pos" type="DPC_T"/>
  </LNodeType>
  <DOType id="DPC_T" cdc="DPC">
    <DA name="origin" bType="Struct" type="Orig_T"/>
    <DA name="Oper" bType="Struct" type="Oper_T"/>
    <DA name="ctlModel" bType="Enum" type="CtlModels"><Val>sbo-with-enhanced-security</Val></DA>
  </DOType>
  <DAType id="Orig_T"/>
  <DAType id="Oper_T"/>
  <DAType id="Unused_T"/>
  <EnumType id="CtlModels"/>
</DataTypeTemplates>"#;

    fn store() -> NsdStore {
        NsdStore::with_locations(NsdLocations::inline(NSD_7_4, NSD_7_3, NSD_8_1), Limits::default())
    }

    fn templates() -> Element {
        Document::from_string(TEMPLATES).unwrap().root().unwrap().clone()
    }

    fn names(elements: &[&Element]) -> Vec<String> {
        elements.iter().map(|e| e.attribute_or_empty("name").to_string()).collect()
    }

    fn type_with_id<'e>(templates: &'e Element, id: &str) -> &'e Element {
        templates
            .children
            .iter()
            .find(|e| e.attribute_or_empty("id") == id)
            .unwrap()
    }

    #[test]
    fn test_chain_is_most_derived_first() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let chain = resolver.ln_class_chain("XCBR").unwrap();
        assert_eq!(names(&chain), vec!["XCBR", "DomainLN"]);
        assert!(resolver.ln_class_chain("NOPE").unwrap().is_empty());
    }

    #[test]
    fn test_mandatory_objects_are_inherited() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let objects = resolver.mandatory_data_objects("XCBR").unwrap();
        assert_eq!(names(&objects), vec!["Pos", "BlkOpn", "Beh"]);
    }

    #[test]
    fn test_base_cycle_fails_fast() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        match resolver.ln_class_chain("LOOP") {
            Err(Error::BaseCycle(path)) => assert_eq!(path, "LOOP -> LOOP2 -> LOOP"),
            other => panic!("expected a base cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_base_chain_limit() {
        let nsd = NsdStore::with_locations(
            NsdLocations::inline(NSD_7_4, NSD_7_3, NSD_8_1),
            Limits {
                max_base_chain: 1,
                ..Limits::default()
            },
        );
        let templates = templates();
        let resolver = TemplateResolver::new(&nsd, &templates);
        assert!(matches!(
            resolver.ln_class_chain("XCBR"),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_structure_expansion() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let attributes = resolver.mandatory_data_attributes("DPC", "origin").unwrap();
        assert_eq!(names(&attributes), vec!["orCat"]);
        assert!(resolver.mandatory_data_attributes("DPC", "stVal").unwrap().is_empty());
        assert!(resolver.mandatory_data_attributes("SPS", "origin").unwrap().is_empty());
    }

    #[test]
    fn test_da_type_children() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let origin = resolver
            .mandatory_children_of_da_type(type_with_id(&templates, "Orig_T"))
            .unwrap();
        assert_eq!(names(&origin), vec!["orCat"]);

        let oper = resolver
            .mandatory_children_of_da_type(type_with_id(&templates, "Oper_T"))
            .unwrap();
        assert_eq!(names(&oper), vec!["ctlVal", "Test"]);

        assert!(resolver
            .mandatory_children_of_da_type(type_with_id(&templates, "Unused_T"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_do_type_children_follow_ctl_model() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let children = resolver
            .mandatory_children_of_do_type(type_with_id(&templates, "DPC_T"), "DPC")
            .unwrap();
        assert_eq!(names(&children), vec!["stVal", "q", "Oper", "SBOw", "Cancel"]);

        let status_only = Element::new("DOType").with_attribute("cdc", "DPC");
        let children = resolver.mandatory_children_of_do_type(&status_only, "DPC").unwrap();
        assert_eq!(names(&children), vec!["stVal", "q"]);
    }

    #[test]
    fn test_control_presence_conditions() {
        assert!(control_presence_conditions(None).is_empty());
        assert!(control_presence_conditions(Some("status-only")).is_empty());
        assert_eq!(control_presence_conditions(Some("direct-with-normal-security")).len(), 1);
        assert_eq!(
            control_presence_conditions(Some("sbo-with-normal-security")),
            &["MOctrl", "MOsbo", "MOsboNormal"]
        );
    }

    #[test]
    fn test_resolve_nsd_data_object() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);

        let object = resolver
            .resolve_nsd_data_object(type_with_id(&templates, "DPC_T"))
            .unwrap()
            .unwrap();
        assert_eq!(object.attribute_or_empty("type"), "DPC");
        assert!(resolver
            .resolve_nsd_data_object(type_with_id(&templates, "Orig_T"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_type() {
        let (nsd, templates) = (store(), templates());
        let resolver = TemplateResolver::new(&nsd, &templates);
        assert_eq!(resolver.find_type("CtlModels").unwrap().local_name(), "EnumType");
        assert!(resolver.find_type("XCBR_T").is_none());
    }
}
