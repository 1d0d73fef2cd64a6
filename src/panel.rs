//! Validation panel
//!
//! The state behind the two result lists of the editor: one for schema
//! validation, one for template validation. Each trigger starts a new run on
//! its own list; results of a run that has since been superseded are dropped.

use std::sync::Arc;

use tracing::{debug, info};

use crate::dispatch::SchemaValidationDispatcher;
use crate::documents::SclDocument;
use crate::error::Result;
use crate::issues::{Issue, IssueList};
use crate::nsd::NsdStore;
use crate::schemas::SchemaVariant;
use crate::validators::templates::validate_templates;

/// A document, its display name and the two issue lists
#[derive(Debug, Clone)]
pub struct ValidationPanel {
    doc: Arc<SclDocument>,
    doc_name: String,
    schema_issues: IssueList,
    template_issues: IssueList,
    dispatcher: Arc<SchemaValidationDispatcher>,
    nsd: Arc<NsdStore>,
    schema_variant: Option<SchemaVariant>,
}

impl ValidationPanel {
    /// Panel backed by the process-wide dispatcher and NSD store
    pub fn new(doc: SclDocument, doc_name: impl Into<String>) -> Self {
        Self {
            doc: Arc::new(doc),
            doc_name: doc_name.into(),
            schema_issues: IssueList::new(),
            template_issues: IssueList::new(),
            dispatcher: SchemaValidationDispatcher::global(),
            nsd: NsdStore::global(),
            schema_variant: None,
        }
    }

    /// Use a specific dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<SchemaValidationDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Use a specific NSD store
    pub fn with_nsd_store(mut self, nsd: Arc<NsdStore>) -> Self {
        self.nsd = nsd;
        self
    }

    /// Validate against `variant` instead of the declared version
    pub fn with_schema_variant(mut self, variant: SchemaVariant) -> Self {
        self.schema_variant = Some(variant);
        self
    }

    /// Replace the document; existing issues are kept until the next run
    pub fn set_document(&mut self, doc: SclDocument, doc_name: impl Into<String>) {
        self.doc = Arc::new(doc);
        self.doc_name = doc_name.into();
    }

    /// Display name of the document
    pub fn doc_name(&self) -> &str {
        &self.doc_name
    }

    /// Schema issues of the latest run
    pub fn schema_issues(&self) -> &IssueList {
        &self.schema_issues
    }

    /// Template issues of the latest run
    pub fn template_issues(&self) -> &IssueList {
        &self.template_issues
    }

    /// Run schema validation; the list is filled at once when the run ends
    ///
    /// On error the list stays empty.
    pub fn validate_schema(&self) -> Result<Vec<Issue>> {
        let token = self.schema_issues.start_run();
        let issues = match self.schema_variant {
            Some(variant) => self
                .dispatcher
                .validate_with_variant(&self.doc, &self.doc_name, variant)?,
            None => self.dispatcher.validate_schema(&self.doc, &self.doc_name)?,
        };

        if self.schema_issues.extend(token, issues.iter().cloned()) {
            info!(document = %self.doc_name, issues = issues.len(), "schema validation finished");
        }
        Ok(issues)
    }

    /// Run template validation, calling `on_batch` for each non-empty batch
    ///
    /// Stops early, returning the issues appended so far, once a newer run
    /// has started on the same list.
    pub fn validate_templates_with(&self, mut on_batch: impl FnMut(&[Issue])) -> Result<usize> {
        let token = self.template_issues.start_run();
        let mut total = 0;

        for batch in validate_templates(&self.nsd, &self.doc) {
            let batch = batch?;
            if batch.is_empty() {
                continue;
            }
            if !self.template_issues.extend(token, batch.iter().cloned()) {
                debug!(document = %self.doc_name, "template run superseded");
                break;
            }
            total += batch.len();
            on_batch(&batch);
        }

        info!(document = %self.doc_name, issues = total, "template validation finished");
        Ok(total)
    }

    /// Run template validation and return the resulting list
    pub fn validate_templates(&self) -> Result<Vec<Issue>> {
        self.validate_templates_with(|_| {})?;
        Ok(self.template_issues.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NsdLocations, ValidationConfig};
    use crate::dispatch::SCHEMA_VALID_TITLE;
    use crate::limits::Limits;
    use pretty_assertions::assert_eq;

    const NSD_7_4: &str = r#"<NS><LNClasses>
        <LNClass name="XCBR"><DataObject name="Pos" type="DPC" presCond="M"/></LNClass>
    </LNClasses></NS>"#;

    const PROJECT: &str = r#"<SCL xmlns="http://www.iec.ch/61850/2003/SCL">
  <Header id="project"/>
  <DataTypeTemplates>
    <LNodeType id="XCBR_T" lnClass="XCBR"/>
    <LNodeType id="Broken_T"/>
    <EnumType id="Beh"><EnumVal ord="1">on</EnumVal></EnumType>
  </DataTypeTemplates>
</SCL>"#;

    fn panel() -> ValidationPanel {
        let nsd = NsdStore::with_locations(
            NsdLocations::inline(NSD_7_4, "<NS/>", "<ServiceNS/>"),
            Limits::default(),
        );
        ValidationPanel::new(SclDocument::from_string(PROJECT).unwrap(), "project.scd")
            .with_dispatcher(Arc::new(SchemaValidationDispatcher::new(&ValidationConfig::default())))
            .with_nsd_store(Arc::new(nsd))
    }

    #[test]
    fn test_schema_run_fills_list() {
        // LNodeType without DO children or lnClass is schema invalid too
        let panel = panel();
        let issues = panel.validate_schema().unwrap();
        assert!(issues
            .iter()
            .any(|i| i.title == "The attribute 'lnClass' is required but missing."));
        assert!(issues.iter().all(|i| i.title != SCHEMA_VALID_TITLE));
        assert_eq!(panel.schema_issues().snapshot(), issues);
        assert!(panel.template_issues().is_empty());
    }

    #[test]
    fn test_template_batches_arrive_in_order() {
        let panel = panel();
        let mut batches = Vec::new();
        let total = panel
            .validate_templates_with(|batch| batches.push(batch.to_vec()))
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].title, "The LNodeType XCBR is missing mandatory DO Pos");
        assert_eq!(
            batches[1][0].title,
            "The attribute lnClass is required but missing in LNodeType"
        );
    }

    #[test]
    fn test_rerun_replaces_list() {
        let panel = panel();
        let first = panel.validate_templates().unwrap();
        let second = panel.validate_templates().unwrap();
        assert_eq!(first, second);
        assert_eq!(panel.template_issues().len(), 2);
    }

    #[test]
    fn test_superseded_run_stops() {
        let panel = panel();
        let list = panel.template_issues().clone();
        let total = panel
            .validate_templates_with(|_| {
                // A newer run starts while this one is still walking
                list.start_run();
            })
            .unwrap();

        assert_eq!(total, 1);
        assert!(panel.template_issues().is_empty());
    }

    #[test]
    fn test_lists_are_independent() {
        let panel = panel();
        panel.validate_templates().unwrap();
        let schema = panel.validate_schema().unwrap();
        assert_eq!(panel.template_issues().len(), 2);
        assert_eq!(panel.schema_issues().len(), schema.len());
    }
}
