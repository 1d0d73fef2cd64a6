//! NSD reference documents
//!
//! The 7-4, 7-3 and 8-1 NSD files are read at most once per [`NsdStore`] and
//! shared read-only afterwards. A load that fails is not remembered; the next
//! access reads the file again.

pub mod resolver;

use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use tracing::debug;

use crate::config::{NsdLocations, ValidationConfig};
use crate::documents::{Document, Element};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;

pub use resolver::TemplateResolver;

static GLOBAL: Lazy<Mutex<Option<Arc<NsdStore>>>> = Lazy::new(|| Mutex::new(None));

/// Lazily loaded NSD documents
#[derive(Debug)]
pub struct NsdStore {
    locations: NsdLocations,
    loader: Loader,
    limits: Limits,
    part_7_4: OnceCell<Document>,
    part_7_3: OnceCell<Document>,
    part_8_1: OnceCell<Document>,
}

impl NsdStore {
    /// Store reading the endpoints under `config.nsd_root`
    pub fn new(config: &ValidationConfig) -> Self {
        Self::with_locations(config.nsd_locations(), config.limits.clone())
    }

    /// Store reading explicit locations
    pub fn with_locations(locations: NsdLocations, limits: Limits) -> Self {
        Self {
            locations,
            loader: Loader::new().with_limits(limits.clone()),
            limits,
            part_7_4: OnceCell::new(),
            part_7_3: OnceCell::new(),
            part_8_1: OnceCell::new(),
        }
    }

    /// The process-wide store, created with defaults on first use
    pub fn global() -> Arc<Self> {
        let mut global = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        global
            .get_or_insert_with(|| Arc::new(Self::new(&ValidationConfig::default())))
            .clone()
    }

    /// Replace the process-wide store
    pub fn install_global(config: &ValidationConfig) -> Arc<Self> {
        let store = Arc::new(Self::new(config));
        *GLOBAL.lock().unwrap_or_else(PoisonError::into_inner) = Some(store.clone());
        store
    }

    /// Drop the process-wide store and its cached documents
    pub fn reset_global() {
        GLOBAL.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Limits applied to loading and to base chains
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Root of the 7-4 document (logical node classes)
    pub fn part_7_4(&self) -> Result<&Element> {
        self.root(&self.part_7_4, &self.locations.part_7_4, "7-4")
    }

    /// Root of the 7-3 document (common data classes)
    pub fn part_7_3(&self) -> Result<&Element> {
        self.root(&self.part_7_3, &self.locations.part_7_3, "7-3")
    }

    /// Root of the 8-1 document (service data classes)
    pub fn part_8_1(&self) -> Result<&Element> {
        self.root(&self.part_8_1, &self.locations.part_8_1, "8-1")
    }

    fn root<'s>(
        &'s self,
        cell: &'s OnceCell<Document>,
        location: &Location,
        part: &str,
    ) -> Result<&'s Element> {
        let document = cell.get_or_try_init(|| {
            debug!(part, location = %location.as_str(), "loading NSD document");
            self.loader.load_document(location)
        })?;
        document
            .root()
            .ok_or_else(|| Error::Resource(format!("NSD {} document has no root element", part)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NSD_7_4: &str = r#"<NS><LNClasses><LNClass name="XCBR"/></LNClasses></NS>"#;

    #[test]
    fn test_inline_documents() {
        let store = NsdStore::with_locations(
            NsdLocations::inline(NSD_7_4, "<NS/>", "<ServiceNS/>"),
            Limits::default(),
        );
        assert_eq!(store.part_7_4().unwrap().local_name(), "NS");
        assert_eq!(store.part_8_1().unwrap().local_name(), "ServiceNS");
    }

    #[test]
    fn test_documents_read_from_nsd_root() {
        let dir = TempDir::new().unwrap();
        let xml = dir.path().join("public/xml");
        fs::create_dir_all(&xml).unwrap();
        fs::write(xml.join("IEC_61850-7-4_2007B3.nsd"), NSD_7_4).unwrap();

        let store = NsdStore::new(&ValidationConfig::new().with_nsd_root(dir.path()));
        let root = store.part_7_4().unwrap();
        assert_eq!(root.descendants_named("LNClass").count(), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let dir = TempDir::new().unwrap();
        let store = NsdStore::new(&ValidationConfig::new().with_nsd_root(dir.path()));
        assert!(store.part_7_3().is_err());

        let xml = dir.path().join("public/xml");
        fs::create_dir_all(&xml).unwrap();
        fs::write(xml.join("IEC_61850-7-3_2007B3.nsd"), "<NS/>").unwrap();
        assert!(store.part_7_3().is_ok());
    }

    #[test]
    fn test_loaded_document_is_kept() {
        let dir = TempDir::new().unwrap();
        let xml = dir.path().join("public/xml");
        fs::create_dir_all(&xml).unwrap();
        let path = xml.join("IEC_61850-8-1_2003A2.nsd");
        fs::write(&path, "<ServiceNS/>").unwrap();

        let store = NsdStore::new(&ValidationConfig::new().with_nsd_root(dir.path()));
        store.part_8_1().unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(store.part_8_1().unwrap().local_name(), "ServiceNS");
    }
}
