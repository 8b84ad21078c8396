use rustc_hash::FxHashMap;

use crate::error::SetupError;

/// Workbook name ↔ collaborator index, in registration order.
///
/// Names are compared exactly: no case folding, trimming or unicode
/// normalization.
#[derive(Default, Debug, Clone)]
pub struct WorkbookRegistry {
    index_by_name: FxHashMap<String, usize>,
    name_by_index: Vec<String>,
}

impl WorkbookRegistry {
    pub fn new() -> Self {
        WorkbookRegistry::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        WorkbookRegistry {
            index_by_name: FxHashMap::with_capacity_and_hasher(n, Default::default()),
            name_by_index: Vec::with_capacity(n),
        }
    }

    pub fn try_register(&mut self, name: &str) -> Result<usize, SetupError> {
        if self.index_by_name.contains_key(name) {
            return Err(SetupError::DuplicateWorkbookName {
                name: name.to_string(),
            });
        }

        let index = self.name_by_index.len();
        self.name_by_index.push(name.to_string());
        self.index_by_name.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.name_by_index.get(index).map(String::as_str)
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.name_by_index
    }

    pub fn len(&self) -> usize {
        self.name_by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_by_index.is_empty()
    }
}
