use std::fmt;

use super::StoreError;

/// Slash-separated path with an odd number of segments, e.g. `classrooms/abc/schedules`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CollectionPath(String);

/// Slash-separated path with an even number of segments, e.g. `classrooms/abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct DocumentPath(String);

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let valid = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment.len() <= 256
        && !segment.chars().any(|ch| ch == '/' || ch.is_control());
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(segment.to_string()))
    }
}

fn validate_path(raw: &str, expect_even: bool) -> Result<(), StoreError> {
    let mut count = 0usize;
    for segment in raw.split('/') {
        validate_segment(segment).map_err(|_| StoreError::InvalidPath(raw.to_string()))?;
        count += 1;
    }
    if (count % 2 == 0) == expect_even {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(raw.to_string()))
    }
}

fn depth_of(raw: &str) -> usize {
    raw.split('/').count()
}

impl CollectionPath {
    pub(crate) fn root(name: &str) -> Result<Self, StoreError> {
        validate_segment(name)?;
        Ok(Self(name.to_string()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, StoreError> {
        validate_path(raw, false)?;
        Ok(Self(raw.to_string()))
    }

    pub(crate) fn doc(&self, id: &str) -> Result<DocumentPath, StoreError> {
        validate_segment(id)?;
        Ok(DocumentPath(format!("{}/{id}", self.0)))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn depth(&self) -> usize {
        depth_of(&self.0)
    }

    pub(crate) fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub(crate) fn parent(&self) -> Option<DocumentPath> {
        self.0.rsplit_once('/').map(|(parent, _)| DocumentPath(parent.to_string()))
    }
}

impl DocumentPath {
    pub(crate) fn parse(raw: &str) -> Result<Self, StoreError> {
        validate_path(raw, true)?;
        Ok(Self(raw.to_string()))
    }

    pub(crate) fn collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        validate_segment(name)?;
        Ok(CollectionPath(format!("{}/{name}", self.0)))
    }

    pub(crate) fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub(crate) fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(self.0.clone()),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn depth(&self) -> usize {
        depth_of(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
