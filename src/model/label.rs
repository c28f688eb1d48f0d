/// Ordered mapping from 1-indexed integer type ids to string labels.
///
/// Insertion order is preserved and defines the order of [`types`](Self::types)
/// and [`typeids`](Self::typeids). Re-inserting an existing id replaces its
/// label without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<(i64, String)>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label for `typeid`, returning the label it replaced.
    pub fn insert(&mut self, typeid: i64, label: impl Into<String>) -> Option<String> {
        let label = label.into();
        match self.entries.iter_mut().find(|(id, _)| *id == typeid) {
            Some((_, slot)) => Some(std::mem::replace(slot, label)),
            None => {
                self.entries.push((typeid, label));
                None
            }
        }
    }

    pub fn get(&self, typeid: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(id, _)| *id == typeid)
            .map(|(_, label)| label.as_str())
    }

    pub fn remove(&mut self, typeid: i64) -> Option<String> {
        let pos = self.entries.iter().position(|(id, _)| *id == typeid)?;
        Some(self.entries.remove(pos).1)
    }

    #[inline]
    pub fn contains(&self, typeid: i64) -> bool {
        self.entries.iter().any(|(id, _)| *id == typeid)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.entries.iter().map(|(id, label)| (*id, label.as_str()))
    }

    pub fn types(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, label)| label.as_str()).collect()
    }

    pub fn typeids(&self) -> Vec<i64> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Reverse lookup; the first id carrying `label` wins.
    pub fn id_of(&self, label: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(_, l)| l == label)
            .map(|(id, _)| *id)
    }
}

impl<S: Into<String>> FromIterator<(i64, S)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (i64, S)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (typeid, label) in iter {
            map.insert(typeid, label);
        }
        map
    }
}

impl<S: Into<String>> Extend<(i64, S)> for LabelMap {
    fn extend<I: IntoIterator<Item = (i64, S)>>(&mut self, iter: I) {
        for (typeid, label) in iter {
            self.insert(typeid, label);
        }
    }
}
