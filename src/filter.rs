//! Include/exclude episode-name filters of a category

use crate::error::Result;
use crate::types::CategoryNode;
use regex::{Regex, RegexBuilder};

/// Compiled include/exclude patterns
///
/// Patterns are case-insensitive and match anywhere in the episode name.
/// An empty include list accepts everything; any exclude match rejects.
#[derive(Clone, Debug, Default)]
pub struct EpisodeFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl EpisodeFilter {
    /// Compile include and exclude pattern lists
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Filter configured on a category node
    pub fn for_category(node: &CategoryNode) -> Result<Self> {
        Self::new(&node.include, &node.exclude)
    }

    /// Whether an episode name passes the filter
    pub fn accepts(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(name));
        included && !self.exclude.iter().any(|re| re.is_match(name))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| Ok(RegexBuilder::new(p).case_insensitive(true).build()?))
        .collect()
}
