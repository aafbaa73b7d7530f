//! Core types for episode-grab

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Reference to the category an episode belongs to
///
/// Identity is `(channel, id)`. The display name, extension and download
/// parameters travel with the reference but do not take part in equality,
/// so an episode rebuilt from persisted state matches the one found by a search.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategoryRef {
    /// Name of the provider plugin (channel) owning the category
    pub channel: String,
    /// Provider-specific category identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// File extension of downloaded episodes
    #[serde(default)]
    pub extension: String,
    /// Extra parameters handed to the downloader
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl CategoryRef {
    /// Create a category reference
    pub fn new(channel: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            name: name.into(),
            extension: String::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Set the extension of downloaded files
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl PartialEq for CategoryRef {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel && self.id == other.id
    }
}

impl Eq for CategoryRef {}

impl Hash for CategoryRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channel.hash(state);
        self.id.hash(state);
    }
}

/// Episode key: `(category, display name, source id)`
///
/// This is the deduplication and retry-accounting key everywhere in the core.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Episode {
    /// Category the episode was found in
    pub category: CategoryRef,
    /// Display name
    pub name: String,
    /// Source-specific identifier (usually the media URL)
    pub id: String,
}

impl Episode {
    /// Create an episode key
    pub fn new(category: CategoryRef, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.category.channel, self.category.name, self.name
        )
    }
}

/// Node of a provider's category tree
///
/// Built fresh by provider plugins on every search. Leaves are `downloadable`,
/// containers group other nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Name of the provider plugin owning this node
    pub channel: String,
    /// Provider-specific identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Extension of downloaded files
    #[serde(default)]
    pub extension: String,
    /// Whether the operator wants this category grabbed
    #[serde(default)]
    pub selected: bool,
    /// Whether episodes can be listed from this node
    #[serde(default)]
    pub downloadable: bool,
    /// Episode-name include patterns (empty = everything)
    #[serde(default)]
    pub include: Vec<String>,
    /// Episode-name exclude patterns
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Extra parameters handed to the downloader
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Child categories
    #[serde(default)]
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Create an unselected container node
    pub fn new(channel: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Mark the node as a downloadable leaf
    pub fn downloadable(mut self) -> Self {
        self.downloadable = true;
        self
    }

    /// Mark the node as selected for grabbing
    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    /// Append a child node
    pub fn with_child(mut self, child: CategoryNode) -> Self {
        self.children.push(child);
        self
    }

    /// Reference used in episode keys
    pub fn category_ref(&self) -> CategoryRef {
        CategoryRef {
            channel: self.channel.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            extension: self.extension.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Whether this node or any descendant is selected
    pub fn has_selection(&self) -> bool {
        self.selected || self.children.iter().any(CategoryNode::has_selection)
    }

    /// Drop every branch with nothing selected in it
    ///
    /// Returns `None` when the whole node is unselected.
    pub fn prune_unselected(mut self) -> Option<Self> {
        if !self.has_selection() {
            return None;
        }
        self.children = std::mem::take(&mut self.children)
            .into_iter()
            .filter_map(CategoryNode::prune_unselected)
            .collect();
        Some(self)
    }

    /// Selected downloadable nodes of this subtree, depth-first
    pub fn grabbable(&self) -> Vec<&CategoryNode> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.selected && node.downloadable {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }
}

/// Persisted marker: "episode X has export step N in flight"
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeExportState {
    /// The episode whose export chain is running
    pub episode: Episode,
    /// Rank of the export step in flight
    pub step: u32,
}

impl EpisodeExportState {
    /// Create a resume marker
    pub fn new(episode: Episode, step: u32) -> Self {
        Self { episode, step }
    }
}

/// Pipeline stage a task belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Episode search across a provider's selected categories
    Search,
    /// Category tree discovery for a provider
    Category,
    /// Check, download and export of one episode
    Retrieve,
    /// Download of one episode
    Download,
    /// One export step of one episode
    Export,
}

impl TaskKind {
    /// Default worker count of this stage's pools
    pub fn default_pool_size(&self) -> usize {
        match self {
            TaskKind::Download => 3,
            TaskKind::Search | TaskKind::Category | TaskKind::Retrieve | TaskKind::Export => 1,
        }
    }

    /// Stage name, also used as pool category for single-pool stages
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Category => "category",
            TaskKind::Retrieve => "retrieve",
            TaskKind::Download => "download",
            TaskKind::Export => "export",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted while searching, retrieving, downloading and exporting
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A search cycle is starting
    SearchStarting {
        /// Number of provider plugins known
        plugin_count: usize,
    },

    /// A provider's search task started running
    Searching {
        /// Provider name
        plugin: String,
    },

    /// A provider's search finished
    SearchDone {
        /// Provider name
        plugin: String,
    },

    /// A provider's search (or one of its categories) failed
    SearchFailed {
        /// Provider name
        plugin: String,
        /// Error message
        error: String,
    },

    /// Every submitted search task reached a terminal state
    AllSearchDone,

    /// The retrieve backlog drained
    AllRetrieveDone,

    /// Interrupted export chains are being resumed
    ResumeExport {
        /// Number of persisted export steps found
        count: usize,
    },

    /// Category discovery queued for a channel
    CategoriesToBuild {
        /// Provider name
        channel: String,
    },

    /// Category discovery running for a channel
    BuildingCategories {
        /// Provider name
        channel: String,
    },

    /// Category discovery finished for a channel
    CategoriesBuilt {
        /// Provider name
        channel: String,
        /// Number of top-level categories found
        count: usize,
    },

    /// Category discovery failed for a channel
    CategoriesFailed {
        /// Provider name
        channel: String,
        /// Error message
        error: String,
    },

    /// Episode admitted for retrieval
    ToDownload {
        /// Episode key
        episode: Episode,
    },

    /// Episode recorded as already downloaded on a category's first search
    Indexed {
        /// Episode key
        episode: Episode,
    },

    /// Download process started
    DownloadStarting {
        /// Episode key
        episode: Episode,
    },

    /// Download finished and the output file is in place
    Downloaded {
        /// Episode key
        episode: Episode,
    },

    /// Download failed
    DownloadFailed {
        /// Episode key
        episode: Episode,
        /// Error message
        error: String,
    },

    /// Export step admitted
    ToExport {
        /// Episode key
        episode: Episode,
        /// Export name
        export: String,
    },

    /// Export process started
    ExportStarting {
        /// Episode key
        episode: Episode,
        /// Export name
        export: String,
        /// Rank of the step
        rank: u32,
    },

    /// Export step failed; its branch of the export chain stops
    ExportFailed {
        /// Episode key
        episode: Episode,
        /// Export name
        export: String,
        /// Error message
        error: String,
    },

    /// Episode fully downloaded and exported
    Ready {
        /// Episode key
        episode: Episode,
    },

    /// Episode retrieved but some export branches failed
    ExportIncomplete {
        /// Episode key
        episode: Episode,
        /// Number of export steps that failed
        failed_steps: usize,
    },

    /// Retrieval failed (check or download)
    RetrieveFailed {
        /// Episode key
        episode: Episode,
        /// Error message
        error: String,
    },

    /// Work on the episode was stopped
    Stopped {
        /// Episode key
        episode: Episode,
    },

    /// The episode failed too many times and was given up on
    TooManyFailures {
        /// Episode key
        episode: Episode,
        /// Number of failed attempts
        attempts: u32,
    },

    /// A worker crashed outside the task's own failure handling
    PoolFailure {
        /// Pool category
        category: String,
        /// Error message
        error: String,
    },

    /// Shutdown initiated
    Shutdown,
}
