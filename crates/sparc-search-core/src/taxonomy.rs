//! MIME taxonomy: content type → file category.
//!
//! Every file object in an index document carries a declared MIME type (and
//! sometimes an "additional" override type). The taxonomy maps those raw
//! strings onto a fixed set of [`CategoryTag`]s the front-end knows how to
//! render.
//!
//! The mapping is not uniform across dataset schema versions: later curation
//! pipelines introduced scaffold views, Biolucida images and video, and fixed
//! several annotations that older datasets still carry. Each schema version
//! therefore owns its own [`MimeTable`], and the tables below are written out
//! in full rather than derived from one another so that a change to a newer
//! table can never alter an older version's results.
//!
//! Content types that are known but deliberately ignored live in a single
//! skip list shared by all versions. The [`Taxonomy`] also carries the
//! derivative path convention and the historical path rename table.

use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Semantic file category.
///
/// [`NotSpecified`](CategoryTag::NotSpecified) and [`Skip`](CategoryTag::Skip)
/// are sentinels: objects resolved to either never land in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryTag {
    CommonImages,
    TiffImage,
    ScaffoldDir,
    ScaffoldMetadataFile,
    ScaffoldViewFile,
    ScaffoldThumbnail,
    ContextFile,
    PlotFile,
    SegmentationFile,
    ThumbnailImage,
    Video,
    Biolucida2d,
    Biolucida3d,
    FeModel,
    NotSpecified,
    Skip,
}

impl CategoryTag {
    /// Every tag, sentinels last.
    pub const ALL: [CategoryTag; 16] = [
        CategoryTag::CommonImages,
        CategoryTag::TiffImage,
        CategoryTag::ScaffoldDir,
        CategoryTag::ScaffoldMetadataFile,
        CategoryTag::ScaffoldViewFile,
        CategoryTag::ScaffoldThumbnail,
        CategoryTag::ContextFile,
        CategoryTag::PlotFile,
        CategoryTag::SegmentationFile,
        CategoryTag::ThumbnailImage,
        CategoryTag::Video,
        CategoryTag::Biolucida2d,
        CategoryTag::Biolucida3d,
        CategoryTag::FeModel,
        CategoryTag::NotSpecified,
        CategoryTag::Skip,
    ];

    /// Output key used for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryTag::CommonImages => "common-images",
            CategoryTag::TiffImage => "tiff-image",
            CategoryTag::ScaffoldDir => "abi-scaffold-dir",
            CategoryTag::ScaffoldMetadataFile => "abi-scaffold-metadata-file",
            CategoryTag::ScaffoldViewFile => "abi-scaffold-view-file",
            CategoryTag::ScaffoldThumbnail => "abi-scaffold-thumbnail",
            CategoryTag::ContextFile => "abi-context-file",
            CategoryTag::PlotFile => "abi-plot",
            CategoryTag::SegmentationFile => "mbf-segmentation",
            CategoryTag::ThumbnailImage => "abi-thumbnail",
            CategoryTag::Video => "video",
            CategoryTag::Biolucida2d => "biolucida-2d",
            CategoryTag::Biolucida3d => "biolucida-3d",
            CategoryTag::FeModel => "fe-model",
            CategoryTag::NotSpecified => "not-specified",
            CategoryTag::Skip => "skip",
        }
    }

    /// True for `not-specified` and `skip`.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, CategoryTag::NotSpecified | CategoryTag::Skip)
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or(())
    }
}

impl Serialize for CategoryTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Normalize a MIME string for lookup: trimmed, ASCII lowercase.
pub fn normalize_mime(mime: &str) -> String {
    mime.trim().to_ascii_lowercase()
}

/// One schema version's MIME type → category mapping.
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    entries: HashMap<String, CategoryTag>,
}

impl MimeTable {
    pub fn from_entries(entries: &[(&str, CategoryTag)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(mime, tag)| (normalize_mime(mime), *tag))
                .collect(),
        }
    }

    /// Look up a MIME type. Matching is case-insensitive and ignores
    /// surrounding whitespace.
    pub fn lookup(&self, mime: &str) -> Option<CategoryTag> {
        self.entries.get(&normalize_mime(mime)).copied()
    }

    /// Distinct tags this table can produce, `Skip` included.
    pub fn tags(&self) -> impl Iterator<Item = CategoryTag> + '_ {
        CategoryTag::ALL
            .into_iter()
            .filter(move |tag| self.entries.values().any(|t| t == tag))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Historical dataset-relative path renames.
///
/// Some files were renamed at publish time while their index entries kept
/// the old path. Entries map the indexed path to the current one.
#[derive(Debug, Clone, Default)]
pub struct PathRenames {
    renames: HashMap<String, String>,
}

impl PathRenames {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            renames: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Current path for `path`, if it was renamed.
    pub fn current(&self, path: &str) -> Option<&str> {
        self.renames.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

/// Dataset path prefix marking generated artifacts.
pub const DERIVATIVE_PREFIX: &str = "derivative/";

/// Shared, version-independent classification configuration.
///
/// Built once at startup and passed by reference; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    skipped: HashSet<String>,
    derivative_prefix: String,
    renames: PathRenames,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Taxonomy {
    /// The deployed skip list and derivative convention, with no renames.
    ///
    /// Renames are deployment data: the rename table in use comes from
    /// `[classifier.path_renames]` in the config file and is installed with
    /// [`with_renames`](Self::with_renames).
    pub fn builtin() -> Self {
        Self {
            skipped: SKIPPED_MIME_TYPES.iter().map(|m| normalize_mime(m)).collect(),
            derivative_prefix: DERIVATIVE_PREFIX.to_string(),
            renames: PathRenames::default(),
        }
    }

    /// Replace the path rename table.
    pub fn with_renames(mut self, renames: PathRenames) -> Self {
        self.renames = renames;
        self
    }

    pub fn is_skipped(&self, mime: &str) -> bool {
        self.skipped.contains(&normalize_mime(mime))
    }

    /// Whether a dataset-relative path points into the derivative tree.
    ///
    /// A leading `/` is ignored and the prefix match is case-insensitive.
    pub fn is_derivative_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        path.len() >= self.derivative_prefix.len()
            && path.is_char_boundary(self.derivative_prefix.len())
            && path[..self.derivative_prefix.len()].eq_ignore_ascii_case(&self.derivative_prefix)
    }

    pub fn renames(&self) -> &PathRenames {
        &self.renames
    }
}

/// Content types that are never classified, in any schema version.
pub const SKIPPED_MIME_TYPES: &[&str] = &[
    "inode/directory",
    "application/x-directory",
    "inode/x-empty",
    "application/octet-stream",
    "application/zip",
    "application/x-tar",
    "application/gzip",
    "application/x-sh",
    "text/x-python",
    "text/x-matlab",
    "application/x-matlab-data",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

use CategoryTag::*;

/// Oldest curated datasets. Scaffold and thumbnail annotations here predate
/// the scaffold view and thumbnail conventions and are kept as observed.
const MIME_V1_1_2: &[(&str, CategoryTag)] = &[
    ("image/png", CommonImages),
    ("image/jpeg", CommonImages),
    ("image/tiff", TiffImage),
    ("image/tif", TiffImage),
    ("inode/vnd.abi.scaffold+directory", ScaffoldDir),
    ("inode/vnd.abi.scaffold+file", ScaffoldMetadataFile),
    ("inode/vnd.abi.scaffold+thumbnail", ThumbnailImage),
    ("application/x.vnd.abi.scaffold.meta+json", ScaffoldMetadataFile),
    ("image/x.vnd.abi.thumbnail+jpeg", ThumbnailImage),
    ("text/vnd.abi.plot+tab-separated-values", PlotFile),
    ("text/vnd.abi.plot+csv", PlotFile),
    ("application/vnd.mbfbioscience.metadata+xml", SegmentationFile),
    ("application/vnd.mbfbioscience.neurolucida+xml", SegmentationFile),
];

const MIME_V1_1_3: &[(&str, CategoryTag)] = &[
    ("image/png", CommonImages),
    ("image/jpeg", CommonImages),
    ("image/tiff", TiffImage),
    ("image/tif", TiffImage),
    ("inode/vnd.abi.scaffold+directory", ScaffoldDir),
    ("inode/vnd.abi.scaffold+file", ScaffoldMetadataFile),
    ("inode/vnd.abi.scaffold+thumbnail", ThumbnailImage),
    ("application/x.vnd.abi.scaffold.meta+json", ScaffoldMetadataFile),
    ("application/x.vnd.abi.scaffold.view+json", ScaffoldViewFile),
    ("image/x.vnd.abi.thumbnail+jpeg", ThumbnailImage),
    ("text/vnd.abi.plot+tab-separated-values", PlotFile),
    ("text/vnd.abi.plot+csv", PlotFile),
    ("application/vnd.mbfbioscience.metadata+xml", SegmentationFile),
    ("application/vnd.mbfbioscience.neurolucida+xml", SegmentationFile),
    ("image/jp2", Biolucida2d),
    ("image/vnd.ome.xml+jp2", Biolucida2d),
    ("image/jpx", Biolucida3d),
    ("image/vnd.ome.xml+jpx", Biolucida3d),
    ("video/mp4", Video),
];

const MIME_V1_1_4: &[(&str, CategoryTag)] = &[
    ("image/png", CommonImages),
    ("image/jpeg", CommonImages),
    ("image/tiff", TiffImage),
    ("image/tif", TiffImage),
    ("inode/vnd.abi.scaffold+directory", ScaffoldDir),
    ("inode/vnd.abi.scaffold+file", ScaffoldMetadataFile),
    ("inode/vnd.abi.scaffold+thumbnail", ThumbnailImage),
    ("inode/vnd.abi.scaffold.view+file", ScaffoldViewFile),
    ("inode/vnd.abi.scaffold.thumbnail+file", ScaffoldThumbnail),
    ("application/x.vnd.abi.scaffold.meta+json", ScaffoldMetadataFile),
    ("application/x.vnd.abi.scaffold.view+json", ScaffoldViewFile),
    ("application/x.vnd.abi.context-information+json", ContextFile),
    ("image/x.vnd.abi.thumbnail+jpeg", ThumbnailImage),
    ("text/vnd.abi.plot+tab-separated-values", PlotFile),
    ("text/vnd.abi.plot+csv", PlotFile),
    ("application/vnd.mbfbioscience.metadata+xml", SegmentationFile),
    ("application/vnd.mbfbioscience.neurolucida+xml", SegmentationFile),
    ("image/jp2", Biolucida2d),
    ("image/vnd.ome.xml+jp2", Biolucida2d),
    ("image/jpx", Biolucida3d),
    ("image/vnd.ome.xml+jpx", Biolucida3d),
    ("video/mp4", Video),
];

/// Scaffold thumbnails are no longer reported as generic thumbnails, and
/// the legacy scaffold file annotation no longer counts as metadata.
const MIME_V1_1_5: &[(&str, CategoryTag)] = &[
    ("image/png", CommonImages),
    ("image/jpeg", CommonImages),
    ("image/tiff", TiffImage),
    ("image/tif", TiffImage),
    ("inode/vnd.abi.scaffold+directory", ScaffoldDir),
    ("inode/vnd.abi.scaffold+file", Skip),
    ("inode/vnd.abi.scaffold+thumbnail", ScaffoldThumbnail),
    ("inode/vnd.abi.scaffold.view+file", ScaffoldViewFile),
    ("inode/vnd.abi.scaffold.thumbnail+file", ScaffoldThumbnail),
    ("application/x.vnd.abi.scaffold.meta+json", ScaffoldMetadataFile),
    ("application/x.vnd.abi.scaffold.view+json", ScaffoldViewFile),
    ("application/x.vnd.abi.context-information+json", ContextFile),
    ("application/x.vnd.abi.fe-model+json", FeModel),
    ("image/x.vnd.abi.thumbnail+jpeg", ThumbnailImage),
    ("text/vnd.abi.plot+tab-separated-values", PlotFile),
    ("text/vnd.abi.plot+csv", PlotFile),
    ("application/vnd.mbfbioscience.metadata+xml", SegmentationFile),
    ("application/vnd.mbfbioscience.neurolucida+xml", SegmentationFile),
    ("image/jp2", Biolucida2d),
    ("image/vnd.ome.xml+jp2", Biolucida2d),
    ("image/jpx", Biolucida3d),
    ("image/vnd.ome.xml+jpx", Biolucida3d),
    ("video/mp4", Video),
];

const MIME_V1_2: &[(&str, CategoryTag)] = &[
    ("image/png", CommonImages),
    ("image/jpeg", CommonImages),
    ("image/gif", CommonImages),
    ("image/tiff", TiffImage),
    ("image/tif", TiffImage),
    ("inode/vnd.abi.scaffold+directory", ScaffoldDir),
    ("inode/vnd.abi.scaffold+file", Skip),
    ("inode/vnd.abi.scaffold+thumbnail", ScaffoldThumbnail),
    ("inode/vnd.abi.scaffold.view+file", ScaffoldViewFile),
    ("inode/vnd.abi.scaffold.thumbnail+file", ScaffoldThumbnail),
    ("application/x.vnd.abi.scaffold.meta+json", ScaffoldMetadataFile),
    ("application/x.vnd.abi.scaffold.view+json", ScaffoldViewFile),
    ("application/x.vnd.abi.context-information+json", ContextFile),
    ("application/x.vnd.abi.fe-model+json", FeModel),
    ("image/x.vnd.abi.thumbnail+jpeg", ThumbnailImage),
    ("image/x.vnd.abi.thumbnail+png", ThumbnailImage),
    ("text/vnd.abi.plot+tab-separated-values", PlotFile),
    ("text/vnd.abi.plot+csv", PlotFile),
    ("application/vnd.mbfbioscience.metadata+xml", SegmentationFile),
    ("application/vnd.mbfbioscience.neurolucida+xml", SegmentationFile),
    ("image/jp2", Biolucida2d),
    ("image/vnd.ome.xml+jp2", Biolucida2d),
    ("image/jpx", Biolucida3d),
    ("image/vnd.ome.xml+jpx", Biolucida3d),
    ("video/mp4", Video),
    ("video/quicktime", Video),
];

pub fn mime_table_v1_1_2() -> MimeTable {
    MimeTable::from_entries(MIME_V1_1_2)
}

pub fn mime_table_v1_1_3() -> MimeTable {
    MimeTable::from_entries(MIME_V1_1_3)
}

pub fn mime_table_v1_1_4() -> MimeTable {
    MimeTable::from_entries(MIME_V1_1_4)
}

pub fn mime_table_v1_1_5() -> MimeTable {
    MimeTable::from_entries(MIME_V1_1_5)
}

pub fn mime_table_v1_2() -> MimeTable {
    MimeTable::from_entries(MIME_V1_2)
}
