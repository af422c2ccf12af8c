//! Version schema registry.
//!
//! Every index document declares the curation schema it was produced with
//! at `item.version.keyword`. The version selects:
//!
//! - an attribute table: logical attribute name → key path into `_source`,
//! - the pass-through keys: the exact set of fields emitted in output,
//!   including which file categories may surface,
//! - the mandatory paths a document must carry,
//! - the MIME table used by the file classifier.
//!
//! Documents without a version resolve to [`SchemaVersion::Undefined`];
//! documents with a version this registry does not know resolve to
//! [`SchemaVersion::Unknown`]. Both are degraded, read-only schemas that
//! expose identifier, name, DOI and description and never classify files.
//!
//! New versions are added as a new enum variant plus a new table set. The
//! tables of existing versions are not edited, since that would silently
//! change historical results.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::path::path_get;
use crate::taxonomy::{
    mime_table_v1_1_2, mime_table_v1_1_3, mime_table_v1_1_4, mime_table_v1_1_5, mime_table_v1_2,
    MimeTable,
};

/// Location of the version string inside `_source`.
pub const VERSION_PATH: &[&str] = &["item", "version", "keyword"];

/// Schema version of one index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    V1_1_2,
    V1_1_3,
    V1_1_4,
    V1_1_5,
    /// Any `1.2.*` release.
    V1_2,
    /// No version recorded.
    Undefined,
    /// A version this registry does not know.
    Unknown,
}

impl SchemaVersion {
    pub const ALL: [SchemaVersion; 7] = [
        SchemaVersion::V1_1_2,
        SchemaVersion::V1_1_3,
        SchemaVersion::V1_1_4,
        SchemaVersion::V1_1_5,
        SchemaVersion::V1_2,
        SchemaVersion::Undefined,
        SchemaVersion::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1_1_2 => "1.1.2",
            SchemaVersion::V1_1_3 => "1.1.3",
            SchemaVersion::V1_1_4 => "1.1.4",
            SchemaVersion::V1_1_5 => "1.1.5",
            SchemaVersion::V1_2 => "1.2.x",
            SchemaVersion::Undefined => "undefined",
            SchemaVersion::Unknown => "unknown",
        }
    }

    /// Map a declared version string to a schema version.
    pub fn from_declared(declared: &str) -> Self {
        match declared.trim() {
            "1.1.2" => SchemaVersion::V1_1_2,
            "1.1.3" => SchemaVersion::V1_1_3,
            "1.1.4" => SchemaVersion::V1_1_4,
            "1.1.5" => SchemaVersion::V1_1_5,
            v if v == "1.2" || v.starts_with("1.2.") => SchemaVersion::V1_2,
            _ => SchemaVersion::Unknown,
        }
    }

    /// Resolve the version of a document `_source`.
    pub fn resolve(source: &Value) -> Self {
        match path_get(source, VERSION_PATH) {
            None | Some(Value::Null) => SchemaVersion::Undefined,
            Some(Value::String(s)) if s.trim().is_empty() => SchemaVersion::Undefined,
            Some(Value::String(s)) => SchemaVersion::from_declared(s),
            Some(_) => SchemaVersion::Unknown,
        }
    }

    /// Whether this is one of the degraded fallback schemas.
    pub fn is_fallback(&self) -> bool {
        matches!(self, SchemaVersion::Undefined | SchemaVersion::Unknown)
    }

    fn index(&self) -> usize {
        match self {
            SchemaVersion::V1_1_2 => 0,
            SchemaVersion::V1_1_3 => 1,
            SchemaVersion::V1_1_4 => 2,
            SchemaVersion::V1_1_5 => 3,
            SchemaVersion::V1_2 => 4,
            SchemaVersion::Undefined => 5,
            SchemaVersion::Unknown => 6,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Logical attribute name → key path.
pub type AttributeTable = &'static [(&'static str, &'static [&'static str])];

/// Everything one schema version needs to normalize a document.
#[derive(Debug, Clone)]
pub struct VersionSchema {
    pub version: SchemaVersion,
    pub attributes: AttributeTable,
    pub pass_through: &'static [&'static str],
    pub mandatory: &'static [&'static [&'static str]],
    pub mime_table: MimeTable,
    pub classifies_files: bool,
}

impl VersionSchema {
    /// Key path for a logical attribute.
    pub fn attribute_path(&self, name: &str) -> Option<&'static [&'static str]> {
        self.attributes
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, path)| *path)
    }
}

/// Immutable table of every known schema version.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<VersionSchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    pub fn builtin() -> Self {
        let schemas = SchemaVersion::ALL.iter().map(|v| builtin_schema(*v)).collect();
        Self { schemas }
    }

    pub fn get(&self, version: SchemaVersion) -> &VersionSchema {
        &self.schemas[version.index()]
    }

    /// Resolve and return the schema for a document `_source`.
    pub fn resolve(&self, source: &Value) -> &VersionSchema {
        let version = SchemaVersion::resolve(source);
        tracing::debug!(version = %version, "resolved schema version");
        self.get(version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSchema> {
        self.schemas.iter()
    }
}

fn builtin_schema(version: SchemaVersion) -> VersionSchema {
    let (attributes, pass_through, mime_table): (AttributeTable, &'static [&'static str], MimeTable) =
        match version {
            SchemaVersion::V1_1_2 => (ATTRS_V1_1_2, PASS_V1_1_2, mime_table_v1_1_2()),
            SchemaVersion::V1_1_3 => (ATTRS_V1_1_3, PASS_V1_1_3, mime_table_v1_1_3()),
            SchemaVersion::V1_1_4 => (ATTRS_V1_1_4, PASS_V1_1_4, mime_table_v1_1_4()),
            SchemaVersion::V1_1_5 => (ATTRS_V1_1_5, PASS_V1_1_5, mime_table_v1_1_5()),
            SchemaVersion::V1_2 => (ATTRS_V1_2, PASS_V1_2, mime_table_v1_2()),
            SchemaVersion::Undefined | SchemaVersion::Unknown => {
                (ATTRS_FALLBACK, PASS_FALLBACK, MimeTable::default())
            }
        };
    VersionSchema {
        version,
        attributes,
        pass_through,
        mandatory: MANDATORY,
        mime_table,
        classifies_files: !version.is_fallback(),
    }
}

const MANDATORY: &[&[&str]] = &[&["item"]];

const ATTRS_FALLBACK: AttributeTable = &[
    ("identifier", &["item", "identifier"]),
    ("name", &["item", "name"]),
    ("doi", &["item", "curie"]),
    ("description", &["item", "description"]),
];

const PASS_FALLBACK: &[&str] = &["identifier", "name", "doi", "description"];

const ATTRS_V1_1_2: AttributeTable = &[
    ("name", &["item", "name"]),
    ("description", &["item", "description"]),
    ("identifier", &["item", "identifier"]),
    ("uri", &["distributions", "current", "uri"]),
    ("updated", &["dates", "updated"]),
    ("organs", &["anatomy", "organ"]),
    ("contributors", &["contributors"]),
    ("doi", &["item", "curie"]),
    ("files", &["objects"]),
    ("s3uri", &["pennsieve", "uri"]),
    ("samples", &["attributes", "sample", "subject"]),
];

const PASS_V1_1_2: &[&str] = &[
    "name",
    "description",
    "identifier",
    "uri",
    "contributors",
    "doi",
    "s3uri",
    "abi-scaffold-metadata-file",
    "abi-thumbnail",
    "abi-scaffold-dir",
    "abi-plot",
    "common-images",
    "tiff-image",
    "mbf-segmentation",
];

const ATTRS_V1_1_3: AttributeTable = &[
    ("sampleSize", &["item", "statistics", "samples", "count"]),
    ("subjectSize", &["item", "statistics", "subjects", "count"]),
    ("name", &["item", "name"]),
    ("description", &["item", "description"]),
    ("identifier", &["item", "identifier"]),
    ("uri", &["distributions", "current", "uri"]),
    ("updated", &["dates", "updated"]),
    ("organs", &["anatomy", "organ"]),
    ("organisms", &["organisms", "subject"]),
    ("contributors", &["contributors"]),
    ("doi", &["item", "curie"]),
    ("files", &["objects"]),
    ("version", &["item", "version", "keyword"]),
    ("s3uri", &["pennsieve", "uri"]),
    ("samples", &["attributes", "sample", "subject"]),
];

const PASS_V1_1_3: &[&str] = &[
    "sampleSize",
    "subjectSize",
    "name",
    "description",
    "identifier",
    "uri",
    "organisms",
    "contributors",
    "doi",
    "version",
    "s3uri",
    "abi-scaffold-metadata-file",
    "abi-scaffold-view-file",
    "abi-thumbnail",
    "abi-scaffold-dir",
    "abi-plot",
    "common-images",
    "tiff-image",
    "mbf-segmentation",
    "biolucida-2d",
    "biolucida-3d",
    "video",
];

const ATTRS_V1_1_4: AttributeTable = &[
    ("sampleSize", &["item", "statistics", "samples", "count"]),
    ("subjectSize", &["item", "statistics", "subjects", "count"]),
    ("name", &["item", "name"]),
    ("description", &["item", "description"]),
    ("identifier", &["item", "identifier"]),
    ("uri", &["distributions", "current", "uri"]),
    ("updated", &["dates", "updated"]),
    ("organs", &["anatomy", "organ"]),
    ("organisms", &["organisms", "primary"]),
    ("contributors", &["contributors"]),
    ("doi", &["item", "curie"]),
    ("files", &["objects"]),
    ("version", &["item", "version", "keyword"]),
    ("s3uri", &["pennsieve", "uri"]),
    ("techniques", &["item", "techniques"]),
    ("modalities", &["item", "modalities"]),
    ("samples", &["attributes", "sample", "subject"]),
];

const PASS_V1_1_4: &[&str] = &[
    "sampleSize",
    "subjectSize",
    "name",
    "description",
    "identifier",
    "uri",
    "organisms",
    "contributors",
    "doi",
    "version",
    "s3uri",
    "techniques",
    "abi-scaffold-metadata-file",
    "abi-scaffold-view-file",
    "abi-scaffold-thumbnail",
    "abi-context-file",
    "abi-thumbnail",
    "abi-scaffold-dir",
    "abi-plot",
    "common-images",
    "tiff-image",
    "mbf-segmentation",
    "biolucida-2d",
    "biolucida-3d",
    "video",
];

const ATTRS_V1_1_5: AttributeTable = &[
    ("sampleSize", &["item", "statistics", "samples", "count"]),
    ("subjectSize", &["item", "statistics", "subjects", "count"]),
    ("name", &["item", "name"]),
    ("description", &["item", "description"]),
    ("readme", &["item", "readme", "description"]),
    ("keywords", &["item", "keywords"]),
    ("identifier", &["item", "identifier"]),
    ("uri", &["distributions", "current", "uri"]),
    ("updated", &["dates", "updated"]),
    ("organs", &["anatomy", "organ"]),
    ("organisms", &["organisms", "primary"]),
    ("contributors", &["contributors"]),
    ("doi", &["item", "curie"]),
    ("files", &["objects"]),
    ("version", &["item", "version", "keyword"]),
    ("s3uri", &["pennsieve", "uri"]),
    ("banner", &["pennsieve", "banner", "uri"]),
    ("techniques", &["item", "techniques"]),
    ("modalities", &["item", "modalities"]),
    ("samples", &["attributes", "sample", "subject"]),
];

const PASS_V1_1_5: &[&str] = &[
    "sampleSize",
    "subjectSize",
    "name",
    "description",
    "readme",
    "keywords",
    "identifier",
    "uri",
    "organisms",
    "contributors",
    "doi",
    "version",
    "s3uri",
    "banner",
    "techniques",
    "abi-scaffold-metadata-file",
    "abi-scaffold-view-file",
    "abi-scaffold-thumbnail",
    "abi-context-file",
    "abi-thumbnail",
    "abi-scaffold-dir",
    "abi-plot",
    "common-images",
    "tiff-image",
    "mbf-segmentation",
    "biolucida-2d",
    "biolucida-3d",
    "video",
    "fe-model",
];

const ATTRS_V1_2: AttributeTable = &[
    ("sampleSize", &["item", "statistics", "samples", "count"]),
    ("subjectSize", &["item", "statistics", "subjects", "count"]),
    ("name", &["item", "name"]),
    ("description", &["item", "description"]),
    ("readme", &["item", "readme", "description"]),
    ("keywords", &["item", "keywords"]),
    ("identifier", &["item", "identifier"]),
    ("uri", &["distributions", "current", "uri"]),
    ("updated", &["dates", "updated"]),
    ("organs", &["anatomy", "organ"]),
    ("organisms", &["organisms", "primary"]),
    ("contributors", &["contributors"]),
    ("doi", &["item", "curie"]),
    ("files", &["objects"]),
    ("version", &["item", "version", "keyword"]),
    ("s3uri", &["pennsieve", "uri"]),
    ("banner", &["pennsieve", "banner", "uri"]),
    ("createdAt", &["pennsieve", "createdAt", "timestamp"]),
    ("updatedAt", &["pennsieve", "updatedAt", "timestamp"]),
    ("firstPublishedAt", &["pennsieve", "firstPublishedAt", "timestamp"]),
    ("techniques", &["item", "techniques"]),
    ("modalities", &["item", "modalities"]),
    ("samples", &["attributes", "sample", "subject"]),
];

const PASS_V1_2: &[&str] = &[
    "sampleSize",
    "subjectSize",
    "name",
    "description",
    "readme",
    "keywords",
    "identifier",
    "uri",
    "organisms",
    "contributors",
    "doi",
    "version",
    "s3uri",
    "banner",
    "createdAt",
    "updatedAt",
    "firstPublishedAt",
    "techniques",
    "abi-scaffold-metadata-file",
    "abi-scaffold-view-file",
    "abi-scaffold-thumbnail",
    "abi-context-file",
    "abi-thumbnail",
    "abi-scaffold-dir",
    "abi-plot",
    "common-images",
    "tiff-image",
    "mbf-segmentation",
    "biolucida-2d",
    "biolucida-3d",
    "video",
    "fe-model",
];
