//! File classification.
//!
//! Buckets a document's file objects into [`CategoryTag`]s using one schema
//! version's [`MimeTable`] plus the shared [`Taxonomy`].
//!
//! # Rule Chain
//!
//! Each object runs through an ordered chain of rules. A rule either
//! decides the final tag or passes a (possibly updated) tentative tag on:
//!
//! 1. `effective-type`: no usable MIME type → `not-specified`.
//! 2. `skip-list`: the type is on the shared skip list → `skip`.
//! 3. `direct-mapping`: look the type up in the version's table.
//! 4. `derivative-override`: a `common-images` object under the derivative
//!    tree → `skip`.
//!
//! Anything still undecided after the chain is `not-specified` and logged.
//! Objects tagged `skip` or `not-specified` are dropped. Survivors have
//! their dataset path rewritten through the rename table, then are appended
//! to their bucket. Buckets keep the order in which they were first seen.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::path::path_get;
use crate::taxonomy::{CategoryTag, MimeTable, Taxonomy};

/// Typed view over one raw file object.
///
/// Fields borrow from the raw JSON; absent or non-string fields are `None`.
#[derive(Debug, Clone, Copy)]
pub struct FileObject<'a> {
    pub raw: &'a Value,
    pub identifier: Option<&'a str>,
    pub mimetype: Option<&'a str>,
    pub additional_mimetype: Option<&'a str>,
    pub storage_uri: Option<&'a str>,
    pub dataset_path: Option<&'a str>,
    pub size: Option<u64>,
}

impl<'a> FileObject<'a> {
    pub fn from_value(raw: &'a Value) -> Self {
        Self {
            raw,
            identifier: path_get(raw, &["identifier"]).and_then(Value::as_str),
            mimetype: mime_name(raw, "mimetype"),
            additional_mimetype: mime_name(raw, "additional_mimetype"),
            storage_uri: path_get(raw, &["uri"]).and_then(Value::as_str),
            dataset_path: path_get(raw, &["dataset", "path"]).and_then(Value::as_str),
            size: path_get(raw, &["bytes", "count"]).and_then(Value::as_u64),
        }
    }

    /// The MIME type classification uses: the override when present and
    /// non-empty, otherwise the declared type.
    pub fn effective_mime(&self) -> Option<&'a str> {
        non_empty(self.additional_mimetype).or_else(|| non_empty(self.mimetype))
    }
}

/// MIME fields appear both as `{"name": "..."}` and as bare strings.
fn mime_name<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    match path_get(raw, &[key])? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Inputs available to every rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub object: &'a FileObject<'a>,
    pub table: &'a MimeTable,
    pub taxonomy: &'a Taxonomy,
}

/// Result of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Continue with this tentative tag (`None` = not yet mapped).
    Next(Option<CategoryTag>),
    /// Stop; this is the final tag.
    Done(CategoryTag),
}

pub type Rule = fn(&RuleContext<'_>, Option<CategoryTag>) -> Step;

/// The classification chain, in evaluation order.
pub const RULES: &[(&str, Rule)] = &[
    ("effective-type", effective_type),
    ("skip-list", skip_list),
    ("direct-mapping", direct_mapping),
    ("derivative-override", derivative_override),
];

pub fn effective_type(cx: &RuleContext<'_>, current: Option<CategoryTag>) -> Step {
    match cx.object.effective_mime() {
        Some(_) => Step::Next(current),
        None => Step::Done(CategoryTag::NotSpecified),
    }
}

pub fn skip_list(cx: &RuleContext<'_>, current: Option<CategoryTag>) -> Step {
    match cx.object.effective_mime() {
        Some(mime) if cx.taxonomy.is_skipped(mime) => Step::Done(CategoryTag::Skip),
        _ => Step::Next(current),
    }
}

pub fn direct_mapping(cx: &RuleContext<'_>, _current: Option<CategoryTag>) -> Step {
    Step::Next(cx.object.effective_mime().and_then(|mime| cx.table.lookup(mime)))
}

pub fn derivative_override(cx: &RuleContext<'_>, current: Option<CategoryTag>) -> Step {
    let derivative = cx
        .object
        .dataset_path
        .map(|p| cx.taxonomy.is_derivative_path(p))
        .unwrap_or(false);
    if current == Some(CategoryTag::CommonImages) && derivative {
        Step::Done(CategoryTag::Skip)
    } else {
        Step::Next(current)
    }
}

/// Run the rule chain for one object.
pub fn classify_object(object: &FileObject<'_>, table: &MimeTable, taxonomy: &Taxonomy) -> CategoryTag {
    let cx = RuleContext {
        object,
        table,
        taxonomy,
    };
    let mut current = None;
    for (name, rule) in RULES {
        match rule(&cx, current) {
            Step::Done(tag) => {
                tracing::trace!(rule = *name, tag = %tag, "classification decided");
                return finish(object, tag);
            }
            Step::Next(tag) => current = tag,
        }
    }
    finish(object, current.unwrap_or(CategoryTag::NotSpecified))
}

fn finish(object: &FileObject<'_>, tag: CategoryTag) -> CategoryTag {
    if tag == CategoryTag::NotSpecified {
        tracing::warn!(
            mimetype = object.effective_mime().unwrap_or("<none>"),
            path = object.dataset_path.unwrap_or("<none>"),
            "unmapped file type, object not classified"
        );
    }
    tag
}

/// Category → objects grouping, in first-seen category order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryBuckets {
    buckets: Vec<(CategoryTag, Vec<Value>)>,
}

impl CategoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object. Sentinel tags are ignored.
    pub fn push(&mut self, tag: CategoryTag, object: Value) {
        if tag.is_sentinel() {
            return;
        }
        match self.buckets.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, objects)) => objects.push(object),
            None => self.buckets.push((tag, vec![object])),
        }
    }

    pub fn get(&self, tag: CategoryTag) -> Option<&[Value]> {
        self.buckets
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, objects)| objects.as_slice())
    }

    pub fn tags(&self) -> impl Iterator<Item = CategoryTag> + '_ {
        self.buckets.iter().map(|(t, _)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryTag, &[Value])> + '_ {
        self.buckets.iter().map(|(t, o)| (*t, o.as_slice()))
    }

    /// Number of non-empty categories.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Serialize for CategoryBuckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (tag, objects) in &self.buckets {
            map.serialize_entry(tag.as_str(), objects)?;
        }
        map.end()
    }
}

/// Classify a list of raw file objects.
///
/// Non-object entries are ignored. An empty list yields empty buckets.
pub fn classify(objects: &[Value], table: &MimeTable, taxonomy: &Taxonomy) -> CategoryBuckets {
    let mut buckets = CategoryBuckets::new();
    for raw in objects {
        if !raw.is_object() {
            continue;
        }
        let object = FileObject::from_value(raw);
        let tag = classify_object(&object, table, taxonomy);
        if tag.is_sentinel() {
            continue;
        }
        buckets.push(tag, remap_path(&object, taxonomy));
    }
    buckets
}

/// Copy of the raw object with its dataset path brought up to date.
fn remap_path(object: &FileObject<'_>, taxonomy: &Taxonomy) -> Value {
    let mut copy = object.raw.clone();
    let renamed = object
        .dataset_path
        .and_then(|p| taxonomy.renames().current(p));
    if let Some(current) = renamed {
        if let Some(dataset) = copy.get_mut("dataset").and_then(Value::as_object_mut) {
            dataset.insert("path".to_string(), Value::String(current.to_string()));
        }
    }
    copy
}
