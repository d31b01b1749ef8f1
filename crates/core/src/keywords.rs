//! Keyword hierarchy reconciliation.
//!
//! A file carries the same keyword tree up to five times: once as the
//! structured `KeywordInfo` hierarchy and four more times as flat lists of
//! delimiter-joined root-to-leaf paths. [`combine`] folds all of them into a
//! single deduplicated hierarchy; [`expand`] regenerates the flat lists from
//! the hierarchy before a write.

use tracing::warn;

use crate::metadata::{KeywordInfo, KeywordNode, MetadataBundle, PIPE_DELIMITER, SLASH_DELIMITER};

/// Accumulates a keyword forest for the duration of one [`combine`] call.
///
/// Nodes are matched by label at each depth, so overlapping paths coming
/// from different encodings share their common prefix.
#[derive(Debug, Default)]
struct ForestBuilder {
    roots: Vec<KeywordNode>,
}

impl ForestBuilder {
    /// Union a whole subtree into the forest.
    fn merge(&mut self, node: KeywordNode) {
        merge_into(&mut self.roots, node);
    }

    fn insert_list(&mut self, list: Option<&[String]>, delimiter: char) {
        for path in list.unwrap_or_default() {
            self.insert_path(path, delimiter);
        }
    }

    fn insert_path(&mut self, path: &str, delimiter: char) {
        let mut siblings = &mut self.roots;
        for segment in path.split(delimiter).filter(|s| !s.is_empty()) {
            let index = match siblings.iter().position(|n| n.keyword == segment) {
                Some(index) => index,
                None => {
                    siblings.push(KeywordNode::new(segment));
                    siblings.len() - 1
                }
            };
            siblings = &mut siblings[index].children;
        }
    }

    fn finish(mut self) -> Vec<KeywordNode> {
        deduplicate(&mut self.roots);
        self.roots
    }
}

/// Union `node` into `siblings` by label, recursively. Applied flags are
/// never invented: an unset flag stays unset unless a merged copy sets it.
fn merge_into(siblings: &mut Vec<KeywordNode>, node: KeywordNode) {
    let index = match siblings.iter().position(|n| n.keyword == node.keyword) {
        Some(index) => index,
        None => {
            siblings.push(KeywordNode::new(node.keyword.clone()));
            siblings.len() - 1
        }
    };
    let existing = &mut siblings[index];
    match (existing.applied, node.applied) {
        (None, incoming) => existing.applied = incoming,
        (Some(false), Some(true)) => existing.applied = Some(true),
        _ => {}
    }
    for child in node.children {
        merge_into(&mut existing.children, child);
    }
}

/// Collapse structurally identical siblings, depth first, keeping the first
/// occurrence in place.
pub fn deduplicate(nodes: &mut Vec<KeywordNode>) {
    for node in nodes.iter_mut() {
        deduplicate(&mut node.children);
    }
    let mut unique: Vec<KeywordNode> = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        if !unique.contains(&node) {
            unique.push(node);
        }
    }
    *nodes = unique;
}

/// Build the canonical hierarchy from every keyword encoding in `bundle`.
///
/// The existing `KeywordInfo` is merged first, then `HierarchicalSubject`,
/// `CatalogSets`, `TagsList` and `LastKeywordXMP`. The flat lists are left
/// as read. Afterwards `keyword_info` is always populated.
///
/// Flat lists carry no applied flags, so nodes only they mention keep the
/// flag unset; [`KeywordNode::is_applied`] then treats leaves as applied.
pub fn combine(bundle: &mut MetadataBundle) {
    let mut builder = ForestBuilder::default();

    if let Some(info) = bundle.keyword_info.take() {
        for root in info.hierarchy {
            builder.merge(root);
        }
    }
    builder.insert_list(bundle.hierarchical_subject.as_deref(), PIPE_DELIMITER);
    builder.insert_list(bundle.catalog_sets.as_deref(), PIPE_DELIMITER);
    builder.insert_list(bundle.tags_list.as_deref(), SLASH_DELIMITER);
    builder.insert_list(bundle.last_keyword_xmp.as_deref(), SLASH_DELIMITER);

    bundle.keyword_info = Some(KeywordInfo::new(builder.finish()));
}

/// Overwrite the four flat keyword lists with paths derived from the
/// hierarchy. Bundles without a hierarchy are left untouched.
pub fn expand(bundle: &mut MetadataBundle) {
    if bundle.keyword_info.is_none() {
        return;
    }
    if !bundle.flat_keywords_empty() {
        warn!(
            "Overwriting existing flat keyword lists of {}",
            bundle.source_file.display()
        );
    }

    let Some(info) = bundle.keyword_info.as_mut() else {
        return;
    };
    deduplicate(&mut info.hierarchy);

    let pipe_paths = leaf_paths(&info.hierarchy, PIPE_DELIMITER);
    let slash_paths = leaf_paths(&info.hierarchy, SLASH_DELIMITER);

    bundle.hierarchical_subject = Some(pipe_paths.clone());
    bundle.catalog_sets = Some(pipe_paths);
    bundle.tags_list = Some(slash_paths.clone());
    bundle.last_keyword_xmp = Some(slash_paths);
}

/// Every root-to-leaf path of `hierarchy`, joined with `delimiter`, without
/// repeats.
pub fn leaf_paths(hierarchy: &[KeywordNode], delimiter: char) -> Vec<String> {
    let mut paths = Vec::new();
    let mut prefix = Vec::new();
    for root in hierarchy {
        collect_leaf_paths(root, &mut prefix, delimiter, &mut paths);
    }
    paths
}

fn collect_leaf_paths<'a>(
    node: &'a KeywordNode,
    prefix: &mut Vec<&'a str>,
    delimiter: char,
    out: &mut Vec<String>,
) {
    prefix.push(&node.keyword);
    if node.is_leaf() {
        let path = prefix.join(delimiter.to_string().as_str());
        if !out.contains(&path) {
            out.push(path);
        }
    } else {
        for child in &node.children {
            collect_leaf_paths(child, prefix, delimiter, out);
        }
    }
    prefix.pop();
}
