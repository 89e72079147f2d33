use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::{document::Document, field_path::FieldPath};

/// Replaces groups of sibling paths with their common parent wherever deleting the parent is
/// equivalent to deleting every child.
///
/// Server-side apply can't express "delete every child but keep an empty mapping", a patch like
/// `{"parent": {"a": null, "b": null}}` is invalid. Instead, `parent` itself is set to null. A
/// group of siblings is only collapsed if
///
/// - the siblings are exactly the children of the parent in `observed`, and
/// - the parent is absent, null or an empty mapping in `desired`.
///
/// Collapsing is repeated until the set of paths doesn't change anymore, so that a collapsed
/// parent can in turn collapse into its own parent. Paths which are covered by one of their
/// ancestors are dropped. The result is sorted and contains no duplicates, regardless of the
/// order of `paths`.
pub fn collapse_siblings(
    observed: &Document,
    desired: &Document,
    paths: impl IntoIterator<Item = FieldPath>,
) -> Vec<FieldPath> {
    let mut current = drop_covered(paths.into_iter().collect());

    // Every pass which changes the set lifts at least one path up by one level, so there can't
    // be more passes than the deepest path has segments.
    let max_passes = current.iter().map(FieldPath::depth).max().unwrap_or_default();

    for pass in 1..=max_passes {
        let next = drop_covered(collapse_pass(observed, desired, &current));
        if next == current {
            tracing::trace!(pass, paths = current.len(), "collapsing reached fixed point");
            break;
        }

        current = next;
    }

    current.into_iter().collect()
}

/// Groups the paths by their parent and collapses every group which can be collapsed.
fn collapse_pass(
    observed: &Document,
    desired: &Document,
    paths: &BTreeSet<FieldPath>,
) -> BTreeSet<FieldPath> {
    let mut result = BTreeSet::new();
    let mut groups: BTreeMap<FieldPath, Vec<&FieldPath>> = BTreeMap::new();

    for path in paths {
        match path.parent() {
            Some(parent) => groups.entry(parent).or_default().push(path),
            // Top-level fields can't be collapsed any further
            None => {
                result.insert(path.clone());
            }
        }
    }

    for (parent, children) in groups {
        if can_collapse(observed, desired, &parent, &children) {
            tracing::trace!(
                %parent,
                children = children.len(),
                "collapsing deleted siblings into parent"
            );
            result.insert(parent);
        } else {
            result.extend(children.into_iter().cloned());
        }
    }

    result
}

fn can_collapse(
    observed: &Document,
    desired: &Document,
    parent: &FieldPath,
    children: &[&FieldPath],
) -> bool {
    let Ok(Some(observed_children)) = observed.child_names(parent) else {
        return false;
    };

    let deleted: BTreeSet<&str> = children.iter().map(|child| child.leaf()).collect();
    if deleted != observed_children {
        return false;
    }

    match desired.get(parent) {
        Ok(None) | Err(_) | Ok(Some(Value::Null)) => true,
        Ok(Some(Value::Object(map))) => map.is_empty(),
        Ok(Some(_)) => false,
    }
}

/// Removes every path which has one of its ancestors in the set as well.
fn drop_covered(paths: BTreeSet<FieldPath>) -> BTreeSet<FieldPath> {
    paths
        .iter()
        .filter(|path| !path.ancestors().any(|ancestor| paths.contains(&ancestor)))
        .cloned()
        .collect()
}
