use std::collections::HashSet;

use crate::paths::{Dialect, common_prefix, dialect_for};

/// Insertion-ordered set of root paths.
#[derive(Debug, Default)]
pub struct OrderedRootSet {
    seen: HashSet<String>,
    roots: Vec<String>,
}

impl OrderedRootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `root` unless an identical string is already present.
    pub fn add(&mut self, root: &str) {
        if self.seen.insert(root.to_string()) {
            self.roots.push(root.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.roots
    }
}

/// Common roots of `paths` with at least `min_depth` components, using the
/// Windows dialect when `os` is `"windows"` and the Unix dialect otherwise.
///
/// - `["/a/b/c", "/a/b/d", "/c/d/e"]`, 1 => `["/a/b", "/c/d/e"]`
/// - `["/a/b/c", "/c/d/e"]`, 1 => `["/a/b/c", "/c/d/e"]`
pub fn compute_common_roots<S: AsRef<str>>(
    paths: &[S],
    min_depth: usize,
    os: &str,
) -> Vec<String> {
    roots(paths, min_depth, dialect_for(os))
}

/// Minimal set of common roots of `paths`, each at least `min_depth` deep.
///
/// Returns an empty result if any group of paths cannot be covered by a
/// root that deep.
pub fn roots<S, D>(paths: &[S], min_depth: usize, dialect: &D) -> Vec<String>
where
    S: AsRef<str>,
    D: Dialect + ?Sized,
{
    if paths.is_empty() {
        return Vec::new();
    }

    // Sorted input keeps paths sharing a long prefix next to each other, so each
    // interval can be judged by its first and last element.
    let mut sorted: Vec<&str> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut found = OrderedRootSet::new();
    if !find_roots(&sorted, 0, sorted.len() - 1, min_depth, dialect, &mut found) {
        return Vec::new();
    }
    found.into_vec()
}

/// Collects roots covering `paths[start..=end]`. Returns false if some path
/// in the interval has no qualifying root.
fn find_roots<D: Dialect + ?Sized>(
    paths: &[&str],
    mut start: usize,
    end: usize,
    min_depth: usize,
    dialect: &D,
    roots: &mut OrderedRootSet,
) -> bool {
    loop {
        if start == end {
            if dialect.depth(paths[start]) < min_depth {
                return false;
            }
            roots.add(paths[start]);
            return true;
        }

        let (common, depth) = common_prefix(paths[start], paths[end], dialect);
        if !common.is_empty() && depth >= min_depth {
            roots.add(common);
            return true;
        }

        // Binary search `[start, end)` for the rightmost path still sharing a
        // qualifying prefix with paths[start]; that may be paths[start] alone.
        let mut prefix = "";
        let mut left = start;
        let mut right = end;
        while left < right {
            let mid = (left + right - 1) / 2;
            let (common, depth) = common_prefix(paths[start], paths[mid], dialect);
            if common.is_empty() || depth < min_depth {
                right = mid;
            } else {
                prefix = common;
                left = mid + 1;
            }
        }
        if prefix.is_empty() {
            return false;
        }
        roots.add(prefix);
        // right <= end - 1 here, so the remaining interval is never empty
        start = right;
    }
}
