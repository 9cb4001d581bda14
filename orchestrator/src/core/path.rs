//! Path normalization, ownership buckets and prefix overlap.

/// Normalize a repository-relative path.
///
/// Backslashes become `/`, leading `./` and `/` are stripped, repeated
/// slashes collapse, and a single trailing slash is dropped.
pub fn normalize_path(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }

    let mut normalized = String::with_capacity(rest.len());
    let mut previous_slash = false;
    for ch in rest.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.push(ch);
    }
    if normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// True if two paths are equal or one contains the other at a `/` boundary.
///
/// Empty paths never overlap.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    long == short || is_under(long, short)
}

/// True if any path of `left` overlaps any path of `right`.
pub fn any_overlap<L: AsRef<str>, R: AsRef<str>>(left: &[L], right: &[R]) -> bool {
    left.iter()
        .any(|a| right.iter().any(|b| paths_overlap(a.as_ref(), b.as_ref())))
}

fn is_under(path: &str, prefix: &str) -> bool {
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

/// Ownership buckets ordered longest-prefix-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSet {
    buckets: Vec<String>,
}

impl BucketSet {
    pub fn new<S: AsRef<str>>(buckets: &[S]) -> Self {
        let mut buckets: Vec<String> = buckets
            .iter()
            .map(|bucket| normalize_path(bucket.as_ref()))
            .filter(|bucket| !bucket.is_empty())
            .collect();
        buckets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        buckets.dedup();
        Self { buckets }
    }

    /// Bucket for a file-touch path.
    ///
    /// The most specific configured bucket that equals or contains the path
    /// wins; otherwise the path's first segment becomes an ad hoc bucket.
    /// Returns `None` for paths that normalize to nothing.
    pub fn bucket_for(&self, path: &str) -> Option<String> {
        let path = normalize_path(path);
        if path.is_empty() {
            return None;
        }
        if let Some(bucket) = self
            .buckets
            .iter()
            .find(|bucket| path == **bucket || is_under(&path, bucket))
        {
            return Some(bucket.clone());
        }
        path.split('/').next().map(str::to_string)
    }
}

/// Convenience wrapper around [`BucketSet::bucket_for`] for one-off lookups.
pub fn bucket_for_path<S: AsRef<str>>(path: &str, buckets: &[S]) -> Option<String> {
    BucketSet::new(buckets).bucket_for(path)
}

/// True if the path looks like documentation (`docs/` trees or `.md`/`.txt`/`.rst`).
pub fn is_doc_path(path: &str) -> bool {
    let path = normalize_path(path).to_ascii_lowercase();
    if path.is_empty() {
        return false;
    }
    let in_docs_dir = path == "docs"
        || path.starts_with("docs/")
        || path.ends_with("/docs")
        || path.contains("/docs/");
    in_docs_dir || [".md", ".txt", ".rst"].iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prefixes_and_duplicate_slashes() {
        assert_eq!(normalize_path(".\\apps\\\\api\\"), "apps/api");
        assert_eq!(normalize_path(".//apps///web/"), "apps/web");
        assert_eq!(normalize_path("/Cargo.lock"), "Cargo.lock");
        assert_eq!(normalize_path("./"), "");
    }

    #[test]
    fn overlap_respects_segment_boundaries() {
        assert!(paths_overlap("apps/api", "apps/api/src"));
        assert!(paths_overlap("apps/api/src", "apps/api"));
        assert!(paths_overlap("./apps/api/", "apps/api"));
        assert!(!paths_overlap("apps/api", "apps/api2"));
        assert!(!paths_overlap("apps/api2", "apps/api"));
        assert!(!paths_overlap("", "apps"));
    }

    #[test]
    fn most_specific_bucket_wins() {
        let buckets = ["apps", "apps/api", "packages/ui"];
        assert_eq!(
            bucket_for_path("apps/api/src/main.rs", &buckets),
            Some("apps/api".to_string())
        );
        assert_eq!(
            bucket_for_path("apps/web/index.ts", &buckets),
            Some("apps".to_string())
        );
        assert_eq!(bucket_for_path("apps/api", &buckets), Some("apps/api".to_string()));
    }

    #[test]
    fn unmatched_path_uses_first_segment() {
        let buckets = ["apps/api"];
        assert_eq!(
            bucket_for_path("scripts/release.sh", &buckets),
            Some("scripts".to_string())
        );
        assert_eq!(
            bucket_for_path("Cargo.lock", &buckets),
            Some("Cargo.lock".to_string())
        );
        assert_eq!(bucket_for_path("apps/api2/x", &buckets), Some("apps".to_string()));
        assert_eq!(bucket_for_path("./", &buckets), None);
    }

    #[test]
    fn doc_signals() {
        assert!(is_doc_path("docs"));
        assert!(is_doc_path("docs/guide/setup.md"));
        assert!(is_doc_path("apps/api/docs/intro"));
        assert!(is_doc_path("README.md"));
        assert!(is_doc_path("notes/CHANGES.RST"));
        assert!(!is_doc_path("apps/api/src/lib.rs"));
        assert!(!is_doc_path("docsite/index.ts"));
    }
}
