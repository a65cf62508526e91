//! Decides which file paths are in scope for interception.
//!
//! A path is in scope when its user-relative form starts with the primary
//! filter, or when it contains one of the fixed tracking directories anywhere.
//! With no primary filter configured every path is in scope.

/// Tracking directories and the filename prefix used for files inside them.
pub const TRACKING_PATH_FILTERS: &[(&str, &str)] = &[
    ("official_website_redirect_to_yamato_tracking", "OWRYT-"),
    ("yamato_tracking_10", "YT10-"),
    ("yamato_tracking", "YTO-"),
    ("yamato_tracking_only", "YTO-"),
    ("japan_post_tracking_only", "JPTO-"),
    ("japan_post_tracking", "JPTO-"),
    ("japan_post_tracking_10", "JPT10-"),
];

pub struct PathFilterMatcher {
    primary: Option<String>,
}

impl PathFilterMatcher {
    pub fn new(primary_filter: &str) -> Self {
        let primary = (!primary_filter.is_empty()).then(|| wrap(primary_filter));
        PathFilterMatcher { primary }
    }

    pub fn matches(&self, file_path: &str) -> bool {
        let clean_path = wrap(normalize(file_path));

        if let Some(filter) = &self.primary
            && clean_path.starts_with(filter.as_str())
        {
            return true;
        }

        // Tracking directories match at any depth, not only as a prefix
        if tracking_entry(&clean_path).is_some() {
            return true;
        }

        self.primary.is_none()
    }

    /// Filename prefix for the first tracking directory found in `file_path`.
    pub fn tracking_prefix(&self, file_path: &str) -> Option<&'static str> {
        tracking_entry(&wrap(normalize(file_path))).map(|(_, prefix)| *prefix)
    }
}

fn tracking_entry(clean_path: &str) -> Option<&'static (&'static str, &'static str)> {
    TRACKING_PATH_FILTERS
        .iter()
        .find(|(dir, _)| clean_path.contains(&wrap(dir)))
}

/// Strips the host's `/<user>/files` root so that `/admin/files/Data/a.xlsx`
/// becomes `/Data/a.xlsx`. Paths without that root are returned unchanged.
fn normalize(file_path: &str) -> &str {
    let Some(rest) = file_path.strip_prefix('/') else {
        return file_path;
    };
    let Some((user, rest)) = rest.split_once('/') else {
        return file_path;
    };
    if user.is_empty() {
        return file_path;
    }
    match rest.strip_prefix("files") {
        Some(relative) if relative.starts_with('/') => relative,
        _ => file_path,
    }
}

fn wrap(path: &str) -> String {
    format!("/{}/", path.trim_matches('/'))
}
