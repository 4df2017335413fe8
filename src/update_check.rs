//! The pure, host-independent half of update checking: comparing a
//! release tag against the running version. The networking half (fetching
//! `releases/latest` from GitHub) is a desktop-shell concern and out of
//! scope here — there is nothing for a headless crate to verify about it.

/// Left-to-right dotted-numeric comparison of two version strings, with a
/// leading `v` stripped from either side. Returns `true` if `latest` is
/// strictly newer than `current`. Non-numeric or missing components
/// compare as `0`.
pub fn is_newer_version(current: &str, latest: &str) -> bool {
    let current_parts = numeric_parts(current);
    let latest_parts = numeric_parts(latest);

    let len = current_parts.len().max(latest_parts.len());
    for i in 0..len {
        let c = current_parts.get(i).copied().unwrap_or(0);
        let l = latest_parts.get(i).copied().unwrap_or(0);
        if l != c {
            return l > c;
        }
    }
    false
}

fn numeric_parts(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}
