//! Relative paths and query strings for the bundle REST endpoints.
//!
//! Paths are relative to the REST root (`{server}/rest`).

/// Relationships requested alongside bundle metadata.
pub const METADATA_INCLUDE: &str = "owner,group_permissions,host_worksheets";

/// Query pairs for the metadata endpoint.
pub fn metadata_query() -> [(&'static str, &'static str); 2] {
    [("include_display_metadata", "1"), ("include", METADATA_INCLUDE)]
}

/// Query pairs for the contents-info endpoint (shallow listing of the root).
pub fn contents_info_query() -> [(&'static str, &'static str); 1] {
    [("depth", "1")]
}

pub fn bundle_path(bundle_id: &str) -> String {
    format!("bundles/{}", urlencoding::encode(bundle_id))
}

pub fn contents_info_path(bundle_id: &str) -> String {
    format!("bundles/{}/contents/info/", urlencoding::encode(bundle_id))
}

/// Blob path for a target inside the bundle. `target` is `/` for the root
/// or `/name` for a child entry.
pub fn blob_path(bundle_id: &str, target: &str) -> String {
    let encoded: Vec<String> = target
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!(
        "bundles/{}/contents/blob{}",
        urlencoding::encode(bundle_id),
        encoded.join("/")
    )
}
