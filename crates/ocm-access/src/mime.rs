//! Media types used by the access methods.

pub use ocm_blob::MIME_OCTET;

pub const MIME_TGZ: &str = "application/x-tgz";
pub const MIME_TGZ_ALT: &str = "application/x-tar+gzip";
pub const MIME_TAR: &str = "application/x-tar";
pub const MIME_JSON: &str = "application/json";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_JAR: &str = "application/java-archive";
pub const MIME_XML: &str = "application/xml";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MIME_OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Whether `mime_type` denotes a gzip compressed tar archive.
pub fn is_tgz(mime_type: &str) -> bool {
    mime_type == MIME_TGZ || mime_type == MIME_TGZ_ALT
}

/// Whether `mime_type` denotes an OCI artifact set archive, such as
/// `application/vnd.oci.image.manifest.v1+tar+gzip`.
pub fn is_artifact_archive(mime_type: &str) -> bool {
    (mime_type.starts_with("application/vnd.oci.") || mime_type.starts_with("application/vnd.docker."))
        && (mime_type.ends_with("+tar") || mime_type.ends_with("+tar+gzip"))
}

/// Media type for a file extension (without dot), if well known.
pub fn for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "jar" | "war" | "ear" => MIME_JAR,
        "pom" | "xml" => MIME_XML,
        "zip" => MIME_ZIP,
        "json" | "module" => MIME_JSON,
        "txt" => MIME_TEXT,
        "tgz" | "tar.gz" => MIME_TGZ,
        "tar" => MIME_TAR,
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(for_extension("jar"), Some(MIME_JAR));
        assert_eq!(for_extension("POM"), Some(MIME_XML));
        assert_eq!(for_extension("bin"), None);
        assert!(is_tgz(MIME_TGZ_ALT));
        assert!(!is_tgz(MIME_TAR));
        assert!(is_artifact_archive("application/vnd.oci.image.manifest.v1+tar+gzip"));
        assert!(is_artifact_archive("application/vnd.docker.distribution.manifest.v2+tar"));
        assert!(!is_artifact_archive(MIME_OCI_IMAGE_MANIFEST));
        assert!(!is_artifact_archive(MIME_TGZ));
    }
}
