//! Maven coordinates and repository access.
//!
//! A repository is addressed by a [`Locator`]. Files are laid out as
//! `<group path>/<artifactId>/<version>/<artifactId>-<version>[-<classifier>].<extension>`
//! with optional checksum sidecars (`.sha1`, `.md5`, ...) next to each file.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use flate2::write::GzEncoder;
use flate2::Compression;
use ocm_blob::{BlobAccess, BlobError, BlobReader, Digest, DigestAlgorithm, MultiHasher, VerifyingReader};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{AccessError, Result};
use crate::mime;
use crate::transport::{Locator, SCHEME_FILE};

/// Checksums written next to uploaded files.
pub const UPLOAD_CHECKSUMS: [DigestAlgorithm; 3] = [
    DigestAlgorithm::Sha1,
    DigestAlgorithm::Md5,
    DigestAlgorithm::Sha256,
];

/// Maven coordinates. Without classifier and extension they address the
/// whole GAV package, with both they address a single file, otherwise a
/// set of files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Coordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Coordinates {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            extension: None,
            media_type: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Parse `group:artifact:version[:classifier[:extension]]`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 3 || parts.len() > 5 || parts[..3].iter().any(|p| p.is_empty()) {
            return Err(AccessError::invalid("maven coordinates", s));
        }
        let mut coords = Coordinates::new(parts[0], parts[1], parts[2]);
        coords.classifier = parts.get(3).map(|c| c.to_string());
        coords.extension = parts.get(4).map(|e| e.to_string());
        Ok(coords)
    }

    /// `group:artifact:version`.
    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// The reference used in hints: the GAV for packages, the full form
    /// otherwise.
    pub fn reference(&self) -> String {
        if self.is_package() {
            self.gav()
        } else {
            self.to_string()
        }
    }

    /// Group id with `/` instead of `.`.
    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// Repository directory of the GAV.
    pub fn gav_path(&self) -> String {
        format!("{}/{}/{}", self.group_path(), self.artifact_id, self.version)
    }

    pub fn file_name_prefix(&self) -> String {
        format!("{}-{}", self.artifact_id, self.version)
    }

    /// File name with classifier and extension. The extension defaults to
    /// `jar`.
    pub fn file_name(&self) -> String {
        let mut name = self.file_name_prefix();
        if let Some(classifier) = self.classifier.as_deref().filter(|c| !c.is_empty()) {
            name.push('-');
            name.push_str(classifier);
        }
        match self.extension.as_deref().filter(|e| !e.is_empty()) {
            Some(extension) => {
                name.push('.');
                name.push_str(extension);
            }
            None => name.push_str(".jar"),
        }
        name
    }

    /// Repository path of the addressed file.
    pub fn file_path(&self) -> String {
        format!("{}/{}", self.gav_path(), self.file_name())
    }

    /// Package URL.
    pub fn purl(&self) -> String {
        format!("pkg:maven/{}/{}@{}", self.group_id, self.artifact_id, self.version)
    }

    /// Whether the complete GAV content is addressed.
    pub fn is_package(&self) -> bool {
        self.classifier.is_none() && self.extension.is_none()
    }

    /// Whether exactly one file is addressed.
    pub fn is_file(&self) -> bool {
        self.classifier.is_some() && self.extension.is_some()
    }

    /// Media type of the addressed content. File sets and packages are
    /// delivered as gzipped tar archive.
    pub fn mime_type(&self) -> String {
        if !self.is_file() {
            return mime::MIME_TGZ.to_string();
        }
        if let Some(media_type) = &self.media_type {
            return media_type.clone();
        }
        self.extension
            .as_deref()
            .and_then(mime::for_extension)
            .unwrap_or(mime::MIME_OCTET)
            .to_string()
    }

    /// Set classifier and extension from a file name of this GAV.
    pub fn set_classifier_extension_by(&mut self, file_name: &str) -> Result<()> {
        let base = file_name.rsplit('/').next().unwrap_or(file_name);
        let prefix = self.file_name_prefix();
        let rest = base.strip_prefix(prefix.as_str()).unwrap_or(base);
        let rest = match rest.strip_prefix('-') {
            Some(classified) => {
                let Some((classifier, extension)) = classified.split_once('.') else {
                    return Err(AccessError::invalid(
                        "maven file name",
                        format!("no extension after classifier in {file_name}"),
                    ));
                };
                self.classifier = Some(classifier.to_string());
                extension
            }
            None => {
                self.classifier = Some(String::new());
                rest.strip_prefix('.').unwrap_or(rest)
            }
        };
        self.extension = Some(rest.to_string());
        Ok(())
    }

    /// Whether a file of this GAV is selected by classifier and extension.
    pub fn matches_file(&self, file_name: &str) -> bool {
        if self.is_package() {
            return true;
        }
        let Some(mut rest) = file_name.strip_prefix(self.file_name_prefix().as_str()) else {
            return false;
        };
        let classifier = self.classifier.as_deref().filter(|c| !c.is_empty());
        if let Some(classifier) = classifier {
            match rest.strip_prefix('-').and_then(|r| r.strip_prefix(classifier)) {
                Some(r) => rest = r,
                None => return false,
            }
        }
        match self.extension.as_deref().filter(|e| !e.is_empty()) {
            Some(extension) => {
                let suffix = format!(".{extension}");
                if rest == suffix {
                    return true;
                }
                // Any classifier matches if none was given.
                self.classifier.is_none()
                    && rest.starts_with('-')
                    && rest.len() > suffix.len() + 1
                    && rest.ends_with(&suffix)
            }
            None => rest.starts_with('.'),
        }
    }

    /// Keep the files selected by these coordinates.
    pub fn filter_files(
        &self,
        files: BTreeMap<String, Option<DigestAlgorithm>>,
    ) -> BTreeMap<String, Option<DigestAlgorithm>> {
        files
            .into_iter()
            .filter(|(name, _)| self.matches_file(name))
            .collect()
    }
}

impl fmt::Display for Coordinates {
    /// `group:artifact:version:classifier:extension`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.version,
            self.classifier.as_deref().unwrap_or(""),
            self.extension.as_deref().unwrap_or("")
        )
    }
}

/// Whether a file is content rather than a checksum or signature.
pub fn is_resource(file_name: &str) -> bool {
    !matches!(
        file_name.rsplit_once('.').map(|(_, ext)| ext),
        Some("asc" | "md5" | "sha1" | "sha256" | "sha512")
    )
}

/// Resource files of a directory listing with the strongest checksum
/// published for each.
pub fn files_and_hashes(files: &[String]) -> BTreeMap<String, Option<DigestAlgorithm>> {
    files
        .iter()
        .filter(|f| is_resource(f))
        .map(|file| {
            let algorithm = DigestAlgorithm::PREFERENCE.into_iter().find(|a| {
                let sidecar = format!("{file}{}", a.file_extension());
                files.iter().any(|f| *f == sidecar)
            });
            (file.clone(), algorithm)
        })
        .collect()
}

fn with_suffix(locator: &Locator, suffix: &str) -> Locator {
    let mut locator = locator.clone();
    locator.location.push_str(suffix);
    locator
}

/// A Maven repository reached through the context's transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    base: Locator,
}

impl Repository {
    pub fn new(base: Locator) -> Self {
        Repository { base }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Repository::new(Locator::from_url(url)?))
    }

    pub fn locator(&self) -> &Locator {
        &self.base
    }

    /// The repository URL. File repositories use `file://localhost<abs path>`.
    pub fn url(&self) -> String {
        match self.base.path() {
            Some(path) => {
                let path = std::fs::canonicalize(&path).unwrap_or(path);
                format!("file://localhost{}", path.display())
            }
            None => self.base.location.clone(),
        }
    }

    pub fn gav_locator(&self, coords: &Coordinates) -> Locator {
        self.base.join(&coords.gav_path())
    }

    pub fn file_locator(&self, coords: &Coordinates) -> Locator {
        self.base.join(&coords.file_path())
    }

    /// Files of the GAV and their strongest published checksum.
    pub fn gav_files(
        &self,
        ctx: &Context,
        coords: &Coordinates,
    ) -> Result<BTreeMap<String, Option<DigestAlgorithm>>> {
        let names = ctx.list(&self.gav_locator(coords))?;
        Ok(files_and_hashes(&names))
    }

    /// Read the checksum sidecar of a file.
    pub fn checksum(&self, ctx: &Context, file: &Locator, algorithm: DigestAlgorithm) -> Result<Digest> {
        let sidecar = with_suffix(file, &algorithm.file_extension());
        let mut content = String::new();
        ctx.fetch(&sidecar)?
            .read_to_string(&mut content)
            .map_err(|e| AccessError::io(format!("reading {sidecar}"), e))?;
        // Sidecars may carry the file name after the hex value.
        let hex_value = content.split_whitespace().next().unwrap_or("");
        Ok(Digest::new(algorithm, hex_value.to_ascii_lowercase())?)
    }

    /// The strongest checksum algorithm published for a file.
    fn sidecar_checksum(&self, ctx: &Context, file: &Locator) -> Result<Option<DigestAlgorithm>> {
        for algorithm in DigestAlgorithm::PREFERENCE {
            if ctx.exists(&with_suffix(file, &algorithm.file_extension()))? {
                return Ok(Some(algorithm));
            }
        }
        Ok(None)
    }

    /// Open a single file, verified against its strongest checksum.
    pub fn download(&self, ctx: &Context, coords: &Coordinates) -> Result<BlobReader> {
        let file_name = coords.file_name();
        let algorithm = match self.gav_files(ctx, coords) {
            Ok(files) => match files.get(&file_name) {
                Some(algorithm) => *algorithm,
                None => return Err(AccessError::not_found("file", format!("{file_name} in {}", coords.gav()))),
            },
            Err(AccessError::NotSupported { .. }) => self.sidecar_checksum(ctx, &self.file_locator(coords))?,
            Err(err) if err.is_not_found() => {
                return Err(AccessError::not_found("package", coords.gav()))
            }
            Err(err) => return Err(err),
        };
        self.open(ctx, &self.file_locator(coords), algorithm)
    }

    fn open(&self, ctx: &Context, file: &Locator, algorithm: Option<DigestAlgorithm>) -> Result<BlobReader> {
        match algorithm {
            Some(algorithm) => {
                let expected = self.checksum(ctx, file, algorithm)?;
                tracing::debug!(%file, %expected, "verifying maven file");
                Ok(Box::new(VerifyingReader::new(ctx.fetch(file)?, expected)))
            }
            None => {
                tracing::warn!(%file, "no checksum available");
                ctx.fetch(file)
            }
        }
    }

    /// All files selected by `coords` as gzipped tar archive in a
    /// temporary file.
    pub fn package(&self, ctx: &Context, coords: &Coordinates) -> Result<BlobAccess> {
        let files = match self.gav_files(ctx, coords) {
            Ok(files) => coords.filter_files(files),
            Err(err) if err.is_not_found() => {
                return Err(AccessError::not_found("package", coords.gav()))
            }
            Err(err) => return Err(err),
        };
        if files.is_empty() {
            return Err(AccessError::not_found("package", coords.to_string()));
        }
        tracing::debug!(gav = %coords.gav(), files = files.len(), "packaging maven files");

        let archive = ctx.cache_attr().create_temp_file("maven-")?;
        let mut builder = tar::Builder::new(GzEncoder::new(archive, Compression::default()));
        for (name, algorithm) in &files {
            let locator = self.gav_locator(coords).join(name);
            // Stage each file so its size is known for the tar header.
            let mut staged = ctx.cache_attr().create_temp_file("maven-file-")?;
            let mut reader = self.open(ctx, &locator, *algorithm)?;
            std::io::copy(&mut reader, &mut staged)
                .map_err(|e| AccessError::from(BlobError::from_io(format!("reading {locator}"), e)))?;
            let staged = staged.seal(mime::MIME_OCTET)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(staged.size()?);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, name, staged.reader()?)
                .map_err(|e| AccessError::io(format!("archiving {name}"), e))?;
            staged.close()?;
        }
        let archive = builder
            .into_inner()
            .and_then(|gz| gz.finish())
            .map_err(|e| AccessError::io("finishing maven package", e))?;
        Ok(archive.seal(mime::MIME_TGZ)?)
    }

    /// Upload one file together with its checksum sidecars.
    pub fn upload(&self, ctx: &Context, coords: &Coordinates, blob: &BlobAccess) -> Result<()> {
        let file = self.file_locator(coords);
        let mut hasher = MultiHasher::new(&UPLOAD_CHECKSUMS);
        hasher.consume(blob.reader()?)?;
        ctx.store(&file, blob)?;
        for digest in hasher.finish() {
            let sidecar = with_suffix(&file, &digest.algorithm().file_extension());
            ctx.store_reader(&sidecar, &mut digest.encoded().as_bytes())?;
        }
        tracing::info!(%file, coords = %coords, "uploaded maven file");
        Ok(())
    }

    pub fn is_file_system(&self) -> bool {
        self.base.scheme == SCHEME_FILE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use std::path::Path;

    fn coords() -> Coordinates {
        Coordinates::new("org.acme.tools", "lib", "1.0")
    }

    fn context(dir: &Path) -> Context {
        Context::builder()
            .cache_dir(dir.join("cache"))
            .retry_policy(RetryPolicy::no_retry())
            .build()
            .unwrap()
    }

    #[test]
    fn paths_and_names() {
        let c = coords();
        assert_eq!(c.gav(), "org.acme.tools:lib:1.0");
        assert_eq!(c.gav_path(), "org/acme/tools/lib/1.0");
        assert_eq!(c.file_name(), "lib-1.0.jar");
        assert_eq!(c.purl(), "pkg:maven/org.acme.tools/lib@1.0");
        assert!(c.is_package());
        assert_eq!(c.mime_type(), mime::MIME_TGZ);
        let f = c.clone().with_classifier("sources").with_extension("zip");
        assert_eq!(f.file_path(), "org/acme/tools/lib/1.0/lib-1.0-sources.zip");
        assert!(f.is_file());
        assert_eq!(f.mime_type(), mime::MIME_ZIP);
        assert_eq!(f.to_string(), "org.acme.tools:lib:1.0:sources:zip");
        assert_eq!(f.reference(), "org.acme.tools:lib:1.0:sources:zip");
        assert_eq!(c.reference(), "org.acme.tools:lib:1.0");
        let pom = c.clone().with_classifier("").with_extension("pom");
        assert_eq!(pom.file_name(), "lib-1.0.pom");
        assert_eq!(
            c.clone().with_classifier("").with_extension("bin").mime_type(),
            mime::MIME_OCTET
        );
    }

    #[test]
    fn parse_coordinates() {
        let c = Coordinates::parse("g:a:1").unwrap();
        assert!(c.is_package());
        let c = Coordinates::parse("g:a:1::pom").unwrap();
        assert_eq!(c.classifier.as_deref(), Some(""));
        assert_eq!(c.file_name(), "a-1.pom");
        assert_eq!(Coordinates::parse(&c.to_string()).unwrap(), c);
        assert!(Coordinates::parse("g:a").is_err());
        assert!(Coordinates::parse("g::1").is_err());
    }

    #[test]
    fn classifier_extension_from_file_name() {
        let mut c = coords();
        c.set_classifier_extension_by("lib-1.0-sources.jar").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("sources"));
        assert_eq!(c.extension.as_deref(), Some("jar"));
        c.set_classifier_extension_by("x/lib-1.0.pom").unwrap();
        assert_eq!(c.classifier.as_deref(), Some(""));
        assert_eq!(c.extension.as_deref(), Some("pom"));
        c.set_classifier_extension_by("lib-1.0.tar.gz").unwrap();
        assert_eq!(c.extension.as_deref(), Some("tar.gz"));
        assert!(c.set_classifier_extension_by("lib-1.0-sources").is_err());
    }

    #[test]
    fn filter_by_classifier_and_extension() {
        let names: Vec<String> = [
            "lib-1.0.jar",
            "lib-1.0.jar.sha1",
            "lib-1.0.pom",
            "lib-1.0-sources.jar",
            "lib-1.0-sources.jar.md5",
            "lib-1.0-tests.zip",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let files = files_and_hashes(&names);
        assert_eq!(files.len(), 4);
        assert_eq!(files["lib-1.0.jar"], Some(DigestAlgorithm::Sha1));
        assert_eq!(files["lib-1.0-sources.jar"], Some(DigestAlgorithm::Md5));
        assert_eq!(files["lib-1.0.pom"], None);

        let keys = |c: &Coordinates| c.filter_files(files.clone()).into_keys().collect::<Vec<_>>();
        assert_eq!(keys(&coords()).len(), 4);
        assert_eq!(
            keys(&coords().with_extension("jar")),
            vec!["lib-1.0-sources.jar", "lib-1.0.jar"]
        );
        assert_eq!(
            keys(&coords().with_classifier("sources")),
            vec!["lib-1.0-sources.jar"]
        );
        assert_eq!(
            keys(&coords().with_classifier("").with_extension("pom")),
            vec!["lib-1.0.pom"]
        );
        assert!(!is_resource("lib-1.0.jar.asc"));
    }

    #[test]
    fn upload_then_download_verified() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let repo = Repository::new(Locator::file(dir.path().join("repo")));
        let file = coords().with_classifier("").with_extension("jar");
        let blob = BlobAccess::for_string(mime::MIME_JAR, "jar content");
        repo.upload(&ctx, &file, &blob).unwrap();

        let gav_dir = dir.path().join("repo/org/acme/tools/lib/1.0");
        for ext in ["", ".sha1", ".md5", ".sha256"] {
            assert!(gav_dir.join(format!("lib-1.0.jar{ext}")).is_file());
        }
        let files = repo.gav_files(&ctx, &file).unwrap();
        assert_eq!(files["lib-1.0.jar"], Some(DigestAlgorithm::Sha256));

        let mut content = String::new();
        repo.download(&ctx, &file).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "jar content");

        // Tamper with the file, keep the published checksum.
        std::fs::write(gav_dir.join("lib-1.0.jar"), "evil content").unwrap();
        let mut content = Vec::new();
        let err = repo.download(&ctx, &file).unwrap().read_to_end(&mut content).unwrap_err();
        assert!(matches!(
            AccessError::from(BlobError::from_io("reading", err)),
            AccessError::Blob(BlobError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn download_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let repo = Repository::new(Locator::file(dir.path().join("repo")));
        let file = coords().with_classifier("").with_extension("jar");
        assert!(repo.download(&ctx, &file).err().unwrap().is_not_found());
        assert!(repo.package(&ctx, &coords()).unwrap_err().is_not_found());
    }

    #[test]
    fn package_as_tgz() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let repo = Repository::new(Locator::file(dir.path().join("repo")));
        let jar = coords().with_classifier("").with_extension("jar");
        let pom = coords().with_classifier("").with_extension("pom");
        repo.upload(&ctx, &jar, &BlobAccess::for_string("", "jar")).unwrap();
        repo.upload(&ctx, &pom, &BlobAccess::for_string("", "<project/>")).unwrap();

        let package = repo.package(&ctx, &coords()).unwrap();
        assert_eq!(package.mime_type(), mime::MIME_TGZ);
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(package.reader().unwrap()));
        let mut entries = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            entries.insert(name, content);
        }
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["lib-1.0.jar"], "jar");
        assert_eq!(entries["lib-1.0.pom"], "<project/>");
        let path = package.file_location().unwrap().to_path_buf();
        package.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn repository_url() {
        let repo = Repository::from_url("https://repo.example.com/maven2").unwrap();
        assert_eq!(repo.url(), "https://repo.example.com/maven2");
        assert!(!repo.is_file_system());
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(Locator::file(dir.path()));
        assert!(repo.url().starts_with("file://localhost/"));
    }
}
