//! Content digests and digesting readers.
//!
//! Every blob is content-addressed via a [`Digest`]: an algorithm name plus
//! the lowercase hex encoding of the hash (`sha256:<hex>`). SHA-256 is the
//! canonical algorithm; SHA-512, SHA-1, and MD5 exist for repositories that
//! only publish legacy checksums (Maven, npm).
//!
//! [`DigestReader`] computes digest and size in a single pass over a stream.
//! [`VerifyingReader`] additionally compares the result against an expected
//! value once the stream is exhausted.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::{BlobError, Result};

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
    Sha1,
    Md5,
}

impl DigestAlgorithm {
    /// The canonical algorithm used for blob identity.
    pub const CANONICAL: DigestAlgorithm = DigestAlgorithm::Sha256;

    /// Algorithms ordered from strongest to weakest.
    pub const PREFERENCE: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Md5,
    ];

    /// Lowercase algorithm name as used in digest strings.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Md5 => "md5",
        }
    }

    /// Checksum sidecar extension used by Maven repositories (`.sha1`, ...).
    pub fn file_extension(self) -> String {
        format!(".{}", self.name())
    }

    /// Length of the hex encoded hash.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Md5 => 32,
        }
    }

    /// Create a streaming hasher for this algorithm.
    pub fn hasher(self) -> Hasher {
        match self {
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "md5" => Ok(DigestAlgorithm::Md5),
            other => Err(BlobError::Invalid {
                detail: format!("unsupported digest algorithm {other:?}"),
            }),
        }
    }
}

/// Streaming hasher over any [`DigestAlgorithm`].
#[derive(Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Sha1(Sha1),
    Md5(Md5),
}

impl Hasher {
    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    /// The algorithm of this hasher.
    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            Hasher::Sha256(_) => DigestAlgorithm::Sha256,
            Hasher::Sha512(_) => DigestAlgorithm::Sha512,
            Hasher::Sha1(_) => DigestAlgorithm::Sha1,
            Hasher::Md5(_) => DigestAlgorithm::Md5,
        }
    }

    /// Finish hashing and produce the digest.
    pub fn finish(self) -> Digest {
        let algorithm = self.algorithm();
        let encoded = match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        };
        Digest { algorithm, encoded }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hasher({})", self.algorithm())
    }
}

/// A content digest (`<algorithm>:<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    encoded: String,
}

impl Digest {
    /// Build a digest from an algorithm and a hex value.
    pub fn new(algorithm: DigestAlgorithm, encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into().trim().to_ascii_lowercase();
        if encoded.len() != algorithm.hex_len() || !encoded.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(BlobError::Invalid {
                detail: format!("invalid {algorithm} digest value {encoded:?}"),
            });
        }
        Ok(Digest { algorithm, encoded })
    }

    /// Compute the canonical digest of the given data.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_bytes_with(DigestAlgorithm::CANONICAL, data)
    }

    /// Compute the digest of the given data with a specific algorithm.
    pub fn from_bytes_with(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        hasher.finish()
    }

    /// Stream a reader to its end and compute its digest and size.
    pub fn from_reader<R: Read>(algorithm: DigestAlgorithm, reader: R) -> Result<(Self, u64)> {
        let mut digester = DigestReader::with_algorithm(reader, algorithm);
        std::io::copy(&mut digester, &mut std::io::sink())
            .map_err(|e| BlobError::from_io("digesting stream", e))?;
        Ok(digester.finish())
    }

    /// Parse the `<algorithm>:<hex>` notation.
    pub fn parse(s: &str) -> Result<Self> {
        let (algo, value) = s.split_once(':').ok_or_else(|| BlobError::Invalid {
            detail: format!("digest {s:?} has no algorithm prefix"),
        })?;
        Digest::new(algo.parse()?, value)
    }

    /// The hash algorithm.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The hex encoded hash value without algorithm prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// File name used to store content under this digest (`sha256.<hex>`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.algorithm, self.encoded)
    }

    /// Inverse of [`Digest::file_name`].
    pub fn from_file_name(name: &str) -> Result<Self> {
        let (algo, value) = name.split_once('.').ok_or_else(|| BlobError::Invalid {
            detail: format!("{name:?} is not a digest file name"),
        })?;
        Digest::new(algo.parse()?, value)
    }

    /// Verify that the given data matches this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        Digest::from_bytes_with(self.algorithm, data) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A reader that counts bytes and hashes content while passing it through.
#[derive(Debug)]
pub struct DigestReader<R> {
    inner: R,
    hasher: Hasher,
    size: u64,
}

impl<R: Read> DigestReader<R> {
    /// Wrap a reader using the canonical algorithm.
    pub fn new(inner: R) -> Self {
        Self::with_algorithm(inner, DigestAlgorithm::CANONICAL)
    }

    /// Wrap a reader using a specific algorithm.
    pub fn with_algorithm(inner: R, algorithm: DigestAlgorithm) -> Self {
        DigestReader {
            inner,
            hasher: algorithm.hasher(),
            size: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Digest of the bytes read so far.
    pub fn digest(&self) -> Digest {
        self.hasher.clone().finish()
    }

    /// Consume the reader, returning digest and size.
    pub fn finish(self) -> (Digest, u64) {
        (self.hasher.finish(), self.size)
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}

/// A reader that fails at end of stream if the content does not match
/// the expected digest.
#[derive(Debug)]
pub struct VerifyingReader<R> {
    inner: DigestReader<R>,
    expected: Digest,
    verified: bool,
}

impl<R: Read> VerifyingReader<R> {
    /// Verify `inner` against `expected`, hashing with the expected algorithm.
    pub fn new(inner: R, expected: Digest) -> Self {
        VerifyingReader {
            inner: DigestReader::with_algorithm(inner, expected.algorithm()),
            expected,
            verified: false,
        }
    }

    /// Verify against a hex value published for a given algorithm.
    pub fn with_hex(inner: R, algorithm: DigestAlgorithm, hex_value: &str) -> Result<Self> {
        Ok(Self::new(inner, Digest::new(algorithm, hex_value)?))
    }

    /// Drain the remaining content and check the digest.
    ///
    /// Use this when a consumer stops reading before end of stream but
    /// still needs the integrity guarantee.
    pub fn finish(mut self) -> Result<u64> {
        std::io::copy(&mut self, &mut std::io::sink())
            .map_err(|e| BlobError::from_io("verifying stream", e))?;
        self.check()?;
        Ok(self.inner.size())
    }

    fn check(&mut self) -> Result<()> {
        let found = self.inner.digest();
        if found != self.expected {
            return Err(BlobError::DigestMismatch {
                expected: self.expected.to_string(),
                found: found.to_string(),
            });
        }
        self.verified = true;
        Ok(())
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.verified {
            self.check().map_err(crate::error::into_io)?;
        }
        Ok(n)
    }
}

/// Computes several digests over the same content in one pass.
#[derive(Debug, Clone)]
pub struct MultiHasher {
    hashers: Vec<Hasher>,
    size: u64,
}

impl MultiHasher {
    /// Create a hasher for the given algorithms.
    pub fn new(algorithms: &[DigestAlgorithm]) -> Self {
        MultiHasher {
            hashers: algorithms.iter().map(|a| a.hasher()).collect(),
            size: 0,
        }
    }

    /// Feed data into all hashers.
    pub fn update(&mut self, data: &[u8]) {
        for h in &mut self.hashers {
            h.update(data);
        }
        self.size += data.len() as u64;
    }

    /// Hash a complete stream.
    pub fn consume<R: Read>(&mut self, mut reader: R) -> Result<u64> {
        let mut buf = [0u8; 8192];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| BlobError::from_io("hashing stream", e))?;
            if n == 0 {
                return Ok(self.size);
            }
            self.update(&buf[..n]);
        }
    }

    /// Finish and return one digest per requested algorithm, in order.
    pub fn finish(self) -> Vec<Digest> {
        self.hashers.into_iter().map(Hasher::finish).collect()
    }
}
