//! Input boundary: turning a user-supplied link into a direct URL.
//!
//! A link is classified once into a [`SourceKind`]; the downloader itself never
//! looks at hostnames. Resolution goes through the [`Resolver`] trait so hosts
//! that need scraping or a proprietary API can be plugged in by the caller.

use thiserror::Error;

use crate::error::TransferError;

/// Kind of link, decided from its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    GoogleDrive,
    Mega,
    Mediafire,
    OneDrive,
    /// Any other http(s) URL, assumed to point at the file itself.
    Direct,
    Unsupported,
}

impl SourceKind {
    pub fn classify(link: &str) -> Self {
        let Ok(url) = url::Url::parse(link.trim()) else {
            return SourceKind::Unsupported;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return SourceKind::Unsupported;
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return SourceKind::Unsupported;
        };
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if on("drive.google.com") {
            SourceKind::GoogleDrive
        } else if on("mega.nz") {
            SourceKind::Mega
        } else if on("mediafire.com") {
            SourceKind::Mediafire
        } else if on("1drv.ms") || on("sharepoint.com") {
            SourceKind::OneDrive
        } else {
            SourceKind::Direct
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GoogleDrive => "google-drive",
            SourceKind::Mega => "mega",
            SourceKind::Mediafire => "mediafire",
            SourceKind::OneDrive => "onedrive",
            SourceKind::Direct => "direct",
            SourceKind::Unsupported => "unsupported",
        }
    }
}

/// Why a link could not be resolved. Never retried.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a supported http(s) link: {0}")]
    Unsupported(String),
    #[error("{kind} links are not handled by this resolver")]
    NoResolver { kind: &'static str },
    #[error("could not find a file id in {0}")]
    MissingFileId(String),
}

impl From<ResolveError> for TransferError {
    fn from(e: ResolveError) -> Self {
        TransferError::SourceUnsupported(e.to_string())
    }
}

/// A direct URL plus whatever headers the host needs for the GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Turns a link of a given kind into a direct URL.
pub trait Resolver {
    fn resolve(&self, kind: SourceKind, link: &str) -> Result<ResolvedSource, ResolveError>;
}

/// Handles the hosts that need no page scraping.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinResolver;

impl Resolver for BuiltinResolver {
    fn resolve(&self, kind: SourceKind, link: &str) -> Result<ResolvedSource, ResolveError> {
        let link = link.trim();
        let url = match kind {
            SourceKind::Direct | SourceKind::OneDrive => link.to_string(),
            SourceKind::GoogleDrive => {
                let id = drive_file_id(link)
                    .ok_or_else(|| ResolveError::MissingFileId(link.to_string()))?;
                format!("https://drive.google.com/uc?export=download&id={id}")
            }
            SourceKind::Mega | SourceKind::Mediafire => {
                return Err(ResolveError::NoResolver {
                    kind: kind.as_str(),
                })
            }
            SourceKind::Unsupported => return Err(ResolveError::Unsupported(link.to_string())),
        };
        Ok(ResolvedSource {
            kind,
            url,
            headers: Vec::new(),
        })
    }
}

/// Classifies `link` and resolves it with `resolver`.
pub fn resolve_link(link: &str, resolver: &dyn Resolver) -> Result<ResolvedSource, TransferError> {
    let kind = SourceKind::classify(link);
    tracing::debug!(kind = kind.as_str(), "classified link");
    Ok(resolver.resolve(kind, link)?)
}

/// File id from `/file/d/<id>/view` or `?id=<id>` links.
fn drive_file_id(link: &str) -> Option<String> {
    let url = url::Url::parse(link).ok()?;
    let valid = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };

    let mut segments = url.path_segments()?;
    while let Some(seg) = segments.next() {
        if seg == "d" {
            return segments.next().filter(|s| valid(s)).map(str::to_string);
        }
    }
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .filter(|v| valid(v))
}
